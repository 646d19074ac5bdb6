pub mod attributes;
pub mod memory;
pub mod parent;

use anyhow::Result;
use libcgcheck::common;
use libcgcheck::ControllerType;
use scopeguard::ScopeGuard;

use crate::runtime::{ContainerRuntime, DockerRuntime, RunOpts};
use crate::scenario::{Context, ScenarioManager};

pub fn scenario_manager() -> ScenarioManager {
    let mut manager = ScenarioManager::new();
    manager.add_group(attributes::get_scenario_group());
    manager.add_group(memory::get_scenario_group());
    manager.add_group(parent::get_scenario_group());
    manager
}

/// The host has v1 hierarchies mounted under the resolver's root.
pub(crate) fn has_v1(ctx: &Context) -> bool {
    match common::require_v1_setup(ctx.resolver.root()) {
        Ok(_) => true,
        Err(err) => {
            tracing::debug!(%err, "cgroup v1 is not available");
            false
        }
    }
}

pub(crate) fn has_controller(ctx: &Context, controller: ControllerType) -> bool {
    has_v1(ctx) && ctx.resolver.controller_root(controller).exists()
}

pub(crate) fn command(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

/// Starts a container that is removed again when the returned guard drops,
/// including when starting it fails halfway.
pub(crate) fn start_container(
    ctx: &Context,
    opts: &RunOpts,
    command: &[String],
) -> Result<ScopeGuard<DockerRuntime, impl FnOnce(DockerRuntime)>> {
    let mut container = scopeguard::guard(ctx.container(), |mut container| {
        if let Err(err) = container.cleanup() {
            tracing::warn!(name = container.name(), "{err:#}");
        }
    });
    container.spawn(opts, command)?;
    Ok(container)
}
