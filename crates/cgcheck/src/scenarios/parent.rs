use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use libcgcheck::membership::{self, Membership};
use libcgcheck::process::{ProcessCgroupLoader, ProcessInspector};
use libcgcheck::{ControllerType, PathResolver};
use nix::unistd::Pid;

use super::{command, has_controller, start_container};
use crate::runtime::{ContainerRuntime, RunOpts};
use crate::scenario::{ConditionalScenario, Context, ScenarioGroup, ScenarioResult};
use crate::try_scenario;

fn random_parent() -> String {
    format!("runsc-{:08x}", rand::random::<u32>())
}

/// Directory a container started with `--cgroup-parent=<parent>` lives in:
/// the parent group is created relative to where the sandbox's own parent
/// process sits in the hierarchy.
pub(crate) fn parented_cgroup_dir<I: ProcessInspector>(
    resolver: &PathResolver,
    loader: &ProcessCgroupLoader<I>,
    controller: ControllerType,
    sandbox: Pid,
    parent: &str,
    cgroup_id: &str,
) -> Result<PathBuf> {
    let base = loader.parent_controller_path(sandbox, controller)?;
    let parent = base.join(parent);
    Ok(resolver.resolve(controller, cgroup_id, Some(&parent)))
}

fn check_attached(controller: ControllerType, pid: Pid, dir: &Path) -> Result<()> {
    match membership::verify_membership(pid, dir)? {
        Membership::Present => Ok(()),
        absent => bail!(
            "cgroup control {:?} processes ({}): {}",
            controller.as_str(),
            dir.display(),
            absent
        ),
    }
}

fn test_parent_memory(ctx: &Context) -> ScenarioResult {
    let parent = random_parent();
    let opts = RunOpts::new(&ctx.alpine_image).cgroup_parent(&parent);
    let container = try_scenario!(start_container(ctx, &opts, &command(&["sleep", "10000"])));
    let id = try_scenario!(container.container_id());
    let pid = try_scenario!(container.sandbox_pid());
    tracing::info!(%id, %pid, %parent, "container sandbox");

    let dir = try_scenario!(parented_cgroup_dir(
        &ctx.resolver,
        &ctx.loader,
        ControllerType::Memory,
        pid,
        &parent,
        &id
    ));
    check_attached(ControllerType::Memory, pid, &dir).into()
}

pub fn get_scenario_group() -> ScenarioGroup {
    let mut group = ScenarioGroup::new("parent");
    group.add(ConditionalScenario::new(
        "memory",
        Box::new(|ctx: &Context| has_controller(ctx, ControllerType::Memory)),
        Box::new(test_parent_memory),
    ));
    group
}
