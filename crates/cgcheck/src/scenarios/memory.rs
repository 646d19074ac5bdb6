use std::path::Path;

use anyhow::{bail, Result};
use libcgcheck::attribute::read_u64;
use libcgcheck::poll::{ConvergencePoller, Outcome, Probe};
use libcgcheck::{ControllerType, VerifyError};

use super::{has_controller, start_container};
use crate::runtime::{ContainerRuntime, RunOpts};
use crate::scenario::{ConditionalScenario, Context, ScenarioGroup, ScenarioResult};
use crate::try_scenario;

const ALLOC_SIZE: u64 = 128 << 20;
const LIMIT_FILE: &str = "memory.limit_in_bytes";
const MAX_USAGE_FILE: &str = "memory.max_usage_in_bytes";

fn allocate_command(bytes: u64) -> Vec<String> {
    vec![
        "python".to_owned(),
        "-c".to_owned(),
        format!("import time; s = 'a' * {bytes}; time.sleep(100)"),
    ]
}

/// Waits until the peak usage in `cgroup_dir` reaches `at_least` while the
/// limit reads `limit`. A limit that is not set yet counts as pending, one
/// that changes after it was observed fails immediately.
fn wait_for_usage(
    poller: &ConvergencePoller,
    cgroup_dir: &Path,
    limit: u64,
    at_least: u64,
) -> Result<u64> {
    let limit_file = cgroup_dir.join(LIMIT_FILE);
    let usage_file = cgroup_dir.join(MAX_USAGE_FILE);
    let mut limit_seen = false;

    let result = poller.poll_until(|| {
        let got = read_u64(&limit_file)?;
        if got != limit {
            if limit_seen {
                return Err(VerifyError::Mismatch {
                    path: limit_file.clone(),
                    got: got.to_string(),
                    want: limit.to_string(),
                });
            }
            return Ok(Probe::Pending(None));
        }
        limit_seen = true;

        let usage = read_u64(&usage_file)?;
        tracing::debug!(usage, at_least, "read usage");
        if usage >= at_least {
            Ok(Probe::Converged(Some(usage)))
        } else {
            Ok(Probe::Pending(Some(usage)))
        }
    })?;

    match result.outcome {
        Outcome::Converged(usage) => Ok(usage.unwrap_or_default()),
        Outcome::TimedOut(last) => {
            let usage = last.flatten().unwrap_or_default();
            bail!(
                "{}MB is less than {}MB after {:?}",
                usage >> 20,
                at_least >> 20,
                result.elapsed
            )
        }
    }
}

fn test_memory_usage(ctx: &Context) -> ScenarioResult {
    let limit = 2 * ALLOC_SIZE;
    let opts = RunOpts::new(&ctx.python_image).memory(limit);
    let container = try_scenario!(start_container(ctx, &opts, &allocate_command(ALLOC_SIZE)));
    let id = try_scenario!(container.container_id());
    tracing::info!(%id, "container cgroup id");

    let cgroup_dir = ctx.resolver.resolve(ControllerType::Memory, &id, None);
    let usage = try_scenario!(wait_for_usage(&ctx.poller, &cgroup_dir, limit, ALLOC_SIZE));
    tracing::info!(usage, "peak usage reached");
    ScenarioResult::Passed
}

pub fn get_scenario_group() -> ScenarioGroup {
    let mut group = ScenarioGroup::new("memory");
    let usage = ConditionalScenario::new(
        "usage",
        Box::new(|ctx: &Context| {
            has_controller(ctx, ControllerType::Memory)
                && ctx
                    .resolver
                    .controller_root(ControllerType::Memory)
                    .join(MAX_USAGE_FILE)
                    .exists()
        }),
        Box::new(test_memory_usage),
    );
    group.add(usage);
    group
}
