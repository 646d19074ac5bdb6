use anyhow::{Context as _, Result};
use libcgcheck::expectation::ResourceTable;
use libcgcheck::membership;
use libcgcheck::{ControllerType, PathResolver, MEMBERSHIP_CONTROLLERS};
use nix::unistd::Pid;

use super::{command, has_v1, start_container};
use crate::runtime::{ContainerRuntime, RunOpts};
use crate::scenario::{ConditionalScenario, Context, ScenarioGroup, ScenarioResult};
use crate::try_scenario;

fn sleeper(ctx: &Context, table: &ResourceTable) -> RunOpts {
    RunOpts::new(&ctx.alpine_image).args(table.args())
}

/// Checks every row of `table` for the container's cgroups, logging rows
/// that were skipped because their file does not exist on this host.
pub(crate) fn check_table(
    resolver: &PathResolver,
    table: &ResourceTable,
    cgroup_id: &str,
) -> Result<()> {
    let report = table
        .verify(resolver, cgroup_id, None)
        .context("failed to read cgroup attributes")?;
    for row in report.skipped() {
        tracing::info!(
            controller = %row.expectation.controller,
            file = %row.expectation.file,
            "skipped"
        );
    }
    report.into_result()?;
    Ok(())
}

pub(crate) fn check_membership(
    resolver: &PathResolver,
    pid: Pid,
    cgroup_id: &str,
    controllers: &[ControllerType],
) -> Result<()> {
    membership::verify_controllers(pid, resolver, cgroup_id, None, controllers).into_result()?;
    Ok(())
}

fn test_table(ctx: &Context) -> ScenarioResult {
    let container = try_scenario!(start_container(
        ctx,
        &sleeper(ctx, &ctx.table),
        &command(&["sleep", "10000"])
    ));
    let id = try_scenario!(container.container_id());
    tracing::info!(%id, "container cgroup id");

    check_table(&ctx.resolver, &ctx.table, &id).into()
}

fn test_membership(ctx: &Context) -> ScenarioResult {
    let container = try_scenario!(start_container(
        ctx,
        &sleeper(ctx, &ctx.table),
        &command(&["sleep", "10000"])
    ));
    let id = try_scenario!(container.container_id());
    let pid = try_scenario!(container.sandbox_pid());
    tracing::info!(%id, %pid, "container sandbox");

    check_membership(&ctx.resolver, pid, &id, MEMBERSHIP_CONTROLLERS).into()
}

pub fn get_scenario_group() -> ScenarioGroup {
    let mut group = ScenarioGroup::new("attributes");
    // A required row under an unmounted hierarchy must fail, not skip.
    group.add(ConditionalScenario::new(
        "table",
        Box::new(has_v1),
        Box::new(test_table),
    ));
    group.add(ConditionalScenario::new(
        "membership",
        Box::new(has_v1),
        Box::new(test_membership),
    ));
    group
}
