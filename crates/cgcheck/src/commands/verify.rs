use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use libcgcheck::attribute::AttributeOutcome;
use libcgcheck::common;
use libcgcheck::membership::verify_controllers;
use libcgcheck::{ControllerType, MEMBERSHIP_CONTROLLERS};
use nix::unistd::Pid;

use super::{create_resolver, load_table};
use crate::GlobalOpts;

/// Check the cgroups of a container that is already running
#[derive(Parser, Debug)]
pub struct Verify {
    /// Identifier the container's cgroups are named after
    #[clap(long)]
    pub id: String,
    /// Host pid of the container's sandbox process
    #[clap(long)]
    pub pid: i32,
    /// JSON attribute table, the built-in docker table if not given
    #[clap(long)]
    pub table: Option<PathBuf>,
    /// Cgroup parent the container was started under, relative to each
    /// hierarchy root
    #[clap(long)]
    pub parent: Option<PathBuf>,
    /// Comma separated controllers to check membership in
    #[clap(long, value_delimiter = ',')]
    pub controllers: Option<Vec<ControllerType>>,
}

fn label(outcome: &AttributeOutcome) -> &'static str {
    match outcome {
        AttributeOutcome::Match => "ok",
        AttributeOutcome::MissingOptional => "skipped",
        AttributeOutcome::Mismatch { .. } | AttributeOutcome::MissingRequired => "not ok",
    }
}

pub fn verify(args: Verify, global: &GlobalOpts) -> Result<()> {
    let resolver = create_resolver(global)?;
    common::require_v1_setup(resolver.root()).context("cgroup v1 is required")?;
    let table = load_table(args.table.as_deref())?;
    let parent = args.parent.as_deref();

    let report = table
        .verify(&resolver, &args.id, parent)
        .context("failed to read cgroup attributes")?;
    for row in &report.rows {
        println!("{:<8}{}", label(&row.outcome), row);
    }

    let controllers = args.controllers.as_deref().unwrap_or(MEMBERSHIP_CONTROLLERS);
    let membership = verify_controllers(
        Pid::from_raw(args.pid),
        &resolver,
        &args.id,
        parent,
        controllers,
    );
    for row in &membership.rows {
        let status = if row.is_failure() { "not ok" } else { "ok" };
        println!("{:<8}{}", status, row);
    }

    let failed = report.failures().count() + membership.failures().count();
    if failed > 0 {
        bail!("{} check(s) failed for container {}", failed, args.id);
    }

    Ok(())
}
