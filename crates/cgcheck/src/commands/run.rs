use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

use super::{create_resolver, load_table, PollOpts};
use crate::scenario::{
    parse_selection, Context, DEFAULT_ALPINE_IMAGE, DEFAULT_DOCKER, DEFAULT_PYTHON_IMAGE,
};
use crate::scenarios::scenario_manager;
use crate::GlobalOpts;

/// Start containers and check their cgroups
#[derive(Parser, Debug)]
pub struct Run {
    /// docker binary used to start containers
    #[clap(long, default_value = DEFAULT_DOCKER)]
    pub docker: PathBuf,
    /// Runtime docker starts containers with, e.g. runsc
    #[clap(long)]
    pub runtime: Option<String>,
    /// Image with a python interpreter, used to allocate memory
    #[clap(long, default_value = DEFAULT_PYTHON_IMAGE)]
    pub python_image: String,
    #[clap(long, default_value = DEFAULT_ALPINE_IMAGE)]
    pub alpine_image: String,
    /// JSON attribute table, the built-in docker table if not given
    #[clap(long)]
    pub table: Option<PathBuf>,
    #[clap(flatten)]
    pub poll: PollOpts,
    /// Selected scenarios to be run, format should be
    /// space separated groups, eg
    /// -t memory attributes::table,membership
    #[clap(short, long, num_args(1..), value_delimiter = ' ')]
    pub tests: Option<Vec<String>>,
}

pub fn run(args: Run, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::new(create_resolver(global)?);
    ctx.docker = args.docker;
    ctx.runtime = args.runtime;
    ctx.python_image = args.python_image;
    ctx.alpine_image = args.alpine_image;
    ctx.table = load_table(args.table.as_deref())?;
    ctx.poller = args.poll.poller();

    let manager = scenario_manager();
    let summary = match &args.tests {
        Some(tests) => manager.run_selected(&ctx, &parse_selection(tests)),
        None => manager.run_all(&ctx),
    };

    println!(
        "passed: {}, skipped: {}, failed: {}",
        summary.passed, summary.skipped, summary.failed
    );
    if !summary.is_success() {
        bail!("{} scenario(s) failed", summary.failed);
    }

    Ok(())
}
