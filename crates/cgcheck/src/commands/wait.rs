use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use libcgcheck::ControllerType;

use super::{create_resolver, PollOpts};
use crate::GlobalOpts;

/// Wait until a numeric control file of a container reaches a value
#[derive(Parser, Debug)]
pub struct Wait {
    /// Identifier the container's cgroups are named after
    #[clap(long)]
    pub id: String,
    /// Control file to poll, e.g. memory.max_usage_in_bytes
    #[clap(long)]
    pub file: String,
    #[clap(long)]
    pub at_least: u64,
    #[clap(long, default_value = "memory")]
    pub controller: ControllerType,
    #[clap(long)]
    pub parent: Option<PathBuf>,
    #[clap(flatten)]
    pub poll: PollOpts,
}

pub fn wait(args: Wait, global: &GlobalOpts) -> Result<()> {
    let resolver = create_resolver(global)?;
    let path = resolver.resolve_file(args.controller, &args.id, args.parent.as_deref(), &args.file);

    let result = args.poll.poller().until_at_least(&path, args.at_least)?;
    tracing::debug!(attempts = result.attempts, elapsed = ?result.elapsed, "done polling");
    let value = result.into_result(&format!("{} >= {}", path.display(), args.at_least))?;
    println!("{value}");

    Ok(())
}
