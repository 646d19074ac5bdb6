use anyhow::{Context, Result};
use clap::Parser;
use libcgcheck::process::ProcessCgroupLoader;
use nix::unistd::Pid;

/// Show the cgroup path of a process in every hierarchy
#[derive(Parser, Debug)]
pub struct Inspect {
    #[clap(long)]
    pub pid: i32,
    /// Show the paths of the process's parent instead
    #[clap(long)]
    pub parent: bool,
}

pub fn inspect(args: Inspect) -> Result<()> {
    let loader = ProcessCgroupLoader::new();
    let mut pid = Pid::from_raw(args.pid);
    if args.parent {
        pid = loader
            .parent_pid(pid)
            .with_context(|| format!("failed to find the parent of {pid}"))?;
        println!("{:<18}{}", "Parent", pid);
    }

    let membership = loader.load_controller_paths(pid)?;
    for (controller, path) in membership.iter() {
        println!("{:<18}{}", controller, path.display());
    }

    Ok(())
}
