//! # cgcheck
//! Starts containers through docker and checks from the host that their
//! cgroup v1 limits and membership match what they were started with.
mod commands;
mod observability;
mod runtime;
mod scenario;
mod scenarios;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{crate_version, Parser};
use libcgcheck::common::DEFAULT_CGROUP_ROOT;

use crate::commands::{inspect, run, verify, wait};

#[derive(Parser, Debug)]
#[clap(version = crate_version!(), author = env!("CARGO_PKG_AUTHORS"))]
struct Opts {
    #[clap(flatten)]
    global: GlobalOpts,

    #[clap(subcommand)]
    subcmd: SubCommand,
}

#[derive(Parser, Debug)]
pub struct GlobalOpts {
    /// change log level to debug, but the `log-level` flag takes precedence
    #[clap(long, global = true)]
    pub debug: bool,
    /// set the log level (default is 'error')
    #[clap(long, global = true)]
    pub log_level: Option<String>,
    /// set the log file to write logs to (default is stderr)
    #[clap(short, long, global = true)]
    pub log: Option<PathBuf>,
    /// set the log format ('text' (default), or 'json')
    #[clap(long, global = true)]
    pub log_format: Option<String>,
    /// root the cgroup v1 hierarchies are mounted under
    #[clap(long, global = true, default_value = DEFAULT_CGROUP_ROOT)]
    pub cgroup_root: PathBuf,
    /// locate hierarchies through /proc/self/mountinfo instead
    #[clap(long, global = true)]
    pub discover_mounts: bool,
}

#[derive(Parser, Debug)]
enum SubCommand {
    Run(run::Run),
    /// List available scenarios
    List,
    Verify(verify::Verify),
    Inspect(inspect::Inspect),
    Wait(wait::Wait),
}

fn main() -> Result<()> {
    let opts = Opts::parse();

    if let Err(e) = observability::init(&opts.global) {
        eprintln!("log init failed: {e:?}");
    }

    tracing::debug!(
        "started by user {} with {:?}",
        nix::unistd::geteuid(),
        std::env::args_os()
    );

    match opts.subcmd {
        SubCommand::Run(args) => run::run(args, &opts.global).context("run scenarios"),
        SubCommand::List => commands::list::list().context("list scenarios"),
        SubCommand::Verify(args) => verify::verify(args, &opts.global),
        SubCommand::Inspect(args) => inspect::inspect(args),
        SubCommand::Wait(args) => wait::wait(args, &opts.global),
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli() {
        Opts::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let opts = Opts::try_parse_from([
            "cgcheck",
            "--cgroup-root",
            "/tmp/cgroup",
            "run",
            "--runtime",
            "runsc",
            "-t",
            "memory attributes::table",
        ])
        .unwrap();
        assert_eq!(opts.global.cgroup_root, PathBuf::from("/tmp/cgroup"));
        match opts.subcmd {
            SubCommand::Run(run) => {
                assert_eq!(run.runtime.as_deref(), Some("runsc"));
                assert_eq!(
                    run.tests,
                    Some(vec!["memory".to_owned(), "attributes::table".to_owned()])
                );
                assert_eq!(run.poll.interval, 100);
                assert_eq!(run.poll.timeout, 30);
            }
            other => panic!("unexpected subcommand: {other:?}"),
        }
    }

    #[test]
    fn test_parse_verify() {
        let opts = Opts::try_parse_from([
            "cgcheck",
            "verify",
            "--id",
            "abc",
            "--pid",
            "42",
            "--controllers",
            "memory,name=systemd",
            "--debug",
        ])
        .unwrap();
        assert!(opts.global.debug);
        assert_eq!(
            opts.global.cgroup_root,
            PathBuf::from(DEFAULT_CGROUP_ROOT)
        );
        match opts.subcmd {
            SubCommand::Verify(verify) => {
                assert_eq!(verify.pid, 42);
                assert_eq!(
                    verify.controllers,
                    Some(vec![
                        libcgcheck::ControllerType::Memory,
                        libcgcheck::ControllerType::Systemd
                    ])
                );
            }
            other => panic!("unexpected subcommand: {other:?}"),
        }
    }

    #[test]
    fn test_parse_wait_rejects_unknown_controller() {
        assert!(Opts::try_parse_from([
            "cgcheck", "wait", "--id", "abc", "--file", "x", "--at-least", "1", "--controller",
            "gpu",
        ])
        .is_err());
    }
}
