use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use libcgcheck::expectation::ResourceTable;
use libcgcheck::poll::{ConvergencePoller, DEFAULT_POLL_DEADLINE, DEFAULT_POLL_INTERVAL};
use libcgcheck::PathResolver;

use crate::GlobalOpts;

pub mod inspect;
pub mod list;
pub mod run;
pub mod verify;
pub mod wait;

/// How long to wait for a value written by the runtime to show up.
#[derive(Parser, Debug)]
pub struct PollOpts {
    /// Milliseconds between two reads
    #[clap(long, default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    pub interval: u64,
    /// Seconds after which polling gives up
    #[clap(long, default_value_t = DEFAULT_POLL_DEADLINE.as_secs())]
    pub timeout: u64,
}

impl PollOpts {
    pub fn poller(&self) -> ConvergencePoller {
        ConvergencePoller::new(
            Duration::from_millis(self.interval),
            Duration::from_secs(self.timeout),
        )
    }
}

fn create_resolver(global: &GlobalOpts) -> Result<PathResolver> {
    if global.discover_mounts {
        return PathResolver::from_mountinfo().context("failed to discover cgroup mounts");
    }
    Ok(PathResolver::new(&global.cgroup_root))
}

/// Loads an attribute table from a JSON file, or the built-in docker table.
fn load_table(path: Option<&Path>) -> Result<ResourceTable> {
    let Some(path) = path else {
        return Ok(ResourceTable::default_docker());
    };

    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read table {path:?}"))?;
    let table: ResourceTable = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse table {path:?}"))?;
    tracing::debug!(?path, rows = table.len(), "loaded attribute table");
    Ok(table)
}

#[cfg(test)]
mod tests {
    use libcgcheck::ControllerType;

    use super::*;

    #[test]
    fn test_load_default_table() {
        let table = load_table(None).unwrap();
        assert_eq!(table, ResourceTable::default_docker());
    }

    #[test]
    fn test_load_table_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("table.json");
        fs::write(
            &path,
            r#"[{"flag": "--cpu-shares", "controller": "cpu", "file": "cpu.shares", "value": "512"}]"#,
        )
        .unwrap();

        let table = load_table(Some(path.as_path())).unwrap();
        assert_eq!(table.len(), 1);
        let row = table.iter().next().unwrap();
        assert_eq!(row.controller, ControllerType::Cpu);
        assert_eq!(row.arg(), "--cpu-shares=512");
    }

    #[test]
    fn test_load_table_errors() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(load_table(Some(tmp.path().join("missing.json").as_path())).is_err());

        let path = tmp.path().join("table.json");
        fs::write(
            &path,
            r#"[{"flag": "--x", "controller": "nope", "file": "x", "value": "1"}]"#,
        )
        .unwrap();
        let err = load_table(Some(path.as_path())).unwrap_err();
        assert!(format!("{err:#}").contains("unknown cgroup controller: nope"));
    }

    #[test]
    fn test_poll_opts() {
        let opts = PollOpts {
            interval: 5,
            timeout: 2,
        };
        let poller = opts.poller();
        assert_eq!(poller.interval(), Duration::from_millis(5));
        assert_eq!(poller.deadline(), Duration::from_secs(2));
    }
}
