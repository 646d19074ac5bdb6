use std::fmt::Display;
use std::path::{Path, PathBuf};

use nix::unistd::Pid;

use crate::common::{self, CGROUP_PROCS};
use crate::controller_type::ControllerType;
use crate::error::VerifyError;
use crate::path::PathResolver;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Membership {
    Present,
    /// The pid is not attached; carries every pid that is, in kernel order.
    Absent(Vec<Pid>),
}

impl Membership {
    pub fn is_present(&self) -> bool {
        matches!(self, Membership::Present)
    }
}

impl Display for Membership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Membership::Present => f.write_str("present"),
            Membership::Absent(pids) => {
                let pids: Vec<i32> = pids.iter().map(|p| p.as_raw()).collect();
                write!(f, "absent, got: {pids:?}")
            }
        }
    }
}

/// Parses the content of a `cgroup.procs` file. Any line that is not a pid
/// fails the whole parse.
pub fn parse_procs(path: &Path, content: &str) -> Result<Vec<Pid>, VerifyError> {
    content
        .lines()
        .map(|line| {
            line.parse::<i32>()
                .map(Pid::from_raw)
                .map_err(|err| VerifyError::malformed(path, line, err))
        })
        .collect()
}

/// Lists the processes attached to the cgroup at `cgroup_dir`.
pub fn read_procs(cgroup_dir: &Path) -> Result<Vec<Pid>, VerifyError> {
    let path = cgroup_dir.join(CGROUP_PROCS);
    let content = common::read_cgroup_file(&path)?;
    parse_procs(&path, &content)
}

/// Checks whether `pid` is attached to the cgroup at `cgroup_dir`.
pub fn verify_membership(pid: Pid, cgroup_dir: &Path) -> Result<Membership, VerifyError> {
    let pids = read_procs(cgroup_dir)?;
    if pids.contains(&pid) {
        tracing::debug!(%pid, ?cgroup_dir, "process is attached");
        Ok(Membership::Present)
    } else {
        tracing::debug!(%pid, ?cgroup_dir, attached = pids.len(), "process is not attached");
        Ok(Membership::Absent(pids))
    }
}

/// Membership of one process in one hierarchy.
#[derive(Debug)]
pub struct MembershipRow {
    pub controller: ControllerType,
    pub path: PathBuf,
    pub result: Result<Membership, VerifyError>,
}

impl MembershipRow {
    pub fn is_failure(&self) -> bool {
        !matches!(self.result, Ok(Membership::Present))
    }
}

impl Display for MembershipRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cgroup control {:?} processes: ", self.controller.as_str())?;
        match &self.result {
            Ok(membership) => write!(f, "{membership}"),
            Err(err) => write!(f, "{err}"),
        }
    }
}

#[derive(Debug)]
pub struct MembershipReport {
    pub pid: Pid,
    pub rows: Vec<MembershipRow>,
}

impl MembershipReport {
    pub fn failures(&self) -> impl Iterator<Item = &MembershipRow> {
        self.rows.iter().filter(|row| row.is_failure())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn into_result(self) -> Result<(), MembershipError> {
        if self.is_success() {
            return Ok(());
        }

        Err(MembershipError {
            pid: self.pid,
            failures: self.rows.into_iter().filter(|r| r.is_failure()).collect(),
        })
    }
}

#[derive(thiserror::Error, Debug)]
#[error("process {pid} is missing from {} cgroup(s):{}", .failures.len(), list(.failures))]
pub struct MembershipError {
    pub pid: Pid,
    pub failures: Vec<MembershipRow>,
}

fn list(failures: &[MembershipRow]) -> String {
    failures.iter().map(|f| format!("\n\t{f}")).collect()
}

/// Checks that `pid` is attached to the container's cgroup in each of
/// `controllers`. Every hierarchy is checked even after a failure.
pub fn verify_controllers(
    pid: Pid,
    resolver: &PathResolver,
    cgroup_id: &str,
    parent: Option<&Path>,
    controllers: &[ControllerType],
) -> MembershipReport {
    let rows = controllers
        .iter()
        .map(|controller| {
            let path = resolver.resolve(*controller, cgroup_id, parent);
            let result = verify_membership(pid, &path);
            MembershipRow {
                controller: *controller,
                path,
                result,
            }
        })
        .collect();

    MembershipReport { pid, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::set_fixture;

    #[test]
    fn test_present() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixture(tmp.path(), CGROUP_PROCS, "7\n1234\n99\n").unwrap();

        let membership = verify_membership(Pid::from_raw(1234), tmp.path()).unwrap();
        assert!(membership.is_present());
    }

    #[test]
    fn test_absent_reports_observed_pids() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixture(tmp.path(), CGROUP_PROCS, "7\n99\n").unwrap();

        let membership = verify_membership(Pid::from_raw(1234), tmp.path()).unwrap();
        assert_eq!(
            membership,
            Membership::Absent(vec![Pid::from_raw(7), Pid::from_raw(99)])
        );
        assert_eq!(membership.to_string(), "absent, got: [7, 99]");
    }

    #[test]
    fn test_empty_cgroup() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixture(tmp.path(), CGROUP_PROCS, "").unwrap();

        let membership = verify_membership(Pid::from_raw(1), tmp.path()).unwrap();
        assert_eq!(membership, Membership::Absent(vec![]));
    }

    #[test]
    fn test_malformed_line_fails_whole_read() {
        let tmp = tempfile::tempdir().unwrap();
        set_fixture(tmp.path(), CGROUP_PROCS, "1234\nnot-a-pid\n").unwrap();

        let err = verify_membership(Pid::from_raw(1234), tmp.path()).unwrap_err();
        match err {
            VerifyError::MalformedData { path, content, .. } => {
                assert_eq!(path, tmp.path().join(CGROUP_PROCS));
                assert_eq!(content, "not-a-pid");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_cgroup() {
        let tmp = tempfile::tempdir().unwrap();
        let err = verify_membership(Pid::from_raw(1), &tmp.path().join("docker/abc")).unwrap_err();
        assert!(matches!(err, VerifyError::NotFound { .. }));
    }

    #[test]
    fn test_verify_controllers() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(tmp.path());
        let pid = Pid::from_raw(1234);
        let controllers = [
            ControllerType::Cpu,
            ControllerType::Memory,
            ControllerType::Pids,
            ControllerType::Systemd,
        ];
        for controller in &controllers[..2] {
            let dir = resolver.resolve(*controller, "abc", None);
            std::fs::create_dir_all(&dir).unwrap();
            set_fixture(&dir, CGROUP_PROCS, "1\n1234\n").unwrap();
        }
        let pids_dir = resolver.resolve(ControllerType::Pids, "abc", None);
        std::fs::create_dir_all(&pids_dir).unwrap();
        set_fixture(&pids_dir, CGROUP_PROCS, "1\n").unwrap();

        let report = verify_controllers(pid, &resolver, "abc", None, &controllers);
        assert_eq!(report.rows.len(), 4);
        assert!(!report.is_success());

        let err = report.into_result().unwrap_err();
        let failed: Vec<ControllerType> = err.failures.iter().map(|r| r.controller).collect();
        assert_eq!(failed, vec![ControllerType::Pids, ControllerType::Systemd]);

        let message = err.to_string();
        assert!(message.starts_with("process 1234 is missing from 2 cgroup(s):"));
        assert!(message.contains("cgroup control \"pids\" processes: absent, got: [1]"));
        assert!(message.contains("cgroup control \"systemd\" processes: "));
    }

    #[test]
    fn test_verify_controllers_with_parent() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = PathResolver::new(tmp.path());
        let parent = Path::new("/user.slice/runsc-1");
        let dir = resolver.resolve(ControllerType::Memory, "abc", Some(parent));
        assert_eq!(dir, tmp.path().join("memory/user.slice/runsc-1/abc"));
        std::fs::create_dir_all(&dir).unwrap();
        set_fixture(&dir, CGROUP_PROCS, "42\n").unwrap();

        let report = verify_controllers(
            Pid::from_raw(42),
            &resolver,
            "abc",
            Some(parent),
            &[ControllerType::Memory],
        );
        assert!(report.into_result().is_ok());
    }
}
