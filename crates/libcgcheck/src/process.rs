use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[cfg(test)]
use mockall::automock;
use nix::unistd::Pid;
use procfs::process::Process;
use procfs::ProcError;

use crate::controller_type::ControllerType;

const DEFAULT_PROC_ROOT: &str = "/proc";

#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    /// The process is gone, unreadable, or `/proc` is not mounted.
    #[error("{what} of process {pid} not found: {source}")]
    NotFound {
        pid: Pid,
        what: &'static str,
        source: ProcError,
    },
    #[error("process {pid} is not attached to a {controller} hierarchy")]
    NoHierarchy {
        pid: Pid,
        controller: ControllerType,
    },
}

/// Per-hierarchy cgroup paths of one process, as recorded in
/// `/proc/<pid>/cgroup`. Paths are relative to the hierarchy root but keep
/// the kernel's leading `/`.
///
/// Lookup is by controller name rather than by record: a record of a
/// co-mounted hierarchy (`cpu,cpuacct`) is reachable through each of its
/// controllers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgroupMembership {
    paths: HashMap<String, PathBuf>,
}

impl CgroupMembership {
    /// Builds the lookup from `(controllers, path)` records. Named
    /// hierarchies lose their `name=` prefix and the controller-less v2
    /// record is skipped.
    pub fn from_records<I, S, P>(records: I) -> Self
    where
        I: IntoIterator<Item = (Vec<S>, P)>,
        S: AsRef<str>,
        P: Into<PathBuf>,
    {
        let mut paths = HashMap::new();
        for (controllers, path) in records {
            if controllers.is_empty() {
                continue;
            }

            let path = path.into();
            for controller in controllers {
                let name = controller.as_ref();
                let name = name.strip_prefix("name=").unwrap_or(name);
                paths.insert(name.to_owned(), path.clone());
            }
        }

        Self { paths }
    }

    pub fn get(&self, controller: ControllerType) -> Option<&Path> {
        self.get_by_name(controller.as_str())
    }

    /// Lookup for hierarchies outside the catalog, e.g. `rdma` or `misc`.
    pub fn get_by_name(&self, name: &str) -> Option<&Path> {
        self.paths.get(name).map(PathBuf::as_path)
    }

    /// Controller names and their paths, sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        let mut entries: Vec<_> = self
            .paths
            .iter()
            .map(|(name, path)| (name.as_str(), path.as_path()))
            .collect();
        entries.sort_by_key(|(name, _)| *name);
        entries.into_iter()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Access to the two process interfaces the verification depends on. They
/// are kept apart so each can fail on its own in tests.
#[cfg_attr(test, automock)]
pub trait ProcessInspector {
    /// Reads the cgroup membership record of `pid`.
    fn cgroup_membership(&self, pid: Pid) -> Result<CgroupMembership, ProcessError>;

    /// Looks up the parent of `pid` in the process hierarchy.
    fn parent_pid(&self, pid: Pid) -> Result<Pid, ProcessError>;
}

/// [`ProcessInspector`] backed by a procfs mount.
#[derive(Debug, Clone)]
pub struct ProcfsInspector {
    proc_root: PathBuf,
}

impl Default for ProcfsInspector {
    fn default() -> Self {
        Self::new(DEFAULT_PROC_ROOT)
    }
}

impl ProcfsInspector {
    pub fn new<P: Into<PathBuf>>(proc_root: P) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }

    fn process(&self, pid: Pid) -> Result<Process, ProcessError> {
        Process::new_with_root(self.proc_root.join(pid.as_raw().to_string())).map_err(|source| {
            ProcessError::NotFound {
                pid,
                what: "process",
                source,
            }
        })
    }
}

impl ProcessInspector for ProcfsInspector {
    fn cgroup_membership(&self, pid: Pid) -> Result<CgroupMembership, ProcessError> {
        let cgroups = self
            .process(pid)?
            .cgroups()
            .map_err(|source| ProcessError::NotFound {
                pid,
                what: "cgroup record",
                source,
            })?;

        Ok(CgroupMembership::from_records(
            cgroups
                .into_iter()
                .map(|cgroup| (cgroup.controllers, cgroup.pathname)),
        ))
    }

    fn parent_pid(&self, pid: Pid) -> Result<Pid, ProcessError> {
        let stat = self
            .process(pid)?
            .stat()
            .map_err(|source| ProcessError::NotFound {
                pid,
                what: "stat",
                source,
            })?;

        Ok(Pid::from_raw(stat.ppid))
    }
}

/// Discovers where a process sits in each cgroup v1 hierarchy.
#[derive(Debug, Clone, Default)]
pub struct ProcessCgroupLoader<I = ProcfsInspector> {
    inspector: I,
}

impl ProcessCgroupLoader<ProcfsInspector> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<I: ProcessInspector> ProcessCgroupLoader<I> {
    pub fn with_inspector(inspector: I) -> Self {
        Self { inspector }
    }

    /// Maps every hierarchy `pid` is attached to onto its cgroup path.
    /// Failures are not retried: a missing record means the process is gone.
    pub fn load_controller_paths(&self, pid: Pid) -> Result<CgroupMembership, ProcessError> {
        let membership = self.inspector.cgroup_membership(pid)?;
        tracing::debug!(%pid, hierarchies = membership.len(), "loaded cgroup membership");
        Ok(membership)
    }

    pub fn controller_path(
        &self,
        pid: Pid,
        controller: ControllerType,
    ) -> Result<PathBuf, ProcessError> {
        self.load_controller_paths(pid)?
            .get(controller)
            .map(Path::to_path_buf)
            .ok_or(ProcessError::NoHierarchy { pid, controller })
    }

    pub fn parent_pid(&self, pid: Pid) -> Result<Pid, ProcessError> {
        self.inspector.parent_pid(pid)
    }

    /// Cgroup path of the parent of `pid` in the `controller` hierarchy.
    /// Containers spawned with a cgroup parent are placed relative to this
    /// path rather than to their own.
    pub fn parent_controller_path(
        &self,
        pid: Pid,
        controller: ControllerType,
    ) -> Result<PathBuf, ProcessError> {
        let ppid = self.parent_pid(pid)?;
        tracing::debug!(%pid, %ppid, "resolved parent process");
        self.controller_path(ppid, controller)
    }
}
