use std::{
    fmt::Display,
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use nix::sys::statfs::{statfs, CGROUP2_SUPER_MAGIC, TMPFS_MAGIC};

pub const CGROUP_PROCS: &str = "cgroup.procs";
pub const DEFAULT_CGROUP_ROOT: &str = "/sys/fs/cgroup";

#[derive(thiserror::Error, Debug)]
pub enum WrappedIoError {
    #[error("failed to read {path}: {err}")]
    Read { err: std::io::Error, path: PathBuf },
    #[error("at {path}: {err}")]
    Other { err: std::io::Error, path: PathBuf },
}

impl WrappedIoError {
    pub fn inner(&self) -> &std::io::Error {
        match self {
            WrappedIoError::Read { err, .. } => err,
            WrappedIoError::Other { err, .. } => err,
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            WrappedIoError::Read { path, .. } => path,
            WrappedIoError::Other { path, .. } => path,
        }
    }

    /// The file, or one of its parent directories, does not exist.
    pub fn is_not_found(&self) -> bool {
        self.inner().kind() == ErrorKind::NotFound
    }
}

#[inline]
pub fn read_cgroup_file<P: AsRef<Path>>(path: P) -> Result<String, WrappedIoError> {
    let path = path.as_ref();
    tracing::debug!(?path, "read cgroup file");
    fs::read_to_string(path).wrap_read(path)
}

pub(crate) trait WrapIoResult {
    type Target;

    fn wrap_read<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
    fn wrap_other<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError>;
}

impl<T> WrapIoResult for Result<T, std::io::Error> {
    type Target = T;

    fn wrap_read<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Read {
            err,
            path: path.into(),
        })
    }

    fn wrap_other<P: Into<PathBuf>>(self, path: P) -> Result<Self::Target, WrappedIoError> {
        self.map_err(|err| WrappedIoError::Other {
            err,
            path: path.into(),
        })
    }
}

pub trait PathBufExt {
    fn join_safely<P: AsRef<Path>>(&self, path: P) -> PathBuf;
}

impl PathBufExt for Path {
    /// Joins `path` even when it is absolute, which is how the kernel reports
    /// cgroup paths in `/proc/<pid>/cgroup`.
    fn join_safely<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        let path = path.as_ref();
        match path.strip_prefix("/") {
            Ok(stripped) => self.join(stripped),
            Err(_) => self.join(path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupSetup {
    Hybrid,
    Legacy,
    Unified,
}

impl CgroupSetup {
    /// Whether per-controller v1 hierarchies are available.
    pub fn has_v1_hierarchies(&self) -> bool {
        matches!(self, CgroupSetup::Hybrid | CgroupSetup::Legacy)
    }
}

impl Display for CgroupSetup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let print = match self {
            CgroupSetup::Hybrid => "hybrid",
            CgroupSetup::Legacy => "legacy",
            CgroupSetup::Unified => "unified",
        };

        write!(f, "{print}")
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SetupError {
    #[error("io error: {0}")]
    WrappedIo(#[from] WrappedIoError),
    #[error("cgroup root {0} does not exist")]
    NoRoot(PathBuf),
    #[error("failed to detect cgroup setup at {0}")]
    FailedToDetect(PathBuf),
    #[error("cgroup setup {0} has no v1 controller hierarchies")]
    Unsupported(CgroupSetup),
}

/// Determines the cgroup setup mounted at `root_path`:
/// - Unified: the root itself is a cgroup2 filesystem.
/// - Legacy: the root is a tmpfs holding one mount per v1 hierarchy.
/// - Hybrid: legacy plus a cgroup2 filesystem under `unified` without
///   controllers attached.
pub fn detect_setup(root_path: &Path) -> Result<CgroupSetup, SetupError> {
    if !root_path.exists() {
        return Err(SetupError::NoRoot(root_path.to_path_buf()));
    }

    let stat = statfs(root_path)
        .map_err(std::io::Error::from)
        .wrap_other(root_path)?;
    if stat.filesystem_type() == CGROUP2_SUPER_MAGIC {
        return Ok(CgroupSetup::Unified);
    }

    if stat.filesystem_type() == TMPFS_MAGIC {
        let unified = root_path.join("unified");
        if unified.exists() {
            let stat = statfs(&unified)
                .map_err(std::io::Error::from)
                .wrap_other(&unified)?;
            if stat.filesystem_type() == CGROUP2_SUPER_MAGIC {
                return Ok(CgroupSetup::Hybrid);
            }
        }

        return Ok(CgroupSetup::Legacy);
    }

    Err(SetupError::FailedToDetect(root_path.to_path_buf()))
}

/// Like [`detect_setup`], but rejects hosts without v1 hierarchies.
pub fn require_v1_setup(root_path: &Path) -> Result<CgroupSetup, SetupError> {
    let setup = detect_setup(root_path)?;
    if !setup.has_v1_hierarchies() {
        return Err(SetupError::Unsupported(setup));
    }

    tracing::debug!(%setup, ?root_path, "detected cgroup setup");
    Ok(setup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::set_fixture;

    #[test]
    fn test_join_safely() {
        let base = Path::new("/sys/fs/cgroup/memory");
        assert_eq!(
            base.join_safely("/user.slice/docker"),
            PathBuf::from("/sys/fs/cgroup/memory/user.slice/docker")
        );
        assert_eq!(
            base.join_safely("docker"),
            PathBuf::from("/sys/fs/cgroup/memory/docker")
        );
        assert_eq!(base.join_safely("/"), PathBuf::from("/sys/fs/cgroup/memory"));
    }

    #[test]
    fn test_read_cgroup_file_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = read_cgroup_file(tmp.path().join("missing/cpu.shares")).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.path(), tmp.path().join("missing/cpu.shares"));
    }

    #[test]
    fn test_read_cgroup_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = set_fixture(tmp.path(), "cpu.shares", "1024\n").unwrap();
        assert_eq!(read_cgroup_file(path).unwrap(), "1024\n");
    }

    #[test]
    fn test_detect_setup_missing_root() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("cgroup");
        assert!(matches!(
            detect_setup(&missing),
            Err(SetupError::NoRoot(p)) if p == missing
        ));
    }
}
