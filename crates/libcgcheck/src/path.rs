use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::common::{PathBufExt, DEFAULT_CGROUP_ROOT};
use crate::controller_type::ControllerType;
use crate::mount::{self, MountError};

/// Parent the docker daemon places containers under when no
/// `--cgroup-parent` is given.
pub const DEFAULT_PARENT: &str = "docker";

/// Computes the control directory of a container's cgroup in every v1
/// hierarchy. Path construction only: nothing is checked for existence,
/// since the runtime may not have created the directory yet.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    default_parent: PathBuf,
    mounts: HashMap<ControllerType, PathBuf>,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CGROUP_ROOT)
    }
}

impl PathResolver {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self {
            root: root.into(),
            default_parent: PathBuf::from(DEFAULT_PARENT),
            mounts: HashMap::new(),
        }
    }

    /// Resolver seeded with the hierarchy mount points found in
    /// `/proc/self/mountinfo`.
    pub fn from_mountinfo() -> Result<Self, MountError> {
        let mut resolver = Self::default();
        resolver.mounts = mount::list_supported_mount_points()?;
        Ok(resolver)
    }

    pub fn with_default_parent<P: Into<PathBuf>>(mut self, parent: P) -> Self {
        self.default_parent = parent.into();
        self
    }

    /// Overrides where the hierarchy of `controller` is mounted.
    pub fn with_mount<P: Into<PathBuf>>(mut self, controller: ControllerType, mount: P) -> Self {
        self.mounts.insert(controller, mount.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root directory of the hierarchy `controller` belongs to.
    pub fn controller_root(&self, controller: ControllerType) -> PathBuf {
        match self.mounts.get(&controller) {
            Some(mount) => mount.clone(),
            None => self.root.join(controller.as_str()),
        }
    }

    /// `<controller root>/<parent>/<cgroup_id>`, where `parent` defaults to
    /// the runtime's own parent (`docker`). Absolute parents, as reported by
    /// `/proc/<pid>/cgroup`, are taken relative to the controller root.
    pub fn resolve(
        &self,
        controller: ControllerType,
        cgroup_id: &str,
        parent: Option<&Path>,
    ) -> PathBuf {
        let parent = parent.unwrap_or(&self.default_parent);
        self.controller_root(controller)
            .join_safely(parent)
            .join_safely(cgroup_id)
    }

    /// Resolves one control file of the container's cgroup.
    pub fn resolve_file(
        &self,
        controller: ControllerType,
        cgroup_id: &str,
        parent: Option<&Path>,
        file: &str,
    ) -> PathBuf {
        self.resolve(controller, cgroup_id, parent).join(file)
    }
}
