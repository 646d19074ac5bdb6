use std::collections::HashMap;
use std::path::{Path, PathBuf};

use procfs::process::{MountInfo, Process};
use procfs::ProcError;

use crate::controller_type::{ControllerType, CONTROLLERS};

#[derive(thiserror::Error, Debug)]
pub enum MountError {
    #[error("failed to read process info from /proc/self: {0}")]
    ReadSelf(ProcError),
    #[error("failed to get mountinfo: {0}")]
    MountInfo(ProcError),
}

fn cgroup_mounts() -> Result<Vec<MountInfo>, MountError> {
    Ok(Process::myself()
        .map_err(MountError::ReadSelf)?
        .mountinfo()
        .map_err(MountError::MountInfo)?
        .into_iter()
        .filter(|m| m.fs_type == "cgroup")
        .collect())
}

/// Whether a v1 mount carries `subsystem`. Co-mounted hierarchies such as
/// `cpu,cpuacct` list every attached controller in their super options;
/// the directory name is only consulted when the options are unavailable.
fn mounts_subsystem(mount: &MountInfo, subsystem: ControllerType) -> bool {
    carries_subsystem(&mount.mount_point, &mount.super_options, subsystem)
}

fn carries_subsystem(
    mount_point: &Path,
    super_options: &HashMap<String, Option<String>>,
    subsystem: ControllerType,
) -> bool {
    if !super_options.is_empty() {
        // named hierarchies show up as `name=systemd`, split into key and value
        let wanted = subsystem.subsystem_name();
        return super_options.iter().any(|(key, value)| match value {
            Some(value) => {
                wanted
                    .strip_prefix(key.as_str())
                    .and_then(|rest| rest.strip_prefix('='))
                    == Some(value.as_str())
            }
            None => key == wanted,
        });
    }

    mount_point
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.split(',').any(|n| n == subsystem.as_str()))
        .unwrap_or(false)
}

/// Mount points of every controller in the catalog that is mounted on this
/// host. Controllers without a hierarchy are left out.
pub fn list_supported_mount_points() -> Result<HashMap<ControllerType, PathBuf>, MountError> {
    let mounts = cgroup_mounts()?;
    let mut mount_paths = HashMap::with_capacity(CONTROLLERS.len());

    for controller in CONTROLLERS {
        if let Some(mount) = mounts.iter().find(|m| mounts_subsystem(m, *controller)) {
            mount_paths.insert(*controller, mount.mount_point.clone());
        } else {
            tracing::debug!(%controller, "controller is not mounted");
        }
    }

    Ok(mount_paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(opts: &[&str]) -> HashMap<String, Option<String>> {
        opts.iter()
            .map(|o| match o.split_once('=') {
                Some((key, value)) => (key.to_owned(), Some(value.to_owned())),
                None => (o.to_string(), None),
            })
            .chain(std::iter::once(("rw".to_owned(), None)))
            .collect()
    }

    #[test]
    fn test_comounted_controllers() {
        let point = Path::new("/sys/fs/cgroup/cpu,cpuacct");
        let opts = options(&["cpu", "cpuacct"]);
        assert!(carries_subsystem(point, &opts, ControllerType::Cpu));
        assert!(carries_subsystem(point, &opts, ControllerType::CpuAcct));
        assert!(!carries_subsystem(point, &opts, ControllerType::CpuSet));
    }

    #[test]
    fn test_named_systemd_hierarchy() {
        let point = Path::new("/sys/fs/cgroup/systemd");
        let opts = options(&["xattr", "name=systemd"]);
        assert!(carries_subsystem(point, &opts, ControllerType::Systemd));
        assert!(!carries_subsystem(point, &opts, ControllerType::Memory));

        let opts = options(&["name=elogind"]);
        assert!(!carries_subsystem(point, &opts, ControllerType::Systemd));
    }

    #[test]
    fn test_fallback_to_directory_name() {
        let point = Path::new("/sys/fs/cgroup/net_cls,net_prio");
        let opts = HashMap::new();
        assert!(carries_subsystem(point, &opts, ControllerType::NetworkClassifier));
        assert!(carries_subsystem(point, &opts, ControllerType::NetworkPriority));
        assert!(!carries_subsystem(point, &opts, ControllerType::Cpu));
    }
}
