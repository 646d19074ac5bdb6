use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Hash, PartialEq, Eq, PartialOrd, Ord, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ControllerType {
    Blkio,
    Cpu,
    CpuAcct,
    CpuSet,
    Devices,
    Freezer,
    HugeTlb,
    Memory,
    NetworkClassifier,
    NetworkPriority,
    PerfEvent,
    Pids,
    /// The named `name=systemd` hierarchy. It has no resource controller
    /// attached but the runtime still places the container in it.
    Systemd,
}

impl ControllerType {
    /// Directory name of the hierarchy below the cgroup root.
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Blkio => "blkio",
            Self::Cpu => "cpu",
            Self::CpuAcct => "cpuacct",
            Self::CpuSet => "cpuset",
            Self::Devices => "devices",
            Self::Freezer => "freezer",
            Self::HugeTlb => "hugetlb",
            Self::Memory => "memory",
            Self::NetworkClassifier => "net_cls",
            Self::NetworkPriority => "net_prio",
            Self::PerfEvent => "perf_event",
            Self::Pids => "pids",
            Self::Systemd => "systemd",
        }
    }

    /// Name as it appears in a mount's super options and in
    /// `/proc/<pid>/cgroup`.
    pub fn subsystem_name(&self) -> &'static str {
        match *self {
            Self::Systemd => "name=systemd",
            other => other.as_str(),
        }
    }
}

impl Display for ControllerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for ControllerType {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown cgroup controller: {0}")]
pub struct UnknownControllerError(pub String);

impl FromStr for ControllerType {
    type Err = UnknownControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CONTROLLERS
            .iter()
            .find(|c| c.as_str() == s || c.subsystem_name() == s)
            .copied()
            .ok_or_else(|| UnknownControllerError(s.to_owned()))
    }
}

impl TryFrom<String> for ControllerType {
    type Error = UnknownControllerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ControllerType> for String {
    fn from(value: ControllerType) -> Self {
        value.as_str().to_owned()
    }
}

pub const CONTROLLERS: &[ControllerType] = &[
    ControllerType::Blkio,
    ControllerType::Cpu,
    ControllerType::CpuAcct,
    ControllerType::CpuSet,
    ControllerType::Devices,
    ControllerType::Freezer,
    ControllerType::HugeTlb,
    ControllerType::Memory,
    ControllerType::NetworkClassifier,
    ControllerType::NetworkPriority,
    ControllerType::PerfEvent,
    ControllerType::Pids,
    ControllerType::Systemd,
];

/// Hierarchies a sandbox process is expected to be attached to.
pub const MEMBERSHIP_CONTROLLERS: &[ControllerType] = &[
    ControllerType::Blkio,
    ControllerType::Cpu,
    ControllerType::CpuSet,
    ControllerType::Memory,
    ControllerType::NetworkClassifier,
    ControllerType::NetworkPriority,
    ControllerType::Devices,
    ControllerType::Freezer,
    ControllerType::PerfEvent,
    ControllerType::Pids,
    ControllerType::Systemd,
];
