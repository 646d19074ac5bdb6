use std::fmt::Display;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::attribute::{self, AttributeOutcome};
use crate::controller_type::ControllerType;
use crate::error::VerifyError;
use crate::path::PathResolver;

const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

/// One configured resource limit: the runtime flag that requests it and the
/// control file the kernel reports it in.
///
/// A single `value` renders both the flag argument and the expected file
/// content, so what a container is started with and what is checked
/// afterwards cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeExpectation {
    /// Runtime flag without a value, e.g. `--cpu-shares`.
    pub flag: String,
    pub controller: ControllerType,
    pub file: String,
    /// Canonical decimal form, e.g. bytes rather than `1GB`.
    pub value: String,
    /// The file may legitimately be absent, e.g. swap accounting disabled.
    #[serde(default)]
    pub optional: bool,
}

impl AttributeExpectation {
    pub fn new<F, V>(flag: F, controller: ControllerType, file: &str, value: V) -> Self
    where
        F: Into<String>,
        V: ToString,
    {
        Self {
            flag: flag.into(),
            controller,
            file: file.to_owned(),
            value: value.to_string(),
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Argument passed to the runtime, e.g. `--cpu-shares=1000`.
    pub fn arg(&self) -> String {
        format!("{}={}", self.flag, self.value)
    }

    pub fn expected(&self) -> &str {
        &self.value
    }

    pub fn path(&self, resolver: &PathResolver, cgroup_id: &str, parent: Option<&Path>) -> PathBuf {
        resolver.resolve_file(self.controller, cgroup_id, parent, &self.file)
    }

    pub fn verify(
        &self,
        resolver: &PathResolver,
        cgroup_id: &str,
        parent: Option<&Path>,
    ) -> Result<AttributeOutcome, VerifyError> {
        let cgroup_dir = resolver.resolve(self.controller, cgroup_id, parent);
        attribute::verify(&cgroup_dir, &self.file, &self.value, self.optional)
    }
}

/// The set of expectations making up one verification run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceTable {
    entries: Vec<AttributeExpectation>,
}

impl ResourceTable {
    pub fn new(entries: Vec<AttributeExpectation>) -> Self {
        Self { entries }
    }

    /// Limits that the docker CLI accepts and cgroup v1 reports verbatim.
    /// cpusets are left out: they fail on single-cpu hosts.
    pub fn default_docker() -> Self {
        use ControllerType::*;

        Self::new(vec![
            AttributeExpectation::new("--cpu-shares", Cpu, "cpu.shares", 1000),
            AttributeExpectation::new("--cpu-period", Cpu, "cpu.cfs_period_us", 2000),
            AttributeExpectation::new("--cpu-quota", Cpu, "cpu.cfs_quota_us", 3000),
            AttributeExpectation::new(
                "--kernel-memory",
                Memory,
                "memory.kmem.limit_in_bytes",
                100 * MIB,
            ),
            AttributeExpectation::new("--memory", Memory, "memory.limit_in_bytes", GIB),
            AttributeExpectation::new(
                "--memory-reservation",
                Memory,
                "memory.soft_limit_in_bytes",
                500 * MIB,
            ),
            AttributeExpectation::new(
                "--memory-swap",
                Memory,
                "memory.memsw.limit_in_bytes",
                2 * GIB,
            )
            .optional(),
            AttributeExpectation::new("--memory-swappiness", Memory, "memory.swappiness", 5),
            AttributeExpectation::new("--blkio-weight", Blkio, "blkio.weight", 750).optional(),
            AttributeExpectation::new("--pids-limit", Pids, "pids.max", 1000),
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttributeExpectation> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runtime arguments requesting every limit in the table.
    pub fn args(&self) -> Vec<String> {
        self.entries.iter().map(AttributeExpectation::arg).collect()
    }

    /// Checks every row. Mismatches and missing files end up in the report;
    /// read failures of any other kind abort the run.
    pub fn verify(
        &self,
        resolver: &PathResolver,
        cgroup_id: &str,
        parent: Option<&Path>,
    ) -> Result<TableReport, VerifyError> {
        let rows = self
            .entries
            .iter()
            .map(|expectation| {
                let outcome = expectation.verify(resolver, cgroup_id, parent)?;
                Ok(AttributeReport {
                    path: expectation.path(resolver, cgroup_id, parent),
                    expectation: expectation.clone(),
                    outcome,
                })
            })
            .collect::<Result<Vec<_>, VerifyError>>()?;

        Ok(TableReport { rows })
    }
}

impl FromIterator<AttributeExpectation> for ResourceTable {
    fn from_iter<T: IntoIterator<Item = AttributeExpectation>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone)]
pub struct AttributeReport {
    pub expectation: AttributeExpectation,
    pub path: PathBuf,
    pub outcome: AttributeOutcome,
}

impl Display for AttributeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "arg: {:?}, cgroup attribute {}/{} ({}): {}",
            self.expectation.arg(),
            self.expectation.controller,
            self.expectation.file,
            self.path.display(),
            self.outcome
        )
    }
}

#[derive(Debug, Clone)]
pub struct TableReport {
    pub rows: Vec<AttributeReport>,
}

impl TableReport {
    pub fn failures(&self) -> impl Iterator<Item = &AttributeReport> {
        self.rows.iter().filter(|row| row.outcome.is_failure())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &AttributeReport> {
        self.rows
            .iter()
            .filter(|row| row.outcome == AttributeOutcome::MissingOptional)
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn into_result(self) -> Result<Self, TableError> {
        if self.is_success() {
            return Ok(self);
        }

        Err(TableError {
            failures: self.rows.into_iter().filter(|r| r.outcome.is_failure()).collect(),
        })
    }
}

#[derive(thiserror::Error, Debug)]
#[error("{} cgroup attribute(s) failed verification:{}", .failures.len(), list(.failures))]
pub struct TableError {
    pub failures: Vec<AttributeReport>,
}

fn list(failures: &[AttributeReport]) -> String {
    failures.iter().map(|f| format!("\n\t{f}")).collect()
}
