use std::fmt::Display;
use std::path::{Path, PathBuf};

use crate::common;
use crate::error::VerifyError;

/// Result of comparing one control file against its expected value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeOutcome {
    Match,
    Mismatch { got: String, want: String },
    /// Absent, but the attribute may be disabled on this kernel.
    MissingOptional,
    MissingRequired,
}

impl AttributeOutcome {
    /// Whether the outcome fails a verification run.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            AttributeOutcome::Mismatch { .. } | AttributeOutcome::MissingRequired
        )
    }

    /// Converts failing outcomes into the matching [`VerifyError`].
    pub fn into_result(self, path: &Path) -> Result<(), VerifyError> {
        match self {
            AttributeOutcome::Match | AttributeOutcome::MissingOptional => Ok(()),
            AttributeOutcome::Mismatch { got, want } => Err(VerifyError::Mismatch {
                path: path.to_path_buf(),
                got,
                want,
            }),
            AttributeOutcome::MissingRequired => Err(VerifyError::NotFound {
                path: path.to_path_buf(),
            }),
        }
    }
}

impl Display for AttributeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttributeOutcome::Match => f.write_str("match"),
            AttributeOutcome::Mismatch { got, want } => write!(f, "got: {got:?}, want: {want:?}"),
            AttributeOutcome::MissingOptional => f.write_str("missing (optional)"),
            AttributeOutcome::MissingRequired => f.write_str("missing"),
        }
    }
}

/// Reads a control file and returns its content without surrounding
/// whitespace.
pub fn read_attribute(path: &Path) -> Result<String, VerifyError> {
    let content = common::read_cgroup_file(path)?;
    Ok(content.trim().to_owned())
}

/// Reads a numeric counter such as `memory.max_usage_in_bytes`.
pub fn read_u64(path: &Path) -> Result<u64, VerifyError> {
    let value = read_attribute(path)?;
    value
        .parse::<u64>()
        .map_err(|err| VerifyError::malformed(path, &value, err))
}

/// Compares `file` under `cgroup_dir` against `want` as exact text. Values
/// are expected in their canonical form already, e.g. byte counts in
/// decimal. A missing file or directory is reported as an outcome rather
/// than an error so that optional attributes can be told apart; every
/// other read failure is returned as is.
pub fn verify(
    cgroup_dir: &Path,
    file: &str,
    want: &str,
    optional: bool,
) -> Result<AttributeOutcome, VerifyError> {
    let path = cgroup_dir.join(file);
    let got = match read_attribute(&path) {
        Ok(got) => got,
        Err(VerifyError::NotFound { .. }) if optional => {
            tracing::info!(?path, "skipped missing optional attribute");
            return Ok(AttributeOutcome::MissingOptional);
        }
        Err(VerifyError::NotFound { .. }) => return Ok(AttributeOutcome::MissingRequired),
        Err(err) => return Err(err),
    };

    if got == want {
        tracing::debug!(?path, %got, "attribute matches");
        Ok(AttributeOutcome::Match)
    } else {
        tracing::debug!(?path, %got, %want, "attribute mismatch");
        Ok(AttributeOutcome::Mismatch {
            got,
            want: want.to_owned(),
        })
    }
}

/// [`verify`] with failing outcomes turned into errors.
pub fn verify_strict(
    cgroup_dir: &Path,
    file: &str,
    want: &str,
    optional: bool,
) -> Result<AttributeOutcome, VerifyError> {
    let outcome = verify(cgroup_dir, file, want, optional)?;
    let path: PathBuf = cgroup_dir.join(file);
    outcome.clone().into_result(&path)?;
    Ok(outcome)
}
