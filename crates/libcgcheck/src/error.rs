use std::path::PathBuf;
use std::time::Duration;

use crate::common::WrappedIoError;

#[derive(thiserror::Error, Debug)]
pub enum VerifyError {
    /// An expected file or directory is absent.
    #[error("{path} does not exist")]
    NotFound { path: PathBuf },
    /// Content did not have the shape the kernel interface defines.
    #[error("malformed data in {path}: {content:?}: {reason}")]
    MalformedData {
        path: PathBuf,
        content: String,
        reason: String,
    },
    #[error("{path}: got {got:?}, want {want:?}")]
    Mismatch {
        path: PathBuf,
        got: String,
        want: String,
    },
    #[error("timed out after {elapsed:?} waiting for {what}, last observed: {last}")]
    TimedOut {
        what: String,
        elapsed: Duration,
        last: String,
    },
    #[error(transparent)]
    Io(WrappedIoError),
}

impl VerifyError {
    pub(crate) fn malformed<P: Into<PathBuf>, R: ToString>(
        path: P,
        content: &str,
        reason: R,
    ) -> Self {
        VerifyError::MalformedData {
            path: path.into(),
            content: content.to_owned(),
            reason: reason.to_string(),
        }
    }

    /// Failures that may clear up once the container finishes starting.
    /// Malformed data is a contract violation and never transient.
    pub fn is_transient(&self) -> bool {
        matches!(self, VerifyError::NotFound { .. })
    }
}

impl From<WrappedIoError> for VerifyError {
    fn from(err: WrappedIoError) -> Self {
        if err.is_not_found() {
            VerifyError::NotFound {
                path: err.path().to_path_buf(),
            }
        } else if err.inner().kind() == std::io::ErrorKind::InvalidData {
            // read_to_string reports non UTF-8 content this way
            VerifyError::MalformedData {
                path: err.path().to_path_buf(),
                content: String::new(),
                reason: err.inner().to_string(),
            }
        } else {
            VerifyError::Io(err)
        }
    }
}
