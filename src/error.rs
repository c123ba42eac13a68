//! Failure taxonomy for lifecycle and verification steps.
//!
//! Every variant names the application and, where one exists, the operation
//! and the observed exit code so a failed scenario step is attributable.
//! Convergence timeouts are absent: polls report them through
//! [`crate::verify::Outcome`] instead of erroring.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("{op} on {app}: precondition failed: {detail}")]
    Precondition {
        op: &'static str,
        app: String,
        detail: String,
    },

    #[error("{op} on {app} failed with exit code {code}")]
    RemoteFailure {
        op: &'static str,
        app: String,
        code: i32,
    },

    #[error("expected creating {app} to fail but it succeeded (uid {uid})")]
    UnexpectedSuccess { app: String, uid: String },

    #[error("snapshot of {app} missing at {}", path.display())]
    SnapshotMissing { app: String, path: PathBuf },

    #[error("snapshot of {app} is empty at {}", path.display())]
    SnapshotEmpty { app: String, path: PathBuf },

    #[error("snapshot of {app} failed integrity check: {detail}")]
    IntegrityViolation { app: String, detail: String },

    #[error("application {app} with uid {uid} is not assigned to group '{group}'")]
    GroupMissing {
        app: String,
        uid: String,
        group: String,
    },

    #[error("{op} on {app}: {source:#}")]
    Collaborator {
        op: &'static str,
        app: String,
        #[source]
        source: anyhow::Error,
    },
}

impl HarnessError {
    pub fn precondition(op: &'static str, app: &str, detail: impl Into<String>) -> Self {
        HarnessError::Precondition {
            op,
            app: app.to_string(),
            detail: detail.into(),
        }
    }

    pub fn collaborator(op: &'static str, app: &str, source: anyhow::Error) -> Self {
        HarnessError::Collaborator {
            op,
            app: app.to_string(),
            source,
        }
    }

    /// Exit code observed from the remote client, when the failure carries one.
    pub fn remote_code(&self) -> Option<i32> {
        match self {
            HarnessError::RemoteFailure { code, .. } => Some(*code),
            _ => None,
        }
    }
}

pub type HarnessResult<T> = std::result::Result<T, HarnessError>;
