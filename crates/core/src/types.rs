//! Job identity and status types shared across the workspace.

use serde::{Deserialize, Serialize};

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Opaque server-side file name returned by the asset upload endpoint.
///
/// Valid for the lifetime of one job; the service makes no promise that
/// a reference survives across unrelated jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetReference(pub String);

impl AssetReference {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssetReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to one submitted job.
///
/// Created on successful submission and never reused for a second
/// submission. Immutable; passed to the poller and output fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    /// Server-assigned task identifier.
    pub task_id: String,
    /// When the submission succeeded (UTC).
    pub submitted_at: Timestamp,
}

impl JobHandle {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            submitted_at: chrono::Utc::now(),
        }
    }
}

/// Status reported by the hub for a running job.
///
/// `Unknown` carries the raw string the service sent (or an empty string
/// when the field was absent entirely) so it can be logged. It is
/// non-terminal: the poll loop keeps going when it sees one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Queued,
    Running,
    Success,
    Completed,
    Failed,
    Error,
    Unknown(String),
}

impl JobStatus {
    /// Parse the `taskStatus` wire string. Unrecognized values map to
    /// [`JobStatus::Unknown`] rather than failing the poll.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "QUEUED" => Self::Queued,
            "RUNNING" => Self::Running,
            "SUCCESS" => Self::Success,
            "COMPLETED" => Self::Completed,
            "FAILED" => Self::Failed,
            "ERROR" => Self::Error,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// True for `SUCCESS` / `COMPLETED`.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success | Self::Completed)
    }

    /// True for `FAILED` / `ERROR`.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed | Self::Error)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Error => "ERROR",
            Self::Unknown(raw) => raw,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
