//! Error taxonomy returned by the [`JobClient`](crate::client::JobClient)
//! facade.
//!
//! Transport-level errors ([`ApiError`](crate::api::ApiError)) never
//! leak to the caller raw; the facade classifies each failure by the
//! pipeline phase it occurred in. No variant is retried automatically.

use std::time::Duration;

use taskbridge_core::CoreError;

#[derive(Debug, thiserror::Error)]
pub enum JobClientError {
    /// Asset upload failed (HTTP failure or service-level error code).
    #[error("Upload failed: {0}")]
    Upload(String),

    /// The service rejected the workflow submission.
    #[error("Submission failed: {0}")]
    Submission(String),

    /// Caller bug: unknown template, missing required binding, or an
    /// invalid template definition. Fatal, never retried.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// HTTP-level failure during status polling. The status endpoint is
    /// not expected to self-heal within the polling horizon, so this is
    /// terminal rather than retried.
    #[error("Status polling transport error: {0}")]
    PollTransport(String),

    /// The service reported the job as failed.
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// The polling deadline elapsed before a terminal status.
    #[error("Job timed out after {elapsed:?}")]
    JobTimeout { elapsed: Duration },

    /// The caller cancelled the job.
    #[error("Job cancelled")]
    JobCancelled,

    /// Retrieving the output payload failed.
    #[error("Output fetch failed: {0}")]
    Fetch(String),
}

impl From<CoreError> for JobClientError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Configuration(msg) | CoreError::Validation(msg) => Self::Configuration(msg),
        }
    }
}
