//! The [`JobService`] seam between the facade and the wire.
//!
//! The facade and poller talk to the hub only through this trait, so
//! unit and integration tests can substitute a scripted double for
//! [`HubApi`](crate::api::HubApi) without a live server.

use async_trait::async_trait;
use taskbridge_core::template::ResolvedWorkflow;
use taskbridge_core::types::AssetReference;

use crate::api::{ApiError, AssetUpload, HubApi, StatusSnapshot};

/// Remote operations of the hub, one method per endpoint.
///
/// Credentials are an implementation detail of the service, not a
/// parameter: [`HubApi`] carries its API key internally.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Upload a binary asset, returning its server-side reference.
    async fn upload_asset(&self, upload: AssetUpload) -> Result<AssetReference, ApiError>;

    /// Submit a resolved workflow, returning the server-assigned task id.
    async fn submit(&self, workflow: &ResolvedWorkflow) -> Result<String, ApiError>;

    /// Query the current status of a task.
    async fn status(&self, task_id: &str) -> Result<StatusSnapshot, ApiError>;

    /// Retrieve the full output payload of a completed task.
    async fn outputs(&self, task_id: &str) -> Result<serde_json::Value, ApiError>;

    /// Ask the hub to cancel a queued or running task.
    async fn cancel(&self, task_id: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl JobService for HubApi {
    async fn upload_asset(&self, upload: AssetUpload) -> Result<AssetReference, ApiError> {
        HubApi::upload_asset(self, upload).await
    }

    async fn submit(&self, workflow: &ResolvedWorkflow) -> Result<String, ApiError> {
        HubApi::submit(self, workflow).await
    }

    async fn status(&self, task_id: &str) -> Result<StatusSnapshot, ApiError> {
        HubApi::status(self, task_id).await
    }

    async fn outputs(&self, task_id: &str) -> Result<serde_json::Value, ApiError> {
        HubApi::outputs(self, task_id).await
    }

    async fn cancel(&self, task_id: &str) -> Result<(), ApiError> {
        HubApi::cancel(self, task_id).await
    }
}
