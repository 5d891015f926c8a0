//! The [`JobClient`] facade: upload -> submit -> poll -> fetch -> cache.
//!
//! One client holds one service endpoint, one template config, one
//! result cache, and at most one active polling session. Starting a new
//! job while one is active cancels the prior session first; concurrent
//! polling of two jobs is out of scope by design.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use taskbridge_core::hashing::fingerprint_bindings;
use taskbridge_core::template::{Bindings, SlotValue, SLOT_IMAGE};
use taskbridge_core::types::JobHandle;

use crate::api::{ApiError, AssetUpload, HubApi};
use crate::cache::{CachedResult, ResultCache};
use crate::config::ClientConfig;
use crate::error::JobClientError;
use crate::poller::{PollOutcome, PollingSession, ProgressFn};
use crate::service::JobService;

/// A successful job run.
#[derive(Debug, Clone)]
pub struct JobResult {
    pub handle: JobHandle,
    /// Verbatim output payload from the hub.
    pub outputs: serde_json::Value,
    /// Status requests issued before the terminal state.
    pub poll_count: u32,
    /// Wall-clock time from first poll to terminal state.
    pub elapsed: Duration,
    /// Fingerprint of the bindings the job ran with (matches the cached
    /// entry's `inputs_fingerprint`).
    pub inputs_fingerprint: String,
}

/// Bookkeeping for the single active job slot.
struct ActiveSession {
    session_id: Uuid,
    /// Known once submission succeeds; used for server-side cancel.
    task_id: Option<String>,
    cancel: CancellationToken,
    /// The poll loop's shared active flag (false until polling starts).
    polling: Arc<AtomicBool>,
}

/// Single entry point coordinating upload, submission, polling, output
/// fetch, and result caching against one hub.
pub struct JobClient<S: JobService> {
    service: S,
    config: ClientConfig,
    cache: ResultCache,
    active: Mutex<Option<ActiveSession>>,
}

impl JobClient<HubApi> {
    /// Client backed by the real HTTP API, with an in-memory cache.
    pub fn from_config(config: ClientConfig) -> Self {
        let api = HubApi::new(config.base_url.clone(), config.api_key.clone());
        Self::with_service(config, api, ResultCache::new())
    }
}

impl<S: JobService> JobClient<S> {
    /// Client with an injected service and cache (test doubles, custom
    /// persistence).
    pub fn with_service(config: ClientConfig, service: S, cache: ResultCache) -> Self {
        Self {
            service,
            config,
            cache,
            active: Mutex::new(None),
        }
    }

    /// The result cache, for reuse decisions and explicit invalidation.
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// The underlying service (handy for test doubles).
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Whether a polling session is currently looping.
    pub fn is_active(&self) -> bool {
        self.active
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|session| session.polling.load(Ordering::SeqCst))
    }

    /// Run one job through the full pipeline.
    ///
    /// If `asset` is present it is uploaded first and bound to the
    /// `image` slot. On success the result is cached under `context_id`;
    /// on any failure the cache is left untouched, so a previously good
    /// entry is never evicted by a failed rerun.
    pub async fn run(
        &self,
        template_name: &str,
        bindings: Bindings,
        asset: Option<AssetUpload>,
        context_id: &str,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<JobResult, JobClientError> {
        let template = self
            .config
            .template(template_name)
            .ok_or_else(|| {
                JobClientError::Configuration(format!("unknown template '{template_name}'"))
            })?
            .clone();

        let session_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        self.claim_slot(session_id, cancel.clone()).await;

        let result = self
            .run_pipeline(&template, bindings, asset, context_id, session_id, &cancel, progress)
            .await;

        self.release_slot(session_id);
        result
    }

    /// Cancel the active session, if any.
    ///
    /// Sets the cooperative cancellation token (the poll loop observes
    /// it before its next status request, or immediately during its
    /// sleep) and fires a best-effort server-side `/cancel`. Returns
    /// whether a session was active.
    pub async fn cancel(&self) -> bool {
        let (cancel, task_id) = {
            let slot = self.active.lock().unwrap();
            match slot.as_ref() {
                Some(session) => (session.cancel.clone(), session.task_id.clone()),
                None => return false,
            }
        };

        cancel.cancel();
        if let Some(task_id) = task_id {
            if let Err(e) = self.service.cancel(&task_id).await {
                tracing::warn!(task_id = %task_id, error = %e, "Server-side cancel failed");
            }
        }
        true
    }

    // ---- private helpers ----

    async fn run_pipeline(
        &self,
        template: &taskbridge_core::template::JobTemplate,
        mut bindings: Bindings,
        asset: Option<AssetUpload>,
        context_id: &str,
        session_id: Uuid,
        cancel: &CancellationToken,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<JobResult, JobClientError> {
        if let Some(upload) = asset {
            let reference = self
                .service
                .upload_asset(upload)
                .await
                .map_err(|e| JobClientError::Upload(service_message(e)))?;
            tracing::info!(reference = %reference, "Asset uploaded");
            bindings.insert(SLOT_IMAGE.to_string(), SlotValue::Asset(reference));
        }

        let inputs_fingerprint = fingerprint_bindings(&bindings);
        let workflow = template.resolve(&bindings)?;

        let task_id = self
            .service
            .submit(&workflow)
            .await
            .map_err(|e| JobClientError::Submission(service_message(e)))?;
        let handle = JobHandle::new(task_id);
        tracing::info!(
            task_id = %handle.task_id,
            template = %template.name,
            "Workflow submitted",
        );

        let polling = PollingSession::new(handle.clone(), self.config.poll, cancel.clone());
        self.publish_handle(session_id, &handle, polling.active_flag());

        match polling.run(&self.service, progress).await {
            PollOutcome::Success {
                poll_count,
                elapsed,
            } => {
                let outputs = self
                    .service
                    .outputs(&handle.task_id)
                    .await
                    .map_err(|e| JobClientError::Fetch(service_message(e)))?;
                self.cache.store(CachedResult {
                    task_id: handle.task_id.clone(),
                    context_id: context_id.to_string(),
                    inputs_fingerprint: inputs_fingerprint.clone(),
                    outputs: outputs.clone(),
                    cached_at: chrono::Utc::now(),
                });
                Ok(JobResult {
                    handle,
                    outputs,
                    poll_count,
                    elapsed,
                    inputs_fingerprint,
                })
            }
            PollOutcome::Failed { message, .. } => Err(JobClientError::JobFailed(message)),
            PollOutcome::TransportError { message, .. } => {
                Err(JobClientError::PollTransport(message))
            }
            PollOutcome::TimedOut { elapsed, .. } => Err(JobClientError::JobTimeout { elapsed }),
            PollOutcome::Cancelled { .. } => Err(JobClientError::JobCancelled),
        }
    }

    /// Install a new active session, cancelling any prior one first.
    async fn claim_slot(&self, session_id: Uuid, cancel: CancellationToken) {
        let prior = {
            let mut slot = self.active.lock().unwrap();
            slot.replace(ActiveSession {
                session_id,
                task_id: None,
                cancel,
                polling: Arc::new(AtomicBool::new(false)),
            })
        };

        if let Some(prior) = prior {
            tracing::info!("Cancelling prior active session before starting a new job");
            prior.cancel.cancel();
            if let Some(task_id) = prior.task_id {
                if let Err(e) = self.service.cancel(&task_id).await {
                    tracing::warn!(task_id = %task_id, error = %e, "Server-side cancel failed");
                }
            }
        }
    }

    /// Record the submitted task id and the poll loop's active flag so
    /// a concurrent cancel call can reach the server-side task.
    fn publish_handle(&self, session_id: Uuid, handle: &JobHandle, polling: Arc<AtomicBool>) {
        let mut slot = self.active.lock().unwrap();
        if let Some(session) = slot.as_mut() {
            if session.session_id == session_id {
                session.task_id = Some(handle.task_id.clone());
                session.polling = polling;
            }
        }
    }

    /// Release the slot exactly once, and only for our own session: a
    /// newer job that already replaced the slot is left alone.
    fn release_slot(&self, session_id: Uuid) {
        let mut slot = self.active.lock().unwrap();
        if slot.as_ref().is_some_and(|s| s.session_id == session_id) {
            *slot = None;
        }
    }
}

/// Prefer the service's own message for service-level failures; fall
/// back to the transport error's rendering otherwise.
fn service_message(error: ApiError) -> String {
    match error {
        ApiError::Service { message, .. } => message,
        other => other.to_string(),
    }
}
