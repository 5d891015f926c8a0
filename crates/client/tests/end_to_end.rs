//! End-to-end pipeline scenarios against a scripted hub double.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;

use taskbridge_client::api::{ApiError, AssetUpload, StatusSnapshot};
use taskbridge_client::cache::ResultCache;
use taskbridge_client::config::ClientConfig;
use taskbridge_client::poller::PollConfig;
use taskbridge_client::service::JobService;
use taskbridge_client::{JobClient, JobClientError};
use taskbridge_core::template::{
    Bindings, JobTemplate, NodeMapping, RawTemplate, ResolvedWorkflow, SlotValue, SLOT_PROMPT,
};
use taskbridge_core::types::{AssetReference, JobStatus};

/// Scripted stand-in for the hub. Each endpoint's behavior can be
/// overridden; defaults are: uploads succeed, submissions hand out
/// sequential task ids, status answers `QUEUED` once the script runs
/// dry, outputs return `{"result":"ok"}`, cancels succeed.
#[derive(Default)]
struct FakeHub {
    uploaded: Mutex<Vec<String>>,
    upload_error: Mutex<Option<ApiError>>,
    submitted: Mutex<Vec<ResolvedWorkflow>>,
    submit_error: Mutex<Option<ApiError>>,
    statuses: Mutex<VecDeque<StatusSnapshot>>,
    status_calls: AtomicU32,
    outputs: Mutex<serde_json::Value>,
    cancelled: Mutex<Vec<String>>,
    task_counter: AtomicU32,
}

impl FakeHub {
    fn new() -> Self {
        Self {
            outputs: Mutex::new(serde_json::json!({ "result": "ok" })),
            ..Default::default()
        }
    }

    fn script_statuses(&self, statuses: &[JobStatus]) {
        let mut queue = self.statuses.lock().unwrap();
        for status in statuses {
            queue.push_back(StatusSnapshot {
                code: 0,
                message: None,
                status: status.clone(),
            });
        }
    }

    fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobService for FakeHub {
    async fn upload_asset(&self, upload: AssetUpload) -> Result<AssetReference, ApiError> {
        if let Some(err) = self.upload_error.lock().unwrap().take() {
            return Err(err);
        }
        self.uploaded.lock().unwrap().push(upload.file_name.clone());
        Ok(AssetReference(format!("api/{}", upload.file_name)))
    }

    async fn submit(&self, workflow: &ResolvedWorkflow) -> Result<String, ApiError> {
        if let Some(err) = self.submit_error.lock().unwrap().take() {
            return Err(err);
        }
        self.submitted.lock().unwrap().push(workflow.clone());
        let n = self.task_counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("T{n}"))
    }

    async fn status(&self, _task_id: &str) -> Result<StatusSnapshot, ApiError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.statuses.lock().unwrap().pop_front().unwrap_or(StatusSnapshot {
            code: 0,
            message: None,
            status: JobStatus::Queued,
        });
        Ok(snapshot)
    }

    async fn outputs(&self, _task_id: &str) -> Result<serde_json::Value, ApiError> {
        Ok(self.outputs.lock().unwrap().clone())
    }

    async fn cancel(&self, task_id: &str) -> Result<(), ApiError> {
        self.cancelled.lock().unwrap().push(task_id.to_string());
        Ok(())
    }
}

fn edit_template() -> JobTemplate {
    JobTemplate::from_raw(
        "edit",
        RawTemplate {
            webapp_id: "wa-edit".to_string(),
            node_mapping: Some(NodeMapping {
                prompt_node: Some("1".to_string()),
                image_node: Some("5".to_string()),
            }),
            node_info_list: None,
        },
    )
    .unwrap()
}

fn fast_poll() -> PollConfig {
    PollConfig {
        interval: Duration::from_millis(5),
        deadline: Duration::from_millis(500),
    }
}

fn client_with(hub: FakeHub) -> JobClient<FakeHub> {
    let config = ClientConfig::new("https://hub.test", "key")
        .with_template(edit_template())
        .with_poll_config(fast_poll());
    JobClient::with_service(config, hub, ResultCache::new())
}

fn prompt_bindings(prompt: &str) -> Bindings {
    let mut bindings = Bindings::new();
    bindings.insert(SLOT_PROMPT.to_string(), SlotValue::Text(prompt.to_string()));
    bindings
}

fn png_asset() -> AssetUpload {
    AssetUpload {
        bytes: vec![0x89, 0x50, 0x4e, 0x47],
        file_name: "shot.png".to_string(),
        mime_type: "image/png".to_string(),
    }
}

#[tokio::test]
async fn full_pipeline_success_populates_the_cache() {
    let hub = FakeHub::new();
    hub.script_statuses(&[JobStatus::Queued, JobStatus::Running, JobStatus::Success]);
    let client = client_with(hub);

    let result = client
        .run("edit", prompt_bindings("fix colors"), Some(png_asset()), "page-1", None)
        .await
        .expect("pipeline succeeds");

    assert_eq!(result.handle.task_id, "T1");
    assert_eq!(result.poll_count, 3);
    assert_eq!(result.outputs, serde_json::json!({ "result": "ok" }));

    // Upload result was bound into the submitted workflow.
    let cached = client.cache().try_get("page-1").expect("cached");
    assert_eq!(cached.task_id, "T1");
    assert_eq!(cached.outputs, serde_json::json!({ "result": "ok" }));
    assert_eq!(cached.inputs_fingerprint, result.inputs_fingerprint);
    assert!(client.cache().try_get("page-2").is_none());
}

#[tokio::test]
async fn uploaded_asset_reference_reaches_the_workflow() {
    let hub = FakeHub::new();
    hub.script_statuses(&[JobStatus::Success]);
    let client = client_with(hub);

    client
        .run("edit", prompt_bindings("p"), Some(png_asset()), "page-1", None)
        .await
        .unwrap();

    let hub = client.service();
    assert_eq!(hub.uploaded.lock().unwrap().as_slice(), ["shot.png"]);

    let submitted = hub.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 1);
    let inputs = &submitted[0].inputs;
    assert_eq!(inputs.len(), 2);
    assert_eq!(inputs[1].field_name, "image");
    assert_eq!(inputs[1].field_value, "api/shot.png");
}

#[tokio::test]
async fn submission_rejection_skips_polling_and_cache() {
    let hub = FakeHub::new();
    *hub.submit_error.lock().unwrap() = Some(ApiError::Service {
        code: 1,
        message: "quota exceeded".to_string(),
    });
    let client = client_with(hub);

    let err = client
        .run("edit", prompt_bindings("p"), None, "page-1", None)
        .await
        .unwrap_err();

    assert_matches!(err, JobClientError::Submission(msg) if msg == "quota exceeded");
    // No polling occurred and the cache was never touched.
    assert_eq!(client.service().status_calls(), 0);
    assert!(client.cache().try_get("page-1").is_none());
}

#[tokio::test]
async fn cancel_during_polling_leaves_cache_untouched() {
    let client = Arc::new(client_with(FakeHub::new()));

    let runner = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .run("edit", prompt_bindings("p"), None, "page-1", None)
                .await
        })
    };

    // Let the job poll QUEUED a few times, then cancel via the facade.
    loop {
        tokio::time::sleep(Duration::from_millis(2)).await;
        if client.service().status_calls() >= 5 {
            break;
        }
    }
    assert!(client.is_active());
    assert!(client.cancel().await);

    let err = runner.await.unwrap().unwrap_err();
    assert_matches!(err, JobClientError::JobCancelled);
    assert!(!client.is_active());
    assert!(client.cache().try_get("page-1").is_none());
    // Server-side cancel went out for the submitted task.
    assert_eq!(client.service().cancelled.lock().unwrap().as_slice(), ["T1"]);
}

#[tokio::test]
async fn timeout_when_no_terminal_state_arrives() {
    let hub = FakeHub::new();
    let client = {
        let config = ClientConfig::new("https://hub.test", "key")
            .with_template(edit_template())
            .with_poll_config(PollConfig {
                interval: Duration::from_millis(10),
                deadline: Duration::from_millis(50),
            });
        JobClient::with_service(config, hub, ResultCache::new())
    };

    let err = client
        .run("edit", prompt_bindings("p"), None, "page-1", None)
        .await
        .unwrap_err();

    assert_matches!(err, JobClientError::JobTimeout { .. });
    // ceil(deadline / interval) + 1 status requests at most.
    assert!(client.service().status_calls() <= 6);
    assert!(client.cache().try_get("page-1").is_none());
}

#[tokio::test]
async fn unknown_template_is_a_configuration_error() {
    let client = client_with(FakeHub::new());
    let err = client
        .run("missing", prompt_bindings("p"), None, "page-1", None)
        .await
        .unwrap_err();
    assert_matches!(err, JobClientError::Configuration(msg) if msg.contains("missing"));
}

#[tokio::test]
async fn missing_required_binding_is_a_configuration_error() {
    let client = client_with(FakeHub::new());
    let err = client
        .run("edit", Bindings::new(), None, "page-1", None)
        .await
        .unwrap_err();
    assert_matches!(err, JobClientError::Configuration(msg) if msg.contains("prompt"));
}

#[tokio::test]
async fn failure_never_evicts_a_previously_good_cache_entry() {
    let hub = FakeHub::new();
    hub.script_statuses(&[JobStatus::Success]);
    let client = client_with(hub);

    client
        .run("edit", prompt_bindings("first"), None, "page-1", None)
        .await
        .unwrap();
    assert!(client.cache().try_get("page-1").is_some());

    // Second run fails server-side.
    client.service().script_statuses(&[JobStatus::Failed]);
    let err = client
        .run("edit", prompt_bindings("second"), None, "page-1", None)
        .await
        .unwrap_err();
    assert_matches!(err, JobClientError::JobFailed(_));

    // The first run's result is still there.
    let cached = client.cache().try_get("page-1").unwrap();
    assert_eq!(cached.task_id, "T1");
}

#[tokio::test]
async fn upload_failure_maps_to_upload_error() {
    let hub = FakeHub::new();
    *hub.upload_error.lock().unwrap() = Some(ApiError::Http {
        status: 500,
        body: "boom".to_string(),
    });
    let client = client_with(hub);

    let err = client
        .run("edit", prompt_bindings("p"), Some(png_asset()), "page-1", None)
        .await
        .unwrap_err();
    assert_matches!(err, JobClientError::Upload(_));
}

#[tokio::test]
async fn starting_a_new_job_cancels_the_active_one() {
    let hub = FakeHub::new();
    let client = Arc::new(client_with(hub));

    let first = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .run("edit", prompt_bindings("first"), None, "page-1", None)
                .await
        })
    };

    // Let the first job reach its poll loop.
    loop {
        tokio::time::sleep(Duration::from_millis(2)).await;
        if client.service().status_calls() >= 1 {
            break;
        }
    }

    let second = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .run("edit", prompt_bindings("second"), None, "page-1", None)
                .await
        })
    };

    // Claiming the slot cancels the first session.
    let first = first.await.unwrap();
    assert_matches!(first.unwrap_err(), JobClientError::JobCancelled);

    // Only now let the second job finish, so the first's final in-flight
    // poll cannot swallow the scripted terminal status.
    client.service().script_statuses(&[JobStatus::Success]);
    let second = second.await.unwrap();
    assert_eq!(second.unwrap().handle.task_id, "T2");
}

#[tokio::test]
async fn progress_callback_receives_poll_ticks() {
    let hub = FakeHub::new();
    hub.script_statuses(&[JobStatus::Queued, JobStatus::Running, JobStatus::Success]);
    let client = client_with(hub);

    let ticks = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&ticks);
    let mut callback = move |update: taskbridge_client::poller::ProgressUpdate| {
        sink.lock().unwrap().push((update.poll_count, update.status.clone()));
    };

    client
        .run("edit", prompt_bindings("p"), None, "page-1", Some(&mut callback))
        .await
        .unwrap();

    let ticks = ticks.lock().unwrap();
    assert_eq!(ticks.len(), 2);
    assert_eq!(ticks[0], (1, JobStatus::Queued));
    assert_eq!(ticks[1], (2, JobStatus::Running));
}
