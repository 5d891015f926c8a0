//! Command-line driver: runs one workflow job end to end.
//!
//! Usage: `taskbridge-runner <template> <prompt> [image-path]`
//!
//! Endpoint and credentials come from `TASKBRIDGE_BASE_URL` /
//! `TASKBRIDGE_API_KEY`; templates load from the JSON file named by
//! `TASKBRIDGE_TEMPLATES`. Ctrl-C cancels the active job cooperatively.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use taskbridge_client::api::AssetUpload;
use taskbridge_client::poller::ProgressUpdate;
use taskbridge_client::{ClientConfig, JobClient};
use taskbridge_core::template::{Bindings, SlotValue, SLOT_PROMPT};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "taskbridge_runner=info,taskbridge_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let base_url =
        std::env::var("TASKBRIDGE_BASE_URL").context("TASKBRIDGE_BASE_URL is not set")?;
    let api_key = std::env::var("TASKBRIDGE_API_KEY").context("TASKBRIDGE_API_KEY is not set")?;

    let mut config = ClientConfig::new(base_url, api_key);
    let templates_path =
        std::env::var("TASKBRIDGE_TEMPLATES").context("TASKBRIDGE_TEMPLATES is not set")?;
    config.load_templates_file(&templates_path)?;

    let mut args = std::env::args().skip(1);
    let usage = "usage: taskbridge-runner <template> <prompt> [image-path]";
    let template = args.next().context(usage)?;
    let prompt = args.next().context(usage)?;
    let asset = match args.next() {
        Some(path) => Some(read_asset(Path::new(&path))?),
        None => None,
    };

    let mut bindings = Bindings::new();
    bindings.insert(SLOT_PROMPT.to_string(), SlotValue::Text(prompt));

    let client = Arc::new(JobClient::from_config(config));

    // Ctrl-C flips the cooperative cancellation token; the poll loop
    // observes it within one interval.
    let canceller = Arc::clone(&client);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Ctrl-C received, cancelling active job");
            canceller.cancel().await;
        }
    });

    let mut progress = |update: ProgressUpdate| {
        tracing::info!(
            poll = update.poll_count,
            status = %update.status,
            elapsed_s = update.elapsed.as_secs(),
            "Job in progress",
        );
    };

    let result = client
        .run(&template, bindings, asset, "cli", Some(&mut progress))
        .await?;

    tracing::info!(
        task_id = %result.handle.task_id,
        polls = result.poll_count,
        elapsed_s = result.elapsed.as_secs(),
        "Job finished",
    );
    println!("{}", serde_json::to_string_pretty(&result.outputs)?);
    Ok(())
}

/// Read an image file into an [`AssetUpload`], guessing the MIME type
/// from the extension.
fn read_asset(path: &Path) -> anyhow::Result<AssetUpload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("cannot read asset {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("asset.bin")
        .to_string();
    let mime_type = match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
    .to_string();

    Ok(AssetUpload {
        bytes,
        file_name,
        mime_type,
    })
}
