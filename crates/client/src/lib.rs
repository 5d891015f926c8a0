//! Async client for a remote AI workflow compute service ("the hub").
//!
//! Provides the HTTP API wrapper, the [`JobService`](service::JobService)
//! trait seam, the status polling state machine, a single-slot result
//! cache with an injectable persistence hook, and the [`JobClient`]
//! facade that sequences upload -> submit -> poll -> fetch -> cache.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod poller;
pub mod service;

pub use client::{JobClient, JobResult};
pub use config::ClientConfig;
pub use error::JobClientError;
