//! Domain types and pure logic for the taskbridge workflow client.
//!
//! This crate has no IO: it defines job status and handle types, the
//! workflow template model (including the legacy placeholder format),
//! slot-binding resolution, and input fingerprinting. The HTTP layer
//! lives in `taskbridge-client`.

pub mod error;
pub mod hashing;
pub mod template;
pub mod types;

pub use error::CoreError;
