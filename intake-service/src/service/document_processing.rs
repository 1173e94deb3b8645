//! Document processing workflows: upload, the OCR/storage/vectorization
//! pipeline, and per-document operations.
//!
//! This module coordinates the document lifecycle:
//! - Upload validation and queueing
//! - Supervised background runs with a concurrency cap
//! - Checkpoint recording and progress broadcasting
//! - Cancellation on delete
//! - CRUD operations

mod cancellation;
mod crud;
mod processing;
mod progress;
mod upload;
mod workers;

pub use upload::{UploadAccepted, UploadRequest};
pub(crate) use workers::InFlightRun;
