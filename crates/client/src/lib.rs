//! HTTP client for the vlab generation/gallery backend.
//!
//! Wraps the remote REST surface (job submission, status fetch,
//! generation content download, gallery upload, content analysis) using
//! [`reqwest`]. The queue crate never talks to this client directly --
//! the worker binary adapts it onto the queue's port traits.

pub mod api;

pub use api::{ApiError, JobWithAnalysis, StudioApi};
