//! Shared domain types and pure helpers for the vlab generation queue.
//!
//! This crate has no internal dependencies. It defines the remote job
//! vocabulary ([`types::VideoJob`], [`types::Generation`]), request and
//! analysis DTOs, and the pure functions used by the queue orchestrator
//! (asset naming, progress estimation).

pub mod naming;
pub mod progress;
pub mod types;
