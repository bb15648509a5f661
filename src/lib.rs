// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod api;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod dates;
pub mod error;
pub mod limiter;
pub mod matcher;
pub mod metrics;
pub mod orchestrator;
pub mod providers;
pub mod types;
pub mod video;
pub mod web;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::error::FetchError;
pub use crate::orchestrator::{ContentSource, ResolutionOrchestrator};
pub use crate::types::{Loan, Resolution, ResolvedContent};
