//! Built-in adapters.

pub mod jsonl;

pub use jsonl::{JsonlAdapter, JsonlConfig};

/// Adapter names accepted by `adapter.use`.
pub const AVAILABLE_ADAPTERS: &[&str] = &[jsonl::NAME];
