//! Upstream API wire formats

pub mod gemini;

// Re-export for convenience
pub use gemini::{build_body, generate_url, list_url, redact, ReplySummary};
