//! The seam between the pipeline and whatever vision model reads the screenshots.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

mod anthropic;
mod response;
mod retry;
mod templates;

pub use anthropic::AnthropicExtractor;
pub use response::parse_fields;
pub use retry::{RetryDecision, RetryPolicy};
pub use templates::{CAUGHT_INFO_TEMPLATE, DETAIL_TEMPLATE, Template};

/// Structured fields returned by one extraction call.
pub type Fields = Map<String, JsonValue>;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("rate limited by extraction service")]
    RateLimited { retry_after: Option<Duration> },

    #[error("malformed extraction output: {reason}")]
    MalformedOutput { reason: String },

    #[error("extraction call failed: {0}")]
    Transient(String),
}

impl ExtractionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RateLimited { .. } => "rate-limit",
            Self::MalformedOutput { .. } => "json-err",
            Self::Transient(_) => "err",
        }
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(
        &self,
        images: &[PathBuf],
        template: &Template,
    ) -> Result<Fields, ExtractionError>;
}

/// Copies every non-null field of `overlay` over `base`.
pub fn merge_non_null(base: &mut Fields, overlay: Fields) {
    for (key, value) in overlay {
        if !value.is_null() {
            base.insert(key, value);
        }
    }
}
