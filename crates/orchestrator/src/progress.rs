//! Structured progress events.
//!
//! The core emits `{stage, processed, total, message}` records; rendering
//! (progress bars, colors) is entirely the consumer's concern.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStage {
    Walking,
    Parsing,
    Updating,
    Persisting,
}

impl std::fmt::Display for ScanStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Walking => "walking",
            Self::Parsing => "parsing",
            Self::Updating => "updating",
            Self::Persisting => "persisting",
        };

        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub stage: ScanStage,
    pub processed: usize,
    pub total: usize,
    pub message: String,
}

/// Receiver of progress events. Implementations must be cheap; events fire
/// from the pipeline's hot path.
pub trait ProgressSink: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _event: ProgressEvent) {}
}
