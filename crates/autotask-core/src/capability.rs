//! Capability traits for collaborators that live outside the engine.
//!
//! Notification dispatch and the ML-based content processors consume the
//! executor's results but contain no scheduling or execution logic of
//! their own. The engine only ever sees these trait objects; the concrete
//! senders and model wrappers are implemented in adapter crates.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::TaskExecution;

/// Delivers a finalized execution result to whoever wants to hear about
/// it (email, webhook, chat). Errors are the implementor's problem to
/// describe; the engine logs them and moves on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, execution: &TaskExecution) -> std::result::Result<(), String>;
}

/// Condensed form of a longer text, as produced by a summarization model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub text: String,
    /// Model self-reported confidence in [0, 1], when available.
    pub confidence: Option<f64>,
}

/// Label assigned to an image, as produced by a classification model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: Option<f64>,
}

/// Text summarization capability (lazy-loaded model behind the trait).
#[async_trait]
pub trait TextSummarizer: Send + Sync {
    async fn summarize(&self, text: &str) -> std::result::Result<Summary, String>;
}

/// Image classification capability.
#[async_trait]
pub trait ImageClassifier: Send + Sync {
    async fn classify(&self, image: &[u8]) -> std::result::Result<Classification, String>;
}
