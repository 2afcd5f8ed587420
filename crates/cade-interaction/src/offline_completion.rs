use async_trait::async_trait;
use cade_core::completion::{CompletionError, CompletionRequest, CompletionService};

/// Completion service that is never available.
///
/// Forces the classifier and router onto their deterministic fallbacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineCompletion;

#[async_trait]
impl CompletionService for OfflineCompletion {
    async fn complete(&self, _request: CompletionRequest) -> Result<String, CompletionError> {
        Err(CompletionError::Unavailable(
            "running without a completion backend".into(),
        ))
    }
}
