//! Document-grounded retrieval seam.

use async_trait::async_trait;

/// Looks up an answer grounded in course documents.
///
/// Returning `None` passes the message on to the model tiers.
#[async_trait]
pub trait ContextRetriever: Send + Sync {
    /// Retrieve a grounded answer for the message text.
    async fn retrieve(&self, text: &str) -> Option<String>;
}

/// Retriever with no document index; never answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRetriever;

#[async_trait]
impl ContextRetriever for NoopRetriever {
    async fn retrieve(&self, _text: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_never_answers() {
        assert!(NoopRetriever.retrieve("explain photosynthesis").await.is_none());
    }
}
