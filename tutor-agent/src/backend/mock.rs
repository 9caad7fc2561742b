//! Mock LLM backend for testing and offline runs.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use super::traits::*;

/// How the mock answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// Return the configured reply
    Reply,
    /// Return an error
    Fail,
    /// Panic mid-call
    Panic,
}

/// Mock backend for testing.
///
/// Configurable reply, failure mode and latency, and counts calls so tests
/// can assert a tier was never reached.
pub struct MockBackend {
    model_id: String,
    response_content: String,
    behavior: MockBehavior,
    latency: Option<Duration>,
    call_count: AtomicU32,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            model_id: model_id.into(),
            response_content: "Mock response".to_string(),
            behavior: MockBehavior::Reply,
            latency: None,
            call_count: AtomicU32::new(0),
        }
    }

    /// Set the response content.
    pub fn with_response(mut self, content: impl Into<String>) -> Self {
        self.response_content = content.into();
        self
    }

    /// Make every call fail.
    pub fn failing(mut self) -> Self {
        self.behavior = MockBehavior::Fail;
        self
    }

    /// Make every call panic.
    pub fn panicking(mut self) -> Self {
        self.behavior = MockBehavior::Panic;
        self
    }

    /// Delay every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Get the number of times complete was called.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Reset the call count.
    pub fn reset_call_count(&self) {
        self.call_count.store(0, Ordering::SeqCst);
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-model")
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn id(&self) -> &str {
        &self.model_id
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match self.behavior {
            MockBehavior::Reply => {}
            MockBehavior::Fail => {
                return Err(LlmError::Unavailable("Mock backend disabled".to_string()));
            }
            MockBehavior::Panic => panic!("mock backend {} panicked", self.model_id),
        }

        // Estimate token counts
        let prompt_tokens: u32 = request
            .messages
            .iter()
            .map(|m| m.content.len() as u32 / 4)
            .sum();

        let completion_tokens = self.response_content.len() as u32 / 4;

        Ok(CompletionResponse {
            content: self.response_content.clone(),
            usage: Usage {
                prompt_tokens,
                completion_tokens,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_backend() {
        let backend = MockBackend::new("test-model").with_response("Hello, world!");

        assert_eq!(backend.call_count(), 0);

        let response = backend
            .complete(CompletionRequest::user("Hi"))
            .await
            .unwrap();

        assert_eq!(response.content, "Hello, world!");
        assert_eq!(backend.call_count(), 1);

        backend.reset_call_count();
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_mock_failing() {
        let backend = MockBackend::new("test-model").failing();

        let result = backend.complete(CompletionRequest::user("Hi")).await;
        assert!(matches!(result, Err(LlmError::Unavailable(_))));
        assert_eq!(backend.call_count(), 1);
    }
}
