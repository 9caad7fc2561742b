//! Hosted model tiers.
//!
//! The fast tier answers within a fixed budget or steps aside; the fallback
//! tier always produces text, falling back to a canned apology.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::backend::{CompletionRequest, LlmBackend};
use crate::prompt::{TutorPrompt, DEFAULT_GRADE_BAND};
use crate::types::AnswerSource;

/// Default fast tier budget.
pub const DEFAULT_FAST_TIMEOUT_MS: u64 = 5_000;

/// Shown when the fallback model fails.
pub const FALLBACK_APOLOGY: &str = "Sorry, I couldn't find an answer to that right now. \
     Please try asking in a different way, or check your course materials.";

/// Text and source produced by a model tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierReply {
    pub text: String,
    pub source: AnswerSource,
}

fn build_request(
    system_prompt: &str,
    text: &str,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
) -> CompletionRequest {
    let mut request = CompletionRequest::user(text).with_system(system_prompt);
    if let Some(max_tokens) = max_tokens {
        request = request.with_max_tokens(max_tokens);
    }
    if let Some(temperature) = temperature {
        request = request.with_temperature(temperature);
    }
    request
}

/// Fast model tier with a bounded wait.
pub struct FastModelTier {
    backend: Arc<dyn LlmBackend>,
    timeout: Duration,
    system_prompt: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl FastModelTier {
    /// Create a tier with the default budget and system instruction.
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            timeout: Duration::from_millis(DEFAULT_FAST_TIMEOUT_MS),
            system_prompt: TutorPrompt::system_instruction(DEFAULT_GRADE_BAND),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn backend_id(&self) -> &str {
        self.backend.id()
    }

    /// Ask the fast model, waiting at most the configured budget.
    ///
    /// Returns `None` on timeout, error or blank output. A call that runs
    /// past the budget is dropped, which aborts its HTTP request.
    pub async fn generate(&self, text: &str) -> Option<String> {
        let request = build_request(&self.system_prompt, text, self.max_tokens, self.temperature);
        let started = Instant::now();

        match tokio::time::timeout(self.timeout, self.backend.complete(request)).await {
            Ok(Ok(response)) if !response.content.trim().is_empty() => {
                debug!(
                    backend = %self.backend.id(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    tokens = response.usage.total(),
                    "Fast model answered"
                );
                Some(response.content)
            }
            Ok(Ok(_)) => {
                warn!(backend = %self.backend.id(), "Fast model returned blank text");
                None
            }
            Ok(Err(e)) => {
                warn!(backend = %self.backend.id(), error = %e, "Fast model failed");
                None
            }
            Err(_) => {
                warn!(
                    backend = %self.backend.id(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Fast model timed out"
                );
                None
            }
        }
    }
}

/// Fallback model tier; always produces a reply.
pub struct FallbackModelTier {
    backend: Arc<dyn LlmBackend>,
    system_prompt: String,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
}

impl FallbackModelTier {
    /// Create a tier with the default system instruction.
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            system_prompt: TutorPrompt::system_instruction(DEFAULT_GRADE_BAND),
            max_tokens: None,
            temperature: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn backend_id(&self) -> &str {
        self.backend.id()
    }

    /// Ask the fallback model. Failures become the canned apology.
    pub async fn generate(&self, text: &str) -> TierReply {
        let request = build_request(&self.system_prompt, text, self.max_tokens, self.temperature);

        match self.backend.complete(request).await {
            Ok(response) if !response.content.trim().is_empty() => TierReply {
                text: response.content,
                source: AnswerSource::FallbackModel,
            },
            Ok(_) => {
                warn!(backend = %self.backend.id(), "Fallback model returned blank text");
                apology()
            }
            Err(e) => {
                warn!(backend = %self.backend.id(), error = %e, "Fallback model failed");
                apology()
            }
        }
    }
}

fn apology() -> TierReply {
    TierReply {
        text: FALLBACK_APOLOGY.to_string(),
        source: AnswerSource::FallbackApology,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;

    #[tokio::test]
    async fn test_fast_tier_answers() {
        let backend = Arc::new(MockBackend::new("fast").with_response("• Heat moves energy"));
        let tier = FastModelTier::new(backend.clone());

        assert_eq!(tier.generate("what is heat").await.as_deref(), Some("• Heat moves energy"));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_tier_times_out() {
        let backend = Arc::new(MockBackend::new("fast").with_latency(Duration::from_secs(30)));
        let tier = FastModelTier::new(backend.clone());

        assert!(tier.generate("what is heat").await.is_none());
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fast_tier_soft_fails() {
        let tier = FastModelTier::new(Arc::new(MockBackend::new("fast").failing()));
        assert!(tier.generate("what is heat").await.is_none());

        let blank = FastModelTier::new(Arc::new(MockBackend::new("fast").with_response("   ")));
        assert!(blank.generate("what is heat").await.is_none());
    }

    #[tokio::test]
    async fn test_fallback_tier_answers() {
        let tier = FallbackModelTier::new(Arc::new(MockBackend::new("slow").with_response("Heat")));
        let reply = tier.generate("what is heat").await;

        assert_eq!(reply.text, "Heat");
        assert_eq!(reply.source, AnswerSource::FallbackModel);
    }

    #[tokio::test]
    async fn test_fallback_tier_apologizes() {
        let tier = FallbackModelTier::new(Arc::new(MockBackend::new("slow").failing()));
        let reply = tier.generate("what is heat").await;

        assert_eq!(reply.text, FALLBACK_APOLOGY);
        assert_eq!(reply.source, AnswerSource::FallbackApology);
    }
}
