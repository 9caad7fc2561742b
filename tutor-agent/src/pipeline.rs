//! ChatPipeline - resolves one student message to exactly one answer.
//!
//! Tiers run strictly in order and the first one that answers wins:
//! guard, knowledge lookup, context retrieval, fast model, fallback model.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use guardrails::{
    ContentGuard, FanoutIncidentSink, GuardError, GuardRules, GuardVerdict, Incident,
    IncidentSink, JsonlIncidentSink, LoggingIncidentSink, WebhookIncidentSink,
};

use crate::audit::{AuditLog, ResolutionRecord};
use crate::config::{ConfigError, ModelConfig, PipelineConfig};
use crate::knowledge::{KnowledgeBase, KnowledgeError};
use crate::prompt::TutorPrompt;
use crate::retriever::{ContextRetriever, NoopRetriever};
use crate::tiers::{FallbackModelTier, FastModelTier};
use crate::types::{AnswerSource, InboundMessage, ResolvedAnswer, Tier};

/// Returned when the fallback tier itself breaks down.
pub const SYSTEM_ERROR_MESSAGE: &str =
    "I'm having trouble right now. Please try again in a little while.";

/// Used if a refusing verdict arrives without a message.
const GUARD_DEFAULT_MESSAGE: &str = "Let's keep our conversation focused on learning.";

/// Error types for pipeline construction.
///
/// Resolution itself never fails; these only occur at startup.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Guard rules failed to load or validate
    #[error("Guard error: {0}")]
    Guard(#[from] GuardError),

    /// Knowledge tables failed to load or validate
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// A required tier was not supplied
    #[error("Missing tier: {0}")]
    MissingTier(&'static str),
}

/// Sequential resolver for student messages.
pub struct ChatPipeline {
    agent_id: String,
    guard: ContentGuard,
    knowledge: KnowledgeBase,
    retriever: Arc<dyn ContextRetriever>,
    fast: FastModelTier,
    fallback: FallbackModelTier,
    incidents: Arc<dyn IncidentSink>,
    audit: Option<Arc<AuditLog>>,
}

impl ChatPipeline {
    /// Start building a pipeline.
    pub fn builder() -> ChatPipelineBuilder {
        ChatPipelineBuilder::default()
    }

    /// Build a pipeline from configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;

        let rules = match &config.guard_rules_path {
            Some(path) => GuardRules::load(path)?,
            None => GuardRules::default(),
        };
        let knowledge = match &config.knowledge_path {
            Some(path) => KnowledgeBase::load(path)?,
            None => KnowledgeBase::default(),
        };

        let system_prompt = TutorPrompt::system_instruction(&config.grade_band);
        let fast = fast_tier(&config.fast_model, &system_prompt)?;
        let fallback = fallback_tier(&config.fallback_model, &system_prompt)?;

        let log_sink: Arc<dyn IncidentSink> = Arc::new(LoggingIncidentSink);
        let mut incidents = FanoutIncidentSink::new(vec![log_sink]);
        if let Some(path) = &config.incidents.jsonl_path {
            incidents = incidents.with_sink(Arc::new(JsonlIncidentSink::new(path)));
        }
        if let Some(url) = &config.incidents.webhook_url {
            incidents = incidents.with_sink(Arc::new(WebhookIncidentSink::new(url)));
        }

        let mut builder = Self::builder()
            .agent_id(&config.agent_id)
            .guard(ContentGuard::new(rules)?)
            .knowledge(knowledge)
            .fast_tier(fast)
            .fallback_tier(fallback)
            .incident_sink(Arc::new(incidents));

        builder = if config.audit.enabled {
            builder.audit(Arc::new(AuditLog::with_max_entries(config.audit.max_entries)))
        } else {
            builder.without_audit()
        };

        builder.build()
    }

    /// Get the agent ID.
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// The content guard in front of every tier.
    pub fn guard(&self) -> &ContentGuard {
        &self.guard
    }

    /// Resolution audit log, if enabled.
    pub fn audit(&self) -> Option<&Arc<AuditLog>> {
        self.audit.as_ref()
    }

    /// Resolve a message to a single answer.
    ///
    /// Never fails: model errors fall through to later tiers and a broken
    /// fallback tier becomes a fixed apology.
    pub async fn resolve(&self, message: &InboundMessage) -> ResolvedAnswer {
        let started = Instant::now();
        let mut tiers_attempted = Vec::with_capacity(5);

        tiers_attempted.push(Tier::Guard);
        let verdict = self.guard.check(&message.text);

        let (text, source) = if verdict.is_terminal() {
            self.refuse(message, &verdict).await
        } else {
            self.answer(message, &mut tiers_attempted).await
        };

        let flagged = source == AnswerSource::Guardrail;
        let duration_ms = started.elapsed().as_millis() as u64;

        info!(
            agent_id = %self.agent_id,
            sender_id = %message.sender_id,
            source = %source,
            flagged,
            duration_ms,
            "Message resolved"
        );

        if let Some(audit) = &self.audit {
            audit
                .record(ResolutionRecord {
                    entry_id: uuid::Uuid::new_v4().to_string(),
                    sender_id: message.sender_id.clone(),
                    tiers_attempted,
                    source,
                    flagged,
                    guard_action: verdict.action,
                    guard_category: verdict.matched_category.clone(),
                    rules_fingerprint: self.guard.fingerprint().to_string(),
                    duration_ms,
                    resolved_at: chrono::Utc::now(),
                })
                .await;
        }

        ResolvedAnswer::new(text, source, flagged)
    }

    /// Guard stopped the message; raise an incident if needed.
    async fn refuse(
        &self,
        message: &InboundMessage,
        verdict: &GuardVerdict,
    ) -> (String, AnswerSource) {
        debug!(
            sender_id = %message.sender_id,
            action = %verdict.action,
            category = ?verdict.matched_category,
            "Guard stopped message"
        );

        if verdict.requires_escalation() {
            let incident = Incident::from_verdict(&message.sender_id, &message.text, verdict);
            if let Err(e) = self.incidents.record(&incident).await {
                error!(
                    incident_id = %incident.incident_id,
                    sink = self.incidents.name(),
                    error = %e,
                    "Failed to record incident"
                );
            }
        }

        let text = verdict
            .user_message
            .clone()
            .unwrap_or_else(|| GUARD_DEFAULT_MESSAGE.to_string());
        (text, AnswerSource::Guardrail)
    }

    async fn answer(
        &self,
        message: &InboundMessage,
        tiers_attempted: &mut Vec<Tier>,
    ) -> (String, AnswerSource) {
        tiers_attempted.push(Tier::KnowledgeLookup);
        if let Some(hit) = self.knowledge.lookup(
            &message.text,
            &message.enrolled_topic_ids,
            message.sender_display_name.as_deref(),
        ) {
            return (hit.text, hit.source.answer_source());
        }

        tiers_attempted.push(Tier::ContextRetrieve);
        if let Some(text) = self.retriever.retrieve(&message.text).await {
            return (text, AnswerSource::DocumentRetrieval);
        }

        tiers_attempted.push(Tier::FastModel);
        if let Some(text) = self.fast.generate(&message.text).await {
            return (text, AnswerSource::FastModel);
        }

        debug!(backend = %self.fallback.backend_id(), "Falling back to second model");
        tiers_attempted.push(Tier::FallbackModel);
        match AssertUnwindSafe(self.fallback.generate(&message.text))
            .catch_unwind()
            .await
        {
            Ok(reply) => (reply.text, reply.source),
            Err(_) => {
                error!(
                    backend = %self.fallback.backend_id(),
                    sender_id = %message.sender_id,
                    "Fallback tier panicked"
                );
                (SYSTEM_ERROR_MESSAGE.to_string(), AnswerSource::SystemError)
            }
        }
    }
}

fn fast_tier(config: &ModelConfig, system_prompt: &str) -> Result<FastModelTier, ConfigError> {
    let mut tier = FastModelTier::new(config.build_backend()?)
        .with_timeout(config.timeout())
        .with_system_prompt(system_prompt);
    if let Some(max_tokens) = config.max_tokens {
        tier = tier.with_max_tokens(max_tokens);
    }
    if let Some(temperature) = config.temperature {
        tier = tier.with_temperature(temperature);
    }
    Ok(tier)
}

fn fallback_tier(
    config: &ModelConfig,
    system_prompt: &str,
) -> Result<FallbackModelTier, ConfigError> {
    if config.timeout_ms.is_some() {
        warn!(model = %config.model, "timeout_ms is ignored for the fallback model");
    }
    let mut tier = FallbackModelTier::new(config.build_backend()?).with_system_prompt(system_prompt);
    if let Some(max_tokens) = config.max_tokens {
        tier = tier.with_max_tokens(max_tokens);
    }
    if let Some(temperature) = config.temperature {
        tier = tier.with_temperature(temperature);
    }
    Ok(tier)
}

/// Builder for [`ChatPipeline`].
pub struct ChatPipelineBuilder {
    agent_id: Option<String>,
    guard: Option<ContentGuard>,
    knowledge: Option<KnowledgeBase>,
    retriever: Arc<dyn ContextRetriever>,
    fast: Option<FastModelTier>,
    fallback: Option<FallbackModelTier>,
    incidents: Arc<dyn IncidentSink>,
    audit: Option<Arc<AuditLog>>,
}

impl Default for ChatPipelineBuilder {
    fn default() -> Self {
        Self {
            agent_id: None,
            guard: None,
            knowledge: None,
            retriever: Arc::new(NoopRetriever),
            fast: None,
            fallback: None,
            incidents: Arc::new(LoggingIncidentSink),
            audit: Some(Arc::new(AuditLog::new())),
        }
    }
}

impl ChatPipelineBuilder {
    pub fn agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Use a guard other than the built-in rules.
    pub fn guard(mut self, guard: ContentGuard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Use knowledge tables other than the built-in ones.
    pub fn knowledge(mut self, knowledge: KnowledgeBase) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn retriever(mut self, retriever: Arc<dyn ContextRetriever>) -> Self {
        self.retriever = retriever;
        self
    }

    pub fn fast_tier(mut self, tier: FastModelTier) -> Self {
        self.fast = Some(tier);
        self
    }

    pub fn fallback_tier(mut self, tier: FallbackModelTier) -> Self {
        self.fallback = Some(tier);
        self
    }

    /// Where escalations are recorded. Defaults to the log.
    pub fn incident_sink(mut self, sink: Arc<dyn IncidentSink>) -> Self {
        self.incidents = sink;
        self
    }

    pub fn audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn without_audit(mut self) -> Self {
        self.audit = None;
        self
    }

    /// Validate components and assemble the pipeline.
    pub fn build(self) -> Result<ChatPipeline, PipelineError> {
        let guard = match self.guard {
            Some(guard) => guard,
            None => ContentGuard::with_defaults()?,
        };
        let knowledge = self.knowledge.unwrap_or_default();
        knowledge.validate()?;

        let fast = self.fast.ok_or(PipelineError::MissingTier("fast_model"))?;
        let fallback = self
            .fallback
            .ok_or(PipelineError::MissingTier("fallback_model"))?;

        let agent_id = self
            .agent_id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        info!(
            agent_id = %agent_id,
            rules_fingerprint = %guard.fingerprint(),
            fast_model = %fast.backend_id(),
            fast_timeout_ms = fast.timeout().as_millis() as u64,
            fallback_model = %fallback.backend_id(),
            incident_sink = self.incidents.name(),
            "ChatPipeline initialized"
        );

        Ok(ChatPipeline {
            agent_id,
            guard,
            knowledge,
            retriever: self.retriever,
            fast,
            fallback,
            incidents: self.incidents,
            audit: self.audit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::config::ModelProvider;
    use async_trait::async_trait;
    use guardrails::{GuardAction, IncidentError, MemoryIncidentSink};

    fn pipeline_with(
        fast: Arc<MockBackend>,
        fallback: Arc<MockBackend>,
        incidents: Arc<dyn IncidentSink>,
    ) -> ChatPipeline {
        ChatPipeline::builder()
            .agent_id("test")
            .fast_tier(FastModelTier::new(fast))
            .fallback_tier(FallbackModelTier::new(fallback))
            .incident_sink(incidents)
            .build()
            .unwrap()
    }

    struct BrokenSink;

    #[async_trait]
    impl IncidentSink for BrokenSink {
        fn name(&self) -> &str {
            "broken"
        }

        async fn record(&self, _incident: &Incident) -> Result<(), IncidentError> {
            Err(IncidentError::Notification("offline".to_string()))
        }
    }

    #[test]
    fn test_missing_tier_rejected() {
        let result = ChatPipeline::builder()
            .fallback_tier(FallbackModelTier::new(Arc::new(MockBackend::default())))
            .build();
        assert!(matches!(result, Err(PipelineError::MissingTier("fast_model"))));
    }

    #[test]
    fn test_invalid_knowledge_rejected() {
        let mut knowledge = KnowledgeBase::default();
        knowledge.general[0].answer.clear();

        let result = ChatPipeline::builder()
            .knowledge(knowledge)
            .fast_tier(FastModelTier::new(Arc::new(MockBackend::default())))
            .fallback_tier(FallbackModelTier::new(Arc::new(MockBackend::default())))
            .build();
        assert!(matches!(result, Err(PipelineError::Knowledge(_))));
    }

    #[tokio::test]
    async fn test_escalation_recorded_once() {
        let fast = Arc::new(MockBackend::new("fast"));
        let fallback = Arc::new(MockBackend::new("fallback"));
        let sink = Arc::new(MemoryIncidentSink::new());
        let pipeline = pipeline_with(fast.clone(), fallback.clone(), sink.clone());

        let message = InboundMessage::new("i want to kill myself", "student-7");
        let answer = pipeline.resolve(&message).await;

        assert!(answer.flagged);
        assert_eq!(answer.source_label, "guardrail");
        assert!(answer.text.contains("988"));

        let incidents = sink.recent(10).await;
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].sender_id, "student-7");
        assert_eq!(incidents[0].category, "self_harm");
        assert_eq!(incidents[0].action, GuardAction::Escalate);

        assert_eq!(fast.call_count(), 0);
        assert_eq!(fallback.call_count(), 0);
    }

    #[tokio::test]
    async fn test_block_raises_no_incident() {
        let sink = Arc::new(MemoryIncidentSink::new());
        let pipeline = pipeline_with(
            Arc::new(MockBackend::default()),
            Arc::new(MockBackend::default()),
            sink.clone(),
        );

        let answer = pipeline
            .resolve(&InboundMessage::new("this is shit", "student-1"))
            .await;
        assert!(answer.flagged);
        assert_eq!(sink.count().await, 0);
    }

    #[tokio::test]
    async fn test_sink_failure_keeps_answer() {
        let pipeline = pipeline_with(
            Arc::new(MockBackend::default()),
            Arc::new(MockBackend::default()),
            Arc::new(BrokenSink),
        );

        let answer = pipeline
            .resolve(&InboundMessage::new("i want to kill myself", "student-7"))
            .await;
        assert!(answer.flagged);
        assert!(answer.text.contains("988"));
    }

    #[tokio::test]
    async fn test_panicking_fallback_is_contained() {
        let fast = Arc::new(MockBackend::new("fast").failing());
        let fallback = Arc::new(MockBackend::new("fallback").panicking());
        let pipeline = pipeline_with(fast, fallback, Arc::new(LoggingIncidentSink));

        let answer = pipeline
            .resolve(&InboundMessage::new("what is thermodynamics", "student-1"))
            .await;

        assert_eq!(answer.text, SYSTEM_ERROR_MESSAGE);
        assert_eq!(answer.source_label, "system_error");
        assert!(!answer.flagged);
    }

    #[tokio::test]
    async fn test_failing_fallback_apologizes() {
        let pipeline = pipeline_with(
            Arc::new(MockBackend::new("fast").failing()),
            Arc::new(MockBackend::new("fallback").failing()),
            Arc::new(LoggingIncidentSink),
        );

        let answer = pipeline
            .resolve(&InboundMessage::new("what is thermodynamics", "student-1"))
            .await;
        assert_eq!(answer.source_label, "fallback_apology");
        assert_eq!(answer.text, crate::tiers::FALLBACK_APOLOGY);
    }

    #[tokio::test]
    async fn test_from_config_with_mock_models() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::new("campus-tutor");
        config.fast_model = ModelConfig::new(ModelProvider::Mock, "fast");
        config.fast_model.mock_response = Some("Thermodynamics is the study of heat.".to_string());
        config.fallback_model = ModelConfig::new(ModelProvider::Mock, "fallback");
        config.incidents.jsonl_path = Some(dir.path().join("incidents.jsonl"));
        config.audit.max_entries = 5;

        let pipeline = ChatPipeline::from_config(&config).unwrap();
        assert_eq!(pipeline.agent_id(), "campus-tutor");

        let answer = pipeline
            .resolve(&InboundMessage::new("what is thermodynamics", "student-1"))
            .await;
        assert_eq!(answer.source_label, "fast_model");
        assert_eq!(answer.text, "Thermodynamics is the study of heat.");

        pipeline
            .resolve(&InboundMessage::new("send nudes", "student-2"))
            .await;
        let jsonl = JsonlIncidentSink::new(dir.path().join("incidents.jsonl"));
        let incidents = jsonl.read_all().await.unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].category, "grooming");
    }

    #[tokio::test]
    async fn test_audit_disabled() {
        let mut config = PipelineConfig::new("quiet");
        config.fast_model = ModelConfig::new(ModelProvider::Mock, "fast");
        config.fallback_model = ModelConfig::new(ModelProvider::Mock, "fallback");
        config.audit.enabled = false;

        let pipeline = ChatPipeline::from_config(&config).unwrap();
        assert!(pipeline.audit().is_none());
    }
}
