//! Boundary types for the tutor pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// A message from a student, immutable for the duration of one resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    /// What the student typed
    pub text: String,
    /// Who sent it
    pub sender_id: String,
    /// Course ids the student is enrolled in, in enrollment order
    #[serde(default)]
    pub enrolled_topic_ids: Vec<String>,
    /// Student's display name, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_display_name: Option<String>,
}

impl InboundMessage {
    /// Create a new message.
    pub fn new(text: impl Into<String>, sender_id: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender_id: sender_id.into(),
            enrolled_topic_ids: Vec::new(),
            sender_display_name: None,
        }
    }

    /// Set enrolled course ids.
    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enrolled_topic_ids = topics.into_iter().map(Into::into).collect();
        self
    }

    /// Set display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.sender_display_name = Some(name.into());
        self
    }
}

/// Pipeline stage that produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Guard,
    KnowledgeLookup,
    ContextRetrieve,
    FastModel,
    FallbackModel,
}

impl Tier {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Guard => "guard",
            Tier::KnowledgeLookup => "knowledge_lookup",
            Tier::ContextRetrieve => "context_retrieve",
            Tier::FastModel => "fast_model",
            Tier::FallbackModel => "fallback_model",
        }
    }
}

/// Where an answer's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    /// Guard refused or redirected the message
    Guardrail,
    /// Personalized profile template
    StudentProfile,
    /// Static entry from an enrolled course
    CourseMaterials,
    /// Static entry from the general FAQ
    GeneralFaq,
    /// List of the student's enrolled courses
    CourseList,
    /// Document-grounded retrieval
    DocumentRetrieval,
    /// Fast hosted model
    FastModel,
    /// Fallback hosted model
    FallbackModel,
    /// Fallback model failed; canned apology
    FallbackApology,
    /// Something went wrong inside the pipeline itself
    SystemError,
}

impl AnswerSource {
    /// Stable label exposed to callers.
    pub fn label(&self) -> &'static str {
        match self {
            AnswerSource::Guardrail => "guardrail",
            AnswerSource::StudentProfile => "student_profile",
            AnswerSource::CourseMaterials => "course_materials",
            AnswerSource::GeneralFaq => "general_faq",
            AnswerSource::CourseList => "course_list",
            AnswerSource::DocumentRetrieval => "document_retrieval",
            AnswerSource::FastModel => "fast_model",
            AnswerSource::FallbackModel => "fallback_model",
            AnswerSource::FallbackApology => "fallback_apology",
            AnswerSource::SystemError => "system_error",
        }
    }

    /// Tier that produces answers from this source.
    pub fn tier(&self) -> Tier {
        match self {
            AnswerSource::Guardrail => Tier::Guard,
            AnswerSource::StudentProfile
            | AnswerSource::CourseMaterials
            | AnswerSource::GeneralFaq
            | AnswerSource::CourseList => Tier::KnowledgeLookup,
            AnswerSource::DocumentRetrieval => Tier::ContextRetrieve,
            AnswerSource::FastModel => Tier::FastModel,
            AnswerSource::FallbackModel
            | AnswerSource::FallbackApology
            | AnswerSource::SystemError => Tier::FallbackModel,
        }
    }
}

impl std::fmt::Display for AnswerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// The single answer returned for a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ResolvedAnswer {
    /// Text to show the student
    pub text: String,
    /// Label of the source that produced the text
    pub source_label: String,
    /// Whether the guard flagged the message
    pub flagged: bool,
}

impl ResolvedAnswer {
    /// Create an answer from a source.
    pub fn new(text: impl Into<String>, source: AnswerSource, flagged: bool) -> Self {
        Self {
            text: text.into(),
            source_label: source.label().to_string(),
            flagged,
        }
    }
}

/// One round trip in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptTurn {
    pub question: String,
    pub answer: ResolvedAnswer,
    pub at: DateTime<Utc>,
}

/// Conversation history kept by the caller for display.
///
/// The pipeline never reads it; every resolution is independent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    turns: Vec<TranscriptTurn>,
}

impl Transcript {
    /// Create an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed round trip.
    pub fn push(&mut self, question: impl Into<String>, answer: ResolvedAnswer) {
        self.turns.push(TranscriptTurn {
            question: question.into(),
            answer,
            at: Utc::now(),
        });
    }

    /// All turns, oldest first.
    pub fn turns(&self) -> &[TranscriptTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
