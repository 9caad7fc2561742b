//! Tutor Agent - tiered answers for the campus study chat
//!
//! Resolves each student message to exactly one answer:
//! - Content guard in front of everything (from `guardrails`)
//! - Static course and FAQ answers scoped to the student's enrollments
//! - A retrieval seam for document-grounded answers
//! - A fast hosted model with a hard time budget
//! - A fallback hosted model that always produces a reply
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │             ChatPipeline                │
//! │   (resolve one message, audit trail)    │
//! └────────────────┬────────────────────────┘
//!                  │  first tier to answer wins
//!                  ▼
//!   ContentGuard ─► KnowledgeBase ─► ContextRetriever
//!                                          │
//!                                          ▼
//!                      FallbackModelTier ◄─ FastModelTier (5 s)
//!                              │                 │
//!                              ▼                 ▼
//!                        ┌─────────────────────────┐
//!                        │ LlmBackend (Gemini,     │
//!                        │ OpenAI-compatible, mock)│
//!                        └─────────────────────────┘
//! ```

pub mod audit;
pub mod backend;
pub mod config;
pub mod knowledge;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod tiers;
pub mod types;

// Re-export main types for convenience
pub use audit::{AuditLog, AuditStats, ResolutionRecord};
pub use backend::traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError};
pub use config::{ConfigError, ModelConfig, ModelProvider, PipelineConfig};
pub use knowledge::{KnowledgeAnswer, KnowledgeBase, KnowledgeError, KnowledgeSource};
pub use pipeline::{ChatPipeline, ChatPipelineBuilder, PipelineError};
pub use prompt::TutorPrompt;
pub use retriever::{ContextRetriever, NoopRetriever};
pub use tiers::{FallbackModelTier, FastModelTier, TierReply};
pub use types::*;
