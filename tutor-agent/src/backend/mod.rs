//! LLM Backend abstraction layer.
//!
//! Provides a trait-based interface over the hosted text-generation
//! providers used by the model tiers:
//! - OpenAI-compatible (OpenAI, vLLM, Ollama, etc.)
//! - Google Gemini
//! - Mock backend for testing and offline runs

pub mod gemini;
pub mod mock;
pub mod openai;
pub mod traits;

pub use gemini::GeminiBackend;
pub use mock::{MockBackend, MockBehavior};
pub use openai::OpenAiBackend;
pub use traits::{CompletionRequest, CompletionResponse, LlmBackend, LlmError, Message, MessageRole, Usage};
