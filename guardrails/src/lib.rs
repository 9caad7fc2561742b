//! Guardrails - content safety for the campus tutor chat
//!
//! Classifies inbound student messages before any answer is produced:
//! - Normalization that undoes leetspeak, spelled-out and stretched words
//! - Category keyword scanning with an educational-context allowlist
//! - Explicit priority resolution to a single allow/redirect/block/escalate
//! - Incident sinks for escalations (log, durable JSONL, operator webhook)
//!
//! # Example
//!
//! ```ignore
//! use guardrails::{ContentGuard, GuardAction};
//!
//! let guard = ContentGuard::with_defaults()?;
//! let verdict = guard.check("f.u.c.k this");
//! assert_eq!(verdict.action, GuardAction::Block);
//! ```

pub mod guard;
pub mod incident;
pub mod normalize;
pub mod rules;
pub mod verdict;

// Re-export main types
pub use guard::ContentGuard;
pub use incident::{
    FanoutIncidentSink, Incident, IncidentError, IncidentSink, JsonlIncidentSink,
    LoggingIncidentSink, MemoryIncidentSink, WebhookIncidentSink,
};
pub use normalize::normalize;
pub use rules::{CategoryRule, GuardError, GuardRules, MessageRule};
pub use verdict::{GuardAction, GuardVerdict};
