//! Guard verdict types.

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// What the guard decided to do with a message.
///
/// Variants are declared in ascending severity, so `Ord` gives the
/// resolution priority directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum GuardAction {
    /// Message may continue down the pipeline
    Allow,
    /// Steer the student back to learning
    Redirect,
    /// Refuse outright
    Block,
    /// Refuse and raise an incident for a human
    Escalate,
}

impl GuardAction {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardAction::Allow => "allow",
            GuardAction::Redirect => "redirect",
            GuardAction::Block => "block",
            GuardAction::Escalate => "escalate",
        }
    }
}

impl std::fmt::Display for GuardAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The guard's classification of one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct GuardVerdict {
    /// Resolved action
    pub action: GuardAction,
    /// Category that produced the action
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_category: Option<String>,
    /// Terms of the winning category found in the message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_terms: Vec<String>,
    /// Terms excused because the message reads as an academic question
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suppressed_terms: Vec<String>,
    /// Message to show the student instead of an answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
}

impl GuardVerdict {
    /// A verdict that lets the message through.
    pub fn allow() -> Self {
        Self {
            action: GuardAction::Allow,
            matched_category: None,
            matched_terms: Vec::new(),
            suppressed_terms: Vec::new(),
            user_message: None,
        }
    }

    /// Whether the pipeline must stop here.
    pub fn is_terminal(&self) -> bool {
        self.action != GuardAction::Allow
    }

    /// Whether an incident must be raised.
    pub fn requires_escalation(&self) -> bool {
        self.action == GuardAction::Escalate
    }
}
