//! Guard rule tables.
//!
//! Rules are plain data: category keyword lists, the educational-context
//! allowlist and the user-facing message table. They load from YAML and
//! are validated once, before the guard accepts any traffic.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::normalize::normalize;
use crate::verdict::GuardAction;

/// Built-in rule set.
const DEFAULT_RULES_YAML: &str = include_str!("../data/default_rules.yaml");

/// Error types for guard configuration.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// Rules could not be parsed
    #[error("Failed to parse guard rules: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Rules file could not be read
    #[error("Failed to read guard rules: {0}")]
    Io(#[from] std::io::Error),

    /// Rules parsed but are not usable
    #[error("Invalid guard rules: {0}")]
    InvalidRules(String),

    /// Keyword automaton could not be built
    #[error("Failed to compile keyword matcher: {0}")]
    Matcher(String),
}

/// One keyword category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Category name (e.g. "profanity")
    pub name: String,
    /// Action taken when this category matches
    pub action: GuardAction,
    /// Tie-break among categories with the same action; higher wins
    pub priority: u32,
    /// Trigger words and phrases
    pub keywords: Vec<String>,
}

/// A user-facing message for an action, optionally scoped to a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRule {
    pub action: GuardAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub text: String,
}

/// Complete rule set for the content guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardRules {
    /// Keyword categories
    pub categories: Vec<CategoryRule>,
    /// Phrases that mark a message as an academic question
    #[serde(default)]
    pub educational_phrases: Vec<String>,
    /// Subject -> terms that may appear in academic questions
    #[serde(default)]
    pub subject_allowlists: BTreeMap<String, Vec<String>>,
    /// Category-specific messages
    #[serde(default)]
    pub messages: Vec<MessageRule>,
    /// Fallback message per action
    #[serde(default)]
    pub default_messages: BTreeMap<GuardAction, String>,
}

impl Default for GuardRules {
    fn default() -> Self {
        Self::from_yaml(DEFAULT_RULES_YAML).expect("embedded default rules parse")
    }
}

impl GuardRules {
    #[cfg(test)]
    fn empty() -> Self {
        Self {
            categories: Vec::new(),
            educational_phrases: Vec::new(),
            subject_allowlists: BTreeMap::new(),
            messages: Vec::new(),
            default_messages: BTreeMap::new(),
        }
    }

    /// Parse rules from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, GuardError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load rules from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GuardError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Serialize to YAML.
    pub fn to_yaml(&self) -> Result<String, GuardError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Check the rules are usable. Any failure here is a startup error.
    pub fn validate(&self) -> Result<(), GuardError> {
        if self.categories.is_empty() {
            return Err(GuardError::InvalidRules("no categories defined".to_string()));
        }

        let mut names = HashSet::new();
        let mut ranks = HashSet::new();

        for category in &self.categories {
            if category.name.trim().is_empty() {
                return Err(GuardError::InvalidRules("category with empty name".to_string()));
            }
            if !names.insert(category.name.as_str()) {
                return Err(GuardError::InvalidRules(format!(
                    "duplicate category '{}'",
                    category.name
                )));
            }
            if category.action == GuardAction::Allow {
                return Err(GuardError::InvalidRules(format!(
                    "category '{}' has action allow",
                    category.name
                )));
            }
            if !ranks.insert((category.action, category.priority)) {
                return Err(GuardError::InvalidRules(format!(
                    "category '{}' shares action {} and priority {} with another category",
                    category.name, category.action, category.priority
                )));
            }
            if category.keywords.is_empty() {
                return Err(GuardError::InvalidRules(format!(
                    "category '{}' has no keywords",
                    category.name
                )));
            }

            let mut seen = HashSet::new();
            for keyword in &category.keywords {
                let normalized = normalize(keyword);
                if normalized.is_empty() {
                    return Err(GuardError::InvalidRules(format!(
                        "category '{}' has a keyword that normalizes to nothing: {:?}",
                        category.name, keyword
                    )));
                }
                if !seen.insert(normalized) {
                    return Err(GuardError::InvalidRules(format!(
                        "category '{}' repeats keyword {:?}",
                        category.name, keyword
                    )));
                }
            }

            if !self.default_messages.contains_key(&category.action) {
                return Err(GuardError::InvalidRules(format!(
                    "no default message for action {}",
                    category.action
                )));
            }
        }

        for message in &self.messages {
            if let Some(category) = &message.category {
                if !names.contains(category.as_str()) {
                    return Err(GuardError::InvalidRules(format!(
                        "message refers to unknown category '{}'",
                        category
                    )));
                }
            }
        }

        Ok(())
    }

    /// Message for an action and category, falling back to the action default.
    pub fn message_for(&self, action: GuardAction, category: Option<&str>) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.action == action && m.category.as_deref() == category && category.is_some())
            .or_else(|| {
                self.messages
                    .iter()
                    .find(|m| m.action == action && m.category.is_none())
            })
            .map(|m| m.text.as_str())
            .or_else(|| self.default_messages.get(&action).map(String::as_str))
    }

    /// SHA-256 of the canonical serialized rules, hex encoded.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn category(name: &str, action: GuardAction, priority: u32, keywords: &[&str]) -> CategoryRule {
        CategoryRule {
            name: name.to_string(),
            action,
            priority,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn minimal() -> GuardRules {
        let mut rules = GuardRules::empty();
        rules.categories.push(category("profanity", GuardAction::Block, 1, &["darn"]));
        rules
            .default_messages
            .insert(GuardAction::Block, "no".to_string());
        rules
    }

    #[test]
    fn test_embedded_defaults_are_valid() {
        let rules = GuardRules::from_yaml(DEFAULT_RULES_YAML).unwrap();
        rules.validate().unwrap();
        assert!(rules.categories.iter().any(|c| c.name == "self_harm"));
        assert_eq!(GuardRules::default(), rules);
    }

    #[test]
    fn test_minimal_rules_validate() {
        minimal().validate().unwrap();
    }

    #[test]
    fn test_rejects_empty_rules() {
        assert!(matches!(
            GuardRules::empty().validate(),
            Err(GuardError::InvalidRules(_))
        ));
    }

    #[test]
    fn test_rejects_ambiguous_priority() {
        let mut rules = minimal();
        rules.categories.push(category("rude", GuardAction::Block, 1, &["meanie"]));
        let err = rules.validate().unwrap_err();
        assert!(err.to_string().contains("priority"));
    }

    #[test]
    fn test_rejects_keyword_that_normalizes_away() {
        let mut rules = minimal();
        rules.categories[0].keywords.push("!!!".to_string());
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_rejects_missing_default_message() {
        let mut rules = minimal();
        rules
            .categories
            .push(category("drugs", GuardAction::Redirect, 5, &["weed"]));
        let err = rules.validate().unwrap_err();
        assert!(err.to_string().contains("default message"));
    }

    #[test]
    fn test_rejects_unknown_message_category() {
        let mut rules = minimal();
        rules.messages.push(MessageRule {
            action: GuardAction::Block,
            category: Some("ghost".to_string()),
            text: "boo".to_string(),
        });
        assert!(rules.validate().is_err());
    }

    #[test]
    fn test_message_lookup_falls_back() {
        let rules = GuardRules::default();
        let specific = rules
            .message_for(GuardAction::Block, Some("profanity"))
            .unwrap();
        assert!(specific.contains("respectful"));

        let generic = rules.message_for(GuardAction::Block, Some("unknown")).unwrap();
        assert_eq!(generic, rules.default_messages[&GuardAction::Block]);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = minimal();
        let mut b = minimal();
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);

        b.categories[0].keywords.push("heck".to_string());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_yaml_roundtrip() {
        let rules = GuardRules::default();
        let yaml = rules.to_yaml().unwrap();
        assert_eq!(GuardRules::from_yaml(&yaml).unwrap(), rules);
    }
}
