//! Content guard: keyword classification of inbound student messages.
//!
//! Every message is normalized, scanned against the category keyword
//! automaton, filtered through the educational-context allowlist and
//! resolved to a single action.

use aho_corasick::{AhoCorasick, MatchKind};
use std::collections::HashSet;
use tracing::debug;

use crate::normalize::normalize;
use crate::rules::{GuardError, GuardRules};
use crate::verdict::{GuardAction, GuardVerdict};

/// A keyword hit in a normalized message.
#[derive(Debug, Clone, PartialEq, Eq)]
struct KeywordHit {
    category: usize,
    term: String,
    start: usize,
}

/// Compiled content guard.
///
/// Construction validates the rules and builds the matcher; `check` is a
/// pure function of its input after that.
pub struct ContentGuard {
    rules: GuardRules,
    matcher: AhoCorasick,
    /// Pattern index -> (category index, normalized term)
    patterns: Vec<(usize, String)>,
    educational_phrases: Vec<String>,
    allowlisted_terms: HashSet<String>,
    fingerprint: String,
}

impl ContentGuard {
    /// Validate rules and compile the guard.
    pub fn new(rules: GuardRules) -> Result<Self, GuardError> {
        rules.validate()?;

        let patterns: Vec<(usize, String)> = rules
            .categories
            .iter()
            .enumerate()
            .flat_map(|(idx, category)| {
                category.keywords.iter().map(move |k| (idx, normalize(k)))
            })
            .collect();

        let matcher = AhoCorasick::builder()
            .match_kind(MatchKind::Standard)
            .build(patterns.iter().map(|(_, term)| term.as_str()))
            .map_err(|e| GuardError::Matcher(e.to_string()))?;

        let educational_phrases = rules
            .educational_phrases
            .iter()
            .map(|p| normalize(p))
            .filter(|p| !p.is_empty())
            .collect();

        let allowlisted_terms = rules
            .subject_allowlists
            .values()
            .flatten()
            .map(|t| normalize(t))
            .filter(|t| !t.is_empty())
            .collect();

        let fingerprint = rules.fingerprint();

        debug!(
            categories = rules.categories.len(),
            patterns = patterns.len(),
            fingerprint = %fingerprint,
            "Content guard compiled"
        );

        Ok(Self {
            rules,
            matcher,
            patterns,
            educational_phrases,
            allowlisted_terms,
            fingerprint,
        })
    }

    /// Guard built from the embedded default rules.
    pub fn with_defaults() -> Result<Self, GuardError> {
        Self::new(GuardRules::default())
    }

    /// Fingerprint of the rules this guard was compiled from.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// The rules this guard was compiled from.
    pub fn rules(&self) -> &GuardRules {
        &self.rules
    }

    /// Classify a message.
    pub fn check(&self, text: &str) -> GuardVerdict {
        let normalized = normalize(text);
        if normalized.is_empty() {
            return GuardVerdict::allow();
        }

        let hits = self.scan(&normalized);
        if hits.is_empty() {
            return GuardVerdict::allow();
        }

        let educational = self.is_educational(&normalized);
        let (kept, suppressed): (Vec<KeywordHit>, Vec<KeywordHit>) = hits
            .into_iter()
            .partition(|hit| !(educational && self.allowlisted_terms.contains(&hit.term)));

        let suppressed_terms = dedup_terms(suppressed.iter());

        let Some(winner) = self.winning_category(&kept) else {
            debug!(suppressed = ?suppressed_terms, "All keyword hits excused as academic");
            let mut verdict = GuardVerdict::allow();
            verdict.suppressed_terms = suppressed_terms;
            return verdict;
        };

        let category = &self.rules.categories[winner];
        let matched_terms = dedup_terms(kept.iter().filter(|h| h.category == winner));

        debug!(
            category = %category.name,
            action = %category.action,
            terms = ?matched_terms,
            "Guard matched"
        );

        GuardVerdict {
            action: category.action,
            matched_category: Some(category.name.clone()),
            matched_terms,
            suppressed_terms,
            user_message: self
                .rules
                .message_for(category.action, Some(&category.name))
                .map(String::from),
        }
    }

    /// Find all whole-word keyword hits, in order of appearance.
    fn scan(&self, normalized: &str) -> Vec<KeywordHit> {
        let mut hits: Vec<KeywordHit> = self
            .matcher
            .find_overlapping_iter(normalized)
            .filter(|m| is_word_bounded(normalized, m.start(), m.end()))
            .map(|m| {
                let (category, term) = &self.patterns[m.pattern().as_usize()];
                KeywordHit {
                    category: *category,
                    term: term.clone(),
                    start: m.start(),
                }
            })
            .collect();

        hits.sort_by_key(|h| h.start);
        hits
    }

    fn is_educational(&self, normalized: &str) -> bool {
        self.educational_phrases
            .iter()
            .any(|phrase| contains_phrase(normalized, phrase))
    }

    /// Highest action wins; ties go to the higher explicit priority.
    fn winning_category(&self, hits: &[KeywordHit]) -> Option<usize> {
        hits.iter()
            .map(|h| h.category)
            .max_by_key(|&idx| {
                let category = &self.rules.categories[idx];
                (category.action, category.priority)
            })
    }
}

fn dedup_terms<'a>(hits: impl Iterator<Item = &'a KeywordHit>) -> Vec<String> {
    let mut seen = HashSet::new();
    hits.filter(|h| seen.insert(h.term.as_str()))
        .map(|h| h.term.clone())
        .collect()
}

fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack
        .match_indices(phrase)
        .any(|(start, m)| is_word_bounded(haystack, start, start + m.len()))
}

fn is_word_bounded(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> ContentGuard {
        ContentGuard::with_defaults().unwrap()
    }

    #[test]
    fn test_clean_message_allowed() {
        let verdict = guard().check("Can you help me with fractions?");
        assert_eq!(verdict, GuardVerdict::allow());
    }

    #[test]
    fn test_profanity_blocked() {
        let guard = guard();
        let verdict = guard.check("this homework is fucking stupid");
        assert_eq!(verdict.action, GuardAction::Block);
        assert_eq!(verdict.matched_category.as_deref(), Some("profanity"));
        assert_eq!(verdict.matched_terms, vec!["fucking".to_string()]);
        assert_eq!(
            verdict.user_message.as_deref(),
            guard.rules().message_for(GuardAction::Block, Some("profanity"))
        );
    }

    #[test]
    fn test_obfuscations_hit_same_keyword() {
        let guard = guard();
        for text in ["fuck", "fuuuck", "f.u.c.k", "F U C K", "f_u_c_k"] {
            let verdict = guard.check(text);
            assert_eq!(verdict.matched_terms, vec!["fuck".to_string()], "for {text:?}");
        }
    }

    #[test]
    fn test_word_boundaries() {
        let guard = guard();
        assert_eq!(guard.check("I live in Sussex").action, GuardAction::Allow);
        assert_eq!(guard.check("the scientific method").action, GuardAction::Allow);
        assert_eq!(guard.check("scrap paper").action, GuardAction::Allow);
    }

    #[test]
    fn test_escalate_beats_block() {
        let verdict = guard().check("this shit makes me want to die");
        assert_eq!(verdict.action, GuardAction::Escalate);
        assert_eq!(verdict.matched_category.as_deref(), Some("self_harm"));
        assert!(verdict.requires_escalation());
    }

    #[test]
    fn test_priority_breaks_ties_within_action() {
        // Both block categories; sexual carries the higher priority.
        let verdict = guard().check("damn that porn");
        assert_eq!(verdict.action, GuardAction::Block);
        assert_eq!(verdict.matched_category.as_deref(), Some("sexual"));
    }

    #[test]
    fn test_educational_context_suppresses_allowlisted_term() {
        let verdict =
            guard().check("Explain why the narrator calls him a bastard in the novel");
        assert_eq!(verdict.action, GuardAction::Allow);
        assert_eq!(verdict.suppressed_terms, vec!["bastard".to_string()]);
    }

    #[test]
    fn test_educational_context_needs_allowlisted_term() {
        let verdict = guard().check("explain this shit");
        assert_eq!(verdict.action, GuardAction::Block);
    }

    #[test]
    fn test_allowlisted_term_needs_educational_context() {
        let verdict = guard().check("you bastard");
        assert_eq!(verdict.action, GuardAction::Block);
    }

    #[test]
    fn test_self_harm_never_suppressed() {
        let verdict = guard().check("what is suicide");
        assert_eq!(verdict.action, GuardAction::Escalate);
    }

    #[test]
    fn test_redirect_categories() {
        let verdict = guard().check("can you write my essay");
        assert_eq!(verdict.action, GuardAction::Redirect);
        assert_eq!(verdict.matched_category.as_deref(), Some("academic_dishonesty"));
        assert!(verdict.is_terminal());
    }

    #[test]
    fn test_multilingual_variants() {
        assert_eq!(guard().check("que mierda").action, GuardAction::Block);
        assert_eq!(guard().check("je veux mourir").action, GuardAction::Escalate);
    }

    #[test]
    fn test_check_is_idempotent() {
        let guard = guard();
        let text = "sh!t, explain the d.a.m.n thing";
        assert_eq!(guard.check(text), guard.check(text));
        let normalized = normalize(text);
        assert_eq!(guard.check(&normalized), guard.check(text));
    }

    #[test]
    fn test_invalid_rules_fail_construction() {
        let mut rules = GuardRules::default();
        rules.categories.clear();
        assert!(ContentGuard::new(rules).is_err());
    }
}
