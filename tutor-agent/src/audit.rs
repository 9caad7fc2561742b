//! Audit trail for message resolutions.
//!
//! Records which tiers each message passed through and where its answer
//! came from.

use chrono::{DateTime, Utc};
use guardrails::GuardAction;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::types::{AnswerSource, Tier};

/// Maximum entries in the audit log before pruning.
const MAX_AUDIT_ENTRIES: usize = 10_000;

/// One resolved message.
#[derive(Debug, Clone)]
pub struct ResolutionRecord {
    /// Unique entry ID
    pub entry_id: String,
    /// Who sent the message
    pub sender_id: String,
    /// Tiers consulted, in order
    pub tiers_attempted: Vec<Tier>,
    /// Source of the returned answer
    pub source: AnswerSource,
    /// Whether the answer was flagged
    pub flagged: bool,
    /// Guard action for the message
    pub guard_action: GuardAction,
    /// Guard category, if one matched
    pub guard_category: Option<String>,
    /// Fingerprint of the guard rules in force
    pub rules_fingerprint: String,
    /// Processing duration in ms
    pub duration_ms: u64,
    /// When the answer was returned
    pub resolved_at: DateTime<Utc>,
}

/// Audit log of resolutions (newest first).
pub struct AuditLog {
    entries: Arc<RwLock<VecDeque<ResolutionRecord>>>,
    max_entries: usize,
}

impl AuditLog {
    /// Create a new audit log.
    pub fn new() -> Self {
        Self::with_max_entries(MAX_AUDIT_ENTRIES)
    }

    /// Create with custom max entries.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(VecDeque::new())),
            max_entries,
        }
    }

    /// Record a resolution.
    pub async fn record(&self, record: ResolutionRecord) {
        let mut entries = self.entries.write().await;
        entries.push_front(record);

        // Prune if over limit
        while entries.len() > self.max_entries {
            entries.pop_back();
        }
    }

    /// Get recent entries.
    pub async fn recent(&self, limit: usize) -> Vec<ResolutionRecord> {
        let entries = self.entries.read().await;
        entries.iter().take(limit).cloned().collect()
    }

    /// Get entries for a sender.
    pub async fn by_sender(&self, sender_id: &str, limit: usize) -> Vec<ResolutionRecord> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.sender_id == sender_id)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Get statistics.
    pub async fn stats(&self) -> AuditStats {
        let entries = self.entries.read().await;

        let total = entries.len();
        let flagged = entries.iter().filter(|e| e.flagged).count();
        let escalated = entries
            .iter()
            .filter(|e| e.guard_action == GuardAction::Escalate)
            .count();

        let mut by_source = BTreeMap::new();
        for entry in entries.iter() {
            *by_source.entry(entry.source.label()).or_insert(0) += 1;
        }

        let avg_duration_ms = if total > 0 {
            entries.iter().map(|e| e.duration_ms).sum::<u64>() / total as u64
        } else {
            0
        };

        AuditStats {
            total_resolutions: total,
            flagged,
            escalated,
            by_source,
            avg_duration_ms,
        }
    }

    /// Clear the log.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        entries.clear();
    }

    /// Get count.
    pub async fn count(&self) -> usize {
        let entries = self.entries.read().await;
        entries.len()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics from the audit log.
#[derive(Debug, Clone)]
pub struct AuditStats {
    /// Total resolutions logged
    pub total_resolutions: usize,
    /// Answers returned with the flag set
    pub flagged: usize,
    /// Resolutions that raised an incident
    pub escalated: usize,
    /// Count per answer source label
    pub by_source: BTreeMap<&'static str, usize>,
    /// Average processing duration
    pub avg_duration_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sender: &str, source: AnswerSource, duration_ms: u64) -> ResolutionRecord {
        let flagged = source == AnswerSource::Guardrail;
        ResolutionRecord {
            entry_id: uuid::Uuid::new_v4().to_string(),
            sender_id: sender.to_string(),
            tiers_attempted: vec![Tier::Guard, source.tier()],
            source,
            flagged,
            guard_action: if flagged { GuardAction::Block } else { GuardAction::Allow },
            guard_category: None,
            rules_fingerprint: "abc".to_string(),
            duration_ms,
            resolved_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_newest_first_and_pruned() {
        let log = AuditLog::with_max_entries(2);
        log.record(record("a", AnswerSource::GeneralFaq, 1)).await;
        log.record(record("b", AnswerSource::FastModel, 1)).await;
        log.record(record("c", AnswerSource::FallbackModel, 1)).await;

        let recent = log.recent(10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].sender_id, "c");
        assert_eq!(recent[1].sender_id, "b");
    }

    #[tokio::test]
    async fn test_by_sender() {
        let log = AuditLog::new();
        for _ in 0..3 {
            log.record(record("student-1", AnswerSource::CourseMaterials, 2)).await;
        }
        log.record(record("student-2", AnswerSource::CourseMaterials, 2)).await;

        assert_eq!(log.by_sender("student-1", 10).await.len(), 3);
        assert_eq!(log.by_sender("student-1", 2).await.len(), 2);
        assert!(log.by_sender("nobody", 10).await.is_empty());
    }

    #[tokio::test]
    async fn test_audit_stats() {
        let log = AuditLog::new();
        log.record(record("a", AnswerSource::Guardrail, 10)).await;
        log.record(record("a", AnswerSource::FastModel, 20)).await;
        log.record(record("a", AnswerSource::FastModel, 30)).await;

        let stats = log.stats().await;
        assert_eq!(stats.total_resolutions, 3);
        assert_eq!(stats.flagged, 1);
        assert_eq!(stats.escalated, 0);
        assert_eq!(stats.by_source.get("fast_model"), Some(&2));
        assert_eq!(stats.avg_duration_ms, 20);

        log.clear().await;
        assert_eq!(log.count().await, 0);
    }
}
