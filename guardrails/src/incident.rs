//! Incident reporting for escalated messages.
//!
//! When the guard escalates a message, an incident is handed to an
//! [`IncidentSink`]. Sinks can persist it, page an operator, or both via
//! [`FanoutIncidentSink`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::verdict::{GuardAction, GuardVerdict};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Maximum incidents held by the in-memory sink before pruning.
const MAX_MEMORY_INCIDENTS: usize = 1_000;

/// Error types for incident sinks.
#[derive(Debug, thiserror::Error)]
pub enum IncidentError {
    /// Writing to durable storage failed
    #[error("Incident storage failed: {0}")]
    Storage(#[from] std::io::Error),

    /// Encoding the incident failed
    #[error("Incident encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Operator notification failed
    #[error("Incident notification failed: {0}")]
    Notification(String),
}

/// A recorded safety incident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Incident {
    /// Unique incident ID
    pub incident_id: String,
    /// Who sent the message
    pub sender_id: String,
    /// Guard category that fired
    pub category: String,
    /// Original message text
    pub text: String,
    /// Action taken
    pub action: GuardAction,
    /// When the incident was raised
    #[cfg_attr(feature = "typescript", ts(type = "string"))]
    pub timestamp: DateTime<Utc>,
}

impl Incident {
    /// Create an incident from a guard verdict.
    pub fn from_verdict(
        sender_id: impl Into<String>,
        text: impl Into<String>,
        verdict: &GuardVerdict,
    ) -> Self {
        Self {
            incident_id: uuid::Uuid::new_v4().to_string(),
            sender_id: sender_id.into(),
            category: verdict
                .matched_category
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
            text: text.into(),
            action: verdict.action,
            timestamp: Utc::now(),
        }
    }
}

/// Destination for incidents.
#[async_trait]
pub trait IncidentSink: Send + Sync {
    /// Sink identifier for logs.
    fn name(&self) -> &str;

    /// Record one incident.
    async fn record(&self, incident: &Incident) -> Result<(), IncidentError>;
}

/// Sink that only writes a structured warning to the log.
#[derive(Debug, Default)]
pub struct LoggingIncidentSink;

#[async_trait]
impl IncidentSink for LoggingIncidentSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn record(&self, incident: &Incident) -> Result<(), IncidentError> {
        warn!(
            incident_id = %incident.incident_id,
            sender_id = %incident.sender_id,
            category = %incident.category,
            action = %incident.action,
            "Safety incident raised"
        );
        Ok(())
    }
}

/// Durable sink appending one JSON object per line.
pub struct JsonlIncidentSink {
    path: PathBuf,
    /// Serializes appends from concurrent requests
    write_lock: Mutex<()>,
}

impl JsonlIncidentSink {
    /// Create a sink writing to `path`. Parent directories are created on
    /// first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Path of the incident log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read back every incident in the log.
    pub async fn read_all(&self) -> Result<Vec<Incident>, IncidentError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(IncidentError::from))
            .collect()
    }
}

#[async_trait]
impl IncidentSink for JsonlIncidentSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn record(&self, incident: &Incident) -> Result<(), IncidentError> {
        let mut line = serde_json::to_vec(incident)?;
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        info!(
            incident_id = %incident.incident_id,
            path = %self.path.display(),
            "Incident persisted"
        );
        Ok(())
    }
}

/// Sink that alerts an operator by POSTing the incident as JSON.
pub struct WebhookIncidentSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookIncidentSink {
    /// Create a webhook sink.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Create with a preconfigured HTTP client.
    pub fn with_client(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl IncidentSink for WebhookIncidentSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn record(&self, incident: &Incident) -> Result<(), IncidentError> {
        let response = self
            .client
            .post(&self.url)
            .json(incident)
            .send()
            .await
            .map_err(|e| IncidentError::Notification(e.to_string()))?;

        if !response.status().is_success() {
            return Err(IncidentError::Notification(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        Ok(())
    }
}

/// Bounded in-memory sink, newest first.
pub struct MemoryIncidentSink {
    incidents: Arc<RwLock<VecDeque<Incident>>>,
    max_incidents: usize,
}

impl MemoryIncidentSink {
    /// Create a new in-memory sink.
    pub fn new() -> Self {
        Self::with_max_incidents(MAX_MEMORY_INCIDENTS)
    }

    /// Create with custom capacity.
    pub fn with_max_incidents(max_incidents: usize) -> Self {
        Self {
            incidents: Arc::new(RwLock::new(VecDeque::new())),
            max_incidents,
        }
    }

    /// Most recent incidents.
    pub async fn recent(&self, limit: usize) -> Vec<Incident> {
        let incidents = self.incidents.read().await;
        incidents.iter().take(limit).cloned().collect()
    }

    /// Number of incidents held.
    pub async fn count(&self) -> usize {
        self.incidents.read().await.len()
    }
}

impl Default for MemoryIncidentSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IncidentSink for MemoryIncidentSink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn record(&self, incident: &Incident) -> Result<(), IncidentError> {
        let mut incidents = self.incidents.write().await;
        incidents.push_front(incident.clone());

        while incidents.len() > self.max_incidents {
            incidents.pop_back();
        }

        Ok(())
    }
}

/// Records to every inner sink.
///
/// All sinks are attempted even when one fails; the first error is returned.
pub struct FanoutIncidentSink {
    sinks: Vec<Arc<dyn IncidentSink>>,
}

impl FanoutIncidentSink {
    /// Create a fanout over the given sinks.
    pub fn new(sinks: Vec<Arc<dyn IncidentSink>>) -> Self {
        Self { sinks }
    }

    /// Add another sink.
    pub fn with_sink(mut self, sink: Arc<dyn IncidentSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of inner sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Whether there are no inner sinks.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl IncidentSink for FanoutIncidentSink {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn record(&self, incident: &Incident) -> Result<(), IncidentError> {
        let mut first_error = None;

        for sink in &self.sinks {
            if let Err(e) = sink.record(incident).await {
                warn!(
                    sink = sink.name(),
                    incident_id = %incident.incident_id,
                    error = %e,
                    "Incident sink failed"
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
