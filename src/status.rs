//! Per-user run status shared between the orchestrator and its observers.
//!
//! Finished runs expire `ttl` after their last update. Expired entries are
//! dropped by [`StatusTracker::evict_expired`] and lazily on every read.
//! A run still in progress is kept until it completes, however quiet it is.

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{AnalysisStatus, RunStatus};

#[derive(Clone)]
pub struct StatusTracker {
    entries: Arc<RwLock<HashMap<String, AnalysisStatus>>>,
    ttl: Duration,
}

fn evict(entries: &mut HashMap<String, AnalysisStatus>, ttl: Duration) -> usize {
    let now = Utc::now();
    let before = entries.len();
    entries.retain(|_, status| status.is_in_progress() || now - status.last_updated < ttl);
    before - entries.len()
}

impl StatusTracker {
    pub fn new(ttl: std::time::Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::from_std(ttl).unwrap_or_else(|_| Duration::weeks(52)),
        }
    }

    /// Mark a run as started. Fails with `Conflict` while another run for
    /// the same user is in progress.
    pub async fn start(&self, user_id: &str, total_agents: usize) -> Result<()> {
        let mut entries = self.entries.write().await;
        evict(&mut entries, self.ttl);

        if entries
            .get(user_id)
            .is_some_and(AnalysisStatus::is_in_progress)
        {
            return Err(Error::Conflict {
                user_id: user_id.to_string(),
            });
        }

        entries.insert(user_id.to_string(), AnalysisStatus::started(total_agents));
        debug!("Run started for {} ({} agents)", user_id, total_agents);
        Ok(())
    }

    pub async fn advance(&self, user_id: &str, agents_completed: usize) {
        if let Some(status) = self.entries.write().await.get_mut(user_id) {
            status.agents_completed = agents_completed;
            status.last_updated = Utc::now();
        }
    }

    pub async fn complete(&self, user_id: &str) {
        if let Some(status) = self.entries.write().await.get_mut(user_id) {
            status.status = RunStatus::Completed;
            status.last_updated = Utc::now();
        }
    }

    pub async fn status(&self, user_id: &str) -> Result<AnalysisStatus> {
        let mut entries = self.entries.write().await;
        evict(&mut entries, self.ttl);
        entries
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::not_found("analysis", user_id))
    }

    /// Drop expired entries and return how many were removed.
    pub async fn evict_expired(&self) -> usize {
        let removed = evict(&mut *self.entries.write().await, self.ttl);
        if removed > 0 {
            debug!("Evicted {} expired run statuses", removed);
        }
        removed
    }
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(3600))
    }
}
