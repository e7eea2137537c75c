//! Usage counters
//!
//! Fire-and-forget daily counters kept in a remote `analytics` collection,
//! one document per local calendar date. Failures are logged and swallowed —
//! counting must never affect the user-facing path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::identity::Identity;
use crate::remote::DocumentStore;

/// Collection holding one counter document per day.
pub const ANALYTICS_COLLECTION: &str = "analytics";

/// Daily counter document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    #[serde(default)]
    pub total_connections: u64,
    #[serde(default)]
    pub guest_connections: u64,
    #[serde(default)]
    pub auth_connections: u64,
    #[serde(default)]
    pub total_modifications: u64,
}

pub struct UsageTracker {
    remote: Arc<dyn DocumentStore>,
    connection_tracked: AtomicBool,
}

impl UsageTracker {
    pub fn new(remote: Arc<dyn DocumentStore>) -> Self {
        Self {
            remote,
            connection_tracked: AtomicBool::new(false),
        }
    }

    /// Count a connection for today, split by guest/authenticated.
    /// Tracks at most once per session.
    pub async fn track_connection(&self, identity: &Identity) {
        if self.connection_tracked.swap(true, Ordering::SeqCst) {
            return;
        }

        let stats = self.read_today().await;
        let mut patch = serde_json::json!({
            "totalConnections": stats.total_connections + 1,
        });
        match identity {
            Identity::Anonymous => {
                patch["guestConnections"] = (stats.guest_connections + 1).into();
            }
            Identity::User(_) => {
                patch["authConnections"] = (stats.auth_connections + 1).into();
            }
        }

        if let Err(e) = self
            .remote
            .set_with_merge(ANALYTICS_COLLECTION, &today_key(), patch)
            .await
        {
            log::warn!("Failed to track connection: {}", e);
        }
    }

    /// Count a shift modification (create/update/delete or restore-all).
    pub async fn track_modification(&self) {
        let stats = self.read_today().await;
        let patch = serde_json::json!({
            "totalModifications": stats.total_modifications + 1,
        });
        if let Err(e) = self
            .remote
            .set_with_merge(ANALYTICS_COLLECTION, &today_key(), patch)
            .await
        {
            log::warn!("Failed to track modification: {}", e);
        }
    }

    async fn read_today(&self) -> DailyStats {
        match self.remote.read(ANALYTICS_COLLECTION, &today_key()).await {
            Ok(Some(document)) => serde_json::from_value(document).unwrap_or_default(),
            Ok(None) => DailyStats::default(),
            Err(e) => {
                log::warn!("Failed to read usage counters: {}", e);
                DailyStats::default()
            }
        }
    }
}

/// Today's document key: the local calendar date, `YYYY-MM-DD`.
fn today_key() -> String {
    chrono::Local::now()
        .date_naive()
        .format("%Y-%m-%d")
        .to_string()
}
