//! Client-side throttle for rating updates.
//!
//! The server throttles authenticated users at 5 requests per minute and
//! answers 429 past that. This guard counts accepted updates per recipe over
//! a sliding window kept in the durable store, warns once the user is
//! updating often and refuses further updates before the server limit is hit.
//!
//! The guard is advisory. Any storage failure makes it fail open: the
//! mutation path must never be blocked or broken by the guard itself.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::metrics::THROTTLE_DECISIONS;
use crate::store::{KeyValueStore, UPDATE_RECORDS_KEY};

pub const WARN_MESSAGE: &str =
    "You're updating this rating frequently. Please make reasoned changes.";

/// One accepted update against a subject (a recipe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub timestamp: i64,
    #[serde(rename = "recipeId")]
    pub subject_id: u64,
}

#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    pub window: Duration,
    pub warn_threshold: usize,
    // Kept below the server's own limit
    pub block_threshold: usize,
    pub storage_key: String,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            warn_threshold: 2,
            block_threshold: 4,
            storage_key: UPDATE_RECORDS_KEY.to_string(),
        }
    }
}

impl ThrottleConfig {
    pub fn window_ms(&self) -> i64 {
        i64::try_from(self.window.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Outcome of a throttle check. Only `Block` stops the mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Warn(String),
    Block { seconds_remaining: u64 },
}

impl Decision {
    pub fn is_blocked(&self) -> bool {
        matches!(self, Decision::Block { .. })
    }

    pub fn message(&self) -> Option<String> {
        match self {
            Decision::Allow => None,
            Decision::Warn(text) => Some(text.clone()),
            Decision::Block { seconds_remaining } => Some(format!(
                "You've reached the update limit. Please wait {seconds_remaining} seconds before making more changes."
            )),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Warn(_) => "warn",
            Decision::Block { .. } => "block",
        }
    }
}

pub struct UpdateThrottle {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    config: ThrottleConfig,
}

impl UpdateThrottle {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: ThrottleConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Decide whether an update to `subject_id` may go ahead.
    ///
    /// `first_rating` is the caller's knowledge that no rating exists yet for
    /// this subject; creating one is never throttled. Apart from pruning
    /// expired records this does not write anything.
    pub fn evaluate(&self, subject_id: u64, first_rating: bool) -> Decision {
        let decision = if first_rating {
            Decision::Allow
        } else {
            self.decide_now(subject_id)
        };

        THROTTLE_DECISIONS.with_label_values(&[decision.label()]).inc();
        debug!(subject_id, decision = decision.label(), "throttle evaluated");
        decision
    }

    /// Append a record for an accepted update.
    pub fn record(&self, subject_id: u64) {
        let now = self.clock.now_ms();
        let mut recent = self.load_recent(now);
        recent.push(UpdateRecord {
            timestamp: now,
            subject_id,
        });
        self.save(&recent);
    }

    /// Record an accepted update, then evaluate what the next attempt faces.
    /// The advisory is not counted as a throttle decision in metrics.
    pub fn record_and_evaluate(&self, subject_id: u64) -> Decision {
        self.record(subject_id);
        let advisory = self.decide_now(subject_id);
        debug!(subject_id, advisory = advisory.label(), "update recorded");
        advisory
    }

    /// Records still inside the window, oldest first.
    pub fn recent_updates(&self) -> Vec<UpdateRecord> {
        self.load_recent(self.clock.now_ms())
    }

    pub fn count_for(&self, subject_id: u64) -> usize {
        self.recent_updates()
            .iter()
            .filter(|r| r.subject_id == subject_id)
            .count()
    }

    fn decide_now(&self, subject_id: u64) -> Decision {
        let now = self.clock.now_ms();
        let recent = self.load_recent(now);
        self.decide(&recent, subject_id, now)
    }

    fn decide(&self, recent: &[UpdateRecord], subject_id: u64, now: i64) -> Decision {
        let mut count = 0usize;
        let mut oldest = i64::MAX;
        for record in recent.iter().filter(|r| r.subject_id == subject_id) {
            count += 1;
            oldest = oldest.min(record.timestamp);
        }

        if count < self.config.warn_threshold {
            return Decision::Allow;
        }
        if count == self.config.warn_threshold {
            return Decision::Warn(WARN_MESSAGE.to_string());
        }
        if count >= self.config.block_threshold {
            let age = now.saturating_sub(oldest);
            let remaining_ms = self.config.window_ms().saturating_sub(age).max(0);
            let seconds_remaining = (remaining_ms as u64).div_ceil(1000);
            return Decision::Block { seconds_remaining };
        }
        Decision::Allow
    }

    // Loads, prunes and writes back the pruned list when it shrank.
    // Unreadable or corrupt storage reads as no records.
    fn load_recent(&self, now: i64) -> Vec<UpdateRecord> {
        let key = &self.config.storage_key;
        let (mut records, dirty) = match self.store.get(key) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<UpdateRecord>>(&raw) {
                Ok(records) => (records, false),
                Err(e) => {
                    warn!(key = %key, error = %e, "corrupt throttle records, treating as empty");
                    (Vec::new(), true)
                }
            },
            Ok(None) => (Vec::new(), false),
            Err(e) => {
                warn!(key = %key, error = %e, "throttle store unavailable, failing open");
                return Vec::new();
            }
        };

        let cutoff = now.saturating_sub(self.config.window_ms());
        let before = records.len();
        records.retain(|r| r.timestamp >= cutoff);

        if dirty || records.len() != before {
            self.save(&records);
        }
        records
    }

    fn save(&self, records: &[UpdateRecord]) {
        let key = &self.config.storage_key;
        let result = serde_json::to_string(records)
            .map_err(crate::error::StoreError::from)
            .and_then(|raw| self.store.set(key, &raw));
        if let Err(e) = result {
            warn!(key = %key, error = %e, "failed to persist throttle records");
        }
    }
}
