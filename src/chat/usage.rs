//! Advisory message-quota gate
//!
//! The backend is the only authority on usage. The gate keeps the last
//! fetched [`UsageSnapshot`] so obviously over-limit sends can be refused
//! locally; a stale snapshot is corrected when the server answers a send
//! with a `message_limit_exceeded` error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Message usage for the current billing period, as reported by
/// `GET /api/subscription/usage`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UsageSnapshot {
    /// Plan identifier (e.g. `free`, `pro`)
    #[serde(default)]
    pub plan: String,
    /// Messages sent this period
    #[serde(default, rename = "messages_used")]
    pub used: u32,
    /// Period allowance; `None` means unlimited
    #[serde(default, rename = "messages_limit")]
    pub limit: Option<u32>,
    /// Messages left; derived from `limit - used` when absent
    #[serde(default, rename = "messages_remaining")]
    pub remaining: Option<u32>,
    /// Explicit unlimited flag
    #[serde(default, rename = "is_unlimited")]
    pub unlimited: bool,
    /// End of the current billing period
    #[serde(default)]
    pub period_end: Option<DateTime<Utc>>,
}

impl UsageSnapshot {
    /// A capped snapshot with `remaining` messages left out of `limit`.
    pub fn limited(limit: u32, remaining: u32) -> Self {
        Self {
            used: limit.saturating_sub(remaining),
            limit: Some(limit),
            remaining: Some(remaining),
            ..Self::default()
        }
    }

    /// An uncapped snapshot.
    pub fn unlimited() -> Self {
        Self {
            unlimited: true,
            ..Self::default()
        }
    }

    /// `true` when the plan has no message cap.
    pub fn is_unlimited(&self) -> bool {
        self.unlimited || self.limit.is_none()
    }

    /// Messages left this period (`None` when unlimited).
    pub fn messages_remaining(&self) -> Option<u32> {
        if self.is_unlimited() {
            return None;
        }
        self.remaining
            .or_else(|| self.limit.map(|limit| limit.saturating_sub(self.used)))
    }

    /// `limit is unlimited OR remaining > 0`
    ///
    /// # Examples
    ///
    /// ```
    /// use astrochat::chat::UsageSnapshot;
    ///
    /// assert!(UsageSnapshot::limited(3, 1).can_send());
    /// assert!(!UsageSnapshot::limited(3, 0).can_send());
    /// assert!(UsageSnapshot::unlimited().can_send());
    /// ```
    pub fn can_send(&self) -> bool {
        self.is_unlimited() || self.messages_remaining().unwrap_or(0) > 0
    }
}

/// Client-side pre-check against the cached usage snapshot
#[derive(Debug, Clone, Default)]
pub struct UsageGate {
    snapshot: Option<UsageSnapshot>,
}

impl UsageGate {
    /// A gate with nothing cached yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached snapshot.
    pub fn update(&mut self, snapshot: UsageSnapshot) {
        self.snapshot = Some(snapshot);
    }

    /// The cached snapshot, if any has been fetched.
    pub fn snapshot(&self) -> Option<&UsageSnapshot> {
        self.snapshot.as_ref()
    }

    /// Whether a send should be attempted.
    ///
    /// Before the first fetch completes nothing is known, so sends are let
    /// through and the server decides.
    pub fn can_send(&self) -> bool {
        self.snapshot.as_ref().map_or(true, UsageSnapshot::can_send)
    }
}
