//! Session records as held in memory and on disk.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Traffic seen recently.
    Active,
    /// No traffic for a while; still eligible for reuse.
    Idle,
    /// Closed by an operator; removed on the next sweep.
    Closed,
}

/// Relay context for one client identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Upstream address this session is bound to.
    pub target: String,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub status: SessionStatus,
    /// Number of relayed exchanges.
    #[serde(default)]
    pub requests: u64,
}

impl SessionRecord {
    /// A fresh session created by its first request.
    pub fn new(target: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            target: target.into(),
            created_at: now,
            last_activity: now,
            status: SessionStatus::Active,
            requests: 0,
        }
    }

    /// Record one relayed exchange.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
        self.status = SessionStatus::Active;
        self.requests += 1;
    }

    /// True when the last activity predates `cutoff`.
    pub fn is_inactive_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_activity < cutoff
    }
}

/// The full set of sessions, ordered by key so snapshots diff cleanly.
pub type Sessions = BTreeMap<String, SessionRecord>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn serializes_to_documented_fields() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let record = SessionRecord::new("127.0.0.1:8080", at);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["target"], "127.0.0.1:8080");
        assert_eq!(json["status"], "active");
        assert_eq!(json["created_at"], "2024-05-01T12:00:00Z");
        assert_eq!(json["last_activity"], "2024-05-01T12:00:00Z");
    }

    #[test]
    fn missing_request_count_defaults_to_zero() {
        let json = r#"{
            "target": "u1:80",
            "created_at": "2024-05-01T12:00:00Z",
            "last_activity": "2024-05-01T12:05:00Z",
            "status": "idle"
        }"#;
        let record: SessionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.requests, 0);
        assert_eq!(record.status, SessionStatus::Idle);
    }

    #[test]
    fn touch_reactivates() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut record = SessionRecord::new("u1:80", at);
        record.status = SessionStatus::Idle;

        let later = at + chrono::Duration::seconds(30);
        record.touch(later);
        assert_eq!(record.status, SessionStatus::Active);
        assert_eq!(record.last_activity, later);
        assert_eq!(record.created_at, at);
        assert_eq!(record.requests, 1);
    }
}
