//! The presence row shared through the `online_users` table.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::identity::Principal;

/// One row per principal currently considered online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(serialize_with = "serialize_ts", deserialize_with = "deserialize_ts")]
    pub last_seen: DateTime<Utc>,
}

impl PresenceRecord {
    /// Snapshot a principal's identity fields into a fresh record.
    pub fn for_principal(principal: &Principal, last_seen: DateTime<Utc>) -> Self {
        Self {
            id: principal.id.clone(),
            email: principal.email.clone(),
            full_name: principal.display_name.clone(),
            last_seen,
        }
    }

    /// Time since the last heartbeat. Negative when the writer's clock is ahead.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_seen
    }

    /// Active iff `now - last_seen <= window`.
    pub fn is_active(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        self.age(now) <= window
    }

    /// Best label for this user.
    pub fn display_name(&self) -> &str {
        if !self.full_name.is_empty() {
            &self.full_name
        } else if !self.email.is_empty() {
            &self.email
        } else {
            &self.id
        }
    }
}

/// Oldest `last_seen` that still counts as active. Sweeps delete rows
/// strictly older than this. Saturates at the earliest representable time.
pub fn stale_cutoff(now: DateTime<Utc>, window: chrono::Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp, or a zone-less Postgres `timestamp`
/// which is taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn serialize_ts<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format_timestamp(*ts))
}

fn deserialize_ts<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn record(last_seen: DateTime<Utc>) -> PresenceRecord {
        PresenceRecord {
            id: "u1".into(),
            email: "ada@example.edu".into(),
            full_name: "Ada".into(),
            last_seen,
        }
    }

    #[test]
    fn active_boundary_is_inclusive() {
        let window = chrono::Duration::seconds(30);
        assert!(record(at(0)).is_active(at(30), window));
        assert!(!record(at(0)).is_active(at(31), window));
    }

    #[test]
    fn future_heartbeat_counts_as_active() {
        let window = chrono::Duration::seconds(30);
        assert!(record(at(5)).is_active(at(0), window));
    }

    #[test]
    fn stale_cutoff_saturates_for_huge_windows() {
        assert_eq!(stale_cutoff(at(30), chrono::Duration::seconds(30)), at(0));
        assert_eq!(
            stale_cutoff(at(0), chrono::Duration::MAX),
            DateTime::<Utc>::MIN_UTC
        );
        assert!(record(at(0)).is_active(at(0), chrono::Duration::MAX));
    }

    #[test]
    fn serializes_last_seen_as_utc_millis() {
        let json = serde_json::to_value(record(at(0))).unwrap();
        assert_eq!(json["last_seen"], "2023-11-14T22:13:20.000Z");
        assert_eq!(json["full_name"], "Ada");
    }

    #[test]
    fn deserializes_postgres_timestamp_shapes() {
        let with_offset = r#"{"id":"u1","email":"","full_name":"","last_seen":"2023-11-14T22:13:20.5+00:00"}"#;
        let r: PresenceRecord = serde_json::from_str(with_offset).unwrap();
        assert_eq!(r.last_seen.timestamp_millis(), at(0).timestamp_millis() + 500);

        let naive = r#"{"id":"u1","last_seen":"2023-11-14T22:13:20.123456"}"#;
        let r: PresenceRecord = serde_json::from_str(naive).unwrap();
        assert_eq!(r.last_seen.timestamp(), at(0).timestamp());
        assert!(r.email.is_empty());
    }

    #[test]
    fn rejects_garbage_timestamp() {
        let bad = r#"{"id":"u1","last_seen":"yesterday"}"#;
        assert!(serde_json::from_str::<PresenceRecord>(bad).is_err());
    }

    #[test]
    fn display_name_falls_back_to_email_then_id() {
        let mut r = record(at(0));
        assert_eq!(r.display_name(), "Ada");
        r.full_name.clear();
        assert_eq!(r.display_name(), "ada@example.edu");
        r.email.clear();
        assert_eq!(r.display_name(), "u1");
    }
}
