//! Domain types for the device ledger.
//!
//! A [`DeviceRecord`] is one persisted row. Field order matches the
//! canonical column order of the table:
//! `device_id, model_name, hw_id, mgmt_ip, port_id, tag, current_user,
//! duration, resv_end_time`.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Unique identifier for a lab device.
pub type DeviceId = String;

/// Reservation tag of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    /// Available for reservation.
    #[default]
    Free,
    /// Reserved by `current_user` until `resv_end_time`.
    Resv,
    /// Permanently assigned to `current_user`.
    Static,
}

impl Tag {
    /// Lenient parse: unknown or empty values are `Free`.
    pub fn from_raw(raw: &str) -> Tag {
        match raw.trim().to_ascii_lowercase().as_str() {
            "resv" => Tag::Resv,
            "static" => Tag::Static,
            _ => Tag::Free,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Free => "free",
            Tag::Resv => "resv",
            Tag::Static => "static",
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().map(Tag::from_raw).unwrap_or_default())
    }
}

/// One row of the device table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub hw_id: String,
    /// Management address; may be empty or not an address at all.
    #[serde(default)]
    pub mgmt_ip: String,
    #[serde(default)]
    pub port_id: String,
    #[serde(default)]
    pub tag: Tag,
    #[serde(default)]
    pub current_user: String,
    /// Reservation length in minutes, stored as an integer string.
    #[serde(default)]
    pub duration: String,
    /// RFC 3339 UTC end of the reservation.
    #[serde(default)]
    pub resv_end_time: String,
}

impl DeviceRecord {
    /// A free device with the given id and management address.
    pub fn new(device_id: impl Into<String>, mgmt_ip: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            mgmt_ip: mgmt_ip.into(),
            ..Self::default()
        }
    }

    /// Reservation length, if the `duration` column holds an integer.
    pub fn duration_minutes(&self) -> Option<i64> {
        self.duration.trim().parse().ok()
    }

    /// Parsed reservation end. Timestamps without an offset are read as UTC.
    pub fn resv_end(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.resv_end_time)
    }

    /// Put the device into the `resv` state.
    pub fn mark_reserved(&mut self, user: &str, duration_minutes: i64, end: DateTime<Utc>) {
        self.tag = Tag::Resv;
        self.current_user = user.to_string();
        self.duration = duration_minutes.to_string();
        self.resv_end_time = format_timestamp(end);
    }

    /// Put the device into the `free` state, clearing all reservation fields.
    pub fn mark_free(&mut self) {
        self.tag = Tag::Free;
        self.current_user.clear();
        self.duration.clear();
        self.resv_end_time.clear();
    }

    /// Trim whitespace and drop reservation leftovers on free rows.
    pub fn normalize(&mut self) {
        for field in [
            &mut self.device_id,
            &mut self.model_name,
            &mut self.hw_id,
            &mut self.mgmt_ip,
            &mut self.port_id,
            &mut self.current_user,
            &mut self.duration,
            &mut self.resv_end_time,
        ] {
            let trimmed = field.trim();
            if trimmed.len() != field.len() {
                *field = trimmed.to_string();
            }
        }
        if self.tag == Tag::Free {
            self.mark_free();
        }
    }

    /// Check the per-row invariants that must hold before a row is persisted.
    pub fn validate(&self) -> Result<(), String> {
        if self.device_id.trim().is_empty() {
            return Err("device_id must not be empty".to_string());
        }
        match self.tag {
            Tag::Resv => {
                if self.current_user.trim().is_empty() {
                    return Err(format!("{}: reserved without current_user", self.device_id));
                }
                if self.resv_end().is_none() {
                    return Err(format!(
                        "{}: unparseable resv_end_time {:?}",
                        self.device_id, self.resv_end_time
                    ));
                }
            }
            Tag::Free => {
                if !self.current_user.is_empty()
                    || !self.duration.is_empty()
                    || !self.resv_end_time.is_empty()
                {
                    return Err(format!("{}: free row carries reservation fields", self.device_id));
                }
            }
            Tag::Static => {}
        }
        Ok(())
    }
}

/// Format a timestamp the way it is stored in `resv_end_time`.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an ISO-8601 timestamp, normalizing to UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn missing_tag_reads_as_free() {
        let rec: DeviceRecord =
            serde_json::from_str(r#"{"device_id":"sw-1","mgmt_ip":"10.0.0.1"}"#).unwrap();
        assert_eq!(rec.tag, Tag::Free);
    }

    #[test]
    fn unknown_or_null_tag_reads_as_free() {
        let rec: DeviceRecord =
            serde_json::from_str(r#"{"device_id":"sw-1","tag":"borrowed"}"#).unwrap();
        assert_eq!(rec.tag, Tag::Free);
        let rec: DeviceRecord = serde_json::from_str(r#"{"device_id":"sw-1","tag":null}"#).unwrap();
        assert_eq!(rec.tag, Tag::Free);
        let rec: DeviceRecord =
            serde_json::from_str(r#"{"device_id":"sw-1","tag":" RESV "}"#).unwrap();
        assert_eq!(rec.tag, Tag::Resv);
    }

    #[test]
    fn duration_is_persisted_under_canonical_column() {
        let mut rec = DeviceRecord::new("sw-1", "10.0.0.1");
        let end = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        rec.mark_reserved("alice", 90, end);
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["duration"], "90");
        assert_eq!(json["tag"], "resv");
        assert_eq!(json["resv_end_time"], "2025-03-01T12:00:00Z");
    }

    #[test]
    fn mark_free_clears_reservation_fields() {
        let mut rec = DeviceRecord::new("sw-1", "10.0.0.1");
        rec.mark_reserved("alice", 30, Utc::now());
        rec.mark_free();
        assert_eq!(rec.tag, Tag::Free);
        assert!(rec.current_user.is_empty());
        assert!(rec.duration.is_empty());
        assert!(rec.resv_end_time.is_empty());
        assert!(rec.validate().is_ok());
    }

    #[test]
    fn normalize_trims_and_clears_free_rows() {
        let mut rec = DeviceRecord {
            device_id: " sw-9 ".to_string(),
            mgmt_ip: "10.1.1.9 ".to_string(),
            current_user: "stale".to_string(),
            ..DeviceRecord::default()
        };
        rec.normalize();
        assert_eq!(rec.device_id, "sw-9");
        assert_eq!(rec.mgmt_ip, "10.1.1.9");
        assert!(rec.current_user.is_empty());
    }

    #[test]
    fn validate_reserved_needs_user_and_end() {
        let mut rec = DeviceRecord::new("sw-1", "");
        rec.tag = Tag::Resv;
        assert!(rec.validate().is_err());
        rec.current_user = "bob".to_string();
        assert!(rec.validate().is_err());
        rec.resv_end_time = "2025-03-01T12:00:00+00:00".to_string();
        assert!(rec.validate().is_ok());
    }

    #[test]
    fn static_rows_keep_owner() {
        let mut rec = DeviceRecord::new("sw-2", "");
        rec.tag = Tag::Static;
        rec.current_user = "infra".to_string();
        rec.normalize();
        assert_eq!(rec.current_user, "infra");
        assert!(rec.validate().is_ok());
    }

    #[test]
    fn parse_timestamp_variants() {
        let expected = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2025-03-01T12:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01T14:00:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01T12:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2025-03-01 12:00:00"), Some(expected));
        assert_eq!(parse_timestamp("NA"), None);
        assert_eq!(parse_timestamp(""), None);
    }
}
