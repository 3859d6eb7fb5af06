//! Loose mirrors of the backend's JSON bodies.
//!
//! Every field is optional so that a missing field is reported as a schema
//! violation by the decoders in `types` instead of a serde error.

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct UploadBody {
    pub video_url: Option<String>,
    pub heatmap_url: Option<String>,
    pub total_tracked_vehicles: Option<u64>,
    pub wrong_way_count: Option<u64>,
    pub violations: Option<Vec<ViolationEventBody>>,
    pub lane_changes: Option<Vec<LaneChangeBody>>,
}

#[derive(Debug, Deserialize)]
pub struct ViolationEventBody {
    pub track_id: Option<i64>,
    pub lane: Option<String>,
    pub direction_detected: Option<String>,
    pub timestamp_ms: Option<i64>,
    pub evidence_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LaneChangeBody {
    pub track_id: Option<i64>,
    pub from_lane: Option<String>,
    pub to_lane: Option<String>,
    pub timestamp_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PersistedViolationBody {
    pub id: Option<i64>,
    pub filename: Option<String>,
    pub image_path: Option<String>,
    pub track_id: Option<i64>,
    pub timestamp: Option<TimestampValue>,
    pub video_timestamp: Option<TimestampValue>,
}

/// Backend revisions disagree on whether timestamps are numbers or strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum TimestampValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for TimestampValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampValue::Number(n) => write!(f, "{n}"),
            TimestampValue::Text(s) => f.write_str(s),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AnalyticsBody {
    pub total_videos_processed: Option<u64>,
    pub total_tracked_vehicles: Option<u64>,
    pub total_wrong_way: Option<u64>,
    pub total_lane_changes: Option<u64>,
    pub violations_per_lane: Option<HashMap<String, u64>>,
    pub heatmap_accumulated: Option<String>,
}

/// Error bodies are read best-effort; `detail` is only used when it is a string.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn detail_from(bytes: &[u8]) -> Option<String> {
        let body: ErrorBody = serde_json::from_slice(bytes).ok()?;
        match body.detail? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_from_string() {
        let detail = ErrorBody::detail_from(br#"{"detail": "File not found"}"#);
        assert_eq!(detail.as_deref(), Some("File not found"));
    }

    #[test]
    fn test_detail_from_garbage_is_none() {
        assert_eq!(ErrorBody::detail_from(b""), None);
        assert_eq!(ErrorBody::detail_from(b"<html>502 Bad Gateway</html>"), None);
        assert_eq!(ErrorBody::detail_from(br#"{"detail": ""}"#), None);
        assert_eq!(ErrorBody::detail_from(br#"{"detail": [{"loc": ["query"]}]}"#), None);
        assert_eq!(ErrorBody::detail_from(br#"["detail"]"#), None);
    }

    #[test]
    fn test_timestamp_accepts_numbers_and_strings() {
        let body: PersistedViolationBody = serde_json::from_str(
            r#"{"id": 1, "image_path": "/violators/a.jpg", "timestamp": 1712000000, "video_timestamp": "00:04"}"#,
        )
        .unwrap();
        assert_eq!(body.timestamp, Some(TimestampValue::Number(1712000000.0)));
        assert_eq!(body.video_timestamp, Some(TimestampValue::Text("00:04".into())));
    }
}
