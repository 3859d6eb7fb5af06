use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::wire::{
    AnalyticsBody, LaneChangeBody, PersistedViolationBody, TimestampValue, UploadBody,
    ViolationEventBody,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("missing field `{0}`")]
    Missing(&'static str),
    #[error("invalid value {value:?} for `{field}`")]
    InvalidValue { field: &'static str, value: String },
    #[error("{0}")]
    Invariant(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Lane {
    Left,
    Right,
}

impl Lane {
    pub const ALL: [Lane; 2] = [Lane::Left, Lane::Right];

    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Left => "LEFT",
            Lane::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lane {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LEFT" => Ok(Lane::Left),
            "RIGHT" => Ok(Lane::Right),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        })
    }
}

impl FromStr for Direction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UP" => Ok(Direction::Up),
            "DOWN" => Ok(Direction::Down),
            _ => Err(()),
        }
    }
}

/// A wrong-way event flagged during one processing run. `track_id` is only
/// unique within that run's video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViolationEvent {
    pub track_id: i64,
    pub lane: Lane,
    pub direction_detected: Direction,
    pub timestamp_ms: i64,
    pub evidence_image_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneChangeEvent {
    pub track_id: i64,
    pub from_lane: Lane,
    pub to_lane: Lane,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub video_url: String,
    pub heatmap_url: String,
    pub total_tracked_vehicles: u64,
    pub wrong_way_count: u64,
    pub violations: Vec<ViolationEvent>,
    pub lane_changes: Vec<LaneChangeEvent>,
}

impl UploadResult {
    pub fn violations_per_lane(&self) -> BTreeMap<Lane, u64> {
        let mut counts: BTreeMap<Lane, u64> = Lane::ALL.iter().map(|l| (*l, 0)).collect();
        for v in &self.violations {
            *counts.entry(v.lane).or_insert(0) += 1;
        }
        counts
    }
}

/// How a stored violation is addressed for deletion. Backends have exposed
/// both an integer id route and an evidence-filename route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViolationIdentity {
    ById(i64),
    ByFilename(String),
}

impl fmt::Display for ViolationIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationIdentity::ById(id) => write!(f, "#{id}"),
            ViolationIdentity::ByFilename(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PersistedViolation {
    pub id: Option<i64>,
    pub filename: Option<String>,
    pub image_path: String,
    pub track_id: Option<i64>,
    pub timestamp: Option<TimestampValue>,
    pub video_timestamp: Option<TimestampValue>,
}

impl PersistedViolation {
    /// Filename route wins when a filename is known; the id route is the
    /// fallback for backends that only number their records.
    pub fn identity(&self) -> ViolationIdentity {
        match (&self.filename, self.id) {
            (Some(name), _) => ViolationIdentity::ByFilename(name.clone()),
            (None, Some(id)) => ViolationIdentity::ById(id),
            // Unreachable for decoded values; decoding rejects records with neither.
            (None, None) => ViolationIdentity::ByFilename(self.image_path.clone()),
        }
    }

    pub fn matches(&self, identity: &ViolationIdentity) -> bool {
        match identity {
            ViolationIdentity::ById(id) => self.id == Some(*id),
            ViolationIdentity::ByFilename(name) => self.filename.as_deref() == Some(name.as_str()),
        }
    }
}

/// Trailing path segment of an image pointer, ignoring any query string.
pub fn filename_from_path(image_path: &str) -> Option<String> {
    let path = image_path.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/')
        .next()
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analytics {
    pub total_videos_processed: u64,
    pub total_tracked_vehicles: u64,
    pub total_wrong_way: u64,
    pub total_lane_changes: u64,
    pub violations_per_lane: BTreeMap<Lane, u64>,
    pub heatmap_accumulated: String,
}

impl Analytics {
    pub fn lane_count(&self, lane: Lane) -> u64 {
        self.violations_per_lane.get(&lane).copied().unwrap_or(0)
    }

    /// Counters only ever grow between resets.
    pub fn is_monotonic_successor(&self, prev: &Analytics) -> bool {
        self.total_videos_processed >= prev.total_videos_processed
            && self.total_tracked_vehicles >= prev.total_tracked_vehicles
            && self.total_wrong_way >= prev.total_wrong_way
            && self.total_lane_changes >= prev.total_lane_changes
            && Lane::ALL
                .iter()
                .all(|l| self.lane_count(*l) >= prev.lane_count(*l))
    }
}

fn required<T>(value: Option<T>, field: &'static str) -> Result<T, SchemaError> {
    value.ok_or(SchemaError::Missing(field))
}

fn required_str(value: Option<String>, field: &'static str) -> Result<String, SchemaError> {
    match value {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(SchemaError::Missing(field)),
    }
}

fn parse_enum<T: FromStr>(value: Option<String>, field: &'static str) -> Result<T, SchemaError> {
    let raw = required(value, field)?;
    raw.parse()
        .map_err(|_| SchemaError::InvalidValue { field, value: raw })
}

impl TryFrom<ViolationEventBody> for ViolationEvent {
    type Error = SchemaError;

    fn try_from(body: ViolationEventBody) -> Result<Self, Self::Error> {
        Ok(Self {
            track_id: required(body.track_id, "track_id")?,
            lane: parse_enum(body.lane, "lane")?,
            direction_detected: parse_enum(body.direction_detected, "direction_detected")?,
            timestamp_ms: required(body.timestamp_ms, "timestamp_ms")?,
            evidence_image_url: required_str(body.evidence_image_url, "evidence_image_url")?,
        })
    }
}

impl TryFrom<LaneChangeBody> for LaneChangeEvent {
    type Error = SchemaError;

    fn try_from(body: LaneChangeBody) -> Result<Self, Self::Error> {
        let track_id = required(body.track_id, "track_id")?;
        let from_lane: Lane = parse_enum(body.from_lane, "from_lane")?;
        let to_lane: Lane = parse_enum(body.to_lane, "to_lane")?;
        if from_lane == to_lane {
            return Err(SchemaError::Invariant(format!(
                "lane change for track {track_id} stays in {from_lane}"
            )));
        }
        Ok(Self {
            track_id,
            from_lane,
            to_lane,
            timestamp_ms: required(body.timestamp_ms, "timestamp_ms")?,
        })
    }
}

impl TryFrom<UploadBody> for UploadResult {
    type Error = SchemaError;

    fn try_from(body: UploadBody) -> Result<Self, Self::Error> {
        let video_url = required_str(body.video_url, "video_url")?;
        let heatmap_url = required_str(body.heatmap_url, "heatmap_url")?;
        let total_tracked_vehicles = required(body.total_tracked_vehicles, "total_tracked_vehicles")?;
        let wrong_way_count = required(body.wrong_way_count, "wrong_way_count")?;

        if wrong_way_count > total_tracked_vehicles {
            return Err(SchemaError::Invariant(format!(
                "wrong_way_count {wrong_way_count} exceeds total_tracked_vehicles {total_tracked_vehicles}"
            )));
        }

        let violations = required(body.violations, "violations")?
            .into_iter()
            .map(ViolationEvent::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let lane_changes = required(body.lane_changes, "lane_changes")?
            .into_iter()
            .map(LaneChangeEvent::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            video_url,
            heatmap_url,
            total_tracked_vehicles,
            wrong_way_count,
            violations,
            lane_changes,
        })
    }
}

impl TryFrom<PersistedViolationBody> for PersistedViolation {
    type Error = SchemaError;

    fn try_from(body: PersistedViolationBody) -> Result<Self, Self::Error> {
        let image_path = required_str(body.image_path, "image_path")?;
        let filename = body
            .filename
            .filter(|f| !f.is_empty())
            .or_else(|| filename_from_path(&image_path));

        if filename.is_none() && body.id.is_none() {
            return Err(SchemaError::Invariant(format!(
                "violation {image_path:?} has neither an id nor a filename"
            )));
        }

        Ok(Self {
            id: body.id,
            filename,
            image_path,
            track_id: body.track_id,
            timestamp: body.timestamp,
            video_timestamp: body.video_timestamp,
        })
    }
}

impl TryFrom<AnalyticsBody> for Analytics {
    type Error = SchemaError;

    fn try_from(body: AnalyticsBody) -> Result<Self, Self::Error> {
        let mut violations_per_lane: BTreeMap<Lane, u64> =
            Lane::ALL.iter().map(|l| (*l, 0)).collect();
        for (key, count) in required(body.violations_per_lane, "violations_per_lane")? {
            let lane = key.parse::<Lane>().map_err(|_| SchemaError::InvalidValue {
                field: "violations_per_lane",
                value: key.clone(),
            })?;
            violations_per_lane.insert(lane, count);
        }

        Ok(Self {
            total_videos_processed: required(body.total_videos_processed, "total_videos_processed")?,
            total_tracked_vehicles: required(body.total_tracked_vehicles, "total_tracked_vehicles")?,
            total_wrong_way: required(body.total_wrong_way, "total_wrong_way")?,
            total_lane_changes: required(body.total_lane_changes, "total_lane_changes")?,
            violations_per_lane,
            heatmap_accumulated: required_str(body.heatmap_accumulated, "heatmap_accumulated")?,
        })
    }
}
