use std::collections::BTreeMap;
use std::fmt;

use crate::client::BackendClient;
use crate::model::{Direction, Lane, LaneChangeEvent, UploadResult, ViolationEvent};

/// One horizontal bar in a per-lane chart. `width_pct` is relative to the
/// busiest lane, which always fills the track.
#[derive(Debug, Clone, PartialEq)]
pub struct LaneBar {
    pub lane: Lane,
    pub count: u64,
    pub width_pct: f64,
}

pub fn lane_bars(counts: &BTreeMap<Lane, u64>) -> Vec<LaneBar> {
    let count_of = |lane: Lane| counts.get(&lane).copied().unwrap_or(0);
    let max = Lane::ALL.iter().map(|l| count_of(*l)).max().unwrap_or(0).max(1);

    Lane::ALL
        .iter()
        .map(|lane| {
            let count = count_of(*lane);
            LaneBar {
                lane: *lane,
                count,
                width_pct: count as f64 / max as f64 * 100.0,
            }
        })
        .collect()
}

/// Ten lane changes fill the bar.
pub fn lane_change_bar_pct(lane_changes: usize) -> f64 {
    (lane_changes as f64 * 10.0).min(100.0)
}

/// Formats an offset from the start of the video as `MM:SS.mmm`, growing an
/// hours field once the offset passes an hour. Negative offsets clamp to zero.
pub fn format_offset(ms: i64) -> String {
    let ms = ms.max(0) as u64;
    let millis = ms % 1000;
    let total_secs = ms / 1000;
    let secs = total_secs % 60;
    let mins = (total_secs / 60) % 60;
    let hours = total_secs / 3600;

    if hours > 0 {
        format!("{hours}:{mins:02}:{secs:02}.{millis:03}")
    } else {
        format!("{mins:02}:{secs:02}.{millis:03}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViolationCard {
    pub track_id: i64,
    pub lane: Lane,
    pub direction: Direction,
    pub time: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LaneChangeRow {
    pub track_id: i64,
    pub from_lane: Lane,
    pub to_lane: Lane,
    pub time: String,
}

/// Everything the upload dashboard shows for one processing run.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardView {
    pub video_url: String,
    pub heatmap_url: String,
    pub tracked_vehicles: u64,
    pub wrong_way: u64,
    pub lane_change_count: usize,
    pub violation_count: usize,
    pub lane_bars: Vec<LaneBar>,
    pub lane_change_bar_pct: f64,
    pub cards: Vec<ViolationCard>,
    pub lane_changes: Vec<LaneChangeRow>,
}

impl ViolationCard {
    fn new(event: &ViolationEvent, client: &BackendClient) -> Self {
        Self {
            track_id: event.track_id,
            lane: event.lane,
            direction: event.direction_detected,
            time: format_offset(event.timestamp_ms),
            image_url: client.resolve(&event.evidence_image_url),
        }
    }
}

impl From<&LaneChangeEvent> for LaneChangeRow {
    fn from(event: &LaneChangeEvent) -> Self {
        Self {
            track_id: event.track_id,
            from_lane: event.from_lane,
            to_lane: event.to_lane,
            time: format_offset(event.timestamp_ms),
        }
    }
}

impl DashboardView {
    pub fn build(result: &UploadResult, client: &BackendClient) -> Self {
        Self {
            video_url: client.resolve(&result.video_url),
            heatmap_url: client.cache_busted(&result.heatmap_url),
            tracked_vehicles: result.total_tracked_vehicles,
            wrong_way: result.wrong_way_count,
            lane_change_count: result.lane_changes.len(),
            violation_count: result.violations.len(),
            lane_bars: lane_bars(&result.violations_per_lane()),
            lane_change_bar_pct: lane_change_bar_pct(result.lane_changes.len()),
            cards: result
                .violations
                .iter()
                .map(|v| ViolationCard::new(v, client))
                .collect(),
            lane_changes: result.lane_changes.iter().map(LaneChangeRow::from).collect(),
        }
    }
}

const BAR_WIDTH: usize = 30;

pub(crate) fn render_bar(width_pct: f64) -> String {
    let filled = ((width_pct / 100.0) * BAR_WIDTH as f64).round() as usize;
    let filled = filled.min(BAR_WIDTH);
    format!("{}{}", "#".repeat(filled), ".".repeat(BAR_WIDTH - filled))
}

impl fmt::Display for DashboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total tracked vehicles: {}", self.tracked_vehicles)?;
        writeln!(f, "Wrong-way count:        {}", self.wrong_way)?;
        writeln!(f, "Total lane changes:     {}", self.lane_change_count)?;
        writeln!(f, "Violation count:        {}", self.violation_count)?;
        writeln!(f, "Processed video:        {}", self.video_url)?;
        writeln!(f, "Heatmap:                {}", self.heatmap_url)?;

        writeln!(f, "\nViolations per lane")?;
        for bar in &self.lane_bars {
            writeln!(f, "  {:<5} [{}] {}", bar.lane, render_bar(bar.width_pct), bar.count)?;
        }
        writeln!(
            f,
            "  lanes [{}] {} lane changes",
            render_bar(self.lane_change_bar_pct),
            self.lane_change_count
        )?;

        writeln!(f, "\nViolations")?;
        if self.cards.is_empty() {
            writeln!(f, "  No wrong-way violations detected.")?;
        }
        for card in &self.cards {
            writeln!(
                f,
                "  Track {} | lane {} | direction {} | {} | {}",
                card.track_id, card.lane, card.direction, card.time, card.image_url
            )?;
        }

        writeln!(f, "\nLane change events")?;
        if self.lane_changes.is_empty() {
            writeln!(f, "  No lane changes detected.")?;
        }
        for row in &self.lane_changes {
            writeln!(
                f,
                "  Track {} | {} -> {} | {}",
                row.track_id, row.from_lane, row.to_lane, row.time
            )?;
        }
        Ok(())
    }
}
