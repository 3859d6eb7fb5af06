use std::fmt;

use crate::client::BackendClient;
use crate::model::Analytics;

use super::dashboard::{lane_bars, render_bar, LaneBar};

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsView {
    pub videos_processed: u64,
    pub tracked_vehicles: u64,
    pub wrong_way: u64,
    pub lane_changes: u64,
    pub lane_bars: Vec<LaneBar>,
    pub heatmap_url: String,
    pub heatmap_file: String,
}

impl AnalyticsView {
    /// The cumulative heatmap is rewritten in place, so its URL is always
    /// cache-busted. `heatmap_accumulated` names the file on the backend's
    /// disk rather than a servable path; the image itself is fetched through
    /// the `/heatmap` route.
    pub fn build(analytics: &Analytics, client: &BackendClient) -> Self {
        Self {
            videos_processed: analytics.total_videos_processed,
            tracked_vehicles: analytics.total_tracked_vehicles,
            wrong_way: analytics.total_wrong_way,
            lane_changes: analytics.total_lane_changes,
            lane_bars: lane_bars(&analytics.violations_per_lane),
            heatmap_url: client.heatmap_url(),
            heatmap_file: analytics.heatmap_accumulated.clone(),
        }
    }
}

impl fmt::Display for AnalyticsView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Videos processed:  {}", self.videos_processed)?;
        writeln!(f, "Tracked vehicles:  {}", self.tracked_vehicles)?;
        writeln!(f, "Wrong-way total:   {}", self.wrong_way)?;
        writeln!(f, "Lane changes:      {}", self.lane_changes)?;
        writeln!(f, "Heatmap:           {} ({})", self.heatmap_url, self.heatmap_file)?;
        writeln!(f, "\nViolations per lane")?;
        for bar in &self.lane_bars {
            writeln!(
                f,
                "  {:<5} [{}] {} ({:.1}%)",
                bar.lane,
                render_bar(bar.width_pct),
                bar.count,
                bar.width_pct
            )?;
        }
        Ok(())
    }
}
