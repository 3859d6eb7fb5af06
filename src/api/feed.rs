use rand::Rng;
use serde::Serialize;

use crate::client::BackendClient;
use crate::model::Analytics;

pub const TRAFFIC_UPDATE: &str = "traffic-update";

const DEMO_PLATE_PREFIX: &str = "OD02AB";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrafficUpdate {
    pub vehicles: u64,
    #[serde(rename = "wrongWay")]
    pub wrong_way: bool,
    pub plate: String,
}

#[derive(Serialize)]
struct FeedEvent<'a> {
    event: &'static str,
    data: &'a TrafficUpdate,
}

pub fn encode_event(update: &TrafficUpdate) -> Result<String, serde_json::Error> {
    serde_json::to_string(&FeedEvent {
        event: TRAFFIC_UPDATE,
        data: update,
    })
}

/// Shared, cloneable description of where updates come from. Each
/// connection opens its own [`Feed`].
#[derive(Clone)]
pub enum FeedSource {
    Demo,
    Analytics(BackendClient),
}

impl FeedSource {
    pub fn open(&self) -> Feed {
        match self {
            FeedSource::Demo => Feed::Demo,
            FeedSource::Analytics(client) => Feed::Analytics {
                client: client.clone(),
                baseline: None,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FeedSource::Demo => "demo",
            FeedSource::Analytics(_) => "analytics",
        }
    }
}

pub enum Feed {
    Demo,
    Analytics {
        client: BackendClient,
        baseline: Option<Analytics>,
    },
}

impl Feed {
    /// `None` skips this tick.
    pub async fn next_update(&mut self) -> Option<TrafficUpdate> {
        match self {
            Feed::Demo => Some(demo_update()),
            Feed::Analytics { client, baseline } => match client.get_analytics().await {
                Ok(next) => {
                    let update = analytics_update(baseline.as_ref(), &next);
                    *baseline = Some(next);
                    Some(update)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "analytics poll failed, skipping update");
                    None
                }
            },
        }
    }
}

fn demo_update() -> TrafficUpdate {
    random_update(&mut rand::thread_rng())
}

pub fn random_update<R: Rng>(rng: &mut R) -> TrafficUpdate {
    TrafficUpdate {
        vehicles: rng.gen_range(0..50),
        wrong_way: rng.gen_bool(0.4),
        plate: format!("{DEMO_PLATE_PREFIX}{}", rng.gen_range(0..9999)),
    }
}

/// Deltas since the previous poll. The first poll, and any poll where a
/// counter went backwards (a reset), only establishes the baseline.
pub fn analytics_update(baseline: Option<&Analytics>, next: &Analytics) -> TrafficUpdate {
    match baseline {
        Some(prev) if next.is_monotonic_successor(prev) => TrafficUpdate {
            vehicles: next.total_tracked_vehicles - prev.total_tracked_vehicles,
            wrong_way: next.total_wrong_way > prev.total_wrong_way,
            plate: String::new(),
        },
        _ => TrafficUpdate {
            vehicles: 0,
            wrong_way: false,
            plate: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake_backend::FakeBackend;
    use crate::config::BackendConfig;
    use crate::model::Lane;
    use axum::http::StatusCode;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn analytics(tracked: u64, wrong_way: u64) -> Analytics {
        Analytics {
            total_videos_processed: 1,
            total_tracked_vehicles: tracked,
            total_wrong_way: wrong_way,
            total_lane_changes: 0,
            violations_per_lane: BTreeMap::from([(Lane::Left, wrong_way), (Lane::Right, 0)]),
            heatmap_accumulated: "heatmap.jpg".into(),
        }
    }

    #[test]
    fn test_event_wire_format() {
        let update = TrafficUpdate {
            vehicles: 17,
            wrong_way: true,
            plate: "OD02AB4411".into(),
        };
        assert_eq!(
            encode_event(&update).unwrap(),
            r#"{"event":"traffic-update","data":{"vehicles":17,"wrongWay":true,"plate":"OD02AB4411"}}"#
        );
    }

    #[test]
    fn test_random_update_ranges() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let updates: Vec<TrafficUpdate> = (0..1000).map(|_| random_update(&mut rng)).collect();

        assert!(updates.iter().all(|u| u.vehicles < 50));
        assert!(updates.iter().any(|u| u.wrong_way));
        assert!(updates.iter().any(|u| !u.wrong_way));
        for u in &updates {
            let suffix = u.plate.strip_prefix("OD02AB").unwrap();
            assert!(suffix.parse::<u32>().unwrap() < 9999);
        }
    }

    #[test]
    fn test_analytics_deltas() {
        let first = analytics_update(None, &analytics(10, 1));
        assert_eq!(first.vehicles, 0);
        assert!(!first.wrong_way);

        let grew = analytics_update(Some(&analytics(10, 1)), &analytics(25, 2));
        assert_eq!(grew.vehicles, 15);
        assert!(grew.wrong_way);

        let quiet = analytics_update(Some(&analytics(25, 2)), &analytics(25, 2));
        assert_eq!(quiet.vehicles, 0);
        assert!(!quiet.wrong_way);

        let reset = analytics_update(Some(&analytics(25, 2)), &analytics(3, 0));
        assert_eq!(reset.vehicles, 0);
        assert!(!reset.wrong_way);
    }

    #[tokio::test]
    async fn test_analytics_feed_polls_backend() {
        let backend = FakeBackend::default();
        let client = BackendClient::new(&BackendConfig {
            base_url: backend.spawn().await,
            timeout_secs: 5,
        })
        .unwrap();
        let mut feed = FeedSource::Analytics(client).open();

        let baseline = feed.next_update().await.unwrap();
        assert_eq!(baseline.vehicles, 0);

        backend.set_analytics(serde_json::json!({
            "total_videos_processed": 1,
            "total_tracked_vehicles": 12,
            "total_wrong_way": 1,
            "total_lane_changes": 0,
            "violations_per_lane": {"LEFT": 1, "RIGHT": 0},
            "heatmap_accumulated": "heatmap.jpg"
        }));
        let update = feed.next_update().await.unwrap();
        assert_eq!(update.vehicles, 12);
        assert!(update.wrong_way);
        assert!(update.plate.is_empty());

        backend.fail_analytics(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(feed.next_update().await, None);
    }
}
