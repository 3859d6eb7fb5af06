use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use rust_embed::Embed;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::feed::{encode_event, FeedSource};

#[derive(Embed)]
#[folder = "src/assets/"]
struct Assets;

#[derive(Clone)]
pub struct RelayState {
    source: FeedSource,
    interval: Duration,
    connections: Arc<AtomicUsize>,
}

impl RelayState {
    pub fn new(source: FeedSource, interval: Duration) -> Self {
        Self {
            source,
            interval,
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn live_connections(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }
}

/// Held for exactly the lifetime of one WebSocket connection. Dropping it
/// is the only place a connection is counted out, so every exit path of
/// the connection task releases it once.
struct ConnectionGuard {
    peer: SocketAddr,
    live: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    fn acquire(peer: SocketAddr, live: Arc<AtomicUsize>) -> Self {
        let count = live.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::info!(peer = %peer, live = count, "client connected");
        Self { peer, live }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let count = self.live.fetch_sub(1, Ordering::AcqRel) - 1;
        tracing::info!(peer = %self.peer, live = count, "client disconnected");
    }
}

#[derive(Serialize)]
struct HealthResponse {
    feed: &'static str,
    connections: usize,
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/assets/{*path}", get(static_handler))
        .route("/api/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(listener: tokio::net::TcpListener, state: RelayState) -> Result<(), std::io::Error> {
    let app = router(state);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

pub async fn start_server(state: RelayState, port: u16) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(
        feed = state.source.name(),
        interval_ms = state.interval.as_millis() as u64,
        "starting relay on http://{}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, state).await
}

async fn index_handler() -> impl IntoResponse {
    match Assets::get("index.html") {
        Some(content) => Html(content.data.to_vec()).into_response(),
        None => (StatusCode::NOT_FOUND, "index.html not found").into_response(),
    }
}

async fn static_handler(Path(path): Path<String>) -> impl IntoResponse {
    match Assets::get(&path) {
        Some(content) => {
            let mime = mime_guess::from_path(&path).first_or_octet_stream();
            (
                [(header::CONTENT_TYPE, mime.as_ref())],
                content.data.to_vec(),
            )
                .into_response()
        }
        None => (StatusCode::NOT_FOUND, "not found").into_response(),
    }
}

async fn health_handler(State(state): State<RelayState>) -> impl IntoResponse {
    axum::Json(HealthResponse {
        feed: state.source.name(),
        connections: state.live_connections(),
    })
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<RelayState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    ws.on_upgrade(move |socket| run_connection(socket, peer, state))
}

async fn run_connection(socket: WebSocket, peer: SocketAddr, state: RelayState) {
    let _guard = ConnectionGuard::acquire(peer, Arc::clone(&state.connections));
    let (mut sender, mut receiver) = socket.split();
    let mut feed = state.source.open();

    // First update goes out one full interval after connecting.
    let mut ticker = tokio::time::interval_at(Instant::now() + state.interval, state.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let poll = feed.next_update();
                tokio::pin!(poll);

                // A slow feed must not hide a disconnect.
                let update = loop {
                    tokio::select! {
                        update = &mut poll => break update,
                        msg = receiver.next() => {
                            if is_closed(peer, msg) {
                                return;
                            }
                        }
                    }
                };

                let Some(update) = update else {
                    continue;
                };
                let payload = match encode_event(&update) {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::error!(peer = %peer, error = %e, "failed to encode update");
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(payload.into())).await {
                    tracing::debug!(peer = %peer, error = %e, "send failed, closing connection");
                    break;
                }
                tracing::trace!(peer = %peer, vehicles = update.vehicles, wrong_way = update.wrong_way, "sent update");
            }
            msg = receiver.next() => {
                if is_closed(peer, msg) {
                    break;
                }
            }
        }
    }
}

fn is_closed(peer: SocketAddr, msg: Option<Result<Message, axum::Error>>) -> bool {
    match msg {
        None | Some(Ok(Message::Close(_))) => true,
        Some(Err(e)) => {
            tracing::debug!(peer = %peer, error = %e, "socket error");
            true
        }
        Some(Ok(_)) => false,
    }
}
