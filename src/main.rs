use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod api;
mod client;
mod config;
mod model;
mod view;

use api::{FeedSource, RelayState};
use client::{BackendClient, SelectionSource, VideoFile};
use config::{Config, FeedKind};
use model::{filename_from_path, ViolationIdentity};
use view::{AnalyticsView, DashboardView, UploadSession, ViolationBoard};

#[derive(Parser)]
#[command(name = "wrongway", version, about = "Wrong-way detection backend client and live-feed relay")]
struct Cli {
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// Overrides `backend.base_url` from the config file.
    #[arg(long, global = true, env = "WRONGWAY_BACKEND_URL")]
    backend_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the live traffic-update feed over WebSocket.
    Relay {
        #[arg(long, env = "PORT")]
        port: Option<u16>,
    },
    /// Upload a video for processing and print the resulting dashboard.
    Upload {
        path: PathBuf,
        /// Treat the file as dropped onto the page rather than picked.
        #[arg(long)]
        drag_drop: bool,
    },
    /// List or delete stored violations.
    Violations {
        #[command(subcommand)]
        action: ViolationsCommand,
    },
    /// Print cumulative analytics.
    Analytics,
    /// Reset cumulative analytics.
    Reset,
    /// Download the cumulative heatmap image.
    Heatmap {
        #[arg(long)]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum ViolationsCommand {
    List,
    Delete(DeleteArgs),
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct DeleteArgs {
    #[arg(long)]
    id: Option<i64>,
    #[arg(long)]
    filename: Option<String>,
    /// Derives the filename from the last path segment.
    #[arg(long)]
    image_path: Option<String>,
}

impl DeleteArgs {
    fn identity(&self) -> Result<ViolationIdentity, String> {
        if let Some(id) = self.id {
            return Ok(ViolationIdentity::ById(id));
        }
        if let Some(name) = &self.filename {
            return Ok(ViolationIdentity::ByFilename(name.clone()));
        }
        let path = self.image_path.as_deref().unwrap_or_default();
        filename_from_path(path)
            .map(ViolationIdentity::ByFilename)
            .ok_or_else(|| format!("no filename in image path {path:?}"))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("wrongway=info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(url) = cli.backend_url {
        config = config.with_base_url(url)?;
    }

    let client = BackendClient::new(&config.backend)?;
    tracing::debug!(backend = %client.base_url(), "backend client ready");

    if let Err(e) = run(cli.command, config, client).await {
        eprintln!("{e}");
        std::process::exit(1);
    }

    Ok(())
}

async fn run(
    command: Command,
    config: Config,
    client: BackendClient,
) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Relay { port } => {
            let source = match config.relay.feed {
                FeedKind::Demo => FeedSource::Demo,
                FeedKind::Analytics => FeedSource::Analytics(client),
            };
            let state = RelayState::new(source, Duration::from_millis(config.relay.interval_ms));
            let port = port.unwrap_or(config.relay.port);

            tokio::select! {
                result = api::start_server(state, port) => result?,
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown signal received");
                }
            }
            tracing::info!("shutdown complete");
        }
        Command::Upload { path, drag_drop } => {
            let source = if drag_drop {
                SelectionSource::DragDrop
            } else {
                SelectionSource::Picker
            };
            let file = VideoFile::from_selection(source, &path)?;
            if file.is_empty() {
                tracing::warn!(file = %file.file_name(), "video file is empty");
            }

            let mut session = UploadSession::new();
            let ticket = session.begin();
            tracing::debug!(loading = session.is_loading(), "upload in flight");
            let result = client.submit(&file).await;
            session.complete(ticket, result);

            if let Some(error) = session.error() {
                return Err(error.into());
            }
            if let Some(result) = session.current() {
                print!("{}", DashboardView::build(result, &client));
            }
        }
        Command::Violations { action } => {
            let mut board = ViolationBoard::new();
            board.load(client.list_violations().await);
            if let Some(error) = board.error() {
                return Err(error.into());
            }

            match action {
                ViolationsCommand::List => print_violations(&board, &client),
                ViolationsCommand::Delete(args) => {
                    let identity = args.identity()?;
                    board.select(identity.clone());
                    let result = client.delete_violation(&identity).await;
                    if let Err(e) = &result {
                        tracing::debug!(status = ?e.status(), "delete rejected");
                    }
                    board.apply_delete(&identity, result);

                    if let Some(error) = board.error() {
                        return Err(error.into());
                    }
                    debug_assert!(board.selected().is_none());
                    println!("deleted {identity}, {} violation(s) remain", board.items().len());
                }
            }
        }
        Command::Analytics => {
            let analytics = client.get_analytics().await?;
            print!("{}", AnalyticsView::build(&analytics, &client));
        }
        Command::Reset => {
            client.reset_analytics().await?;
            println!("analytics reset");
        }
        Command::Heatmap { out } => {
            let bytes = client.fetch_heatmap().await?;
            tokio::fs::write(&out, &bytes).await?;
            println!("wrote {} bytes to {}", bytes.len(), out.display());
        }
    }

    Ok(())
}

fn print_violations(board: &ViolationBoard, client: &BackendClient) {
    if board.items().is_empty() {
        println!("No violations stored.");
        return;
    }

    for violation in board.items() {
        let mut line = format!("{:<28} {}", violation.identity(), client.resolve(&violation.image_path));
        if let Some(track_id) = violation.track_id {
            line.push_str(&format!(" track={track_id}"));
        }
        if let Some(ts) = &violation.timestamp {
            line.push_str(&format!(" at={ts}"));
        }
        if let Some(ts) = &violation.video_timestamp {
            line.push_str(&format!(" video={ts}"));
        }
        println!("{line}");
    }
}
