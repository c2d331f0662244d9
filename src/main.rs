//! CLI entry point for the traffic visualization pipeline.
//!
//! Provides subcommands for parsing a network document, following the live
//! telemetry stream with congestion classification, and following the
//! emergency sub-feed.

use std::ffi::OsStr;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use sumo_viz::batch::{self, EDGE_BATCH_SIZE, INTERNAL_BATCH_SIZE};
use sumo_viz::cache::NetworkCache;
use sumo_viz::congestion::Policy;
use sumo_viz::edges;
use sumo_viz::emergency::EmergencyFeedClient;
use sumo_viz::fetch::{BasicClient, fetch_document};
use sumo_viz::net::{Bounds, NetworkDocumentParser, NetworkModel};
use sumo_viz::output::{CongestionRecord, append_record};
use sumo_viz::telemetry::{TcpTransport, TelemetryChannel};

#[derive(Parser)]
#[command(name = "sumo_viz")]
#[command(about = "Ingestion pipeline for live traffic simulation telemetry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    /// Classify by vehicle count per edge
    Count,
    /// Classify by average speed over free flow
    Ratio,
}

impl From<PolicyArg> for Policy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::Count => Policy::Count,
            PolicyArg::Ratio => Policy::Ratio,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a network document from a file or URL and report its contents
    Parse {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        source: String,

        /// Write the parsed model as JSON to this path
        #[arg(long)]
        json: Option<String>,
    },
    /// Follow the live telemetry stream and classify congestion
    Watch {
        /// Simulation bridge address, host:port
        #[arg(short, long, default_value = "127.0.0.1:8814")]
        addr: String,

        /// Network document used for classification until live geometry arrives
        #[arg(short, long)]
        net: Option<String>,

        /// Classification policy
        #[arg(long, value_enum, default_value_t = PolicyArg::Count)]
        policy: PolicyArg,

        /// CSV file to append congestion summaries to
        #[arg(short, long, default_value = "congestion.csv")]
        output: String,

        /// Seconds to wait between reconnect attempts
        #[arg(long, default_value_t = 5)]
        reconnect_secs: u64,
    },
    /// Follow the emergency vehicle sub-feed
    Emergency {
        /// Simulation bridge address, host:port
        #[arg(short, long, default_value = "127.0.0.1:8814")]
        addr: String,

        /// Seed vehicles and routes from this snapshot endpoint before streaming
        #[arg(long)]
        snapshot_url: Option<String>,

        /// Seconds to wait between reconnect attempts
        #[arg(long, default_value_t = 5)]
        reconnect_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/sumo_viz.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("sumo_viz.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse { source, json } => run_parse(&source, json.as_deref()).await,
        Commands::Watch {
            addr,
            net,
            policy,
            output,
            reconnect_secs,
        } => {
            run_watch(
                &addr,
                net.as_deref(),
                policy.into(),
                &output,
                Duration::from_secs(reconnect_secs),
            )
            .await
        }
        Commands::Emergency {
            addr,
            snapshot_url,
            reconnect_secs,
        } => run_emergency(&addr, snapshot_url, Duration::from_secs(reconnect_secs)).await,
    }
}

/// Loads the document from a local path or fetches it over HTTP with the
/// cache-defeating retry policy.
#[tracing::instrument(fields(source = %source))]
async fn load_document(source: &str) -> Result<String> {
    let text = if source.starts_with("http") {
        let client = BasicClient::new();
        fetch_document(&client, source).await?
    } else {
        std::fs::read_to_string(source)?
    };
    Ok(text)
}

async fn load_network(source: &str) -> Result<NetworkModel> {
    let text = load_document(source).await.inspect_err(|err| {
        error!(error = %err, "network document could not be retrieved");
    })?;

    let parser = NetworkDocumentParser::new();
    let model = parser.parse_offloaded(text).await.inspect_err(|err| {
        error!(error = %err, "network document could not be parsed");
    })?;
    Ok(model)
}

async fn run_parse(source: &str, json_out: Option<&str>) -> Result<()> {
    let model = load_network(source).await?;

    let edge_set = edges::aggregate(&model.lanes);
    let internals = edges::internal_geometries(&model.lanes);
    let bounds = model.bounds.or_else(|| Bounds::from_lanes(&model.lanes));

    let edge_geometries: Vec<_> = edge_set.iter().map(|e| e.points.clone()).collect();
    let edge_batches = batch::batch(&edge_geometries, EDGE_BATCH_SIZE);
    let internal_batches = batch::batch(&internals, INTERNAL_BATCH_SIZE);

    info!(
        lanes = model.lanes.len(),
        edges = edge_set.len(),
        internal_connectors = internals.len(),
        signals = model.signals.len(),
        junctions = model.junctions.len(),
        junction_points = model.junction_points.len(),
        edge_batches = edge_batches.len(),
        internal_batches = internal_batches.len(),
        has_bounds = bounds.is_some(),
        "network document parsed"
    );

    if let Some(path) = json_out {
        std::fs::write(path, serde_json::to_string_pretty(&model)?)?;
        info!(path, "parsed model written");
    }

    Ok(())
}

async fn run_watch(
    addr: &str,
    net: Option<&str>,
    policy: Policy,
    output: &str,
    reconnect: Duration,
) -> Result<()> {
    let mut channel = TelemetryChannel::new(policy);
    let mut cache: Option<NetworkCache> = None;
    let mut last_generation = 0u64;

    loop {
        // Refresh the static model only when the cache has expired; live
        // geometry supersedes it anyway once the stream delivers some.
        if let Some(source) = net {
            if cache.as_ref().and_then(|c| c.get(Utc::now())).is_none() {
                match load_network(source).await {
                    Ok(model) => {
                        info!(lanes = model.lanes.len(), "static network loaded");
                        channel.set_static_network(&model);
                        cache = Some(NetworkCache::store(
                            model,
                            chrono::Duration::minutes(30),
                            Utc::now(),
                        ));
                    }
                    Err(err) => {
                        warn!(error = %err, "static network reload failed, keeping last model");
                    }
                }
            }
        }

        match TcpTransport::connect(addr).await {
            Ok(transport) => {
                if let Err(err) = channel.connect(Box::new(transport)).await {
                    warn!(error = %err, "subscribe failed");
                } else {
                    stream_frames(&mut channel, output, &mut last_generation).await;
                }
            }
            Err(err) => warn!(error = %err, "connect failed"),
        }

        // Last-known lanes, vehicles, and signals stay queryable while the
        // transport is down.
        info!(
            delay_secs = reconnect.as_secs(),
            vehicles = channel.vehicles().len(),
            "reconnecting"
        );
        tokio::time::sleep(reconnect).await;
    }
}

async fn stream_frames(channel: &mut TelemetryChannel, output: &str, last_generation: &mut u64) {
    loop {
        match channel.poll().await {
            Ok(true) => {
                if channel.snapshot_generation() == *last_generation {
                    continue;
                }
                *last_generation = channel.snapshot_generation();

                if let Some(snapshot) = channel.congestion() {
                    let record = CongestionRecord::from_snapshot(
                        snapshot,
                        channel.vehicles().len(),
                        channel.last_step(),
                    );
                    if let Err(err) = append_record(output, &record) {
                        error!(error = %err, "failed to append congestion record");
                    }
                    info!(
                        edges = snapshot.len(),
                        vehicles = channel.vehicles().len(),
                        step = channel.last_step(),
                        "congestion recomputed"
                    );
                }
            }
            Ok(false) => {
                info!("stream closed by peer");
                return;
            }
            Err(err) => {
                warn!(error = %err, "stream failed");
                return;
            }
        }
    }
}

async fn run_emergency(
    addr: &str,
    snapshot_url: Option<String>,
    reconnect: Duration,
) -> Result<()> {
    let mut client = EmergencyFeedClient::new();
    if let Some(url) = snapshot_url {
        client = client.with_snapshot_url(url);
    }

    let http = BasicClient::new();
    if let Err(err) = client.bootstrap(&http).await {
        // The stream is the source of truth; an empty start is acceptable.
        warn!(error = %err, "snapshot bootstrap failed, starting from the stream alone");
    }

    loop {
        match TcpTransport::connect(addr).await {
            Ok(transport) => {
                if let Err(err) = client.connect(Box::new(transport)).await {
                    warn!(error = %err, "subscribe failed");
                } else {
                    match client.run().await {
                        Ok(()) => info!("emergency stream closed by peer"),
                        Err(err) => warn!(error = %err, "emergency stream failed"),
                    }
                }
            }
            Err(err) => warn!(error = %err, "connect failed"),
        }

        info!(
            delay_secs = reconnect.as_secs(),
            vehicles = client.vehicles().len(),
            routes = client.routes().len(),
            "reconnecting with caches retained"
        );
        tokio::time::sleep(reconnect).await;
    }
}
