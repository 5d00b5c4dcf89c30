//! # linetrack CLI
//!
//! Command-line interface for the linetrack library. Fetches a transit
//! relation into route artifacts, answers one-shot locate queries, and
//! tracks a live vehicle over WebSocket.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use linetrack::{
    artifacts, assemble, parse_relation, Fix, FixLoop, FixLoopConfig, FixStream, LoopState,
    ManeuverPlan, RelationSource, Tracker, TurnParams,
};

mod cli;

/// Default vehicle feed endpoint
const DEFAULT_FEED_URL: &str = "ws://172.16.20.30:9092/ws";

/// Pause between reconnect attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Parser)]
#[command(name = "linetrack")]
#[command(about = "Transit route linearization and live vehicle tracking")]
#[command(long_about = "Builds a parameterized route polyline from an OpenStreetMap
transit relation and tracks vehicles against it:
  linetrack fetch 15023534                   # build route artifacts
  linetrack locate ways.json stops.json 52.23 21.01
  linetrack track ways.json stops.json 1234  # follow vehicle 1234 live")]
#[command(version = env!("LINETRACK_VERSION"))]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download a relation and write the route artifacts
    Fetch {
        /// OSM relation id
        relation_id: String,

        /// Base directory for the artifact tree
        #[arg(long, default_value = "osm_relations")]
        output_dir: PathBuf,
    },

    /// Project a single position onto a persisted route
    Locate {
        /// Route geometry: ways_ordered.json or route.geojson
        route_file: PathBuf,

        /// Stops: stops.json, route.geojson or summary.txt
        stops_file: PathBuf,

        /// Latitude of the query position
        lat: f64,

        /// Longitude of the query position
        lon: f64,
    },

    /// Track a vehicle live against a persisted route
    Track {
        /// Route geometry: ways_ordered.json or route.geojson
        route_file: PathBuf,

        /// Stops: stops.json, route.geojson or summary.txt
        stops_file: PathBuf,

        /// Vehicle number to follow (the feed's veh_number field)
        vehicle_id: String,

        /// WebSocket URL of the vehicle feed
        #[arg(long, default_value = DEFAULT_FEED_URL)]
        websocket: String,

        /// Update interval in seconds for unchanged positions
        #[arg(long, default_value_t = 1.0)]
        interval: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging to stderr
    let mut builder = env_logger::Builder::from_default_env();
    builder.target(env_logger::Target::Stderr);
    if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    match cli.command {
        Command::Fetch {
            relation_id,
            output_dir,
        } => fetch(&relation_id, &output_dir).await,
        Command::Locate {
            route_file,
            stops_file,
            lat,
            lon,
        } => locate(&route_file, &stops_file, lat, lon),
        Command::Track {
            route_file,
            stops_file,
            vehicle_id,
            websocket,
            interval,
        } => track(&route_file, &stops_file, &vehicle_id, &websocket, interval).await,
    }
}

/// Pipeline (a): relation -> stitched route -> artifacts on disk.
async fn fetch(relation_id: &str, output_dir: &Path) -> anyhow::Result<()> {
    let source = RelationSource::new();

    let progress = cli::ProgressManager::new(0, &format!("🌐 Fetching relation {}", relation_id));
    let xml = source
        .fetch_with_progress(relation_id, {
            let pb = progress.pb.clone();
            Some(std::sync::Arc::new(move |downloaded, total| {
                if pb.length().unwrap_or(0) != total {
                    pb.set_length(total);
                }
                pb.set_position(downloaded);
            }))
        })
        .await
        .with_context(|| format!("fetching relation {}", relation_id))?;
    progress.pb.finish_and_clear();

    let parsed = parse_relation(&xml).context("parsing the relation document")?;
    if parsed.ways.is_empty() {
        anyhow::bail!(
            "relation {} has no way members with the empty role; nothing to stitch",
            relation_id
        );
    }
    eprintln!(
        "📦 {} ways, {} stops (line {} from {} to {})",
        parsed.ways.len(),
        parsed.stops.len(),
        parsed.meta.line_ref,
        parsed.meta.from,
        parsed.meta.to
    );

    let meta = parsed.meta.clone();
    let built = assemble(parsed.ways, parsed.stops).context("assembling the route")?;
    eprintln!(
        "🧵 Stitched {} segments ({} reversed, {} discontinuities), {:.2} m total",
        built.route.ways().len(),
        built.reversed_count,
        built.discontinuities,
        built.route.length()
    );

    let paths = artifacts::ArtifactPaths::layout(output_dir, &meta);
    std::fs::create_dir_all(&paths.dir)
        .with_context(|| format!("creating {}", paths.dir.display()))?;

    artifacts::write_relation_xml(&paths.xml(), &xml)?;
    artifacts::write_ways_ordered(&paths.ways_ordered(), built.route.ways())?;
    artifacts::write_stops(&paths.stops(), built.stops.stops())?;
    artifacts::write_geojson(&paths.geojson(), built.route.ways(), built.stops.stops())?;
    artifacts::write_summary(
        &paths.summary(),
        relation_id,
        built.route.ways(),
        built.stops.stops(),
        built.route.length(),
    )?;
    eprintln!("📁 Artifacts written to {}", paths.dir.display());

    let plan = ManeuverPlan::build(
        &built.route,
        &built.stops,
        &TurnParams::default(),
        built.route.length(),
    );
    println!("\nDirections:");
    for line in plan.directions() {
        println!("  {}", line);
    }

    Ok(())
}

fn load_route(
    route_file: &Path,
    stops_file: &Path,
) -> anyhow::Result<(linetrack::BuiltRoute, f64)> {
    let (built, reference_length) = linetrack::load_from_artifacts(route_file, stops_file)
        .with_context(|| {
            format!(
                "loading route from {} and {}",
                route_file.display(),
                stops_file.display()
            )
        })?;
    let total_length = reference_length.unwrap_or_else(|| built.route.length());
    Ok((built, total_length))
}

/// One-shot projection of a coordinate onto a persisted route.
fn locate(route_file: &Path, stops_file: &Path, lat: f64, lon: f64) -> anyhow::Result<()> {
    let (built, total_length) = load_route(route_file, stops_file)?;
    let plan = ManeuverPlan::build(
        &built.route,
        &built.stops,
        &TurnParams::default(),
        total_length,
    );

    let mut tracker = Tracker::new(&built.route, &built.stops, &plan);
    let state = tracker
        .update(Fix::at(lat, lon))
        .context("projecting the position")?;
    cli::display::print_locate_report(&state, total_length);
    Ok(())
}

/// Pipeline (b): live tracking with reconnects until Ctrl+C.
async fn track(
    route_file: &Path,
    stops_file: &Path,
    vehicle_id: &str,
    websocket: &str,
    interval: f64,
) -> anyhow::Result<()> {
    let (built, total_length) = load_route(route_file, stops_file)?;
    let plan = ManeuverPlan::build(
        &built.route,
        &built.stops,
        &TurnParams::default(),
        total_length,
    );

    eprintln!(
        "🚌 Tracking vehicle {} on a {:.2} m route ({} stops)",
        vehicle_id,
        total_length,
        built.stops.len()
    );
    eprintln!("📡 Feed: {} (update interval {:.1} s)", websocket, interval);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\n🛑 Stopping...");
            signal_cancel.cancel();
        }
    });

    let config = FixLoopConfig {
        vehicle_id: vehicle_id.to_string(),
        update_interval: Duration::from_secs_f64(interval.max(0.0)),
    };

    loop {
        let tracker = Tracker::new(&built.route, &built.stops, &plan);
        let mut fix_loop = FixLoop::new(tracker, config.clone());

        let mut stream = tokio::select! {
            _ = cancel.cancelled() => break,
            connected = FixStream::connect(websocket) => match connected {
                Ok(stream) => stream,
                Err(e) => {
                    log::warn!("connection failed: {}", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            },
        };

        let vehicle = vehicle_id.to_string();
        let outcome = fix_loop
            .run(&mut stream, &cancel, &mut |state| {
                cli::display::print_tracking_view(&vehicle, state, &plan);
            })
            .await;

        match outcome {
            Ok(LoopState::Stopped) => break,
            Ok(_) => {
                eprintln!("🔌 Feed lost, reconnecting...");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
            Err(e) => {
                log::warn!("fix loop failed: {}", e);
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }

    eprintln!("Tracking stopped.");
    Ok(())
}
