use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use serde_json::json;
use tokio::sync::mpsc;

use road_vibes::sensors::{self, SensorEvent, SensorRequest, SimulatedRide};
use road_vibes::{MemoryStore, TrackerConfig, TrackingSession, TripWorker};

#[derive(Parser, Debug)]
#[command(name = "road_vibes")]
#[command(about = "Simulate a ride end-to-end and print the trip summary", long_about = None)]
struct Args {
    /// Ride duration in seconds
    #[arg(value_name = "SECONDS", default_value = "300")]
    duration: f64,

    /// Use the fused rotation-vector sensor instead of the gravity low-pass
    #[arg(long)]
    rotation_sensor: bool,

    /// Ride speed (m/s)
    #[arg(long, default_value = "5.0")]
    speed: f64,

    /// Road excitation amplitude (m/s²)
    #[arg(long, default_value = "1.2")]
    roughness: f64,

    /// Privacy radius in metres (overrides config)
    #[arg(long)]
    radius: Option<f64>,

    /// Replay speed-up factor; omit to run as fast as possible
    #[arg(long)]
    pace: Option<f64>,

    /// Tracker config JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write the summary JSON here
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match args.config.as_ref() {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };
    let radius = args.radius.unwrap_or(config.privacy_radius_m);

    let ride = SimulatedRide {
        duration_s: args.duration,
        speed_mps: args.speed,
        bump_amplitude: args.roughness,
        with_rotation_vector: args.rotation_sensor,
        fix_interval_ms: config.min_fix_interval_ms,
        ..SimulatedRide::default()
    };

    let worker = TripWorker::spawn(MemoryStore::new())?;
    let trip_id = 1;
    let mut session = TrackingSession::new(trip_id, args.rotation_sensor, &config, worker.handle());
    session.start()?;

    let (tx, mut rx) = mpsc::channel::<SensorEvent>(500);
    let _source = tokio::spawn(sensors::event_loop(ride.events(), tx, args.pace));

    while let Some(event) = rx.recv().await {
        session.on_event(&event)?;
    }

    session.stop()?;
    let meta = session.metadata();
    let handle = worker.handle();
    let closed = handle.close_trip(trip_id, radius).await?;

    let output = match handle.summary(trip_id).await? {
        Some(summary) => json!({
            "sensor_request": SensorRequest::from_config(&config),
            "session": meta,
            "redaction": closed.redaction,
            "summary": summary,
            "bump_score": summary.bump_score(),
            "polylines": summary.polylines(config.polyline_max_rms),
        }),
        None => json!({
            "session": meta,
            "redaction": closed.redaction,
            "summary": null,
        }),
    };

    let text = serde_json::to_string_pretty(&output)?;
    println!("{}", text);
    if let Some(path) = args.output.as_ref() {
        std::fs::write(path, &text)?;
        log::info!("summary written to {}", path.display());
    }

    worker.shutdown()?;
    Ok(())
}
