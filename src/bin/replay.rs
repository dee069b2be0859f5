use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Parser;
use flate2::read::GzDecoder;
use road_vibes::sensors::{SensorClock, SensorEvent};
use road_vibes::{MemoryStore, TrackerConfig, TrackingSession, TripWorker};
use serde::Deserialize;
use serde_json::json;

#[derive(Parser, Debug)]
struct Args {
    /// Path to ride_*.json[.gz] log
    #[arg(long, conflicts_with = "dir")]
    log: Option<PathBuf>,

    /// Directory of logs to batch replay (processes ride_*.json[.gz])
    #[arg(long)]
    dir: Option<PathBuf>,

    /// Privacy radius in metres
    #[arg(long, default_value = "50.0")]
    radius: f64,

    /// Tracker config JSON
    #[arg(long)]
    config: Option<PathBuf>,

    /// Include per-segment polylines in the output
    #[arg(long, default_value_t = false)]
    polylines: bool,
}

#[derive(Deserialize)]
struct RideLog {
    #[serde(default = "default_trip_id")]
    trip_id: u32,
    #[serde(default)]
    has_rotation_sensor: bool,
    /// Present when event timestamps are boot-clock nanoseconds
    #[serde(default)]
    boot_clock: Option<BootClock>,
    events: Vec<SensorEvent>,
}

#[derive(Deserialize)]
struct BootClock {
    wall_clock_ms: i64,
    elapsed_realtime_ms: i64,
}

fn default_trip_id() -> u32 {
    1
}

fn load_log(path: &Path) -> anyhow::Result<RideLog> {
    let file = File::open(path)?;
    if path.extension().map(|e| e == "gz").unwrap_or(false) {
        let gz = GzDecoder::new(file);
        let reader = BufReader::new(gz);
        Ok(serde_json::from_reader(reader)?)
    } else {
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

async fn run_once(path: &Path, args: &Args, config: &TrackerConfig) -> anyhow::Result<serde_json::Value> {
    let mut log = load_log(path)?;
    if let Some(boot) = log.boot_clock.as_ref() {
        let clock = SensorClock::new(boot.wall_clock_ms, boot.elapsed_realtime_ms);
        for event in log.events.iter_mut() {
            event.retime(|ns| clock.to_wall_ms(ns));
        }
    }
    log.events.sort_by_key(|e| e.timestamp());

    let worker = TripWorker::spawn(MemoryStore::new())?;
    let mut session = TrackingSession::new(log.trip_id, log.has_rotation_sensor, config, worker.handle());
    session.start()?;

    let mut peak_abs_z: f64 = 0.0;
    for event in &log.events {
        if let SensorEvent::Accel(raw) = event {
            if let Some(sample) = session.on_accel(raw)? {
                peak_abs_z = peak_abs_z.max(sample.z.abs());
            }
        } else {
            session.on_event(event)?;
        }
    }
    session.stop()?;
    let meta = session.metadata();

    let handle = worker.handle();
    let closed = handle.close_trip(log.trip_id, args.radius).await?;
    let summary = handle.summary(log.trip_id).await?;
    worker.shutdown()?;

    let mut result = json!({
        "log": path.display().to_string(),
        "trip_id": log.trip_id,
        "events": log.events.len(),
        "accel_samples": meta.accel_sample_count,
        "gps_samples": meta.gps_sample_count,
        "gps_rejected": meta.gps_rejected_count,
        "orientation_mode": meta.orientation_mode,
        "peak_abs_z": peak_abs_z,
        "segments": closed.segments.len(),
        "redaction": closed.redaction,
    });

    if let Some(summary) = summary {
        result["distance_km"] = json!(summary.distance_km);
        result["speed_kmh"] = json!(summary.speed_kmh);
        result["bumpiness"] = json!(summary.bumpiness);
        result["bump_score"] = json!(summary.bump_score());
        result["viewport"] = json!(summary.viewport);
        if args.polylines {
            result["polylines"] = json!(summary.polylines(config.polyline_max_rms));
        }
    }
    Ok(result)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let config = match args.config.as_ref() {
        Some(path) => TrackerConfig::load(path)?,
        None => TrackerConfig::default(),
    };
    let mut results = Vec::new();

    if let Some(dir) = args.dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("ride_") && (name.ends_with(".json") || name.ends_with(".json.gz"))) {
                continue;
            }
            match run_once(&path, &args, &config).await {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(log) = args.log.as_ref() {
        results.push(run_once(log, &args, &config).await?);
    } else {
        anyhow::bail!("Provide --log or --dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
