use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::Parser;
use flate2::read::GzDecoder;
use serde::Deserialize;
use serde_json::json;

use geotrail_rs::geodesy::distance_m;
use geotrail_rs::location_fusion::LocationFusion;
use geotrail_rs::scheduler::{ScheduleMode, ScheduleState};
use geotrail_rs::Fix;

/// Replay a recorded fix track through location fusion and distance scheduling
#[derive(Parser, Debug)]
struct Args {
    /// Path to a track_*.json[.gz] file
    #[arg(long, conflicts_with = "track_dir")]
    track: Option<PathBuf>,

    /// Directory of tracks to batch replay (processes track_*.json[.gz])
    #[arg(long)]
    track_dir: Option<PathBuf>,

    /// Metres travelled between captures
    #[arg(long, default_value = "100.0")]
    interval: f64,
}

#[derive(Deserialize)]
struct TrackFile {
    fixes: Vec<Fix>,
}

fn load_track(path: &Path) -> anyhow::Result<TrackFile> {
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

fn run_once(path: &Path, args: &Args) -> anyhow::Result<serde_json::Value> {
    let track = load_track(path)?;
    let fusion = LocationFusion::new();
    let mut schedule = ScheduleState::new(ScheduleMode::Distance {
        interval_m: args.interval,
    });
    schedule.start();

    let mut accepted = 0u64;
    let mut captures = Vec::new();
    let mut path_length_m = 0.0;
    let mut previous_best: Option<Fix> = None;

    for fix in track.fixes {
        if !fusion.update(fix) {
            continue;
        }
        accepted += 1;

        let Some(best) = fusion.best_fix() else {
            continue;
        };
        if let Some(prev) = &previous_best {
            path_length_m += distance_m(prev, &best);
        }
        if schedule.on_fix(&best) {
            println!(
                "[CAPTURE] #{} {:.6},{:.6} ({}, ±{:.0} m)",
                captures.len() + 1,
                best.latitude,
                best.longitude,
                best.source,
                best.accuracy
            );
            captures.push(json!({
                "timestamp_ms": best.timestamp_ms,
                "latitude": best.latitude,
                "longitude": best.longitude,
                "source": best.source,
            }));
        }
        previous_best = Some(best);
    }

    Ok(json!({
        "track": path.display().to_string(),
        "interval_m": args.interval,
        "fixes_accepted": accepted,
        "best_fix_path_m": path_length_m,
        "captures": captures.len(),
        "capture_points": captures,
    }))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if !(args.interval.is_finite() && args.interval > 0.0) {
        anyhow::bail!("--interval must be a positive number of metres");
    }
    let mut results = Vec::new();

    if let Some(dir) = args.track_dir.as_ref() {
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
            if !(name.starts_with("track_") && (name.ends_with(".json") || name.ends_with(".json.gz"))) {
                continue;
            }
            match run_once(&path, &args) {
                Ok(res) => results.push(res),
                Err(e) => eprintln!("Failed {}: {}", path.display(), e),
            }
        }
    } else if let Some(track) = args.track.as_ref() {
        results.push(run_once(track, &args)?);
    } else {
        anyhow::bail!("Provide --track or --track-dir");
    }

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}
