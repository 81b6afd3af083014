use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::runtime::Handle;
use tokio::time::{interval, Duration, Instant};

use geotrail_rs::health_monitor::health_monitor_task;
use geotrail_rs::sensors::{SimulatedLocationFeed, SyntheticCamera};
use geotrail_rs::{
    Collaborators, DirectoryRemote, HttpRemote, JpegCodec, LocalPhotoStore, LocationFeed,
    LocationSource, RemoteStore, Session, SessionConfig,
};

#[derive(Parser, Debug)]
#[command(name = "geotrail")]
#[command(about = "Geotagged photo capture session with background upload", long_about = None)]
struct Args {
    /// Capture trigger (time, distance)
    #[arg(long, default_value = "time")]
    mode: String,

    /// Milliseconds between captures (time) or metres travelled (distance)
    #[arg(long, default_value = "5000")]
    interval: f64,

    /// Delay before the first capture in time mode (ms)
    #[arg(long, default_value = "0")]
    initial_delay: u64,

    /// Linear scale applied to uploaded copies, in (0, 1]
    #[arg(long, default_value = "1.0")]
    upload_scale: f64,

    /// Root for session directories
    #[arg(long, default_value = "geotrail_sessions")]
    output_dir: PathBuf,

    /// Upload by copying into this directory
    #[arg(long, conflicts_with = "remote_url")]
    remote_dir: Option<PathBuf>,

    /// Upload with HTTP PUT under this base URL
    #[arg(long)]
    remote_url: Option<String>,

    /// Bearer token for --remote-url
    #[arg(long, requires = "remote_url")]
    token: Option<String>,

    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(long, default_value = "0")]
    duration: u64,

    /// Session config JSON; mode, interval, scale and root come from the file
    #[arg(long)]
    config: Option<PathBuf>,

    /// EXIF make
    #[arg(long)]
    make: Option<String>,

    /// EXIF model
    #[arg(long)]
    model: Option<String>,

    /// Read fixes from termux-location when available
    #[arg(long)]
    termux: bool,
}

fn session_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            let config = match args.mode.as_str() {
                "time" => {
                    if args.interval < 1.0 {
                        bail!("--interval must be at least 1 ms in time mode");
                    }
                    SessionConfig::time(
                        args.interval as u64,
                        args.initial_delay,
                        args.output_dir.clone(),
                    )
                }
                "distance" => SessionConfig::distance(args.interval, args.output_dir.clone()),
                other => bail!("unknown mode '{}' (expected time or distance)", other),
            };
            config.with_upload_scale(args.upload_scale)
        }
    };

    if let Some(make) = &args.make {
        config.device.make = make.clone();
    }
    if let Some(model) = &args.model {
        config.device.model = model.clone();
    }
    config.validate()?;
    Ok(config)
}

fn remote(args: &Args, config: &SessionConfig, runtime: Handle) -> Result<Arc<dyn RemoteStore>> {
    if let Some(url) = &args.remote_url {
        return Ok(Arc::new(HttpRemote::new(url, args.token.clone(), runtime)?));
    }
    let dir = args
        .remote_dir
        .clone()
        .unwrap_or_else(|| config.storage_root.join("outbox"));
    Ok(Arc::new(DirectoryRemote::new(dir)))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = session_config(&args)?;
    let runtime = Handle::current();

    println!("[{}] Geotrail Starting", ts_now());
    println!("  Mode: {:?}", config.mode);
    println!("  Upload scale: {}", config.upload_scale);
    println!("  Storage root: {}", config.storage_root.display());
    println!("  Duration: {} seconds (0=until Ctrl-C)", args.duration);

    std::fs::create_dir_all(&config.storage_root)
        .with_context(|| format!("creating {}", config.storage_root.display()))?;

    // San Francisco; only used when no real provider answers
    let origin = (37.7749, -122.4194);
    let feeds: Vec<Arc<dyn LocationFeed>> = LocationSource::ALL
        .iter()
        .map(|&source| {
            Arc::new(
                SimulatedLocationFeed::new(source, runtime.clone(), origin).with_termux(args.termux),
            ) as Arc<dyn LocationFeed>
        })
        .collect();

    let session = Arc::new(Session::new(Collaborators {
        trigger: Arc::new(SyntheticCamera::new(1600, 1200, runtime.clone())),
        feeds,
        store: Arc::new(LocalPhotoStore::new()),
        codec: Arc::new(JpegCodec::default()),
        remote: remote(&args, &config, runtime.clone())?,
    }));

    let status_path = config.storage_root.join("live_status.json");
    session.start(config)?;
    if let Some(dir) = session.session_dir() {
        println!("[{}] Session directory: {}", ts_now(), dir.display());
    }

    let _health_handle = tokio::spawn(health_monitor_task(Arc::clone(session.health())));

    let started = Instant::now();
    let mut status_tick = interval(Duration::from_secs(2));
    let mut last_reported = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("[{}] Interrupted, stopping...", ts_now());
                break;
            }
            _ = status_tick.tick() => {
                let status = session.live_status();
                if let Err(e) = status.save(&status_path) {
                    log::warn!("[main] could not write {}: {}", status_path.display(), e);
                }
                if status.last_saved != last_reported {
                    if let Some(name) = &status.last_saved {
                        println!("[{}] Saved {}", ts_now(), name);
                    }
                    last_reported = status.last_saved.clone();
                }
                if args.duration > 0 && started.elapsed() >= Duration::from_secs(args.duration) {
                    println!("[{}] Duration reached, stopping...", ts_now());
                    break;
                }
            }
        }
    }

    // stop() joins the worker threads; the HTTP uploader needs the runtime meanwhile
    let stopping = Arc::clone(&session);
    tokio::task::spawn_blocking(move || stopping.stop()).await?;

    let final_status = session.live_status();
    let _ = final_status.save(&status_path.with_file_name("live_status_final.json"));

    println!("\n=== Final Stats ===");
    println!("Captures fired: {}", final_status.captures_fired);
    println!("Photos written: {}", final_status.photos_written);
    println!("Dropped (queue full): {}", final_status.captures_evicted);
    println!(
        "Uploads: {} ok, {} failed",
        final_status.uploads_succeeded, final_status.uploads_failed
    );
    println!("{}", session.health().format_status());

    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
