use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};

use kestrel_capture::camera::Camera;
use kestrel_capture::scheduler::run_capture_loop;
use kestrel_capture::store::CaptureStore;
use kestrel_capture::upload::run_upload_loop;
use kestrel_capture::{doctor as capture_doctor, CaptureConfig};
use kestrel_fc::arbiter::CommandArbiter;
use kestrel_fc::link::VehicleLink;
use kestrel_fc::FcConfig;
use kestrel_mission::controller::{MissionController, MissionEnd};
use kestrel_mission::{doctor as mission_doctor, waypoints, MissionConfig};
use kestrel_uplink::reporter::{run_heartbeat_loop, run_telemetry_loop};
use kestrel_uplink::{doctor as uplink_doctor, Uplink, UplinkConfig};

#[derive(Debug, Parser)]
#[command(name = "kestrel", version, about = "Kestrel - onboard mission-control core")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Preflight checks against the config, no mission launched.
    Doctor,
    /// Fly the configured mission.
    Run,
}

#[derive(Debug, serde::Deserialize)]
struct Config {
    uplink: UplinkConfig,
    fc: FcConfig,
    mission: MissionConfig,
    capture: CaptureConfig,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run => run(&cfg).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");
    uplink_doctor::check_uplink(&cfg.uplink)?;
    mission_doctor::check_mission(&cfg.mission)?;
    capture_doctor::check_capture(&cfg.capture)?;
    anyhow::ensure!(!cfg.fc.serial_dev.is_empty(), "fc.serial_dev missing");
    anyhow::ensure!(cfg.fc.baud > 0, "fc.baud invalid");
    info!("doctor: OK");
    Ok(())
}

enum Exit {
    Mission(Result<MissionEnd>),
    LinkLost(anyhow::Error),
    Interrupted,
}

async fn run(cfg: &Config) -> Result<()> {
    info!("run: starting");

    // Backend auth first; an unreachable backend is fatal after bounded
    // retries.
    let mut uplink = Uplink::new(&cfg.uplink)?;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match uplink.authenticate().await {
            Ok(()) => break,
            Err(e) if attempt < cfg.uplink.login_attempts => {
                warn!("backend login attempt {} failed: {:#}", attempt, e);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
            Err(e) => return Err(e.context("backend unreachable, aborting")),
        }
    }
    let uplink = Arc::new(uplink);

    info!("connecting to flight controller on {}", cfg.fc.serial_dev);
    let link = Arc::new(VehicleLink::open(&cfg.fc).context("connect flight controller")?);

    // An empty plan never launches.
    let waypoints =
        waypoints::load(&cfg.mission.mission_file).context("load mission waypoints")?;
    info!("loaded {} waypoints", waypoints.len());

    // Arbiter, fed by the link's inbound command stream via the blocking
    // reader. A dead link is reported back here and is fatal.
    let arbiter = Arc::new(CommandArbiter::new());
    let stop_reader = Arc::new(AtomicBool::new(false));
    let (fatal_tx, mut fatal_rx) = mpsc::channel::<anyhow::Error>(1);
    {
        let link = link.clone();
        let arbiter = arbiter.clone();
        let stop = stop_reader.clone();
        std::thread::spawn(move || {
            if let Err(e) = link.pump(&arbiter, &stop) {
                let _ = fatal_tx.blocking_send(e);
            }
        });
    }

    // Background workers. Their failure never aborts the mission path.
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let store = CaptureStore::new(&cfg.capture.dir);
    let camera = Camera::new(cfg.capture.camera.clone()).context("camera config")?;
    let mut workers = Vec::new();
    workers.push(tokio::spawn(run_telemetry_loop(
        link.clone(),
        uplink.clone(),
        Duration::from_secs(cfg.uplink.telemetry_secs),
        shutdown_tx.subscribe(),
    )));
    workers.push(tokio::spawn(run_heartbeat_loop(
        uplink.clone(),
        Duration::from_secs(cfg.uplink.heartbeat_secs),
        shutdown_tx.subscribe(),
    )));
    workers.push(tokio::spawn(run_capture_loop(
        link.clone(),
        arbiter.clone(),
        store.clone(),
        camera,
        Duration::from_secs(cfg.capture.interval_secs),
        shutdown_tx.subscribe(),
    )));
    workers.push(tokio::spawn(run_upload_loop(
        store,
        uplink.clone(),
        Duration::from_secs(cfg.capture.sweep_secs),
        shutdown_tx.subscribe(),
    )));

    // Mission on the main path.
    let controller = MissionController::new(
        link.clone(),
        arbiter.clone(),
        cfg.mission.clone(),
        waypoints,
    );
    let exit = tokio::select! {
        end = controller.run() => Exit::Mission(end),
        Some(e) = fatal_rx.recv() => Exit::LinkLost(e),
        _ = tokio::signal::ctrl_c() => Exit::Interrupted,
    };

    // Teardown: stop the workers, let in-flight writes finish, release
    // the link.
    let _ = shutdown_tx.send(());
    stop_reader.store(true, Ordering::Relaxed);
    for w in workers {
        if tokio::time::timeout(Duration::from_secs(5), w).await.is_err() {
            warn!("worker did not stop in time");
        }
    }
    drop(link);
    info!("flight controller link released");

    match exit {
        Exit::Mission(end) => {
            let end = end?;
            info!("mission ended: {:?}", end);
            Ok(())
        }
        Exit::LinkLost(e) => Err(e.context("flight controller link lost mid-mission")),
        Exit::Interrupted => {
            info!("mission interrupted by signal");
            Ok(())
        }
    }
}
