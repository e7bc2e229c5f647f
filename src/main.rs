//! Bhumi - occupancy grid synthesis daemon
//!
//! Listens for point cloud frames and reconfiguration events, synthesizes a
//! grid at the configured loop rate, and broadcasts it to TCP subscribers.
//!
//! # Usage
//!
//! ```bash
//! # With default config (./bhumi.toml if present)
//! cargo run --release
//!
//! # With custom config file
//! cargo run --release -- --config bhumi.toml
//!
//! # Replay a recorded frame, publish on a custom port
//! cargo run --release -- --replay scan.pcd --publish 0.0.0.0:7001
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::Parser;

use bhumi::io::load_pcd;
use bhumi::{
    FrameReceiver, GridSynthesizer, NodeConfig, Result, Scheduler, SharedState, TcpGridPublisher,
};

const DEFAULT_CONFIG_PATH: &str = "bhumi.toml";

/// Point cloud to occupancy grid daemon
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (default: ./bhumi.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// ASCII PCD file injected as the first frame
    #[arg(short, long)]
    replay: Option<String>,

    /// Inbound bind address for frames and reconfiguration
    #[arg(short, long)]
    listen: Option<String>,

    /// Outbound bind address for grid subscribers
    #[arg(short, long)]
    publish: Option<String>,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {} - {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    log::info!("bhumi starting");
    log::info!("  Source: {}", config.source.bind_address);
    log::info!("  Output: {}", config.output.bind_address);
    log::info!(
        "  Grid: frame={}, resolution={}m, deviation={:.4}rad, buffer={}, rate={}Hz",
        config.grid.frame_id,
        config.grid.cell_resolution,
        config.grid.deviation,
        config.grid.buffer,
        config.grid.loop_rate
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    }) {
        log::error!("Error setting Ctrl-C handler: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(config, Arc::clone(&running)) {
        log::error!("Daemon error: {}", e);
        std::process::exit(1);
    }

    log::info!("bhumi shutdown complete");
}

/// Resolve configuration: explicit file, then the default path, then
/// built-in defaults. CLI flags override the file. Fails on invalid values.
fn load_config(args: &Args) -> Result<NodeConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let config = NodeConfig::load(path)?;
            log::info!("Loaded config from {}", path.display());
            config
        }
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            let config = NodeConfig::load(Path::new(DEFAULT_CONFIG_PATH))?;
            log::info!("Loaded config from {}", DEFAULT_CONFIG_PATH);
            config
        }
        None => NodeConfig::default(),
    };

    if let Some(replay) = &args.replay {
        config.source.replay = Some(replay.clone());
    }
    if let Some(listen) = &args.listen {
        config.source.bind_address = listen.clone();
    }
    if let Some(publish) = &args.publish {
        config.output.bind_address = publish.clone();
    }

    config.grid.validate()?;
    Ok(config)
}

fn run(config: NodeConfig, running: Arc<AtomicBool>) -> Result<()> {
    let shared = SharedState::new(config.grid.clone());

    let receiver = FrameReceiver::spawn(
        &config.source.bind_address,
        shared.frame_sink(),
        shared.config_store(),
        Arc::clone(&running),
    )?;

    if let Some(path) = &config.source.replay {
        let frame = load_pcd(Path::new(path))?;
        shared.frame_sink().on_frame(frame);
    }

    let publisher = TcpGridPublisher::bind(&config.output.bind_address)?;
    let mut scheduler = Scheduler::new(Arc::clone(&shared), GridSynthesizer::default(), publisher);
    scheduler.run(&running);

    // Reached on normal shutdown only; make sure helper threads see it too
    running.store(false, Ordering::Relaxed);
    receiver.join();
    Ok(())
}
