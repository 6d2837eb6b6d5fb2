//! LED Strip Agent
//!
//! Runs on the Pi next to the strip. Accepts celebration events over HTTP
//! and WebSocket, runs the matching animation on the strip, and keeps the
//! configured idle effect breathing in between.
//!
//! ## Architecture
//! - **Effect worker** (std::thread): owns all strip writes, consumes one
//!   command queue so events run strictly in arrival order
//! - **Idle thread** (std::thread): the background effect, stopped and
//!   joined before any foreground run starts
//! - **HTTP server** (tokio/axum): accepts API requests and relay frames,
//!   enqueues commands via channel
//!
//! ## Usage
//! ```sh
//! sudo ./target/release/led-strip-agent --config /etc/led-agent/config.json --port 8080
//! ```

use clap::Parser;
use led_strip_agent::config::{Config, SharedPrefs};
use led_strip_agent::dispatcher::Dispatcher;
use led_strip_agent::scheduler::{EffectWorker, Scheduler, Timing, WorkerCommand};
use led_strip_agent::server::{self, AppState};
use led_strip_agent::strip::{MemoryStrip, SharedStrip};
use led_strip_agent::{StripConfig, floor_lsb_for, is_running, setup_signal_handler};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

/// LED Strip Agent
#[derive(Parser)]
#[command(name = "led-strip-agent")]
#[command(about = "Event-driven WS281x LED strip agent")]
#[command(version)]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Port to listen on
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Skip hardware init and drive an in-memory strip
    #[arg(long)]
    headless: bool,
}

#[cfg(feature = "hardware")]
fn open_strip(config: StripConfig) -> SharedStrip {
    use led_strip_agent::strip::Ws281xStrip;
    match Ws281xStrip::open(config) {
        Ok(strip) => Arc::new(Mutex::new(strip)),
        Err(e) => {
            tracing::warn!("hardware init failed ({e}); running headless");
            Arc::new(Mutex::new(MemoryStrip::new(config.count)))
        }
    }
}

#[cfg(not(feature = "hardware"))]
fn open_strip(config: StripConfig) -> SharedStrip {
    tracing::info!("built without hardware support; running headless");
    Arc::new(Mutex::new(MemoryStrip::new(config.count)))
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    // Compact, no ANSI — journald is the usual consumer.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .with_ansi(false)
        .compact()
        .init();

    let args = Args::parse();

    let config = match Config::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("failed to load {}: {e}", args.config.display());
            std::process::exit(1);
        }
    };

    tracing::info!("LED Strip Agent v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Strip: {} LEDs on GPIO {} (brightness {})",
        config.led_count,
        config.led_pin,
        config.brightness
    );
    tracing::info!("Config: {}", args.config.display());
    tracing::info!("Port: {}", args.port);

    let strip = if args.headless {
        tracing::info!("--headless: driving an in-memory strip");
        Arc::new(Mutex::new(MemoryStrip::new(config.led_count))) as SharedStrip
    } else {
        open_strip(config.strip_config())
    };
    let floor_lsb = floor_lsb_for(config.brightness);
    let scheduler = Arc::new(Scheduler::new(strip, Timing::default(), floor_lsb));

    let prefs: SharedPrefs = Arc::new(RwLock::new(config.prefs()));

    // The worker re-reads this on every idle restart, so relay pushes take
    // effect without restarting the process.
    let worker_prefs = prefs.clone();
    let worker = EffectWorker::spawn(scheduler.clone(), move || {
        worker_prefs.read().unwrap().idle_spec()
    });
    let commands = worker.sender();

    // Bring up the configured idle effect, if any.
    if commands.send(WorkerCommand::RefreshIdle).is_err() {
        tracing::error!("effect worker failed to start");
        std::process::exit(1);
    }

    // On Ctrl+C: stop the idle thread, leave the strip dark, exit.
    let running = setup_signal_handler();
    let shutdown_commands = commands.clone();
    std::thread::spawn(move || {
        while is_running(&running) {
            std::thread::sleep(Duration::from_millis(100));
        }
        tracing::info!("shutting down");
        // The clear queues behind any in-flight foreground run; wait for
        // the worker's ack so the strip is actually dark before exiting.
        let (ack_tx, ack_rx) = std::sync::mpsc::channel();
        if shutdown_commands
            .send(WorkerCommand::Clear(Some(ack_tx)))
            .is_ok()
        {
            let _ = ack_rx.recv();
        }
        std::process::exit(0);
    });

    let dispatcher = Arc::new(Dispatcher::new(commands.clone(), prefs.clone()));

    let app_state = AppState {
        commands,
        dispatcher,
        scheduler,
        prefs,
        config: Arc::new(Mutex::new(config)),
        config_path: args.config,
    };

    let app = server::create_router(app_state);

    let addr = format!("0.0.0.0:{}", args.port);
    tracing::info!("Listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", args.port);
    tracing::info!("Relay WebSocket: ws://localhost:{}/api/v1/events", args.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app).await.expect("Server error");
}
