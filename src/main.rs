use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ircam::camera::{JpegEncoder, V4l2Camera};
use ircam::config::{AppConfig, CONFIG_FILE};
use ircam::controls::{ControlStore, CONTROLS_FILE};
use ircam::gpio::{
    open_ir_cut_line, IrCutFilter, IrCutLine, IrFilterState, LineLevel, UnavailableIrCutLine,
};
use ircam::power::SystemPower;
use ircam::session::CameraSessionManager;
use ircam::state::AppState;
use ircam::web;

/// How long shutdown waits for an active session to give up the camera
const CLEANUP_TIMEOUT: Duration = Duration::from_secs(2);

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// ircam command line arguments
#[derive(Parser, Debug)]
#[command(name = "ircam")]
#[command(version, about = "HTTP front end for a camera with a switchable IR-cut filter", long_about = None)]
struct CliArgs {
    /// Listen address (overrides config file)
    #[arg(short = 'a', long, value_name = "ADDRESS")]
    address: Option<String>,

    /// HTTP port (overrides config file)
    #[arg(short = 'p', long, value_name = "PORT")]
    http_port: Option<u16>,

    /// Data directory path, holds config.json and default.json (default: current directory)
    #[arg(short = 'd', long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// V4L2 capture device (overrides config file)
    #[arg(long, value_name = "DEVICE")]
    device: Option<String>,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting ircam v{}", env!("CARGO_PKG_VERSION"));

    let data_dir = args.data_dir.unwrap_or_else(get_data_dir);
    tracing::info!("Data directory: {}", data_dir.display());
    tokio::fs::create_dir_all(&data_dir)
        .await
        .with_context(|| format!("creating {}", data_dir.display()))?;

    let mut config = AppConfig::load(data_dir.join(CONFIG_FILE)).await?;
    if let Some(address) = args.address {
        config.web.bind_address = address;
    }
    if let Some(port) = args.http_port {
        config.web.http_port = port;
    }
    if let Some(device) = args.device {
        config.camera.device = device;
    }
    config.validate()?;

    let controls = ControlStore::load(data_dir.join(CONTROLS_FILE)).await?;

    let camera = V4l2Camera::open(&config.camera.device, config.camera.buffer_count)
        .with_context(|| format!("opening camera {}", config.camera.device))?;
    let encoder = JpegEncoder::new(config.camera.jpeg_quality)?;

    let initial_level = LineLevel::for_state(IrFilterState::Engaged, config.ir_cut.active_level);
    let line: Box<dyn IrCutLine> = match open_ir_cut_line(&config.ir_cut, initial_level) {
        Ok(line) => line,
        Err(e) => {
            tracing::error!("IR-cut GPIO unavailable, captures will fail: {}", e);
            Box::new(UnavailableIrCutLine::new(e.to_string()))
        }
    };
    let ir_filter = IrCutFilter::new(line, config.ir_cut.active_level);

    let manager = Arc::new(CameraSessionManager::new(
        Box::new(camera),
        Box::new(encoder),
        ir_filter,
        Arc::new(controls),
        config.session.to_session_config(),
    ));

    if let Err(e) = manager.prepare().await {
        tracing::warn!("Camera warm-up failed, will retry on first request: {}", e);
    }

    let power = Arc::new(SystemPower::new(
        config.power.power_off_command.clone(),
        config.power.reboot_command.clone(),
    ));
    let state = AppState::new(manager, power);

    let app = web::create_router(state.clone());

    let ip: IpAddr = config
        .web
        .bind_address
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.web.bind_address))?;
    let addr = SocketAddr::new(ip, config.web.http_port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("Starting HTTP server on {}", listener.local_addr()?);

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown signal received");
    };

    let server = axum::serve(listener, app);

    tokio::select! {
        _ = shutdown_signal => {
            cleanup(&state).await;
        }
        result = async move { server.await } => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
            }
            cleanup(&state).await;
        }
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "ircam=error,tower_http=error",
        LogLevel::Warn => "ircam=warn,tower_http=warn",
        LogLevel::Info => "ircam=info,tower_http=info",
        LogLevel::Verbose => "ircam=debug,tower_http=info",
        LogLevel::Debug => "ircam=debug,tower_http=debug",
        LogLevel::Trace => "ircam=trace,tower_http=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    if let Err(err) = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
    {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Get the application data directory
fn get_data_dir() -> PathBuf {
    if let Ok(path) = std::env::var("IRCAM_DATA_DIR") {
        return PathBuf::from(path);
    }
    PathBuf::from(".")
}

/// Stop the camera and release the IR-cut line
async fn cleanup(state: &Arc<AppState>) {
    match tokio::time::timeout(CLEANUP_TIMEOUT, state.manager.shutdown()).await {
        Ok(Ok(())) => tracing::info!("Camera stopped"),
        Ok(Err(e)) => tracing::warn!("Failed to stop camera: {}", e),
        Err(_) => tracing::warn!(
            "Camera still busy ({}), exiting without cleanup",
            state.manager.state()
        ),
    }
}
