//! `run` command implementation.

use adapters::WorldClient;
use anyhow::{Context, Result};
use contracts::BridgeConfig;
use tracing::{error, info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::session::{BridgeSession, SessionOutcome};

/// Execute the `run` command
pub async fn run_bridge(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // CLI overrides are validated again
    args.apply_overrides(&mut config);
    config_loader::ConfigLoader::validate(&config).context("Invalid command-line override")?;
    check_network_file(&config)?;

    info!(
        world = %format!("{}:{}", config.world.host, config.world.port),
        listen = %format!("{}:{}", config.link.listen_host, config.link.listen_port),
        network = ?config.traffic.network_file,
        step_length = config.sync.step_length,
        control_devices = ?config.sync.control_devices,
        sync_color = config.sync.sync_vehicle_color,
        sync_lights = config.sync.sync_vehicle_lights,
        "Configuration loaded"
    );

    if args.dry_run {
        let catalog = config_loader::CatalogLoader::load_from_path(&config.catalog.vehicle_types)
            .context("Failed to load vehicle-class table")?;
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config, catalog.len());
        return Ok(());
    }

    let metrics_port = (args.metrics_port != 0).then_some(args.metrics_port);
    let outcome = if args.offline {
        warn!("Offline mode - world engine simulated in memory");
        let session = BridgeSession::start_offline(&config, metrics_port)
            .await
            .context("Failed to start co-simulation")?;
        serve(session).await?
    } else {
        serve_engine(&config, metrics_port).await?
    };
    outcome.print_summary();

    if let Some(reason) = outcome.fatal {
        anyhow::bail!("Co-simulation stopped: {}", reason);
    }

    info!("cosim-bridge finished");
    Ok(())
}

/// 交通网络文件由交通端加载，这里只确认它存在
fn check_network_file(config: &BridgeConfig) -> std::result::Result<(), CliError> {
    match config.traffic.network_file {
        Some(ref path) if !path.exists() => {
            Err(CliError::config_not_found(path.display().to_string()))
        }
        _ => Ok(()),
    }
}

#[cfg(feature = "real-carla")]
async fn serve_engine(
    config: &BridgeConfig,
    metrics_port: Option<u16>,
) -> Result<SessionOutcome> {
    let session = BridgeSession::start_engine(config, metrics_port)
        .await
        .context("Failed to start co-simulation")?;
    serve(session).await
}

#[cfg(not(feature = "real-carla"))]
async fn serve_engine(
    _config: &BridgeConfig,
    _metrics_port: Option<u16>,
) -> Result<SessionOutcome> {
    Err(CliError::NoWorldEngine.into())
}

async fn serve<C: WorldClient + 'static>(session: BridgeSession<C>) -> Result<SessionOutcome> {
    info!(addr = %session.local_addr()?, "Step link ready");
    session
        .run(setup_shutdown_signal())
        .await
        .context("Co-simulation failed")
}

/// Ctrl+C and SIGTERM
async fn setup_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &BridgeConfig, catalog_size: usize) {
    println!("\n=== Configuration Summary ===\n");
    println!("World:");
    println!("  Map: {}", config.world.map);
    println!("  Engine: {}:{}", config.world.host, config.world.port);

    println!("\nTraffic:");
    println!(
        "  Net offset: ({}, {})",
        config.traffic.net_offset.x, config.traffic.net_offset.y
    );
    match config.traffic.network_file {
        Some(ref path) => println!("  Network: {}", path.display()),
        None => println!("  Network: (peer default)"),
    }

    println!("\nStep link:");
    println!(
        "  Listen: {}:{} ({:?}, {} workers)",
        config.link.listen_host, config.link.listen_port, config.link.format, config.link.max_workers
    );

    println!("\nSync Settings:");
    println!("  Step length: {}s", config.sync.step_length);
    println!("  Control devices: {:?}", config.sync.control_devices);
    println!("  Vehicle color: {}", config.sync.sync_vehicle_color);
    println!("  Vehicle lights: {}", config.sync.sync_vehicle_lights);

    println!("\nCatalog:");
    println!(
        "  Vehicle types: {} ({} classes)",
        config.catalog.vehicle_types.display(),
        catalog_size
    );
    println!(
        "  Landmark mapping: {}",
        config.catalog.landmark_mapping.display()
    );

    println!();
}
