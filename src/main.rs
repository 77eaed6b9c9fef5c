// src/main.rs
use clap::Parser;
use crossbeam_channel::unbounded;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::watch;
use wsminer_rs::{self, *};

/// Main entry point for the mining client
///
/// # Returns
/// - `Ok(())` on successful execution
/// - `Err(MinerError)` if any operation fails
///
/// # Flow
/// 1. Parses command line arguments
/// 2. Delegates to appropriate subcommand handler
/// 3. Propagates any errors upward
fn main() -> Result<(), MinerError> {
    let cli = cli::Commands::parse();

    match cli.action {
        cli::Action::Start(opts) => start_mining(opts),
        cli::Action::Algos => list_algos(),
        cli::Action::Config(opts) => generate_config(opts),
    }
}

/// Starts the mining session with given configuration options
///
/// # Arguments
/// * `opts` - Command line options for mining operation
///
/// # Operations
/// 1. Initializes logging
/// 2. Loads and validates configuration
/// 3. Sets up statistics reporting
/// 4. Runs the session until Ctrl-C or SIGTERM
fn start_mining(opts: cli::StartOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let mut config = config::load(&opts.config)?;
    // Apply CLI overrides
    if let Some(workers) = opts.workers {
        config.threads = Some(workers);
    }
    if let Some(algo) = opts.algorithm {
        config.algorithm = algo.to_string();
    }
    config.validate()?;

    let options = session::SessionOptions::from_config(&config)?;
    log::info!(
        "Mining {} for {} with {} workers via {}",
        options.algorithm,
        options.pool.user,
        options.workers,
        options.url
    );

    // Statistics reporting
    let (event_sender, event_receiver) = unbounded();
    let reporter = stats::StatsReporter::new(
        event_receiver,
        Duration::from_millis(config.stats_interval_ms),
    )
    .start_reporting();

    // Runtime setup
    let rt = Runtime::new()?;
    let result = rt.block_on(async {
        let engine: Arc<dyn Engine> = Arc::new(ProcessEngine::new(
            config.engine.command.clone(),
            config.engine.args.clone(),
        ));
        let session = Session::new(options, engine, event_sender);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            wait_for_signal().await;
            log::info!("Shutdown requested");
            let _ = shutdown_tx.send(true);
        });

        session.run(shutdown_rx).await
    });

    // The session dropped its event sender, so the reporter is finishing
    if reporter.join().is_err() {
        log::warn!("Stats reporter thread panicked");
    }

    let stats = result?;
    log::info!(
        "Session ended: {} accepted, {} rejected",
        stats.accepted,
        stats.rejected
    );
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                log::warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Prints the supported algorithms
fn list_algos() -> Result<(), MinerError> {
    println!("Supported algorithms:");
    for algo in AlgorithmType::ALL {
        println!("  {:<20} {}", algo.name(), algo.label());
    }
    Ok(())
}

/// Generates configuration template file
///
/// # Arguments
/// * `opts` - Configuration generation options
fn generate_config(opts: cli::ConfigOptions) -> Result<(), MinerError> {
    utils::init_logging();

    let template = config::generate_template();
    std::fs::write(&opts.output, template)?;
    log::info!("Wrote config template to {}", opts.output.display());
    Ok(())
}
