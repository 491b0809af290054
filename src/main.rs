//! patchbay - mute/solo and channel-pair control for multichannel mixers
//!
//! Composition root: config, backend, console actor, level poller and REPL.

use anyhow::Result;
use clap::Parser;
use colored::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use patchbay::backend::{AmixerBackend, MemoryBackend, SharedBackend};
use patchbay::cli;
use patchbay::config::{AppConfig, BackendKind, ConfigWatcher};
use patchbay::group::GroupCoordinator;
use patchbay::poller::LevelPoller;
use patchbay::sink::ConsoleSink;
use patchbay::state::{ConsoleActor, ConsoleHandle, MuteSoloMachine};

/// patchbay - mute/solo and stereo-pair control for audio interface mixers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "patchbay.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List the backend's controls and exit
    #[arg(long)]
    list_controls: bool,

    /// Run without the interactive prompt (stop with Ctrl+C)
    #[arg(long)]
    no_repl: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level)?;

    info!("Starting patchbay...");
    info!("Configuration file: {}", args.config);

    // Load configuration, with hot reload when the file exists
    let (config_watcher, config) = if Path::new(&args.config).exists() {
        let (watcher, config) = ConfigWatcher::new(args.config.clone()).await?;
        info!("Configuration loaded successfully with hot-reload enabled");
        (Some(watcher), (*config).clone())
    } else {
        warn!(
            "Config file {} not found, using built-in defaults (memory backend)",
            args.config
        );
        (None, AppConfig::default())
    };

    let backend = build_backend(&config);
    info!("Gain backend: {}", backend.name());

    if args.list_controls {
        list_controls(&backend)?;
        return Ok(());
    }

    let machine = MuteSoloMachine::new(backend.clone(), &config.mixer.output_prefixes);
    info!(channels = machine.len(), "Mute/solo state machine ready");

    let groups = GroupCoordinator::with_channels(
        &machine,
        config.layout.grid(),
        config.layout.snap_rules(),
    );

    let console = ConsoleActor::spawn(machine, groups, config.mixer.flash_interval());

    if console
        .subscribe(Arc::new(ConsoleSink::new("log")))
        .await
        .is_none()
    {
        anyhow::bail!("Console actor stopped during startup");
    }

    if !config.presets.is_empty() {
        info!(count = config.presets.len(), "Applying startup presets");
        console.apply_presets(config.presets.clone());
    }

    let poller_task = if config.poller.enabled {
        let poller = LevelPoller::new(
            backend.clone(),
            config.poller.watch.clone(),
            config.poller.interval(),
        );
        Some(poller.spawn(console.clone()))
    } else {
        info!("Level poller disabled");
        None
    };

    run_app(console.clone(), config, config_watcher, args.no_repl).await?;

    console.shutdown();
    if let Some(task) = poller_task {
        let _ = task.await;
    }

    info!("patchbay shutdown complete");
    Ok(())
}

fn build_backend(config: &AppConfig) -> SharedBackend {
    match config.backend.kind {
        BackendKind::Memory => {
            let controls: Vec<(&str, u8)> = config
                .backend
                .controls
                .iter()
                .map(|seed| (seed.name.as_str(), seed.level))
                .collect();
            Arc::new(MemoryBackend::with_levels(&controls))
        }
        BackendKind::Amixer => Arc::new(
            AmixerBackend::new(config.backend.card)
                .with_timeout(config.backend.command_timeout()),
        ),
    }
}

fn list_controls(backend: &SharedBackend) -> Result<()> {
    let controls = backend.list_controls()?;

    println!("\n{}", format!("=== Controls on {} ===", backend.name()).bold().cyan());
    for name in &controls {
        match backend.get_level(name) {
            Ok(level) => println!("  {:<28} {}", name, level.to_string().green()),
            Err(e) => println!("  {:<28} {}", name, e.to_string().red()),
        }
    }
    println!("\n  Total: {}", controls.len().to_string().green());
    Ok(())
}

async fn run_app(
    console: ConsoleHandle,
    mut config: AppConfig,
    mut config_watcher: Option<ConfigWatcher>,
    headless: bool,
) -> Result<()> {
    let repl = async {
        if headless {
            info!("Running headless, press Ctrl+C to stop");
            std::future::pending::<Result<()>>().await
        } else {
            cli::run_repl(console.clone()).await
        }
    };
    tokio::pin!(repl);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut repl => {
                if let Err(e) = result {
                    warn!("REPL stopped with error: {:#}", e);
                }
                break;
            }

            Some(new_config) = next_config(&mut config_watcher) => {
                info!("📝 Configuration file changed, reloading...");

                if config.restart_required(&new_config) {
                    warn!("⚠️  Backend, poller, output or grid settings changed; restart to apply them");
                }
                console.set_snap_rules(new_config.layout.snap_rules());
                console.set_flash_interval(new_config.mixer.flash_interval());
                info!("✅ Snap rules and flash interval applied");
                config = new_config;
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping");
                break;
            }
        }
    }

    Ok(())
}

/// Next reloaded config, or never when hot reload is off
async fn next_config(watcher: &mut Option<ConfigWatcher>) -> Option<AppConfig> {
    match watcher {
        Some(watcher) => watcher.next_config().await,
        None => std::future::pending().await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
