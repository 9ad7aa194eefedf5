// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Skein — dataflow pipeline runtime and HTTP control plane
//
//  Control plane: axum on tokio
//  Persistence:   JSON mirror directory (images, aliases, versions,
//                 syntactic index, suspensions)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use clap::Parser;
use skein_admin::server::AppState;
use skein_core::config::SkeinConfig;
use skein_runtime::{LoadOptions, Registry};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "skein", version, about = "Skein — dataflow pipeline runtime")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/skein/skein.yaml")]
    config: PathBuf,

    /// Log level (overridden by RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Listener address override
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Mirror directory override; state written here survives restarts
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Directory of .skein sources to bulk-load at boot
    #[arg(long)]
    load_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Config ──
    let mut config = if cli.config.exists() {
        SkeinConfig::load(&cli.config)?
    } else {
        SkeinConfig::default()
    };
    if let Some(addr) = cli.addr {
        config.server.addr = addr;
    }
    if let Some(level) = &cli.log_level {
        config.server.log_level = level.clone();
    }
    if let Some(dir) = &cli.data_dir {
        config.store.data_dir = Some(dir.clone());
    }
    if let Some(dir) = &cli.load_dir {
        config.loader.directory = Some(dir.clone());
    }

    // ── Tracing ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.server.log_level)),
        )
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "Skein starting");
    if cli.config.exists() {
        info!(path = %cli.config.display(), "config loaded");
    }

    // ── Stores + registry ──
    let registry = match &config.store.data_dir {
        Some(dir) => {
            info!(dir = %dir.display(), "persistence enabled");
            Registry::with_mirror(
                dir,
                config.store.suspension_capacity,
                config.store.latency_ring,
            )
        }
        None => {
            info!("no data directory configured; state is in-memory only");
            Registry::in_memory()
        }
    };
    let registry = Arc::new(registry);

    // ── Bulk load ──
    if let Some(dir) = &config.loader.directory {
        let options = LoadOptions {
            recursive: config.loader.recursive,
            fail_on_error: config.loader.fail_on_error,
            alias_strategy: config.loader.alias_strategy,
        };
        let report = registry.load_directory(dir, &options)?;
        info!(
            dir = %dir.display(),
            loaded = report.loaded,
            skipped = report.skipped,
            failed = report.failed,
            "bulk load complete"
        );
        for error in &report.errors {
            warn!("load error: {error}");
        }
    }

    // ── Serve ──
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async {
        let state = AppState {
            registry: Arc::clone(&registry),
        };
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown signal received");
        };
        skein_admin::serve(config.server.addr, state, shutdown).await
    })?;

    info!("Skein stopped");
    Ok(())
}
