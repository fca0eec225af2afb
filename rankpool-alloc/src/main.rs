//! rankpool-alloc - Main entry point
//!
//! Serves the ranking survey over HTTP and offers operator commands for
//! inspecting and resetting the claim ledger.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rankpool_alloc::db::AssignmentStore;
use rankpool_alloc::services::{Allocator, PoolCatalog};
use rankpool_alloc::types::ResourceId;
use rankpool_alloc::{build_router, AppState};
use rankpool_common::config::{
    load_toml_config_with_source, resolve_config_path, write_toml_config, TomlConfig,
};
use rankpool_common::db::init_database_with_timeout;
use rankpool_common::SessionId;

/// Command-line arguments for rankpool-alloc
#[derive(Parser, Debug)]
#[command(name = "rankpool-alloc")]
#[command(about = "Image pool allocator and ranking survey service")]
#[command(version)]
struct Args {
    /// Config file (falls back to RANKPOOL_CONFIG, then the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the image pool
    #[arg(long, env = "RANKPOOL_IMAGE_ROOT", global = true)]
    image_root: Option<PathBuf>,

    /// SQLite database holding claims and assignments
    #[arg(long, env = "RANKPOOL_DATABASE", global = true)]
    database: Option<PathBuf>,

    /// Directory receiving exported results
    #[arg(long, env = "RANKPOOL_OUTPUT_DIR", global = true)]
    output_dir: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long, env = "RANKPOOL_BIND", global = true)]
    bind: Option<String>,

    /// Global sampling seed
    #[arg(long, env = "RANKPOOL_SEED", global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP survey service (default)
    Serve,
    /// Print claim ledger counts
    Ledger,
    /// Delete one session's claims and assignment
    Release {
        #[arg(long)]
        session: String,
    },
    /// Delete every claim and assignment
    ClearLedger {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// List the catalogued pool identifiers
    Catalog,
    /// Write the effective configuration to a file
    InitConfig {
        /// Target file (defaults to the resolved config path)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Args {
    /// Apply command-line overrides on top of the file config
    fn apply_overrides(&self, config: &mut TomlConfig) {
        if let Some(root) = &self.image_root {
            config.image_root = root.clone();
        }
        if let Some(db) = &self.database {
            config.database_path = db.clone();
        }
        if let Some(out) = &self.output_dir {
            config.output_dir = out.clone();
        }
        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let (mut config, config_source) = load_toml_config_with_source(config_path.as_deref())
        .context("Failed to load configuration")?;
    args.apply_overrides(&mut config);

    // Initialize tracing; RUST_LOG wins over the config file level
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "rankpool-alloc {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    config_source.log();

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Ledger => print_ledger(&config).await,
        Command::Release { session } => release(&config, &session).await,
        Command::ClearLedger { yes } => clear_ledger(&config, yes).await,
        Command::Catalog => print_catalog(&config),
        Command::InitConfig { path, force } => init_config(&config, path.or(config_path), force),
    }
}

fn catalog_pool(config: &TomlConfig) -> Result<Vec<ResourceId>> {
    let catalog = PoolCatalog::new(config.normalized_extensions()).recursive(config.recursive);
    let pool_ids = catalog
        .list_pool_ids(&config.image_root)
        .context("Failed to catalog image pool")?;
    Ok(pool_ids)
}

async fn open_store(config: &TomlConfig) -> Result<AssignmentStore> {
    let pool = init_database_with_timeout(&config.database_path, config.busy_timeout_ms)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_path.display()))?;
    Ok(AssignmentStore::new(pool, config.max_lock_wait_ms))
}

async fn serve(config: TomlConfig) -> Result<()> {
    config.validate().context("Invalid configuration")?;

    let pool_ids = catalog_pool(&config)?;
    info!(
        "Image pool: {} ({} images, n_total={}, set_size={}, {} batches per session)",
        config.image_root.display(),
        pool_ids.len(),
        config.n_total,
        config.set_size,
        config.num_sets()
    );
    if pool_ids.len() < config.n_total {
        warn!(
            "Pool holds fewer images ({}) than one session needs ({})",
            pool_ids.len(),
            config.n_total
        );
    }

    let store = open_store(&config).await?;
    let summary = store.ledger_summary().await?;
    info!(
        "Ledger: {} claimed images across {} sessions",
        summary.claimed_resources, summary.sessions
    );

    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_addr))?;

    let app = build_router(AppState::new(Allocator::new(store), pool_ids, config));

    info!("Starting HTTP server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn print_ledger(config: &TomlConfig) -> Result<()> {
    let store = open_store(config).await?;
    let summary = store.ledger_summary().await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn release(config: &TomlConfig, session: &str) -> Result<()> {
    let session = SessionId::parse(session)?;
    let store = open_store(config).await?;
    let released = store.release_session(&session).await?;
    info!(
        "Released session {}: {} claims, {} assignment rows",
        session, released.claims, released.assignment_rows
    );
    println!("{}", serde_json::to_string_pretty(&released)?);
    Ok(())
}

async fn clear_ledger(config: &TomlConfig, yes: bool) -> Result<()> {
    if !yes {
        bail!("Refusing to clear the ledger without --yes");
    }
    let store = open_store(config).await?;
    let released = store.clear_ledger().await?;
    warn!(
        "Ledger cleared: {} claims, {} assignment rows removed",
        released.claims, released.assignment_rows
    );
    println!("{}", serde_json::to_string_pretty(&released)?);
    Ok(())
}

fn print_catalog(config: &TomlConfig) -> Result<()> {
    for id in catalog_pool(config)? {
        println!("{}", id);
    }
    Ok(())
}

fn init_config(config: &TomlConfig, path: Option<PathBuf>, force: bool) -> Result<()> {
    let target = path.unwrap_or_else(|| PathBuf::from("config.toml"));
    if target.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", target.display());
    }
    write_toml_config(config, &target)?;
    info!("Wrote config to {}", target.display());
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
