//! keybind verification authority.
//!
//! Serves the verification and admin API, and doubles as the operator's
//! key-management tool against the same store:
//!
//!   keybind-server serve --store sqlite --database keys.db
//!   keybind-server add ABC-123 30d
//!   keybind-server remove ABC-123
//!   keybind-server list

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keybind_license::{AdminRegistry, LicenseError};
use keybind_server::{build_router, spawn_sweeper, AppState, ServerConfig, StoreKind};
use keybind_types::{Clock, LicenseKey, LicenseType, SystemClock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "keybind-server", version)]
#[command(about = "License key activation and device-binding authority")]
struct Args {
    /// JSON config file; flags and environment override its values
    #[arg(short, long, global = true, env = "KEYBIND_CONFIG")]
    config: Option<PathBuf>,

    /// Key store backend
    #[arg(long, global = true, value_enum)]
    store: Option<StoreKind>,

    /// Path of the sqlite database or JSON document
    #[arg(long, global = true, env = "KEYBIND_DATABASE_PATH")]
    database: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long, env = "KEYBIND_BIND")]
    bind: Option<String>,

    /// Bearer token required on admin routes
    #[arg(long, env = "KEYBIND_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (default)
    Serve,
    /// Issue a new, unactivated key
    Add {
        key: String,
        #[arg(value_name = "TYPE")]
        license_type: String,
    },
    /// Revoke a key, activated or not
    Remove { key: String },
    /// Show all keys, purging expired ones first
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    config.store = config.store.overridden(args.store, args.database.clone());
    if let Some(bind) = &args.bind {
        config.bind.clone_from(bind);
    }
    if args.admin_token.is_some() {
        config.admin_token.clone_from(&args.admin_token);
    }

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Add { key, license_type } => {
            let admin = open_registry(&config)?;
            let key = LicenseKey::parse(&key).context("invalid key")?;
            let license_type = LicenseType::parse(&license_type).context("invalid type")?;
            admin
                .issue(&key, &license_type)
                .await
                .with_context(|| format!("failed to add {key}"))?;
            println!("added {key} ({license_type})");
            Ok(())
        }
        Command::Remove { key } => {
            let admin = open_registry(&config)?;
            let key = LicenseKey::parse(&key).context("invalid key")?;
            match admin.revoke(&key).await {
                Ok(()) => println!("removed {key}"),
                Err(LicenseError::NotFound(_)) => println!("{key} not found"),
                Err(e) => return Err(e).context("failed to remove key"),
            }
            Ok(())
        }
        Command::List => {
            let admin = open_registry(&config)?;
            let records = admin.list(SystemClock.now()).await?;
            if records.is_empty() {
                println!("no keys");
            }
            for record in records {
                match &record.binding {
                    Some(b) => println!(
                        "{}\t{}\t{}\texpires {}",
                        record.key,
                        record.license_type,
                        b.device_id,
                        b.expires_at.as_millis()
                    ),
                    None => println!("{}\t{}\tunactivated", record.key, record.license_type),
                }
            }
            Ok(())
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn open_registry(config: &ServerConfig) -> Result<AdminRegistry> {
    config.require_persistent_store()?;
    let store = config.open_store().context("failed to open key store")?;
    Ok(AdminRegistry::new(store, Arc::new(config.durations.clone())))
}

async fn serve(config: ServerConfig) -> Result<()> {
    info!("keybind server starting...");
    let store = config.open_store().context("failed to open key store")?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::new(store, config.durations.clone(), Arc::clone(&clock))
        .with_admin_token(config.admin_token.clone());
    if state.admin_token.is_none() {
        info!("no admin token configured; /admin routes are unauthenticated");
    }

    if let Some(period) = config.sweep_interval() {
        spawn_sweeper(Arc::clone(state.engine()), clock, period);
    }

    let types: Vec<String> = config.durations.types().map(ToString::to_string).collect();
    info!("license types: {}", types.join(", "));

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutting down");
            }
        })
        .await
        .context("HTTP server failed")
}
