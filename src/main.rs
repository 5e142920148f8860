//! PHIL backend - Main Entry Point

use clap::{Parser, Subcommand};
use phil::api::{self, AppState};
use phil::auth::{DisabledVerifier, SupabaseVerifier, TokenVerifier};
use phil::config::{PhilConfig, StorageBackend};
use phil::health::{HealthCheckManager, LlmProviderHealthCheck, StorageHealthCheck};
use phil::llm::provider::LlmProvider;
use phil::llm::providers::{PerplexityConfig, PerplexityProvider};
use phil::observability::{init_logging, metrics::metrics, HealthServer, LogFormat};
use phil::storage::{AgentStore, MemoryStore, SupabaseStore, SCHEMA_SQL};
use phil::studio::Studio;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};

/// Backend for the PHIL agent builder
#[derive(Parser)]
#[command(name = "phil")]
#[command(about = "Describe an AI agent, get its Python plus a technical and cost review")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "PHIL_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API and health servers
    Serve,
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Print the Postgres schema for the Supabase project
    Schema,
}

type BoxError = Box<dyn std::error::Error>;

#[tokio::main]
async fn main() {
    // Secrets usually come from a local .env during development
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Commands::Schema = cli.command {
        print!("{SCHEMA_SQL}");
        return;
    }

    init_observability(cli.verbose);
    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    info!("Starting PHIL backend v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Serve => serve(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
        Commands::Schema => Ok(()),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

/// LOG_LEVEL / LOG_FORMAT / LOG_SPANS from the environment, raised by -v
fn init_observability(verbose: u8) {
    let level = match verbose {
        0 => phil::observability::logging::parse_level(
            &std::env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
        ),
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let format = LogFormat::parse(&std::env::var("LOG_FORMAT").unwrap_or_default());
    let include_spans = std::env::var("LOG_SPANS")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    init_logging(level, format, include_spans);
}

fn load_configuration(config_path: &Option<PathBuf>) -> Result<PhilConfig, BoxError> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(PhilConfig::load_from_file(path)?);
    }

    for path_str in ["phil.toml", "config/phil.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(PhilConfig::load_from_file(&path)?);
        }
    }

    Err("No configuration file found. Provide one with -c/--config or create phil.toml".into())
}

fn handle_config_command(config: &PhilConfig, show: bool) -> Result<(), BoxError> {
    if show {
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(config)?);
    }

    for (name, present) in [
        (config.llm.api_key_env.as_str(), config.get_llm_api_key().is_ok()),
        (
            config
                .supabase
                .as_ref()
                .map(|s| s.service_key_env.as_str())
                .unwrap_or("SUPABASE_KEY"),
            config.supabase.is_none() || config.get_supabase_key().is_ok(),
        ),
    ] {
        if !present {
            warn!("Environment variable {} is not set", name);
        }
    }

    info!("Configuration validation complete");
    Ok(())
}

/// Provider factory for creating the LLM provider from configuration
fn create_provider(config: &PhilConfig) -> Result<Arc<dyn LlmProvider>, BoxError> {
    let mut provider_config = PerplexityConfig {
        api_key: config.get_llm_api_key()?,
        timeout: Duration::from_secs(config.llm.timeout_secs),
        ..Default::default()
    };
    if let Some(base_url) = &config.llm.base_url {
        provider_config.base_url = base_url.clone();
    }

    Ok(Arc::new(PerplexityProvider::new(provider_config)?))
}

fn create_store(config: &PhilConfig) -> Result<Arc<dyn AgentStore>, BoxError> {
    match (config.storage.backend, &config.supabase) {
        (StorageBackend::Memory, _) => {
            warn!("Using in-memory storage; agents are lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        (StorageBackend::Supabase, Some(supabase)) => Ok(Arc::new(SupabaseStore::new(
            &supabase.url,
            config.get_supabase_key()?,
            Duration::from_secs(30),
        )?)),
        (StorageBackend::Supabase, None) => Err("[supabase] section is missing".into()),
    }
}

fn create_verifier(config: &PhilConfig) -> Result<Arc<dyn TokenVerifier>, BoxError> {
    match (&config.supabase, config.auth.enabled) {
        (_, false) => {
            warn!("Authentication is disabled; every request runs as the local developer");
            Ok(Arc::new(DisabledVerifier::new()))
        }
        (Some(supabase), true) => Ok(Arc::new(SupabaseVerifier::new(
            &supabase.url,
            config.get_supabase_key()?,
            Duration::from_secs(10),
        )?)),
        (None, true) => Err("[supabase] section is required when auth is enabled".into()),
    }
}

async fn serve(config: PhilConfig) -> Result<(), BoxError> {
    let provider = create_provider(&config)?;
    let store = create_store(&config)?;
    let verifier = create_verifier(&config)?;
    info!(
        "Using {} LLM provider and {} storage",
        provider.name(),
        store.name()
    );

    let studio = Arc::new(Studio::new(
        provider.clone(),
        config.llm.models.clone(),
        config.chat.personality,
    ));
    let state = AppState::new(
        store.clone(),
        studio,
        verifier,
        config.chat.max_context_urls,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Health server
    let mut checks = HealthCheckManager::new();
    checks.add_health_check(Box::new(StorageHealthCheck::new(store)));
    checks.add_health_check(Box::new(LlmProviderHealthCheck::new(provider)));
    let health_server = Arc::new(HealthServer::new(
        "phil",
        config.server.health_port,
        checks,
    ));
    let health_task = tokio::spawn(health_server.start(wait_for(shutdown_rx.clone())));

    // API server
    let host: IpAddr = config.server.host.parse()?;
    let addr = SocketAddr::new(host, config.server.port);
    let routes = api::routes(state, &config.server.cors_origins);
    let (bound, server) =
        warp::serve(routes).try_bind_with_graceful_shutdown(addr, wait_for(shutdown_rx))?;
    info!("API listening on {}", bound);
    metrics().update_health_status(true);
    let api_task = tokio::spawn(server);

    wait_for_signal().await?;
    info!("Application shutdown initiated");
    let _ = shutdown_tx.send(true);

    if let Err(e) = api_task.await {
        error!("API server task failed: {}", e);
    }
    if let Err(e) = health_task.await {
        error!("Health server task failed: {}", e);
    }

    Ok(())
}

async fn wait_for(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow() {
        if shutdown.changed().await.is_err() {
            break;
        }
    }
}

/// Resolve on SIGINT or SIGTERM
async fn wait_for_signal() -> Result<(), BoxError> {
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }
    Ok(())
}
