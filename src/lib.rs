pub mod api;
pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod domain;
pub mod entities;
pub mod security;
pub mod services;
pub mod session;
pub mod state;

use anyhow::Context;
use clap::Parser;
pub use config::Config;
use db::Store;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

pub async fn run() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.validate()?;

    let prometheus_handle = if config.observability.metrics_enabled {
        use metrics_exporter_prometheus::PrometheusBuilder;
        let builder = PrometheusBuilder::new();
        let handle = builder
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        info!("Prometheus metrics recorder initialized");
        Some(handle)
    } else {
        None
    };

    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = cli::Cli::parse();

    match cli.command {
        Some(cli::Commands::Daemon) | None => run_daemon(config, prometheus_handle).await,

        Some(cli::Commands::Init) => {
            if Config::create_default_if_missing()? {
                println!("✓ Config file created. Edit config.toml and run again.");
            } else {
                println!("config.toml already exists, leaving it alone.");
            }
            Ok(())
        }

        Some(cli::Commands::Purge) => cmd_purge(&config).await,

        Some(cli::Commands::User { command }) => match command {
            cli::UserCommands::Add {
                username,
                email,
                role_id,
            } => cmd_user_add(&config, &username, &email, role_id).await,
        },
    }
}

async fn run_daemon(
    config: Config,
    prometheus_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
) -> anyhow::Result<()> {
    if !config.server.enabled {
        anyhow::bail!("Server is disabled in config.toml; nothing to run");
    }

    info!(
        "Wardkeep v{} starting in daemon mode...",
        env!("CARGO_PKG_VERSION")
    );

    let state = api::create_app_state_from_config(config.clone(), prometheus_handle).await?;
    let app = api::router(state).await;

    let addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let server_handle = tokio::spawn(async move {
        info!("🌐 API server running at http://{addr}");
        if let Err(e) = axum::serve(listener, app).await {
            error!("Web server error: {}", e);
        }
    });

    info!("Daemon running. Press Ctrl+C to stop.");

    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Shutdown signal received");
        }
        Err(e) => {
            error!("Error listening for shutdown: {}", e);
        }
    }

    server_handle.abort();
    info!("Daemon stopped");

    Ok(())
}

/// Runs the age sweeps the engines otherwise perform opportunistically.
async fn cmd_purge(config: &Config) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let now = chrono::Utc::now();

    let attempt_cutoff = security::format_timestamp(
        now - chrono::Duration::seconds(config.auth.attempt_retention_seconds),
    );
    let attempts = store.purge_login_attempts_before(&attempt_cutoff).await?;

    let token_cutoff = security::format_timestamp(
        now - chrono::Duration::days(config.auth.autologin_purge_days),
    );
    let tokens = store.purge_autologins_before(&token_cutoff).await?;

    println!("Purged {attempts} stale login attempts and {tokens} expired autologin tokens.");

    Ok(())
}

async fn cmd_user_add(
    config: &Config,
    username: &str,
    email: &str,
    role_id: i32,
) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    let (password, generated) = match std::env::var("WARDKEEP_PASSWORD") {
        Ok(password) if !password.is_empty() => (password, false),
        _ => (security::random_alnum(12), true),
    };

    let salt = security::generate_salt();
    let password_hash = security::credential_hash(&salt, &password);
    let created_at = security::format_timestamp(chrono::Utc::now());

    let user_id = store
        .create_user(username, email, role_id, &salt, &password_hash, &created_at)
        .await?;

    println!("✓ Created user '{username}' (id {user_id}, role {role_id})");
    if generated {
        println!("  Generated password: {password}");
    }

    Ok(())
}
