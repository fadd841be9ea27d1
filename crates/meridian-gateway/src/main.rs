use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use meridian_core::config::{MeridianConfig, Secrets};
use meridian_gateway::{app, cleaner};
use meridian_storage::Storage;

#[derive(Parser, Debug)]
#[command(name = "meridian-gateway", about = "Meridian chat timezone assistant")]
struct Args {
    /// Path to meridian.yaml (default: ./meridian.yaml)
    #[arg(long)]
    config: Option<String>,
    /// Override the bind host
    #[arg(long)]
    host: Option<String>,
    /// Override the bind port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = MeridianConfig::load(args.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Config load failed ({}), using defaults", e);
        MeridianConfig::default()
    });

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("meridian={},tower_http=info", config.logging.level).into()
            }),
        )
        .init();

    let secrets = Secrets::from_env();
    let storage = Arc::new(Storage::open(&config.database.path)?);
    info!(path = %config.database.path, "storage opened");

    let host = args.host.unwrap_or_else(|| config.app.host.clone());
    let port = args.port.unwrap_or(config.app.port);
    let dedupe_ttl = config.dedupe.ttl_seconds;

    let state = Arc::new(app::AppState::build(config, secrets, Arc::clone(&storage)));
    let router = app::build_router(Arc::clone(&state));

    let cleaner = cleaner::spawn_cleaner(storage, dedupe_ttl);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("meridian gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    cleaner.abort();
    info!("shutdown complete");
    Ok(())
}
