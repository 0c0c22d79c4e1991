use anyhow::{anyhow, Result};
use clap::Parser;
use sensor_hub::{app, cli, config, live, openapi, state, store};
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Binds the HTTP listener; a taken port gets a hint instead of a bare OS error.
async fn listen(host: &str, port: u16) -> Result<TcpListener> {
    let addr = format!("{host}:{port}");
    TcpListener::bind(&addr).await.map_err(|err| match err.kind() {
        ErrorKind::AddrInUse => anyhow!(
            "cannot listen on {addr}: another process already holds port {port}; \
             stop it or start sensor-hub with --port <free port>"
        ),
        _ => anyhow!(err).context(format!("cannot listen on {addr}")),
    })
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    tracing::info!("shutting down");
    // Live viewer connections never finish on their own.
    cancel.cancel();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();
    if args.print_openapi {
        println!(
            "{}",
            serde_json::to_string_pretty(&openapi::openapi_json())?
        );
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,sensor_hub=info")),
        )
        .init();

    let config = config::HubConfig::from_env(args.database_path, args.static_root)?;
    let (store, commits) = store::StoreHandle::open(config.store_options()).map_err(|err| {
        anyhow!(err).context(format!(
            "failed to open store at {}",
            config.database_path.display()
        ))
    })?;

    let cancel = CancellationToken::new();
    let sessions = Arc::new(live::SessionRegistry::new(config.session_queue_capacity));
    let fanout = live::spawn_fanout(sessions.clone(), commits, cancel.clone());

    let state = state::AppState::new(config, store, sessions, cancel.clone());
    let app = app::build(state)?;

    let listener = listen(&args.host, args.port).await?;
    tracing::info!(host = %args.host, port = args.port, "sensor-hub listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(cancel.clone()))
    .await?;

    cancel.cancel();
    if let Err(err) = fanout.await {
        tracing::warn!(error = %err, "fan-out task ended abnormally");
    }
    Ok(())
}
