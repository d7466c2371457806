use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use mlx_api_runtime::MockRuntime;
use mlx_api_server::{run_server, shutdown_signal, AppState, LifecycleManager, ServerState, Settings};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::parse();
    if let Err(err) = settings.validate() {
        tracing::error!("{}", err);
        return ExitCode::FAILURE;
    }
    let settings = Arc::new(settings);

    let state = Arc::new(ServerState::new());
    let lifecycle = LifecycleManager::new(Arc::new(MockRuntime::new()), Arc::clone(&state));

    // no listener until the model is ready
    if let Err(err) = lifecycle.start(&settings).await {
        tracing::error!("{}", err);
        return ExitCode::FAILURE;
    }

    let addr = (settings.host.as_str(), settings.port);
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind {}:{}: {}", settings.host, settings.port, err);
            lifecycle.stop();
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let app_state = AppState::new(Arc::clone(&state), Arc::clone(&settings));
    let served = run_server(app_state, listener, shutdown).await;

    tracing::info!("Shutting down MLX API");
    lifecycle.stop();

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("Server error: {}", err);
            ExitCode::FAILURE
        }
    }
}
