mod app;
mod config;
mod error;
mod normalize;
mod routes;
mod services;
mod state;
#[cfg(test)]
mod test_support;

use std::path::Path;

use shiftboard_shared::Roster;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let base_roster = match config::roster_path() {
        Some(path) => match services::roster_loader::load_base_roster(Path::new(&path)).await {
            Ok(roster) => {
                tracing::info!(
                    %path,
                    shifts = roster.groups.len(),
                    members = roster.member_count(),
                    "loaded roster file"
                );
                roster
            }
            Err(e) => {
                tracing::warn!(error = %e, %path, "failed to load roster file; starting without roster");
                Roster::default()
            }
        },
        None => {
            tracing::info!("ROSTER_PATH not set; starting without roster");
            Roster::default()
        }
    };

    let state = AppState::new(base_roster);
    tracing::info!(sources = ?state.sources, "status sources configured");

    // Spawn background services
    tokio::spawn(services::status_poller::run(state.clone()));
    if let Some(csv_url) = config::roster_csv_url() {
        tokio::spawn(services::roster_loader::run(state.clone(), csv_url));
    }

    let app = app::build_app(state);

    let addr = format!("0.0.0.0:{}", config::server_port());
    tracing::info!("Shiftboard server listening on {addr}");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %addr, "failed to bind TCP listener");
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(error = %e, "server failed");
    }

    tracing::info!("Server shut down gracefully");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                return;
            }
        };
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
