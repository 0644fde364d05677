//! Parley agent binary: joins a LiveKit room and talks with whoever is in it.
//!
//! Loads configuration, sets up structured logging, mints the agent's join
//! token, joins the room and runs the agent until SIGTERM/SIGINT.
//!
//! Joining a room needs the WebRTC stack: build with
//! `cargo build -p parley-agent --features livekit-rtc`. A default build
//! fails at the join step and exits 1.

use parley_agent::{config, room, run_agent, AgentError};
use parley_voice::VoiceService;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("PARLEY_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() -> ExitCode {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("parley.toml"));

    // Tracing is not up yet; report straight to stderr.
    let (config, origin) = match config::load_config(selected_config_path) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("parley-agent: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );
    if origin == config::ConfigOrigin::Defaults {
        tracing::info!(
            path = selected_config_path.unwrap_or("<none>"),
            "config file not found, using defaults"
        );
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "parley agent failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: config::Config) -> Result<(), AgentError> {
    config.validate()?;

    let voice = VoiceService::new(config.livekit.clone());
    let token = voice.agent_token()?;

    // Rooms are created on join anyway; an explicit create only fails when
    // the server API is unreachable or the key lacks roomCreate.
    match voice.create_room(voice.room_name()).await {
        Ok(room) => tracing::info!(room = %room.name, "room ready"),
        Err(e) => tracing::warn!(error = %e, "could not create room, joining anyway"),
    }

    tracing::info!(
        url = voice.get_url(),
        room = voice.room_name(),
        identity = %config.livekit.identity,
        "joining room"
    );
    let room = room::connect(voice.get_url(), &token, &config.agent).await?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    run_agent(&config, room, shutdown).await
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
