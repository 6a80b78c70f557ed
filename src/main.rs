//! # Voice Screening Backend - Main Application Entry Point
//!
//! Actix-web server that orchestrates real-time voice sessions: it routes
//! every utterance to a voice command, a PHQ-2/PHQ-9 screening answer or
//! ordinary dialogue, dispatches the functions the realtime model invokes,
//! and keeps the client's voice transport in step through a WebSocket.
//!
//! ## Key Rust Concepts Used:
//! - **async/await**: the server, each session controller and the persistence
//!   worker are all tokio tasks
//! - **modules**: one module per component, leaves first
//! - **Result<T, E>**: `anyhow::Result` at startup, `AppResult` everywhere else
//! - **static**: the global shutdown flag
//!
//! ## Application Architecture:
//! - **screening**: PHQ question sequencing, scoring, severity, crisis flag
//! - **persona**: humor level, greetings and system instructions
//! - **conversation**: messages, speech tracking, live transcripts
//! - **routing**: intent classification and the message router
//! - **dispatch**: functions the realtime model can call
//! - **session**: controller, event protocol, transport and persistence seams
//! - **websocket**: one WebSocket connection per session
//! - **config / state / error / health / handlers**: service plumbing

mod config;        // Configuration management (config.rs)
mod conversation;  // Messages, speech tracker, live transcript buffer
mod dispatch;      // Function call dispatcher (dispatch.rs)
mod error;         // Error handling types (error.rs)
mod handlers;      // HTTP request handlers (handlers/ directory)
mod health;        // Health check endpoints (health.rs)
mod persona;       // Humor level and personalization
mod routing;       // Intent classification and message routing
mod screening;     // PHQ-2 / PHQ-9 screening engine
mod session;       // Session controller and its collaborators
mod state;         // Application state management (state.rs)
mod websocket;     // Session WebSocket bridge (websocket.rs)

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use session::{FilePreferenceStore, InMemoryPreferenceStore, PreferenceStore};
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Global shutdown signal, set by the signal handler task.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** from defaults, `config.toml` and environment
/// 2. **Sets up logging** with `tracing`
/// 3. **Opens the humor preference store** shared by all sessions
/// 4. **Configures the HTTP server** with routes and the session WebSocket
/// 5. **Handles graceful shutdown** on SIGINT / SIGTERM
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting voice-screening-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);
    info!(
        "Realtime voice: {}, humor preferences at {}",
        config.realtime.voice, config.preferences.store_path
    );

    // An empty path keeps the humor preference in memory for this process only
    let preferences: Arc<dyn PreferenceStore> = if config.preferences.store_path.is_empty() {
        Arc::new(InMemoryPreferenceStore::default())
    } else {
        Arc::new(FilePreferenceStore::new(&config.preferences.store_path))
    };
    let app_state = AppState::new(config.clone(), preferences);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(cors)
            .wrap(TracingLogger::default())   // One span per HTTP request
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config))
                    .route("/preferences/humor", web::get().to(handlers::get_humor))
                    .route("/preferences/humor", web::put().to(handlers::update_humor)),
            )
            .route("/ws/session", web::get().to(websocket::session_websocket))
            .route("/health", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize the tracing (logging) system for the application.
///
/// ## Environment Variables:
/// - `RUST_LOG`: Controls what gets logged (e.g. "voice_screening_backend=trace")
/// - If not set, defaults to "voice_screening_backend=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_screening_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Listen for SIGTERM and SIGINT and raise the shutdown flag.
///
/// If a handler can't be installed the server keeps running; it can still be
/// stopped by the process supervisor.
fn setup_signal_handlers() {
    use tokio::signal::unix::{signal, SignalKind};

    tokio::spawn(async {
        let (mut sigterm, mut sigint) = match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Poll the shutdown flag every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
