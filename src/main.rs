//! # Sign Recognition Backend - Main Application Entry Point
//!
//! Web server that turns streamed hand/face/pose landmarks into ranked sign predictions.
//!
//! ## Application Architecture:
//! - **config**: Application configuration (TOML file + environment variables)
//! - **state**: Shared application state and metrics
//! - **health**: Health and metrics endpoints
//! - **middleware**: Request metrics
//! - **handlers**: HTTP handlers (batch prediction, content files, runtime config)
//! - **websocket**: Streaming sessions on `/ws/vocab`
//! - **landmarks**: Frame normalization, per-session buffers and the session registry
//! - **inference**: Tensor assembly, the model, vocabulary and ranking
//! - **error**: Pipeline and HTTP error types

mod config;
mod error;
mod handlers;
mod health;
mod inference;
mod landmarks;
mod middleware;
mod state;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use config::AppConfig;
use inference::SignPredictor;
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Set once SIGTERM or SIGINT arrives.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

/// ## Startup order:
/// 1. Environment (`.env`) and logging
/// 2. Configuration, validated
/// 3. Schema, vocabulary and model; any failure here aborts startup
/// 4. HTTP server with routes and middleware
/// 5. Wait for the server to exit or a shutdown signal
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting sign-recognition-backend v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {}:{}", config.server.host, config.server.port);

    let predictor = SignPredictor::load(&config.models).context("Failed to load sign model")?;
    info!(
        signs = predictor.vocabulary().len(),
        rows_per_frame = predictor.schema().rows_per_frame(),
        backend = predictor.engine().backend_name(),
        "Sign predictor ready"
    );

    let app_state = AppState::new(config.clone(), Arc::new(predictor));
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
            .wrap(middleware::MetricsMiddleware)
            .wrap(TracingLogger::default())
            .route("/", web::get().to(index))
            .route("/health", web::get().to(health::health_check))
            .route("/ws/vocab", web::get().to(websocket::vocab_websocket))
            .service(
                web::scope("/api/v1")
                    .route("/health", web::get().to(health::health_check))
                    .route("/metrics", web::get().to(health::detailed_metrics))
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/config", web::put().to(handlers::update_config)),
            )
            .service(
                web::scope("/api")
                    .route("/vocab-predict", web::post().to(handlers::vocab_predict))
                    .route("/vocab-contents", web::get().to(handlers::vocab_contents))
                    .route("/fs-contents", web::get().to(handlers::fs_contents)),
            )
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

async fn index() -> HttpResponse {
    HttpResponse::Ok().body("Sign recognition server running")
}

/// `RUST_LOG` overrides the default filter.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sign_recognition_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Listen for SIGTERM/SIGINT and raise the shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        use tokio::signal::unix::{signal, SignalKind};

        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
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

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
