//! # Voice Userbot Backend - Main Application Entry Point
//!
//! Wires the whole system together and runs it:
//!
//! ## Application Architecture:
//! - **config**: layered configuration (TOML file + environment variables)
//! - **engines**: capability-typed adapters to the external engines
//!   (messaging account, voice transport, media fetch, transcode,
//!   recognition)
//! - **voice**: the per-chat session state machine, registry, playback
//!   pipeline, and chat command table
//! - **userbot**: the dispatcher consuming the account's command stream
//! - **state / health / handlers / middleware**: the HTTP control surface
//!
//! The messaging and voice-call engines are deployment plugs. When they are
//! not wired in, the process still starts, serves the control surface, and
//! reports every voice command as unavailable — the same degraded mode the
//! bot runs in before its first authentication.

mod config;
mod engines;
mod error;
mod handlers;
mod health;
mod middleware;
mod state;
mod userbot;
mod voice;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use engines::{
    AccountClient, DisabledVoiceTransport, FfmpegTranscode, HttpRecognizer, OfflineAccount,
    VoiceTransport, YtdlFetch,
};
use state::{AppState, BotMetrics};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use userbot::Userbot;
use voice::{PlaybackPipeline, SessionDeps, SessionRegistry};

/// Global shutdown signal, set by the signal handlers and polled by the
/// main select loop.
static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;
    config.ensure_media_dirs()?;

    info!("Starting voice-userbot-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}",
        config.server.host, config.server.port
    );

    // Engine wiring. Swap these constructors to mount real engines.
    let account: Arc<dyn AccountClient> = Arc::new(OfflineAccount::new());
    let transport: Arc<dyn VoiceTransport> = Arc::new(DisabledVoiceTransport::new());
    let fetcher = Arc::new(YtdlFetch::new(config.tools.ytdlp_bin.clone(), account.clone()));
    let transcoder = Arc::new(FfmpegTranscode::new(config.tools.ffmpeg_bin.clone()));
    let recognizer = Arc::new(HttpRecognizer::from_config(&config.recognition)?);

    let pipeline = Arc::new(PlaybackPipeline::new(
        fetcher,
        transcoder,
        config.download_dir(),
        config.artifact_dir(),
    ));
    let registry = SessionRegistry::new(
        SessionDeps {
            transport,
            pipeline,
        },
        config.limits.max_voice_sessions,
    );

    let metrics = Arc::new(RwLock::new(BotMetrics::default()));
    let bot = Userbot::new(account.clone(), recognizer, registry, metrics.clone());

    match account.connect().await {
        Ok(()) => info!("Account engine connected"),
        Err(e) => warn!("Account engine unavailable ({e}); control surface only"),
    }
    let bot_task = tokio::spawn(bot.clone().run());

    let auth_secret = resolve_auth_secret(&config);
    let app_state = AppState::new(config.clone(), bot.clone(), metrics);
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
            .wrap(Logger::default())
            .wrap(TracingLogger::default())
            .service(
                web::scope("/api")
                    .wrap(middleware::ApiAuth::new(auth_secret.clone()))
                    .route("/status", web::get().to(handlers::get_status))
                    .route("/sessions", web::get().to(handlers::get_sessions))
                    .route("/metrics", web::get().to(handlers::get_metrics)),
            )
            .route("/healthz", web::get().to(health::health_check))
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(server_result) => {
                    if let Err(e) = server_result {
                        error!("Server error: {}", e);
                    }
                }
                Err(e) => {
                    error!("Server task error: {}", e);
                }
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping...");
            // Leave every live voice chat before the process goes away.
            bot.shutdown().await;
            server_handle.stop(true).await;
        }
    }

    bot_task.abort();
    info!("Server stopped gracefully");
    Ok(())
}

/// Initialize structured logging; `RUST_LOG` overrides the defaults.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_userbot_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    Ok(())
}

/// Use the configured bearer secret, or generate one for this run.
///
/// The generated value goes to stdout only — never into the log stream —
/// matching how the original deployment surfaced it.
fn resolve_auth_secret(config: &AppConfig) -> String {
    match &config.server.auth_secret {
        Some(secret) => secret.clone(),
        None => {
            let secret = uuid::Uuid::new_v4().simple().to_string();
            info!("AUTH_SECRET generated for API access");
            println!("AUTH_SECRET for web access: {secret}");
            secret
        }
    }
}

/// Listen for SIGTERM/SIGINT and flip the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

/// Wait for the shutdown flag, polling every 100ms.
async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
