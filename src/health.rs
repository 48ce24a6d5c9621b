use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let config = state.get_config();
    let metrics = state.metrics_snapshot();
    let status = state.userbot.status();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.uptime_seconds(),
        "service": {
            "name": "voice-userbot-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "userbot": {
            "authenticated": status.authenticated,
            "active_sessions": status.active_sessions
        },
        "commands": {
            "processed": metrics.commands_processed,
            "errors": metrics.command_errors,
            "error_rate": metrics.error_rate()
        }
    }))
}
