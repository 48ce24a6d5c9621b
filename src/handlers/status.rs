//! # Status Handlers
//!
//! Read-only API endpoints behind the bearer token: account status, live
//! voice sessions, and command metrics. The control surface never mutates
//! the bot — all control flows through chat commands.

use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

/// `GET /api/status` — account and bot status.
pub async fn get_status(state: web::Data<AppState>) -> HttpResponse {
    let status = state.userbot.status();

    HttpResponse::Ok().json(json!({
        "success": true,
        "authenticated": status.authenticated,
        "user": status.user,
        "status": status
    }))
}

/// `GET /api/sessions` — every live voice session's snapshot.
pub async fn get_sessions(state: web::Data<AppState>) -> HttpResponse {
    let sessions = state.userbot.session_snapshots().await;

    HttpResponse::Ok().json(json!({
        "success": true,
        "count": sessions.len(),
        "sessions": sessions
    }))
}

/// `GET /api/metrics` — command traffic counters.
pub async fn get_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.metrics_snapshot();
    let uptime_seconds = state.uptime_seconds();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "commands": {
            "processed": metrics.commands_processed,
            "errors": metrics.command_errors,
            "error_rate": metrics.error_rate(),
            "per_second": if uptime_seconds > 0 {
                metrics.commands_processed as f64 / uptime_seconds as f64
            } else {
                0.0
            }
        },
        "recognition": {
            "attempted": metrics.recognitions_attempted,
            "matched": metrics.recognitions_matched
        }
    }))
}
