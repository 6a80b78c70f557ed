use crate::state::{AppMetrics, AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "sessions": {
            "active": metrics.active_sessions,
            "total": metrics.total_sessions
        },
        "realtime": {
            "voice": config.realtime.voice,
            "input_transcription": config.realtime.enable_input_transcription
        },
        "memory": get_memory_info(),
        "system": get_system_status(&metrics)
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "sessions": {
            "active": metrics.active_sessions,
            "total": metrics.total_sessions,
            "messages_routed": metrics.messages_routed,
            "connection_errors": metrics.connection_errors
        },
        "functions": {
            "calls": metrics.function_calls,
            "failures": metrics.function_failures,
            "failure_rate": ratio(metrics.function_failures, metrics.function_calls)
        },
        "assessments": {
            "started": metrics.assessments_started,
            "completed": metrics.assessments_completed,
            "completion_rate": ratio(metrics.assessments_completed, metrics.assessments_started),
            "crisis_flags": metrics.crisis_flags
        },
        "memory": get_memory_info()
    }))
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64
    } else {
        0.0
    }
}

fn get_memory_info() -> serde_json::Value {
    let pid = process::id();

    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", pid)) {
            let field = |name: &str| {
                status
                    .lines()
                    .find(|line| line.starts_with(name))
                    .and_then(|line| line.split_whitespace().nth(1))
                    .and_then(|kb| kb.parse::<u64>().ok())
                    .map(|kb| kb * 1024)
                    .unwrap_or(0)
            };

            return json!({
                "resident_memory_bytes": field("VmRSS:"),
                "virtual_memory_bytes": field("VmSize:"),
                "available": true
            });
        }
    }

    let _ = pid;
    json!({
        "resident_memory_bytes": 0,
        "virtual_memory_bytes": 0,
        "available": false,
        "note": "Memory info not available on this platform"
    })
}

fn get_system_status(metrics: &AppMetrics) -> serde_json::Value {
    let mut warnings = Vec::new();
    if metrics.total_sessions > 0 && metrics.connection_errors > metrics.total_sessions {
        warnings.push("Clients are reporting frequent transport errors");
    }

    json!({
        "status": if warnings.is_empty() { "normal" } else { "degraded" },
        "current_sessions": metrics.active_sessions,
        "warnings": warnings
    })
}
