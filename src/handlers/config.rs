use crate::config::AppConfig;
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

fn config_json(config: &AppConfig) -> serde_json::Value {
    json!({
        "server": {
            "host": config.server.host,
            "port": config.server.port
        },
        "realtime": {
            "voice": config.realtime.voice,
            "temperature": config.realtime.temperature,
            "turn_detection_threshold": config.realtime.turn_detection_threshold,
            "prefix_padding_ms": config.realtime.prefix_padding_ms,
            "silence_duration_ms": config.realtime.silence_duration_ms,
            "enable_input_transcription": config.realtime.enable_input_transcription
        },
        "session": {
            "close_grace_ms": config.session.close_grace_ms,
            "notification_dismiss_ms": config.session.notification_dismiss_ms,
            "caption_hold_ms": config.session.caption_hold_ms
        },
        "preferences": {
            "store_path": config.preferences.store_path,
            "default_humor_level": config.preferences.default_humor_level
        }
    })
}

pub async fn get_config(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": config_json(&config)
    })))
}

/// Partial update; only new sessions see the change.
pub async fn update_config(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> Result<HttpResponse, AppError> {
    let json_str = serde_json::to_string(&body.into_inner())?;

    let mut current_config = state.get_config();
    current_config.update_from_json(&json_str)?;
    state.update_config(current_config.clone())?;

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "message": "Configuration updated successfully",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "updated_config": config_json(&current_config)
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::preferences::InMemoryPreferenceStore;
    use actix_web::{test, App};
    use std::sync::Arc;

    fn app_state() -> AppState {
        AppState::new(AppConfig::default(), Arc::new(InMemoryPreferenceStore::default()))
    }

    #[actix_web::test]
    async fn test_partial_config_update() {
        let state = app_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({ "realtime": { "voice": "echo" } }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        assert_eq!(state.get_config().realtime.voice, "echo");
        assert_eq!(state.get_config().server.port, 8080);
    }

    #[actix_web::test]
    async fn test_invalid_config_update_is_rejected() {
        let state = app_state();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state.clone()))
                .route("/config", web::put().to(update_config)),
        )
        .await;

        let req = test::TestRequest::put()
            .uri("/config")
            .set_json(json!({ "realtime": { "temperature": 2.5 } }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), actix_web::http::StatusCode::BAD_REQUEST);
        assert!((state.get_config().realtime.temperature - 0.7).abs() < f32::EPSILON);
    }
}
