//! Humor preference endpoints.
//!
//! Writes go straight to the shared preference store, so the next session
//! opened by any client starts at the new level. Running sessions keep
//! theirs until the user changes it by voice or function call.

use crate::persona::HumorLevel;
use crate::session::preferences::HUMOR_LEVEL_KEY;
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct HumorUpdate {
    pub level: i64,
}

pub async fn get_humor(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let default = HumorLevel::clamped(i64::from(state.get_config().preferences.default_humor_level));
    let stored = state.preferences.load_humor()?;
    let level = stored.unwrap_or(default);

    Ok(HttpResponse::Ok().json(json!({
        "key": HUMOR_LEVEL_KEY,
        "level": level,
        "band": level.band(),
        "label": level.band().label(),
        "stored": stored.is_some(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Strict: out-of-range levels are rejected, not clamped.
pub async fn update_humor(
    state: web::Data<AppState>,
    body: web::Json<HumorUpdate>,
) -> Result<HttpResponse, AppError> {
    let level = HumorLevel::try_new(body.level).ok_or_else(|| {
        AppError::ValidationError(format!("Humor level must be between 0 and 100, got {}", body.level))
    })?;
    state.preferences.save_humor(level)?;
    info!(humor = level.value(), "Humor preference updated");

    Ok(HttpResponse::Ok().json(json!({
        "status": "success",
        "key": HUMOR_LEVEL_KEY,
        "level": level,
        "band": level.band(),
        "label": level.band().label(),
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
