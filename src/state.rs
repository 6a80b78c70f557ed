//! # Application State Management
//!
//! State shared by every HTTP handler and every session WebSocket. Sessions
//! themselves are not stored here: each one lives on its own controller task.
//! What is shared is the runtime configuration, the service counters and the
//! humor preference store.
//!
//! ## Key Rust Concepts:
//!
//! ### Arc<RwLock<T>> Pattern
//! - **Arc**: many handlers and actors hold the same state
//! - **RwLock**: many concurrent readers, or one writer
//!
//! ### Lock poisoning
//! A lock is "poisoned" when a thread panics while holding it. The counters
//! and config stay valid in that case, so the guards are recovered with
//! `PoisonError::into_inner` instead of propagating the panic.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::session::events::SessionUpdate;
use crate::session::{InMemoryProgressStore, InMemoryTranscriptStore, PreferenceStore, Stores};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// Shared across all HTTP request handlers and session actors.
///
/// ## Rust Concepts:
/// - **#[derive(Clone)]**: cloning only bumps the `Arc` reference counts
/// - **Arc<dyn PreferenceStore>**: the store is chosen at startup (file in
///   production, in-memory in tests)
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration (can be updated at runtime)
    pub config: Arc<RwLock<AppConfig>>,

    /// Session and screening counters
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// Persisted humor level, shared by all sessions
    pub preferences: Arc<dyn PreferenceStore>,

    /// When the server started
    pub start_time: Instant,
}

/// Counters collected across all sessions.
///
/// ## Why these metrics matter:
/// - **active_sessions**: open WebSocket sessions right now
/// - **messages_routed**: conversation volume
/// - **assessments_completed / crisis_flags**: screening outcomes
/// - **connection_errors**: transport health as seen by clients
#[derive(Debug, Default, Clone, Serialize)]
pub struct AppMetrics {
    pub active_sessions: u32,
    pub total_sessions: u64,
    pub messages_routed: u64,
    pub function_calls: u64,
    pub function_failures: u64,
    pub assessments_started: u64,
    pub assessments_completed: u64,
    pub crisis_flags: u64,
    pub connection_errors: u64,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl AppState {
    pub fn new(config: AppConfig, preferences: Arc<dyn PreferenceStore>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            preferences,
            start_time: Instant::now(),
        }
    }

    /// Get a copy of the current configuration.
    ///
    /// ## Why clone:
    /// Cloning releases the lock immediately, so other threads aren't blocked.
    pub fn get_config(&self) -> AppConfig {
        read(&self.config).clone()
    }

    /// Replace the configuration after validating it.
    ///
    /// Running sessions keep the config they were started with; new
    /// sessions pick up the change.
    pub fn update_config(&self, new_config: AppConfig) -> AppResult<()> {
        new_config
            .validate()
            .map_err(|e| AppError::ValidationError(e.to_string()))?;
        *write(&self.config) = new_config;
        Ok(())
    }

    /// Stores for a new session. Transcript and progress records are
    /// per-session; the preference store is shared.
    pub fn session_stores(&self) -> Stores {
        Stores {
            transcript: Arc::new(InMemoryTranscriptStore::new()),
            progress: Arc::new(InMemoryProgressStore::new()),
            preferences: self.preferences.clone(),
        }
    }

    pub fn increment_active_sessions(&self) {
        let mut metrics = write(&self.metrics);
        metrics.active_sessions += 1;
        metrics.total_sessions += 1;
    }

    /// Saturates at zero so an unbalanced decrement can't wrap.
    pub fn decrement_active_sessions(&self) {
        let mut metrics = write(&self.metrics);
        metrics.active_sessions = metrics.active_sessions.saturating_sub(1);
    }

    /// Bump counters for an update a session sent to its client.
    pub fn record_update(&self, update: &SessionUpdate) {
        let mut metrics = write(&self.metrics);
        match update {
            SessionUpdate::MessageAppended { .. } => metrics.messages_routed += 1,
            SessionUpdate::FunctionResult { result, .. } => {
                metrics.function_calls += 1;
                if result.get("success").and_then(|v| v.as_bool()) != Some(true) {
                    metrics.function_failures += 1;
                }
            }
            SessionUpdate::AssessmentStarted { .. } => metrics.assessments_started += 1,
            SessionUpdate::AssessmentCompleted { result } => {
                metrics.assessments_completed += 1;
                if result.crisis_flag {
                    metrics.crisis_flags += 1;
                }
            }
            SessionUpdate::Error { .. } => metrics.connection_errors += 1,
            _ => {}
        }
    }

    /// Get a snapshot of current metrics (used for the /metrics endpoint).
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        read(&self.metrics).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::preferences::InMemoryPreferenceStore;
    use serde_json::json;

    fn state() -> AppState {
        AppState::new(AppConfig::default(), Arc::new(InMemoryPreferenceStore::default()))
    }

    #[test]
    fn test_active_sessions_never_underflow() {
        let state = state();
        state.decrement_active_sessions();
        state.increment_active_sessions();
        state.decrement_active_sessions();
        state.decrement_active_sessions();

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.active_sessions, 0);
        assert_eq!(metrics.total_sessions, 1);
    }

    #[test]
    fn test_function_results_are_counted() {
        let state = state();
        state.record_update(&SessionUpdate::FunctionResult {
            call_id: "c1".to_string(),
            name: "invoke-phq2".to_string(),
            result: json!({ "success": true }),
        });
        state.record_update(&SessionUpdate::FunctionResult {
            call_id: "c2".to_string(),
            name: "launch".to_string(),
            result: json!({ "success": false, "error": "unknown function" }),
        });

        let metrics = state.get_metrics_snapshot();
        assert_eq!(metrics.function_calls, 2);
        assert_eq!(metrics.function_failures, 1);
    }

    #[test]
    fn test_invalid_config_update_is_rejected() {
        let state = state();
        let mut config = state.get_config();
        config.server.port = 0;

        assert!(matches!(state.update_config(config), Err(AppError::ValidationError(_))));
        assert_eq!(state.get_config().server.port, 8080);
    }
}
