//! User-visible notifications, mainly connection-loss reporting.
//!
//! Reconnect backoff belongs to the transport. The orchestrator only turns
//! `(attempt, max_attempts)` into a notice: a dismissible warning while
//! attempts remain, a sticky error once they are exhausted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub id: String,
    pub level: NotificationLevel,
    pub message: String,
    pub dismissible: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>, dismissible: bool) -> Self {
        Self {
            id: format!("notice-{}", Uuid::new_v4().simple()),
            level,
            message: message.into(),
            dismissible,
            created_at: Utc::now(),
        }
    }

    /// Dismissible warnings go away on their own after a delay.
    pub fn auto_dismisses(&self) -> bool {
        self.dismissible && self.level == NotificationLevel::Warning
    }
}

/// Notice for a transport reconnect attempt.
pub fn connection_lost(attempt: u32, max_attempts: u32) -> Notification {
    if attempt >= max_attempts {
        Notification::new(
            NotificationLevel::Error,
            format!(
                "Connection lost. Unable to reconnect after {} attempts. Please refresh the page.",
                max_attempts
            ),
            false,
        )
    } else {
        Notification::new(
            NotificationLevel::Warning,
            format!(
                "Connection lost. Reconnecting... (Attempt {}/{})",
                attempt, max_attempts
            ),
            true,
        )
    }
}
