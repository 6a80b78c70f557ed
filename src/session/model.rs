//! # Session Model
//!
//! Lifecycle of one orchestrated voice session.
//!
//! ## Session Lifecycle:
//! 1. **Inactive**: created, transport not started yet
//! 2. **Active**: transport connected, speech is routed
//! 3. **Paused**: transport kept open, only commands are acted on
//! 4. **Ended**: local state cleared; a new start creates a fresh session

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Inactive,
    Active,
    Paused,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Inactive => "inactive",
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Ended => "ended",
        }
    }
}

/// Transport connection as last reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    status: SessionStatus,
    connection: ConnectionStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    message_count: u64,
}

/// Serializable view of a session for status updates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub status: SessionStatus,
    pub connection: ConnectionStatus,
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    pub message_count: u64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            session_id: format!("session-{}", Uuid::new_v4().simple()),
            status: SessionStatus::Inactive,
            connection: ConnectionStatus::Disconnected,
            started_at: None,
            ended_at: None,
            message_count: 0,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.connection
    }

    pub fn set_connection(&mut self, connection: ConnectionStatus) {
        self.connection = connection;
    }

    /// Active or paused; the transport is up either way.
    pub fn is_live(&self) -> bool {
        matches!(self.status, SessionStatus::Active | SessionStatus::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.status == SessionStatus::Paused
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    pub fn increment_message_count(&mut self) {
        self.message_count += 1;
    }

    /// ## State Transition:
    /// Inactive → Active
    pub fn activate(&mut self) -> Result<(), String> {
        match self.status {
            SessionStatus::Inactive => {
                self.status = SessionStatus::Active;
                self.started_at = Some(Utc::now());
                Ok(())
            }
            other => Err(format!("Cannot activate session from status: {}", other.as_str())),
        }
    }

    /// ## State Transition:
    /// Active → Paused
    pub fn pause(&mut self) -> Result<(), String> {
        match self.status {
            SessionStatus::Active => {
                self.status = SessionStatus::Paused;
                Ok(())
            }
            other => Err(format!("Cannot pause from status: {}", other.as_str())),
        }
    }

    /// ## State Transition:
    /// Paused → Active
    pub fn resume(&mut self) -> Result<(), String> {
        match self.status {
            SessionStatus::Paused => {
                self.status = SessionStatus::Active;
                Ok(())
            }
            other => Err(format!("Cannot resume from status: {}", other.as_str())),
        }
    }

    /// ## State Transition:
    /// any → Ended. Idempotent; clears the counter.
    pub fn end(&mut self) {
        if self.status != SessionStatus::Ended {
            self.ended_at = Some(Utc::now());
        }
        self.status = SessionStatus::Ended;
        self.connection = ConnectionStatus::Disconnected;
        self.message_count = 0;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            status: self.status,
            connection: self.connection,
            started_at: self.started_at,
            ended_at: self.ended_at,
            message_count: self.message_count,
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
