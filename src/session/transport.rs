//! # Voice Transport Seam
//!
//! The duplex voice transport (realtime model connection, microphone,
//! playback) lives outside this service. The controller drives it through
//! the [`Transport`] trait; [`ClientTransport`] implements it by sending
//! command frames to the browser that owns the real connection.

use crate::config::RealtimeConfig;
use crate::dispatch::ToolDefinition;
use crate::error::{AppError, AppResult};
use crate::persona::UserIdentity;
use crate::session::events::SessionUpdate;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;

/// Turn-detection settings handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnDetection {
    pub threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
}

/// Everything the transport needs to open a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RealtimeSessionConfig {
    pub instructions: String,
    pub voice: String,
    pub temperature: f32,
    pub turn_detection: TurnDetection,
    pub enable_input_transcription: bool,
    pub tools: Vec<ToolDefinition>,
}

impl RealtimeSessionConfig {
    pub fn new(realtime: &RealtimeConfig, instructions: String, tools: Vec<ToolDefinition>) -> Self {
        Self {
            instructions,
            voice: realtime.voice.clone(),
            temperature: realtime.temperature,
            turn_detection: TurnDetection {
                threshold: realtime.turn_detection_threshold,
                prefix_padding_ms: realtime.prefix_padding_ms,
                silence_duration_ms: realtime.silence_duration_ms,
            },
            enable_input_transcription: realtime.enable_input_transcription,
            tools,
        }
    }
}

/// Commands the orchestrator issues to the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TransportCommand {
    Initialize,
    StartSession {
        user: UserIdentity,
        config: RealtimeSessionConfig,
    },
    PauseSession,
    ResumeSession,
    EndSession,
    InterruptResponse,
    Destroy,
}

impl TransportCommand {
    pub fn name(&self) -> &'static str {
        match self {
            TransportCommand::Initialize => "initialize",
            TransportCommand::StartSession { .. } => "start_session",
            TransportCommand::PauseSession => "pause_session",
            TransportCommand::ResumeSession => "resume_session",
            TransportCommand::EndSession => "end_session",
            TransportCommand::InterruptResponse => "interrupt_response",
            TransportCommand::Destroy => "destroy",
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Called once per controller, before the first session starts.
    async fn initialize(&self) -> AppResult<()>;
    async fn start_session(&self, user: &UserIdentity, config: &RealtimeSessionConfig) -> AppResult<()>;
    async fn pause_session(&self) -> AppResult<()>;
    async fn resume_session(&self) -> AppResult<()>;
    async fn end_session(&self) -> AppResult<()>;
    async fn interrupt_response(&self) -> AppResult<()>;
    async fn destroy(&self) -> AppResult<()>;
}

/// Forwards commands to the WebSocket client.
pub struct ClientTransport {
    updates: UnboundedSender<SessionUpdate>,
}

impl ClientTransport {
    pub fn new(updates: UnboundedSender<SessionUpdate>) -> Self {
        Self { updates }
    }

    fn send(&self, command: TransportCommand) -> AppResult<()> {
        let name = command.name();
        self.updates
            .send(SessionUpdate::Command { command })
            .map_err(|_| AppError::Connection(format!("Client channel closed while sending {}", name)))
    }
}

#[async_trait]
impl Transport for ClientTransport {
    async fn initialize(&self) -> AppResult<()> {
        self.send(TransportCommand::Initialize)
    }

    async fn start_session(&self, user: &UserIdentity, config: &RealtimeSessionConfig) -> AppResult<()> {
        self.send(TransportCommand::StartSession {
            user: user.clone(),
            config: config.clone(),
        })
    }

    async fn pause_session(&self) -> AppResult<()> {
        self.send(TransportCommand::PauseSession)
    }

    async fn resume_session(&self) -> AppResult<()> {
        self.send(TransportCommand::ResumeSession)
    }

    async fn end_session(&self) -> AppResult<()> {
        self.send(TransportCommand::EndSession)
    }

    async fn interrupt_response(&self) -> AppResult<()> {
        self.send(TransportCommand::InterruptResponse)
    }

    async fn destroy(&self) -> AppResult<()> {
        self.send(TransportCommand::Destroy)
    }
}
