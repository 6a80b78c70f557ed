//! # Session Event Protocol
//!
//! Everything that reaches a session controller is a [`SessionEvent`];
//! everything it produces for the client is a [`SessionUpdate`]. Both travel
//! as JSON over the session WebSocket, tagged by `type`.
//!
//! ## Client → Server:
//! Control requests (`start`, `end`, `pause`, `resume`, `interrupt`) and the
//! transport's own events (`message`, `speech_detection`, `function_call`, ...)
//!
//! ## Server → Client:
//! UI updates plus `command` frames the client executes on the transport.

use crate::conversation::live::LiveFragment;
use crate::conversation::{ConversationState, Message, Role, SpeechDetectionState};
use crate::persona::{HumorBand, HumorLevel, UserIdentity};
use crate::screening::{AssessmentResult, ScreeningType};
use crate::session::model::{ConnectionStatus, SessionSnapshot};
use crate::session::notifications::Notification;
use crate::session::transport::TransportCommand;
use serde::{Deserialize, Serialize};

/// Inbound event, drained one at a time by the controller.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Client asks to open a session
    Start {
        user: UserIdentity,
        #[serde(default)]
        existing_session_id: Option<String>,
    },
    End,
    Pause,
    Resume,
    Interrupt,

    /// Finalized utterance from either side
    Message {
        role: Role,
        text: String,
        #[serde(default)]
        is_transcript: bool,
    },
    VoiceActivity {
        level: f32,
    },
    StatusChange {
        status: ConnectionStatus,
    },
    SpeechDetection(SpeechDetectionState),
    ConversationState(ConversationState),
    /// User-side live transcript fragment
    LiveTranscript {
        text: String,
        #[serde(default)]
        is_final: bool,
    },
    ConnectionLost {
        attempt: u32,
        max_attempts: u32,
    },
    /// Assistant speech caption
    Transcript {
        text: String,
        #[serde(default)]
        is_final: bool,
    },
    Error {
        message: String,
    },
    FunctionCall {
        call_id: String,
        name: String,
        #[serde(default)]
        arguments: serde_json::Value,
    },

    /// Posted back into the queue by the controller's own timers
    #[serde(skip)]
    Timer(TimerEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    CloseGraceElapsed,
    DismissNotification { id: String },
    ClearCaption { text: String },
}

/// Outbound update for the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionUpdate {
    MessageAppended {
        message: Message,
    },
    Session {
        session: SessionSnapshot,
    },
    Notification {
        notification: Notification,
    },
    NotificationDismissed {
        id: String,
    },
    /// Screen-reader announcement
    Announcement {
        text: String,
    },
    Speech {
        state: SpeechDetectionState,
        typing_indicator: bool,
    },
    VoiceActivity {
        level: f32,
    },
    Conversation {
        state: ConversationState,
    },
    Caption {
        text: Option<String>,
    },
    LiveTranscript {
        fragments: Vec<LiveFragment>,
    },
    HumorLevel {
        level: HumorLevel,
        band: HumorBand,
    },
    AssessmentStarted {
        assessment_id: String,
        screening_type: ScreeningType,
    },
    AssessmentCompleted {
        result: AssessmentResult,
    },
    /// Screening context for the client to inject into the model's
    /// conversation after an unusable answer, so both stay on the same item.
    ScreeningPrompt {
        assessment_id: String,
        question_number: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        attempts_remaining: Option<u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        skipped_question: Option<u8>,
        response_scale: String,
        instruction: String,
    },
    FunctionResult {
        call_id: String,
        name: String,
        result: serde_json::Value,
    },
    Command {
        command: TransportCommand,
    },
    Error {
        code: String,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_event_parsing() {
        let event: SessionEvent = serde_json::from_str(
            r#"{"type":"function_call","call_id":"c1","name":"invoke-phq2","arguments":{}}"#,
        )
        .unwrap();
        assert!(matches!(event, SessionEvent::FunctionCall { ref name, .. } if name == "invoke-phq2"));

        let event: SessionEvent = serde_json::from_str(
            r#"{"type":"speech_detection","is_user_speaking":false,"is_ai_speaking":true}"#,
        )
        .unwrap();
        assert!(matches!(event, SessionEvent::SpeechDetection(state) if state.is_ai_speaking));

        let event: SessionEvent =
            serde_json::from_str(r#"{"type":"start","user":{"user_id":"u1","display_name":"Alex Kim"}}"#).unwrap();
        assert!(matches!(event, SessionEvent::Start { existing_session_id: None, .. }));

        let event: SessionEvent = serde_json::from_str(r#"{"type":"pause"}"#).unwrap();
        assert!(matches!(event, SessionEvent::Pause));
    }

    #[test]
    fn test_timer_events_cannot_come_from_the_wire() {
        assert!(serde_json::from_str::<SessionEvent>(r#"{"type":"timer"}"#).is_err());
    }

    #[test]
    fn test_update_serialization() {
        let update = SessionUpdate::Caption {
            text: Some("Hello".to_string()),
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json["type"], "caption");
        assert_eq!(json["text"], "Hello");
    }
}
