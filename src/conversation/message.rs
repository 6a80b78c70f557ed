//! Conversation messages and the metadata attached to them.

use crate::screening::ScreeningType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// Category recorded with every transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    VoiceInput,
    AgentResponse,
    Greeting,
    SessionPause,
    SessionResume,
    SessionClose,
    HelpCommand,
    HumorChange,
    PhqAnswer,
    PhqQuestion,
    CrisisResources,
    PhqSummary,
}

/// Screening and transcript metadata carried by a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageFlags {
    pub is_transcript: bool,
    pub is_partial: bool,
    pub is_phq_question: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phq_type: Option<ScreeningType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phq_question_number: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessment_id: Option<String>,
    pub is_phq_answer: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phq_answer_value: Option<u8>,
}

/// One entry of the visible conversation.
///
/// Messages are never edited after they are appended; any marker stripping
/// happens before construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub kind: MessageKind,
    pub flags: MessageFlags,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>, kind: MessageKind) -> Self {
        Self {
            id: format!("msg-{}", Uuid::new_v4().simple()),
            role,
            text: text.into(),
            timestamp: Utc::now(),
            kind,
            flags: MessageFlags::default(),
        }
    }

    pub fn user(text: impl Into<String>, kind: MessageKind) -> Self {
        Self::new(Role::User, text, kind)
    }

    pub fn assistant(text: impl Into<String>, kind: MessageKind) -> Self {
        Self::new(Role::Assistant, text, kind)
    }

    pub fn with_flags(mut self, flags: MessageFlags) -> Self {
        self.flags = flags;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serialization() {
        let message = Message::assistant("Question 1: ...", MessageKind::PhqQuestion).with_flags(MessageFlags {
            is_phq_question: true,
            phq_type: Some(ScreeningType::Phq2),
            phq_question_number: Some(1),
            ..Default::default()
        });

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["kind"], "phq-question");
        assert_eq!(json["flags"]["phq_type"], "PHQ-2");
        assert_eq!(json["flags"]["phq_question_number"], 1);
        assert!(json["flags"].get("assessment_id").is_none());
    }
}
