//! # Speech & Conversation Tracker
//!
//! Projection of the transport's `speech_detection` and `conversation_state`
//! events onto two observable values plus the latest voice-activity level.
//! Nothing here drives the transport; microphone muting is the transport's
//! own business.

use serde::{Deserialize, Serialize};

/// Who is currently speaking. Both may be true at once (barge-in).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeechDetectionState {
    pub is_user_speaking: bool,
    pub is_ai_speaking: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationPhase {
    #[default]
    Idle,
    Listening,
    Processing,
    Speaking,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationState {
    pub state: ConversationPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Default)]
pub struct SpeechTracker {
    speech: SpeechDetectionState,
    conversation: ConversationState,
    voice_level: f32,
}

impl SpeechTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the state actually changed.
    pub fn apply_speech(&mut self, state: SpeechDetectionState) -> bool {
        let changed = self.speech != state;
        self.speech = state;
        changed
    }

    /// Store the new phase; returns the text to announce, if any.
    pub fn apply_conversation(&mut self, state: ConversationState) -> Option<String> {
        let announcement = state.message.clone();
        self.conversation = state;
        announcement
    }

    pub fn set_voice_level(&mut self, level: f32) {
        self.voice_level = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 };
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.conversation = ConversationState {
            state: ConversationPhase::Error,
            message: Some(message.into()),
        };
    }

    #[cfg(test)]
    pub fn speech(&self) -> SpeechDetectionState {
        self.speech
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn voice_level(&self) -> f32 {
        self.voice_level
    }

    /// The typing indicator mirrors assistant speech.
    pub fn show_typing_indicator(&self) -> bool {
        self.speech.is_ai_speaking
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
