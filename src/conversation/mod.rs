//! # Conversation Model
//!
//! Messages, speaker/phase tracking and the rolling live-caption buffer.

pub mod live;       // Live transcript ring buffer
pub mod message;    // Message, Role, MessageKind, MessageFlags
pub mod tracker;    // Speech and conversation-phase projection

pub use live::LiveTranscriptBuffer;
pub use message::{Message, MessageFlags, MessageKind, Role};
pub use tracker::{ConversationState, SpeechDetectionState, SpeechTracker};
