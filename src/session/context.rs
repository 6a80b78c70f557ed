//! Per-session state container and the effect outbox.
//!
//! The router and dispatcher are synchronous: they mutate [`SessionState`]
//! and record everything that needs I/O in an [`Outbox`]. The controller
//! drains the outbox after each event, sending updates to the client,
//! queuing persistence writes and running control requests on the transport.

use crate::conversation::{LiveTranscriptBuffer, Message, Role, SpeechTracker};
use crate::persona::{HumorLevel, UserIdentity};
use crate::screening::ScreeningEngine;
use crate::session::events::SessionUpdate;
use crate::session::model::Session;
use crate::session::notifications::Notification;
use crate::session::persistence::PersistenceOp;
use serde_json::Value;

/// Session-level operation requested by a command or function call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlRequest {
    Pause,
    Resume,
    /// End after the close grace delay
    Close,
}

#[derive(Debug, Default)]
pub struct Outbox {
    pub updates: Vec<SessionUpdate>,
    pub persistence: Vec<PersistenceOp>,
    pub controls: Vec<ControlRequest>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, update: SessionUpdate) {
        self.updates.push(update);
    }

    pub fn persist(&mut self, op: PersistenceOp) {
        self.persistence.push(op);
    }

    pub fn control(&mut self, request: ControlRequest) {
        self.controls.push(request);
    }
}

/// Everything one session owns. Only the controller task touches it.
#[derive(Debug)]
pub struct SessionState {
    pub session: Session,
    pub identity: UserIdentity,
    pub humor: HumorLevel,
    pub messages: Vec<Message>,
    pub engine: ScreeningEngine,
    pub tracker: SpeechTracker,
    pub live: LiveTranscriptBuffer,
    pub caption: Option<String>,
    pub notification: Option<Notification>,
}

impl SessionState {
    pub fn new(identity: UserIdentity, humor: HumorLevel) -> Self {
        Self {
            session: Session::new(),
            identity,
            humor,
            messages: Vec::new(),
            engine: ScreeningEngine::new(),
            tracker: SpeechTracker::new(),
            live: LiveTranscriptBuffer::new(),
            caption: None,
            notification: None,
        }
    }

    pub fn first_name(&self) -> String {
        self.identity.first_name()
    }

    pub fn pet_names(&self) -> Vec<String> {
        self.identity.pet_name_candidates()
    }

    /// Append to the visible conversation and the transcript.
    ///
    /// `counted` messages bump the session message counter; command
    /// confirmations and system lines do not.
    pub fn append(&mut self, message: Message, counted: bool, metadata: Value, outbox: &mut Outbox) {
        let op = match message.role {
            Role::User => PersistenceOp::AddUserMessage {
                text: message.text.clone(),
                kind: message.kind,
                metadata,
            },
            Role::Assistant => PersistenceOp::AddAssistantMessage {
                text: message.text.clone(),
                kind: message.kind,
                metadata,
            },
        };
        outbox.persist(op);

        if counted {
            self.session.increment_message_count();
        }
        outbox.update(SessionUpdate::MessageAppended {
            message: message.clone(),
        });
        self.messages.push(message);
    }

    /// Drop everything tied to the current run of the session.
    pub fn clear_local(&mut self) {
        self.messages.clear();
        self.engine.reset();
        self.tracker.reset();
        self.live.clear();
        self.caption = None;
        self.notification = None;
    }
}
