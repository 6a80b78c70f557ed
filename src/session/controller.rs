//! # Session Controller
//!
//! Owns one orchestrated voice session and drains its event queue.
//!
//! ## Event flow:
//! 1. The WebSocket bridge parses client JSON into [`SessionEvent`]s
//! 2. [`SessionController::run`] handles them one at a time, to completion
//! 3. Router and dispatcher mutate [`SessionState`] and fill an [`Outbox`]
//! 4. The outbox is applied: updates to the client, writes to the
//!    persistence worker, control requests to the transport
//!
//! Timers (close grace, notification auto-dismiss, caption hold) never touch
//! the state directly. They sleep, then post a [`TimerEvent`] back into the
//! same queue, so every mutation happens on this task.
//!
//! ## Rust Concepts Demonstrated:
//! - **Weak senders**: timers hold a `WeakUnboundedSender`, so a pending
//!   timer never keeps a closed session's queue alive
//! - **Trait objects**: transport, stores, classifier and random source are
//!   all injected as `dyn Trait`

use crate::config::AppConfig;
use crate::conversation::{Message, MessageKind, Role};
use crate::dispatch::{tool_definitions, FunctionDispatcher};
use crate::error::{AppError, AppResult};
use crate::persona::{compose, HumorLevel, RandomSource, StdRandom, UserIdentity};
#[cfg(test)]
use crate::routing::IntentClassifier;
use crate::routing::{MessageRouter, PatternIntentClassifier};
use crate::session::context::{ControlRequest, Outbox, SessionState};
use crate::session::events::{SessionEvent, SessionUpdate, TimerEvent};
use crate::session::model::{ConnectionStatus, SessionStatus};
use crate::session::notifications::{self, Notification, NotificationLevel};
use crate::session::persistence::{spawn_worker, PersistenceHandle, PersistenceOp, Stores};
use crate::session::preferences::PreferenceStore;
use crate::session::transport::{RealtimeSessionConfig, Transport};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tracing::{debug, error, info, warn};

const CONNECT_FAILED: &str =
    "Unable to connect to the voice service. Please check your connection and try again.";

pub struct SessionController {
    state: SessionState,
    config: AppConfig,
    transport: Arc<dyn Transport>,
    persistence: PersistenceHandle,
    preferences: Arc<dyn PreferenceStore>,
    router: MessageRouter,
    dispatcher: FunctionDispatcher,
    rng: Box<dyn RandomSource>,
    updates: UnboundedSender<SessionUpdate>,
    timers: WeakUnboundedSender<SessionEvent>,
    transport_initialized: bool,
    close_pending: bool,
}

impl SessionController {
    /// Build a controller whose timers post into `events`.
    ///
    /// Spawns the persistence worker, so this must run inside a tokio runtime.
    pub fn new(
        config: AppConfig,
        transport: Arc<dyn Transport>,
        stores: Stores,
        updates: UnboundedSender<SessionUpdate>,
        events: &UnboundedSender<SessionEvent>,
    ) -> Self {
        let preferences = stores.preferences.clone();
        let humor = HumorLevel::clamped(i64::from(config.preferences.default_humor_level));

        Self {
            state: SessionState::new(UserIdentity::default(), humor),
            config,
            transport,
            persistence: spawn_worker(stores),
            preferences,
            router: MessageRouter::new(Box::new(PatternIntentClassifier)),
            dispatcher: FunctionDispatcher::new(),
            rng: Box::new(StdRandom::from_entropy()),
            updates,
            timers: events.downgrade(),
            transport_initialized: false,
            close_pending: false,
        }
    }

    #[cfg(test)]
    pub fn with_classifier(mut self, classifier: Box<dyn IntentClassifier>) -> Self {
        self.router = MessageRouter::new(classifier);
        self
    }

    #[cfg(test)]
    pub fn with_random(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Wait until every queued persistence write has been applied.
    pub async fn flush_persistence(&self) {
        self.persistence.flush().await;
    }

    /// Drain the queue until every sender is gone, then tear down.
    pub async fn run(mut self, mut events: UnboundedReceiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }

        debug!(session_id = %self.state.session.session_id, "Event queue closed");
        self.end_session().await;
        // Closing records must land before the task exits
        self.flush_persistence().await;
        if self.transport_initialized {
            if let Err(err) = self.transport.destroy().await {
                debug!(error = %err, "Transport destroy failed");
            }
        }
    }

    pub async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Start {
                user,
                existing_session_id,
            } => {
                if let Err(err) = self.start_session(user, existing_session_id).await {
                    error!(error = %err, "Session start failed");
                }
            }
            SessionEvent::End => self.end_session().await,
            SessionEvent::Pause => self.pause_session().await,
            SessionEvent::Resume => self.resume_session().await,
            SessionEvent::Interrupt => self.interrupt_response().await,
            SessionEvent::Message {
                role,
                text,
                is_transcript,
            } => self.on_message(role, &text, is_transcript).await,
            SessionEvent::VoiceActivity { level } => {
                self.state.tracker.set_voice_level(level);
                self.publish(SessionUpdate::VoiceActivity {
                    level: self.state.tracker.voice_level(),
                });
            }
            SessionEvent::StatusChange { status } => self.on_status_change(status),
            SessionEvent::SpeechDetection(speech) => {
                if self.state.tracker.apply_speech(speech) {
                    self.publish(SessionUpdate::Speech {
                        state: speech,
                        typing_indicator: self.state.tracker.show_typing_indicator(),
                    });
                }
            }
            SessionEvent::ConversationState(conversation) => {
                if let Some(text) = self.state.tracker.apply_conversation(conversation.clone()) {
                    self.publish(SessionUpdate::Announcement { text });
                }
                self.publish(SessionUpdate::Conversation { state: conversation });
            }
            SessionEvent::LiveTranscript { text, is_final } => {
                self.state.live.push(text, is_final);
                self.publish_live_transcript();
            }
            SessionEvent::ConnectionLost {
                attempt,
                max_attempts,
            } => self.on_connection_lost(attempt, max_attempts),
            SessionEvent::Transcript { text, is_final } => self.on_transcript(text, is_final),
            SessionEvent::Error { message } => self.on_transport_error(message),
            SessionEvent::FunctionCall {
                call_id,
                name,
                arguments,
            } => self.on_function_call(call_id, name, arguments).await,
            SessionEvent::Timer(timer) => self.on_timer(timer).await,
        }
    }

    /// Open the transport and greet the user.
    ///
    /// A start while already live or connecting is ignored. A failed start
    /// leaves the connection in `Error` with a notification; it is not retried.
    pub async fn start_session(&mut self, user: UserIdentity, existing_session_id: Option<String>) -> AppResult<()> {
        if self.state.session.is_live() || self.state.session.connection() == ConnectionStatus::Connecting {
            debug!(session_id = %self.state.session.session_id, "Session already active, ignoring start");
            return Ok(());
        }

        let default_humor = HumorLevel::clamped(i64::from(self.config.preferences.default_humor_level));
        let humor = self.preferences.humor_or(default_humor);
        self.state = SessionState::new(user, humor);
        self.close_pending = false;
        self.state.session.set_connection(ConnectionStatus::Connecting);
        self.publish_session();

        if !self.transport_initialized {
            if let Err(err) = self.transport.initialize().await {
                return Err(self.fail_start(err));
            }
            self.transport_initialized = true;
        }

        let first_name = self.state.first_name();
        let pet_names = self.state.pet_names();
        let personalization = compose(humor, &first_name, &pet_names, self.rng.as_mut());
        let realtime = RealtimeSessionConfig::new(
            &self.config.realtime,
            personalization.instructions,
            tool_definitions(),
        );

        if let Err(err) = self.transport.start_session(&self.state.identity, &realtime).await {
            return Err(self.fail_start(err));
        }

        self.state.session.activate().map_err(AppError::Internal)?;
        self.state.session.set_connection(ConnectionStatus::Connected);

        let mut outbox = Outbox::new();
        outbox.persist(PersistenceOp::InitializeTranscript {
            user_id: self.state.identity.user_id.clone(),
            existing_session_id,
        });
        outbox.update(SessionUpdate::HumorLevel {
            level: humor,
            band: humor.band(),
        });
        self.state.append(
            Message::assistant(personalization.greeting, MessageKind::Greeting),
            false,
            json!({ "humor_level": humor.value(), "band": personalization.band }),
            &mut outbox,
        );
        self.apply_outbox(outbox).await;

        self.publish_live_transcript();
        self.publish(SessionUpdate::Caption { text: None });
        self.publish_session();

        info!(
            session_id = %self.state.session.session_id,
            user_id = %self.state.identity.user_id,
            humor = humor.value(),
            "Session started"
        );
        Ok(())
    }

    fn fail_start(&mut self, err: AppError) -> AppError {
        error!(session_id = %self.state.session.session_id, error = %err, "Voice transport failed to start");

        self.state.session.set_connection(ConnectionStatus::Error);
        let notice = Notification::new(NotificationLevel::Error, CONNECT_FAILED, true);
        self.show_notification(notice);
        self.publish(SessionUpdate::Error {
            code: err.code().to_string(),
            message: err.message().to_string(),
        });
        self.publish_session();
        err
    }

    /// Best-effort teardown. Local state is cleared even if the transport fails.
    pub async fn end_session(&mut self) {
        let was_open = self.state.session.is_live()
            || (self.state.session.status() == SessionStatus::Inactive
                && self.state.session.connection() != ConnectionStatus::Disconnected);

        if was_open {
            if let Err(err) = self.transport.end_session().await {
                warn!(session_id = %self.state.session.session_id, error = %err, "Transport end failed");
            }
            self.persistence.submit(PersistenceOp::EndProgress);
            self.persistence.submit(PersistenceOp::EndTranscript);
        }

        let already_ended = self.state.session.status() == SessionStatus::Ended;
        self.close_pending = false;
        self.state.clear_local();
        self.state.session.end();

        if !already_ended {
            info!(session_id = %self.state.session.session_id, "Session ended");
        }
        self.publish_live_transcript();
        self.publish(SessionUpdate::Caption { text: None });
        self.publish_session();
    }

    pub async fn pause_session(&mut self) {
        if self.state.session.status() != SessionStatus::Active {
            debug!(status = self.state.session.status().as_str(), "Pause ignored");
            return;
        }

        if let Err(err) = self.transport.pause_session().await {
            error!(session_id = %self.state.session.session_id, error = %err, "Transport pause failed");
            self.publish_error(&err);
        }
        if let Err(err) = self.state.session.pause() {
            warn!(error = %err, "Pause rejected");
            return;
        }

        info!(session_id = %self.state.session.session_id, "Session paused");
        self.publish(SessionUpdate::Announcement {
            text: "Session paused".to_string(),
        });
        self.publish_session();
    }

    pub async fn resume_session(&mut self) {
        if !self.state.session.is_paused() {
            debug!(status = self.state.session.status().as_str(), "Resume ignored");
            return;
        }

        if let Err(err) = self.transport.resume_session().await {
            error!(session_id = %self.state.session.session_id, error = %err, "Transport resume failed");
            self.publish_error(&err);
        }
        if let Err(err) = self.state.session.resume() {
            warn!(error = %err, "Resume rejected");
            return;
        }

        info!(session_id = %self.state.session.session_id, "Session resumed");
        self.publish(SessionUpdate::Announcement {
            text: "Session resumed".to_string(),
        });
        self.publish_session();
    }

    /// Abort the in-flight assistant utterance. The screening engine is untouched.
    pub async fn interrupt_response(&mut self) {
        if !self.state.session.is_live() {
            debug!("Interrupt ignored, no live session");
            return;
        }

        match self.transport.interrupt_response().await {
            Ok(()) => debug!(session_id = %self.state.session.session_id, "Response interrupted"),
            Err(err) => {
                error!(session_id = %self.state.session.session_id, error = %err, "Interrupt failed");
                self.publish(SessionUpdate::Announcement {
                    text: "Unable to interrupt the response".to_string(),
                });
                self.publish_error(&err);
            }
        }
    }

    async fn on_message(&mut self, role: Role, text: &str, is_transcript: bool) {
        if !self.state.session.is_live() {
            debug!(status = self.state.session.status().as_str(), "Message outside a live session ignored");
            return;
        }

        let count_before = self.state.session.message_count();
        let mut outbox = Outbox::new();
        let outcome = self.router.route(
            role,
            text,
            is_transcript,
            &mut self.state,
            &mut outbox,
            self.rng.as_mut(),
        );
        debug!(session_id = %self.state.session.session_id, ?outcome, "Message routed");

        self.apply_outbox(outbox).await;
        if self.state.session.message_count() != count_before {
            self.publish_session();
        }
    }

    async fn on_function_call(&mut self, call_id: String, name: String, arguments: serde_json::Value) {
        let mut outbox = Outbox::new();
        let result = if self.state.session.is_live() {
            self.dispatcher.dispatch(&name, &arguments, &mut self.state, &mut outbox)
        } else {
            warn!(function = %name, "Function call outside a live session");
            json!({ "success": false, "error": "no active session" })
        };

        outbox.update(SessionUpdate::FunctionResult { call_id, name, result });
        self.apply_outbox(outbox).await;
    }

    fn on_status_change(&mut self, status: ConnectionStatus) {
        debug!(session_id = %self.state.session.session_id, ?status, "Transport status changed");
        self.state.session.set_connection(status);

        // A reconnect clears a lingering reconnect warning; terminal errors stay
        if status == ConnectionStatus::Connected
            && self.state.notification.as_ref().is_some_and(|n| n.dismissible)
        {
            if let Some(notice) = self.state.notification.take() {
                self.publish(SessionUpdate::NotificationDismissed { id: notice.id });
            }
        }
        self.publish_session();
    }

    fn on_connection_lost(&mut self, attempt: u32, max_attempts: u32) {
        let notice = notifications::connection_lost(attempt, max_attempts);

        if notice.level == NotificationLevel::Error {
            error!(session_id = %self.state.session.session_id, attempt, max_attempts, "Reconnect attempts exhausted");
            self.state.session.set_connection(ConnectionStatus::Error);
        } else {
            warn!(session_id = %self.state.session.session_id, attempt, max_attempts, "Connection lost, transport reconnecting");
            self.state.session.set_connection(ConnectionStatus::Disconnected);
        }

        if notice.auto_dismisses() {
            self.schedule(
                self.config.session.notification_dismiss_ms,
                TimerEvent::DismissNotification { id: notice.id.clone() },
            );
        }
        self.show_notification(notice);
        self.publish_session();
    }

    fn on_transcript(&mut self, text: String, is_final: bool) {
        self.state.caption = Some(text.clone());
        self.publish(SessionUpdate::Caption {
            text: Some(text.clone()),
        });
        if is_final {
            self.schedule(self.config.session.caption_hold_ms, TimerEvent::ClearCaption { text });
        }
    }

    fn on_transport_error(&mut self, message: String) {
        error!(session_id = %self.state.session.session_id, error = %message, "Transport reported an error");
        self.state.tracker.mark_error(message.clone());
        self.publish(SessionUpdate::Conversation {
            state: self.state.tracker.conversation().clone(),
        });
        self.publish_error(&AppError::Connection(message));
    }

    async fn on_timer(&mut self, timer: TimerEvent) {
        match timer {
            TimerEvent::CloseGraceElapsed => {
                if self.close_pending {
                    self.end_session().await;
                }
            }
            TimerEvent::DismissNotification { id } => {
                if self.state.notification.as_ref().is_some_and(|n| n.id == id) {
                    self.state.notification = None;
                    self.publish(SessionUpdate::NotificationDismissed { id });
                }
            }
            TimerEvent::ClearCaption { text } => {
                // A newer caption replaced this one; leave it alone
                if self.state.caption.as_deref() == Some(text.as_str()) {
                    self.state.caption = None;
                    self.publish(SessionUpdate::Caption { text: None });
                }
            }
        }
    }

    async fn apply_outbox(&mut self, outbox: Outbox) {
        let Outbox {
            updates,
            persistence,
            controls,
        } = outbox;

        for op in persistence {
            self.persistence.submit(op);
        }
        for update in updates {
            self.publish(update);
        }
        for control in controls {
            match control {
                ControlRequest::Pause => self.pause_session().await,
                ControlRequest::Resume => self.resume_session().await,
                ControlRequest::Close => {
                    if !self.close_pending {
                        self.close_pending = true;
                        info!(session_id = %self.state.session.session_id, "Session closing");
                        self.schedule(self.config.session.close_grace_ms, TimerEvent::CloseGraceElapsed);
                    }
                }
            }
        }
    }

    /// Post `timer` back into the queue after `delay_ms`.
    fn schedule(&self, delay_ms: u64, timer: TimerEvent) {
        let events = self.timers.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if let Some(events) = events.upgrade() {
                let _ = events.send(SessionEvent::Timer(timer));
            }
        });
    }

    fn show_notification(&mut self, notice: Notification) {
        self.publish(SessionUpdate::Announcement {
            text: notice.message.clone(),
        });
        self.publish(SessionUpdate::Notification {
            notification: notice.clone(),
        });
        self.state.notification = Some(notice);
    }

    fn publish_session(&self) {
        self.publish(SessionUpdate::Session {
            session: self.state.session.snapshot(),
        });
    }

    fn publish_live_transcript(&self) {
        self.publish(SessionUpdate::LiveTranscript {
            fragments: self.state.live.fragments().cloned().collect(),
        });
    }

    fn publish_error(&self, err: &AppError) {
        self.publish(SessionUpdate::Error {
            code: err.code().to_string(),
            message: err.message().to_string(),
        });
    }

    fn publish(&self, update: SessionUpdate) {
        if self.updates.send(update).is_err() {
            debug!(session_id = %self.state.session.session_id, "Client gone, update dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::intent::Intent;
    use crate::screening::Severity;
    use crate::session::testing::{Harness, RecordingTransport, StubClassifier};

    const Q1: &str = "[PHQ-Q1] Question 1: Over the last 2 weeks, how often have you been bothered by little interest or pleasure in doing things? Take your time.";
    const Q2: &str = "[PHQ-Q2] Question 2: Over the last 2 weeks, how often have you been bothered by feeling down, depressed, or hopeless?";

    fn start() -> SessionEvent {
        SessionEvent::Start {
            user: UserIdentity::new("user-1", Some("Alex Johnson".to_string())),
            existing_session_id: None,
        }
    }

    fn user(text: &str) -> SessionEvent {
        SessionEvent::Message {
            role: Role::User,
            text: text.to_string(),
            is_transcript: true,
        }
    }

    fn assistant(text: &str) -> SessionEvent {
        SessionEvent::Message {
            role: Role::Assistant,
            text: text.to_string(),
            is_transcript: true,
        }
    }

    #[tokio::test]
    async fn test_quick_screening_end_to_end() {
        let mut h = Harness::new(RecordingTransport::new());

        h.controller.handle_event(start()).await;
        assert_eq!(h.transport.calls(), vec!["initialize", "start_session"]);
        let config = h.transport.last_config().unwrap();
        assert_eq!(config.tools.len(), 6);
        assert!(config.instructions.contains("Alex"));
        assert_eq!(h.controller.state().messages[0].kind, MessageKind::Greeting);

        h.controller.handle_event(user("start the quick screening")).await;
        assert_eq!(h.controller.state().messages.len(), 2);

        h.controller
            .handle_event(SessionEvent::FunctionCall {
                call_id: "call-1".to_string(),
                name: "invoke-phq2".to_string(),
                arguments: json!({}),
            })
            .await;
        let updates = h.drain_updates();
        let result = updates
            .iter()
            .find_map(|u| match u {
                SessionUpdate::FunctionResult { call_id, result, .. } if call_id == "call-1" => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(result["success"], true);
        assert_eq!(result["type"], "phq2");
        assert_eq!(result["alreadyActive"], false);

        h.controller.handle_event(assistant(Q1)).await;
        let question = h.controller.state().messages.last().unwrap();
        assert!(!question.text.contains("[PHQ-Q1]"));
        assert!(question.text.starts_with("Question 1:"));
        assert!(question.flags.is_phq_question);

        h.controller.handle_event(user("1")).await;
        h.controller.handle_event(assistant(Q2)).await;
        h.controller.handle_event(user("0")).await;

        let updates = h.drain_updates();
        let completed = updates
            .iter()
            .find_map(|u| match u {
                SessionUpdate::AssessmentCompleted { result } => Some(result.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(completed.score, 1);
        assert_eq!(completed.severity, Severity::Minimal);
        assert!(!completed.crisis_flag);

        let last = h.controller.state().messages.last().unwrap();
        assert_eq!(last.kind, MessageKind::PhqSummary);
        assert!(last.text.contains("Your total score is 1 out of 6"));
        assert!(!h.controller.state().messages.iter().any(|m| m.kind == MessageKind::CrisisResources));
        assert!(h.controller.state().engine.current().is_none());

        h.controller.flush_persistence().await;
        let records = h.progress.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].completed, Some((1, Severity::Minimal)));
        assert_eq!(records[0].answers.len(), 2);
        assert!(records[0].question_texts.get(&1).unwrap().ends_with("doing things?"));
        assert!(!h.transcript.entries().is_empty());
    }

    #[tokio::test]
    async fn test_start_while_active_is_ignored() {
        let mut h = Harness::new(RecordingTransport::new());
        h.controller.handle_event(start()).await;
        let session_id = h.controller.state().session.session_id.clone();

        h.controller.handle_event(start()).await;

        assert_eq!(h.transport.calls(), vec!["initialize", "start_session"]);
        assert_eq!(h.controller.state().session.session_id, session_id);
    }

    #[tokio::test]
    async fn test_start_uses_stored_humor_level() {
        let mut h = Harness::new(RecordingTransport::new());
        h.preferences.save_humor(HumorLevel::clamped(10)).unwrap();

        h.controller.handle_event(start()).await;

        assert_eq!(h.controller.state().humor.value(), 10);
        let config = h.transport.last_config().unwrap();
        assert!(config.instructions.contains("10%"));
    }

    #[tokio::test]
    async fn test_failed_start_sets_error_without_retry() {
        let mut h = Harness::new(RecordingTransport::failing_on(&["start_session"]));

        h.controller.handle_event(start()).await;

        let session = &h.controller.state().session;
        assert_eq!(session.connection(), ConnectionStatus::Error);
        assert_eq!(session.status(), SessionStatus::Inactive);
        let notice = h.controller.state().notification.as_ref().unwrap();
        assert_eq!(notice.level, NotificationLevel::Error);
        assert_eq!(h.transport.calls(), vec!["initialize", "start_session"]);
    }

    #[tokio::test]
    async fn test_end_session_is_idempotent_when_transport_fails() {
        let mut h = Harness::new(RecordingTransport::failing_on(&["end_session"]));
        h.controller.handle_event(start()).await;
        h.controller.handle_event(user("hello there")).await;

        h.controller.handle_event(SessionEvent::End).await;
        h.controller.handle_event(SessionEvent::End).await;

        let state = h.controller.state();
        assert_eq!(state.session.status(), SessionStatus::Ended);
        assert_eq!(state.session.message_count(), 0);
        assert!(state.messages.is_empty());
        let ends = h.transport.calls().iter().filter(|c| **c == "end_session").count();
        assert_eq!(ends, 1);

        h.controller.flush_persistence().await;
        assert!(h.transcript.is_ended());
    }

    #[tokio::test]
    async fn test_restart_after_end_creates_fresh_session() {
        let mut h = Harness::new(RecordingTransport::new());
        h.controller.handle_event(start()).await;
        let first_id = h.controller.state().session.session_id.clone();
        h.controller.handle_event(SessionEvent::End).await;

        h.controller.handle_event(start()).await;

        assert_ne!(h.controller.state().session.session_id, first_id);
        assert_eq!(h.controller.state().session.status(), SessionStatus::Active);
        // initialize runs once per controller
        let inits = h.transport.calls().iter().filter(|c| **c == "initialize").count();
        assert_eq!(inits, 1);
    }

    #[tokio::test]
    async fn test_pause_command_keeps_transport_open() {
        let mut h = Harness::new(RecordingTransport::new());
        h.controller.handle_event(start()).await;

        h.controller.handle_event(user("pause session")).await;
        assert!(h.controller.state().session.is_paused());
        assert!(h.transport.calls().contains(&"pause_session"));
        assert!(!h.transport.calls().contains(&"end_session"));

        h.controller.handle_event(user("tell me a story")).await;
        let count = h.controller.state().messages.len();

        h.controller.handle_event(user("resume session")).await;
        assert_eq!(h.controller.state().session.status(), SessionStatus::Active);
        assert_eq!(h.controller.state().messages.len(), count + 1);
    }

    #[tokio::test]
    async fn test_interrupt_failure_is_announced() {
        let mut h = Harness::new(RecordingTransport::failing_on(&["interrupt_response"]));
        h.controller.handle_event(start()).await;
        h.controller.handle_event(SessionEvent::FunctionCall {
            call_id: "c".to_string(),
            name: "invoke-phq9".to_string(),
            arguments: json!({}),
        })
        .await;
        h.drain_updates();

        h.controller.handle_event(SessionEvent::Interrupt).await;

        let updates = h.drain_updates();
        assert!(updates.iter().any(|u| matches!(
            u,
            SessionUpdate::Announcement { text } if text == "Unable to interrupt the response"
        )));
        assert!(h.controller.state().engine.is_in_progress());
        assert_eq!(h.controller.state().session.status(), SessionStatus::Active);
    }

    #[tokio::test]
    async fn test_connection_lost_notifications() {
        let mut h = Harness::new(RecordingTransport::new());
        h.controller.handle_event(start()).await;

        h.controller
            .handle_event(SessionEvent::ConnectionLost {
                attempt: 2,
                max_attempts: 5,
            })
            .await;
        let notice = h.controller.state().notification.clone().unwrap();
        assert!(notice.dismissible);
        assert!(notice.message.contains("Attempt 2/5"));
        assert_eq!(h.controller.state().session.connection(), ConnectionStatus::Disconnected);

        // Auto-dismiss timer comes back through the queue
        let timer = h.next_event().await;
        assert!(matches!(&timer, SessionEvent::Timer(TimerEvent::DismissNotification { id }) if *id == notice.id));
        h.controller.handle_event(timer).await;
        assert!(h.controller.state().notification.is_none());

        h.controller
            .handle_event(SessionEvent::ConnectionLost {
                attempt: 5,
                max_attempts: 5,
            })
            .await;
        let notice = h.controller.state().notification.clone().unwrap();
        assert!(!notice.dismissible);
        assert_eq!(
            notice.message,
            "Connection lost. Unable to reconnect after 5 attempts. Please refresh the page."
        );
        assert_eq!(h.controller.state().session.connection(), ConnectionStatus::Error);
    }

    #[tokio::test]
    async fn test_reconnect_keeps_terminal_notice() {
        let mut h = Harness::new(RecordingTransport::new());
        h.controller.handle_event(start()).await;

        h.controller
            .handle_event(SessionEvent::ConnectionLost {
                attempt: 2,
                max_attempts: 5,
            })
            .await;
        h.controller
            .handle_event(SessionEvent::StatusChange {
                status: ConnectionStatus::Connected,
            })
            .await;
        assert!(h.controller.state().notification.is_none());

        h.controller
            .handle_event(SessionEvent::ConnectionLost {
                attempt: 5,
                max_attempts: 5,
            })
            .await;
        h.drain_updates();
        h.controller
            .handle_event(SessionEvent::StatusChange {
                status: ConnectionStatus::Connected,
            })
            .await;

        let notice = h.controller.state().notification.clone().unwrap();
        assert!(!notice.dismissible);
        assert!(!h
            .drain_updates()
            .iter()
            .any(|u| matches!(u, SessionUpdate::NotificationDismissed { .. })));
    }

    #[tokio::test]
    async fn test_close_command_ends_after_grace_delay() {
        let mut h = Harness::new(RecordingTransport::new());
        h.controller.handle_event(start()).await;

        h.controller.handle_event(user("close session")).await;
        assert_eq!(h.controller.state().session.status(), SessionStatus::Active);
        assert_eq!(h.controller.state().messages.last().unwrap().kind, MessageKind::SessionClose);

        let timer = h.next_event().await;
        assert!(matches!(timer, SessionEvent::Timer(TimerEvent::CloseGraceElapsed)));
        h.controller.handle_event(timer).await;
        assert_eq!(h.controller.state().session.status(), SessionStatus::Ended);
        assert!(h.transport.calls().contains(&"end_session"));
    }

    #[tokio::test]
    async fn test_final_caption_is_cleared_unless_replaced() {
        let mut h = Harness::new(RecordingTransport::new());
        h.controller.handle_event(start()).await;

        h.controller
            .handle_event(SessionEvent::Transcript {
                text: "Hello there".to_string(),
                is_final: true,
            })
            .await;
        let timer = h.next_event().await;

        h.controller
            .handle_event(SessionEvent::Transcript {
                text: "How are".to_string(),
                is_final: false,
            })
            .await;
        h.controller.handle_event(timer).await;
        assert_eq!(h.controller.state().caption.as_deref(), Some("How are"));
    }

    #[tokio::test]
    async fn test_injected_classifier_drives_commands() {
        let classifier = StubClassifier::new(&[("goodnight", Intent::Close)]);
        let mut h = Harness::with_classifier(RecordingTransport::new(), Box::new(classifier));
        h.controller.handle_event(start()).await;

        h.controller.handle_event(user("goodnight")).await;

        assert_eq!(h.controller.state().messages.last().unwrap().kind, MessageKind::SessionClose);
        assert!(matches!(h.next_event().await, SessionEvent::Timer(TimerEvent::CloseGraceElapsed)));
    }

    #[tokio::test]
    async fn test_messages_before_start_are_ignored() {
        let mut h = Harness::new(RecordingTransport::new());
        h.controller.handle_event(user("hello")).await;
        assert!(h.controller.state().messages.is_empty());
    }

    #[tokio::test]
    async fn test_run_tears_down_when_queue_closes() {
        let h = Harness::new(RecordingTransport::new());
        let Harness {
            controller,
            transport,
            transcript,
            events,
            events_tx,
            ..
        } = h;

        events_tx.send(start()).unwrap();
        drop(events_tx);
        controller.run(events).await;

        assert_eq!(
            transport.calls(),
            vec!["initialize", "start_session", "end_session", "destroy"]
        );
        // Teardown waits for the closing writes
        assert!(transcript.is_ended());
    }
}
