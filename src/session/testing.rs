//! Test doubles for driving a [`SessionController`] without a client.

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::persona::composer::testing::FixedRandom;
use crate::persona::UserIdentity;
use crate::routing::intent::Intent;
use crate::routing::{IntentClassifier, PatternIntentClassifier};
use crate::session::controller::SessionController;
use crate::session::events::{SessionEvent, SessionUpdate};
use crate::session::persistence::{InMemoryProgressStore, InMemoryTranscriptStore, Stores};
use crate::session::preferences::InMemoryPreferenceStore;
use crate::session::transport::{RealtimeSessionConfig, Transport};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Records every call; optionally fails the named ones.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<&'static str>>,
    fail_on: Vec<&'static str>,
    last_config: Mutex<Option<RealtimeSessionConfig>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport whose listed operations return `AppError::Connection`.
    pub fn failing_on(operations: &[&'static str]) -> Self {
        Self {
            fail_on: operations.to_vec(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn last_config(&self) -> Option<RealtimeSessionConfig> {
        self.last_config.lock().unwrap().clone()
    }

    fn record(&self, operation: &'static str) -> AppResult<()> {
        self.calls.lock().unwrap().push(operation);
        if self.fail_on.contains(&operation) {
            return Err(AppError::Connection(format!("{} failed", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn initialize(&self) -> AppResult<()> {
        self.record("initialize")
    }

    async fn start_session(&self, _user: &UserIdentity, config: &RealtimeSessionConfig) -> AppResult<()> {
        *self.last_config.lock().unwrap() = Some(config.clone());
        self.record("start_session")
    }

    async fn pause_session(&self) -> AppResult<()> {
        self.record("pause_session")
    }

    async fn resume_session(&self) -> AppResult<()> {
        self.record("resume_session")
    }

    async fn end_session(&self) -> AppResult<()> {
        self.record("end_session")
    }

    async fn interrupt_response(&self) -> AppResult<()> {
        self.record("interrupt_response")
    }

    async fn destroy(&self) -> AppResult<()> {
        self.record("destroy")
    }
}

/// Classifier with a fixed phrase table; anything else is `Intent::None`.
pub struct StubClassifier {
    phrases: Vec<(String, Intent)>,
}

impl StubClassifier {
    pub fn new(phrases: &[(&str, Intent)]) -> Self {
        Self {
            phrases: phrases.iter().map(|(p, i)| (p.to_string(), *i)).collect(),
        }
    }
}

impl IntentClassifier for StubClassifier {
    fn classify(&self, text: &str) -> Intent {
        self.phrases
            .iter()
            .find(|(phrase, _)| phrase.eq_ignore_ascii_case(text.trim()))
            .map(|(_, intent)| *intent)
            .unwrap_or(Intent::None)
    }
}

/// A controller wired to in-memory stores and short timers.
pub struct Harness {
    pub controller: SessionController,
    pub transport: Arc<RecordingTransport>,
    pub transcript: Arc<InMemoryTranscriptStore>,
    pub progress: Arc<InMemoryProgressStore>,
    pub preferences: Arc<InMemoryPreferenceStore>,
    pub updates: UnboundedReceiver<SessionUpdate>,
    pub events: UnboundedReceiver<SessionEvent>,
    pub events_tx: UnboundedSender<SessionEvent>,
}

impl Harness {
    pub fn new(transport: RecordingTransport) -> Self {
        Self::with_classifier(transport, Box::new(PatternIntentClassifier))
    }

    pub fn with_classifier(transport: RecordingTransport, classifier: Box<dyn IntentClassifier>) -> Self {
        let mut config = AppConfig::default();
        config.session.close_grace_ms = 5;
        config.session.notification_dismiss_ms = 5;
        config.session.caption_hold_ms = 5;

        let transport = Arc::new(transport);
        let transcript = Arc::new(InMemoryTranscriptStore::new());
        let progress = Arc::new(InMemoryProgressStore::new());
        let preferences = Arc::new(InMemoryPreferenceStore::default());
        let stores = Stores {
            transcript: transcript.clone(),
            progress: progress.clone(),
            preferences: preferences.clone(),
        };

        let (updates_tx, updates) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let controller = SessionController::new(config, transport.clone(), stores, updates_tx, &events_tx)
            .with_classifier(classifier)
            .with_random(Box::new(FixedRandom::new(&[0.9])));

        Self {
            controller,
            transport,
            transcript,
            progress,
            preferences,
            updates,
            events,
            events_tx,
        }
    }

    pub fn drain_updates(&mut self) -> Vec<SessionUpdate> {
        let mut drained = Vec::new();
        while let Ok(update) = self.updates.try_recv() {
            drained.push(update);
        }
        drained
    }

    /// Next event posted into the queue, normally a timer.
    pub async fn next_event(&mut self) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(2), self.events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("event queue closed")
    }
}
