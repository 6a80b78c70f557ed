//! # Persistence Collaborators
//!
//! Transcript and screening-progress storage sit behind async traits. The
//! controller never awaits them directly: every write becomes a
//! [`PersistenceOp`] queued to a background worker that applies ops in order
//! and logs failures. A failed write never reaches the conversation.
//!
//! The in-memory stores back the server (the durable store is an external
//! collaborator) and double as inspection points in tests.

use crate::conversation::{MessageKind, Role};
use crate::error::{AppError, AppResult};
use crate::persona::HumorLevel;
use crate::screening::{ScreeningType, Severity};
use crate::session::preferences::PreferenceStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Open (or continue) a transcript; returns its session ID.
    async fn initialize_session(&self, user_id: &str, existing_session_id: Option<&str>) -> AppResult<String>;
    async fn add_user_message(&self, text: &str, kind: MessageKind, metadata: &Value) -> AppResult<()>;
    async fn add_assistant_message(&self, text: &str, kind: MessageKind, metadata: &Value) -> AppResult<()>;
    async fn end_session(&self) -> AppResult<()>;
}

#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn initialize_session(
        &self,
        user_id: &str,
        screening_type: ScreeningType,
        assessment_id: &str,
    ) -> AppResult<()>;
    async fn set_question_text(&self, question_number: u8, text: &str) -> AppResult<()>;
    async fn record_answer(&self, question_number: u8, value: u8) -> AppResult<()>;
    async fn record_invalid_attempt(&self, question_number: u8) -> AppResult<()>;
    async fn complete_assessment(&self, score: u8, severity: Severity) -> AppResult<()>;
    async fn add_message(&self, role: Role, text: &str) -> AppResult<()>;
    async fn end_session(&self) -> AppResult<()>;
}

/// One queued write.
#[derive(Debug)]
pub enum PersistenceOp {
    InitializeTranscript {
        user_id: String,
        existing_session_id: Option<String>,
    },
    AddUserMessage {
        text: String,
        kind: MessageKind,
        metadata: Value,
    },
    AddAssistantMessage {
        text: String,
        kind: MessageKind,
        metadata: Value,
    },
    EndTranscript,
    InitializeProgress {
        user_id: String,
        screening_type: ScreeningType,
        assessment_id: String,
    },
    SetQuestionText {
        question_number: u8,
        text: String,
    },
    RecordAnswer {
        question_number: u8,
        value: u8,
    },
    RecordInvalidAttempt {
        question_number: u8,
    },
    CompleteAssessment {
        score: u8,
        severity: Severity,
    },
    AddProgressMessage {
        role: Role,
        text: String,
    },
    EndProgress,
    SaveHumor(HumorLevel),
    /// Resolves once every earlier op has been applied
    Flush(oneshot::Sender<()>),
}

impl PersistenceOp {
    fn name(&self) -> &'static str {
        match self {
            PersistenceOp::InitializeTranscript { .. } => "initialize_transcript",
            PersistenceOp::AddUserMessage { .. } => "add_user_message",
            PersistenceOp::AddAssistantMessage { .. } => "add_assistant_message",
            PersistenceOp::EndTranscript => "end_transcript",
            PersistenceOp::InitializeProgress { .. } => "initialize_progress",
            PersistenceOp::SetQuestionText { .. } => "set_question_text",
            PersistenceOp::RecordAnswer { .. } => "record_answer",
            PersistenceOp::RecordInvalidAttempt { .. } => "record_invalid_attempt",
            PersistenceOp::CompleteAssessment { .. } => "complete_assessment",
            PersistenceOp::AddProgressMessage { .. } => "add_progress_message",
            PersistenceOp::EndProgress => "end_progress",
            PersistenceOp::SaveHumor(_) => "save_humor",
            PersistenceOp::Flush(_) => "flush",
        }
    }
}

/// Sending half of the persistence worker queue.
#[derive(Clone)]
pub struct PersistenceHandle {
    tx: mpsc::UnboundedSender<PersistenceOp>,
}

impl PersistenceHandle {
    /// Queue a write. Never blocks; a stopped worker only costs a log line.
    pub fn submit(&self, op: PersistenceOp) {
        if let Err(err) = self.tx.send(op) {
            warn!("Persistence worker stopped, dropping {}", err.0.name());
        }
    }

    /// Wait until everything queued so far has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.submit(PersistenceOp::Flush(done_tx));
        let _ = done_rx.await;
    }
}

/// Stores the worker writes to.
#[derive(Clone)]
pub struct Stores {
    pub transcript: Arc<dyn TranscriptStore>,
    pub progress: Arc<dyn ProgressStore>,
    pub preferences: Arc<dyn PreferenceStore>,
}

/// Spawn the background writer for one session.
pub fn spawn_worker(stores: Stores) -> PersistenceHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<PersistenceOp>();

    tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            let name = op.name();
            if let Err(err) = apply(&stores, op).await {
                warn!(op = name, error = %err, "Persistence write failed");
            }
        }
        debug!("Persistence worker finished");
    });

    PersistenceHandle { tx }
}

async fn apply(stores: &Stores, op: PersistenceOp) -> AppResult<()> {
    match op {
        PersistenceOp::InitializeTranscript {
            user_id,
            existing_session_id,
        } => {
            let id = stores
                .transcript
                .initialize_session(&user_id, existing_session_id.as_deref())
                .await?;
            debug!(transcript_session = %id, "Transcript initialized");
            Ok(())
        }
        PersistenceOp::AddUserMessage { text, kind, metadata } => {
            stores.transcript.add_user_message(&text, kind, &metadata).await
        }
        PersistenceOp::AddAssistantMessage { text, kind, metadata } => {
            stores.transcript.add_assistant_message(&text, kind, &metadata).await
        }
        PersistenceOp::EndTranscript => stores.transcript.end_session().await,
        PersistenceOp::InitializeProgress {
            user_id,
            screening_type,
            assessment_id,
        } => {
            stores
                .progress
                .initialize_session(&user_id, screening_type, &assessment_id)
                .await
        }
        PersistenceOp::SetQuestionText { question_number, text } => {
            stores.progress.set_question_text(question_number, &text).await
        }
        PersistenceOp::RecordAnswer { question_number, value } => {
            stores.progress.record_answer(question_number, value).await
        }
        PersistenceOp::RecordInvalidAttempt { question_number } => {
            stores.progress.record_invalid_attempt(question_number).await
        }
        PersistenceOp::CompleteAssessment { score, severity } => {
            stores.progress.complete_assessment(score, severity).await
        }
        PersistenceOp::AddProgressMessage { role, text } => stores.progress.add_message(role, &text).await,
        PersistenceOp::EndProgress => stores.progress.end_session().await,
        PersistenceOp::SaveHumor(level) => stores.preferences.save_humor(level),
        PersistenceOp::Flush(done) => {
            let _ = done.send(());
            Ok(())
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> AppResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AppError::Persistence("store lock poisoned".to_string()))
}

/// One transcript line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptEntry {
    pub role: Role,
    pub text: String,
    pub kind: MessageKind,
    pub metadata: Value,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct TranscriptRecord {
    session_id: Option<String>,
    user_id: Option<String>,
    entries: Vec<TranscriptEntry>,
    ended: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryTranscriptStore {
    record: Mutex<TranscriptRecord>,
}

impl InMemoryTranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn entries(&self) -> Vec<TranscriptEntry> {
        lock(&self.record).map(|r| r.entries.clone()).unwrap_or_default()
    }

    #[cfg(test)]
    pub fn session_id(&self) -> Option<String> {
        lock(&self.record).ok().and_then(|r| r.session_id.clone())
    }

    #[cfg(test)]
    pub fn is_ended(&self) -> bool {
        lock(&self.record).map(|r| r.ended).unwrap_or(false)
    }

    fn push(&self, role: Role, text: &str, kind: MessageKind, metadata: &Value) -> AppResult<()> {
        let mut record = lock(&self.record)?;
        if record.session_id.is_none() {
            return Err(AppError::Persistence("transcript not initialized".to_string()));
        }
        record.entries.push(TranscriptEntry {
            role,
            text: text.to_string(),
            kind,
            metadata: metadata.clone(),
            recorded_at: Utc::now(),
        });
        Ok(())
    }
}

#[async_trait]
impl TranscriptStore for InMemoryTranscriptStore {
    async fn initialize_session(&self, user_id: &str, existing_session_id: Option<&str>) -> AppResult<String> {
        let mut record = lock(&self.record)?;
        let session_id = existing_session_id
            .map(str::to_string)
            .unwrap_or_else(|| format!("transcript-{}", Uuid::new_v4().simple()));
        if record.session_id.as_deref() != Some(session_id.as_str()) {
            record.entries.clear();
        }
        record.session_id = Some(session_id.clone());
        record.user_id = Some(user_id.to_string());
        record.ended = false;
        Ok(session_id)
    }

    async fn add_user_message(&self, text: &str, kind: MessageKind, metadata: &Value) -> AppResult<()> {
        self.push(Role::User, text, kind, metadata)
    }

    async fn add_assistant_message(&self, text: &str, kind: MessageKind, metadata: &Value) -> AppResult<()> {
        self.push(Role::Assistant, text, kind, metadata)
    }

    async fn end_session(&self) -> AppResult<()> {
        lock(&self.record)?.ended = true;
        Ok(())
    }
}

/// Stored state of one assessment run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressRecord {
    pub user_id: String,
    pub screening_type: ScreeningType,
    pub assessment_id: String,
    pub question_texts: BTreeMap<u8, String>,
    pub answers: BTreeMap<u8, u8>,
    pub invalid_attempts: BTreeMap<u8, u32>,
    pub messages: Vec<(Role, String)>,
    pub completed: Option<(u8, Severity)>,
    pub ended: bool,
}

#[derive(Debug, Default)]
pub struct InMemoryProgressStore {
    records: Mutex<Vec<ProgressRecord>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn records(&self) -> Vec<ProgressRecord> {
        lock(&self.records).map(|r| r.clone()).unwrap_or_default()
    }

    fn with_current<F>(&self, f: F) -> AppResult<()>
    where
        F: FnOnce(&mut ProgressRecord),
    {
        let mut records = lock(&self.records)?;
        let current = records
            .last_mut()
            .filter(|r| !r.ended)
            .ok_or_else(|| AppError::Persistence("no open assessment record".to_string()))?;
        f(current);
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn initialize_session(
        &self,
        user_id: &str,
        screening_type: ScreeningType,
        assessment_id: &str,
    ) -> AppResult<()> {
        let mut records = lock(&self.records)?;
        if let Some(open) = records.last_mut().filter(|r| !r.ended) {
            open.ended = true;
        }
        records.push(ProgressRecord {
            user_id: user_id.to_string(),
            screening_type,
            assessment_id: assessment_id.to_string(),
            question_texts: BTreeMap::new(),
            answers: BTreeMap::new(),
            invalid_attempts: BTreeMap::new(),
            messages: Vec::new(),
            completed: None,
            ended: false,
        });
        Ok(())
    }

    async fn set_question_text(&self, question_number: u8, text: &str) -> AppResult<()> {
        self.with_current(|r| {
            r.question_texts.insert(question_number, text.to_string());
        })
    }

    async fn record_answer(&self, question_number: u8, value: u8) -> AppResult<()> {
        self.with_current(|r| {
            r.answers.insert(question_number, value);
        })
    }

    async fn record_invalid_attempt(&self, question_number: u8) -> AppResult<()> {
        self.with_current(|r| {
            *r.invalid_attempts.entry(question_number).or_default() += 1;
        })
    }

    async fn complete_assessment(&self, score: u8, severity: Severity) -> AppResult<()> {
        self.with_current(|r| r.completed = Some((score, severity)))
    }

    async fn add_message(&self, role: Role, text: &str) -> AppResult<()> {
        self.with_current(|r| r.messages.push((role, text.to_string())))
    }

    async fn end_session(&self) -> AppResult<()> {
        let mut records = lock(&self.records)?;
        if let Some(open) = records.last_mut() {
            open.ended = true;
        }
        Ok(())
    }
}
