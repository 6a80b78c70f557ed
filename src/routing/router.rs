//! # Message Router
//!
//! Ordered matcher chain for finalized messages, first match wins:
//! 1. **Control command** (user messages only): executed immediately, the
//!    confirmation is appended as an assistant line and the command text
//!    itself never enters the visible conversation.
//! 2. **Screening answer**: no command and an assessment in progress, so the
//!    turn goes to the screening engine.
//! 3. **Dialogue**: appended to the conversation and the transcript.
//!
//! Assistant messages skip step 1 and have their question marker handled
//! before step 3. While the session is paused, user messages that are not
//! commands are dropped.

use crate::conversation::{Message, MessageFlags, MessageKind, Role};
use crate::persona::{composer, HumorLevel, RandomSource};
use crate::routing::intent::{Intent, IntentClassifier};
use crate::routing::markers::{self, AssistantSignal};
use crate::screening::questionnaire::response_scale_text;
use crate::screening::scoring::crisis_resources_message;
use crate::screening::{AssessmentPhase, AttemptOutcome, ScreeningEngine};
use crate::session::context::{ControlRequest, Outbox, SessionState};
use crate::session::events::SessionUpdate;
use crate::session::persistence::PersistenceOp;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// What the router did with a message.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Command(Intent),
    Answer {
        question_number: u8,
        value: Option<u8>,
    },
    Dialogue,
    /// Dropped: empty, or non-command input while paused
    Ignored,
}

pub struct MessageRouter {
    classifier: Box<dyn IntentClassifier>,
}

impl MessageRouter {
    pub fn new(classifier: Box<dyn IntentClassifier>) -> Self {
        Self { classifier }
    }

    pub fn route(
        &self,
        role: Role,
        text: &str,
        is_transcript: bool,
        state: &mut SessionState,
        outbox: &mut Outbox,
        rng: &mut dyn RandomSource,
    ) -> RouteOutcome {
        let text = text.trim();
        if text.is_empty() {
            return RouteOutcome::Ignored;
        }

        match role {
            Role::User => self.route_user(text, is_transcript, state, outbox, rng),
            Role::Assistant => route_assistant(text, is_transcript, state, outbox),
        }
    }

    fn route_user(
        &self,
        text: &str,
        is_transcript: bool,
        state: &mut SessionState,
        outbox: &mut Outbox,
        rng: &mut dyn RandomSource,
    ) -> RouteOutcome {
        let intent = self.classifier.classify(text);
        if intent.is_command() {
            debug!(session_id = %state.session.session_id, ?intent, "Voice command matched");
            execute_command(intent, text, state, outbox, rng);
            return RouteOutcome::Command(intent);
        }

        if state.session.is_paused() {
            debug!(session_id = %state.session.session_id, "Session paused, ignoring input");
            return RouteOutcome::Ignored;
        }

        if state.engine.is_in_progress() {
            return route_answer(text, is_transcript, state, outbox);
        }

        let message = Message::user(text, MessageKind::VoiceInput).with_flags(MessageFlags {
            is_transcript,
            ..Default::default()
        });
        state.append(message, true, json!({ "is_transcript": is_transcript }), outbox);
        RouteOutcome::Dialogue
    }
}

fn command_metadata(command_text: &str) -> Value {
    json!({ "triggered_by_voice_command": true, "command": command_text })
}

/// Set the humor level (clamped), persist it and confirm.
pub(crate) fn apply_humor(requested: i64, state: &mut SessionState, outbox: &mut Outbox) -> HumorLevel {
    let level = HumorLevel::clamped(requested);
    state.humor = level;
    outbox.persist(PersistenceOp::SaveHumor(level));
    outbox.update(SessionUpdate::HumorLevel {
        level,
        band: level.band(),
    });
    outbox.update(SessionUpdate::Announcement {
        text: format!("Humor level set to {} percent", level.value()),
    });
    info!(session_id = %state.session.session_id, humor = level.value(), "Humor level updated");
    level
}

pub(crate) fn farewell_message(first_name: &str) -> String {
    format!(
        "Thank you for our conversation today, {}. Your session is ending now. \
         Take care and remember - support is always available when you need it.",
        first_name
    )
}

fn help_message(first_name: &str) -> String {
    format!(
        "Here are the voice commands you can use, {}:\n\n\
         Humor Settings:\n\
         • \"Set humor level to [0-100]\" - Adjust my personality from formal (0) to casual (100)\n\n\
         Session Control:\n\
         • \"Pause session\" - Temporarily pause our conversation\n\
         • \"Resume session\" - Continue after pausing\n\
         • \"Close session\" or \"End session\" - End our conversation\n\n\
         Mental Health Assessments:\n\
         • \"Invoke PHQ-9\" - Start comprehensive mental health assessment\n\
         • \"Invoke PHQ-2\" - Start quick mental health screening\n\n\
         General:\n\
         • \"Help\" or \"Commands\" - Show this help message\n\n\
         Just speak naturally - I understand variations of these commands!",
        first_name
    )
}

fn execute_command(
    intent: Intent,
    command_text: &str,
    state: &mut SessionState,
    outbox: &mut Outbox,
    rng: &mut dyn RandomSource,
) {
    let first = state.first_name();

    let (text, kind) = match intent {
        Intent::SetHumor(requested) => {
            let level = apply_humor(requested, state, outbox);
            let pets = state.pet_names();
            (
                composer::humor_confirmation(level, &first, &pets, rng),
                MessageKind::HumorChange,
            )
        }
        Intent::Close => {
            outbox.control(ControlRequest::Close);
            outbox.update(SessionUpdate::Announcement {
                text: "Session ending".to_string(),
            });
            (farewell_message(&first), MessageKind::SessionClose)
        }
        Intent::Pause => {
            if state.session.is_paused() {
                (
                    format!("The session is already paused, {}. Say \"resume session\" to continue.", first),
                    MessageKind::SessionPause,
                )
            } else {
                outbox.control(ControlRequest::Pause);
                (
                    format!(
                        "Session paused, {}. I'll be here waiting when you're ready. \
                         Just say \"resume session\" to continue our conversation.",
                        first
                    ),
                    MessageKind::SessionPause,
                )
            }
        }
        Intent::Resume => {
            if state.session.is_paused() {
                outbox.control(ControlRequest::Resume);
                (
                    format!("Welcome back, {}! Session resumed. How can I help you today?", first),
                    MessageKind::SessionResume,
                )
            } else {
                (
                    format!("The session is already active, {}. How can I help you?", first),
                    MessageKind::SessionResume,
                )
            }
        }
        Intent::Help => (help_message(&first), MessageKind::HelpCommand),
        Intent::None => return,
    };

    state.append(
        Message::assistant(text, kind),
        false,
        command_metadata(command_text),
        outbox,
    );
}

/// Step 2: the engine's reading of the user turn is the only bookkeeping path.
fn route_answer(text: &str, is_transcript: bool, state: &mut SessionState, outbox: &mut Outbox) -> RouteOutcome {
    let Some(question_number) = state.engine.next_question().map(|q| q.number) else {
        return RouteOutcome::Ignored;
    };
    let Some((assessment_id, screening_type)) = state
        .engine
        .current()
        .map(|a| (a.assessment_id.clone(), a.screening_type))
    else {
        return RouteOutcome::Ignored;
    };

    let value = ScreeningEngine::parse_answer(text);
    let mut flags = MessageFlags {
        is_transcript,
        phq_type: Some(screening_type),
        phq_question_number: Some(question_number),
        assessment_id: Some(assessment_id.clone()),
        ..Default::default()
    };

    let mut attempt = None;
    match value {
        Some(answer) => match state.engine.record_answer(question_number, answer) {
            Ok(()) => {
                flags.is_phq_answer = true;
                flags.phq_answer_value = Some(answer);
                outbox.persist(PersistenceOp::RecordAnswer {
                    question_number,
                    value: answer,
                });
                info!(
                    session_id = %state.session.session_id,
                    assessment_id = %assessment_id,
                    question = question_number,
                    answer,
                    "Screening answer recorded"
                );
            }
            Err(err) => warn!(assessment_id = %assessment_id, error = %err, "Answer rejected"),
        },
        None => match state.engine.record_invalid_attempt(question_number) {
            Ok(outcome) => {
                outbox.persist(PersistenceOp::RecordInvalidAttempt { question_number });
                match outcome {
                    AttemptOutcome::Retry { attempts_remaining } => debug!(
                        assessment_id = %assessment_id,
                        question = question_number,
                        attempts_remaining,
                        "Unparseable answer"
                    ),
                    AttemptOutcome::Skipped => info!(
                        assessment_id = %assessment_id,
                        question = question_number,
                        "Question skipped after repeated invalid answers"
                    ),
                }
                attempt = Some(outcome);
            }
            Err(err) => warn!(assessment_id = %assessment_id, error = %err, "Invalid attempt not recorded"),
        },
    }

    let kind = if flags.is_phq_answer {
        MessageKind::PhqAnswer
    } else {
        MessageKind::VoiceInput
    };
    let metadata = serde_json::to_value(&flags).unwrap_or(Value::Null);
    outbox.persist(PersistenceOp::AddProgressMessage {
        role: Role::User,
        text: text.to_string(),
    });
    state.append(Message::user(text, kind).with_flags(flags), true, metadata, outbox);

    if let Some(outcome) = attempt {
        reprompt(outcome, question_number, &assessment_id, state, outbox);
    }

    if state.engine.phase() == AssessmentPhase::Completed {
        complete_assessment(state, outbox);
    }

    RouteOutcome::Answer {
        question_number,
        value,
    }
}

/// After an unusable answer: restate the scale, or move on past a skipped
/// question. The client gets the same guidance for the model so the model
/// asks the item the engine is waiting for.
fn reprompt(
    outcome: AttemptOutcome,
    question_number: u8,
    assessment_id: &str,
    state: &mut SessionState,
    outbox: &mut Outbox,
) {
    let first = state.first_name();
    let scale = response_scale_text();
    let screening_type = state.engine.current().map(|a| a.screening_type);
    let metadata = json!({ "assessment_id": assessment_id, "phq_question_number": question_number });

    match outcome {
        AttemptOutcome::Retry { attempts_remaining } => {
            let text = format!(
                "I didn't catch a number there, {}. Please answer with one of these:\n{}",
                first, scale
            );
            state.append(Message::assistant(text, MessageKind::AgentResponse), false, metadata, outbox);
            outbox.update(SessionUpdate::ScreeningPrompt {
                assessment_id: assessment_id.to_string(),
                question_number,
                attempts_remaining: Some(attempts_remaining),
                skipped_question: None,
                response_scale: scale.clone(),
                instruction: format!(
                    "The reply to question {n} did not match the response scale. Ask [PHQ-Q{n}] again and list the options:\n{scale}",
                    n = question_number,
                    scale = scale
                ),
            });
        }
        AttemptOutcome::Skipped => {
            state.append(
                Message::assistant(
                    format!("Let's skip that one and move on, {}.", first),
                    MessageKind::AgentResponse,
                ),
                false,
                metadata,
                outbox,
            );

            // Last item skipped: completion handling takes over
            let Some((next_number, next_text)) = state
                .engine
                .next_question()
                .map(|q| (q.number, q.text.clone()))
            else {
                return;
            };
            if let Err(err) = state.engine.mark_asked(next_number) {
                warn!(assessment_id = %assessment_id, question = next_number, error = %err, "Next question not marked asked");
            }
            outbox.persist(PersistenceOp::SetQuestionText {
                question_number: next_number,
                text: next_text.clone(),
            });

            let question = format!("Question {}: {}", next_number, next_text);
            outbox.persist(PersistenceOp::AddProgressMessage {
                role: Role::Assistant,
                text: question.clone(),
            });
            let flags = MessageFlags {
                is_phq_question: true,
                phq_type: screening_type,
                phq_question_number: Some(next_number),
                assessment_id: Some(assessment_id.to_string()),
                ..Default::default()
            };
            let flag_metadata = serde_json::to_value(&flags).unwrap_or(Value::Null);
            state.append(
                Message::assistant(question.clone(), MessageKind::PhqQuestion).with_flags(flags),
                false,
                flag_metadata,
                outbox,
            );
            outbox.update(SessionUpdate::ScreeningPrompt {
                assessment_id: assessment_id.to_string(),
                question_number: next_number,
                attempts_remaining: None,
                skipped_question: Some(question_number),
                response_scale: scale,
                instruction: format!(
                    "Question {} was skipped after repeated unclear replies. Continue with [PHQ-Q{}] {}",
                    question_number, next_number, question
                ),
            });
        }
    }
}

/// Crisis resources (if flagged), then the summary, then reset.
fn complete_assessment(state: &mut SessionState, outbox: &mut Outbox) {
    let Some(result) = state.engine.result() else {
        return;
    };
    let first = state.first_name();

    info!(
        session_id = %state.session.session_id,
        assessment_id = %result.assessment_id,
        score = result.score,
        severity = %result.severity,
        crisis = result.crisis_flag,
        "Assessment completed"
    );

    let metadata = json!({
        "assessment_id": result.assessment_id,
        "phq_type": result.screening_type,
        "score": result.score,
        "severity": result.severity,
        "crisis_flag": result.crisis_flag,
    });

    if result.crisis_flag {
        warn!(assessment_id = %result.assessment_id, "Crisis flag raised");
        let crisis = crisis_resources_message(&first);
        outbox.persist(PersistenceOp::AddProgressMessage {
            role: Role::Assistant,
            text: crisis.clone(),
        });
        state.append(
            Message::assistant(crisis, MessageKind::CrisisResources),
            false,
            metadata.clone(),
            outbox,
        );
    }

    let summary = result.summary(&first);
    outbox.persist(PersistenceOp::AddProgressMessage {
        role: Role::Assistant,
        text: summary.clone(),
    });
    state.append(Message::assistant(summary, MessageKind::PhqSummary), false, metadata, outbox);

    outbox.persist(PersistenceOp::CompleteAssessment {
        score: result.score,
        severity: result.severity,
    });
    outbox.update(SessionUpdate::AssessmentCompleted { result });
    state.engine.reset();
}

fn route_assistant(text: &str, is_transcript: bool, state: &mut SessionState, outbox: &mut Outbox) -> RouteOutcome {
    let tagged = markers::extract_question_tag(text);
    let mut flags = MessageFlags {
        is_transcript,
        ..Default::default()
    };
    let mut kind = MessageKind::AgentResponse;

    if let Some(tag) = &tagged.tag {
        match state.engine.current().filter(|_| state.engine.is_in_progress()) {
            Some(assessment) => {
                let assessment_id = assessment.assessment_id.clone();
                let screening_type = assessment.screening_type;
                let question_text = tag.question_text.clone().or_else(|| {
                    screening_type
                        .questions()
                        .get(usize::from(tag.number).saturating_sub(1))
                        .map(|q| q.to_string())
                });

                if let Err(err) = state.engine.mark_asked(tag.number) {
                    warn!(assessment_id = %assessment_id, question = tag.number, error = %err, "Question tag does not match assessment");
                }
                if let Some(question_text) = question_text {
                    outbox.persist(PersistenceOp::SetQuestionText {
                        question_number: tag.number,
                        text: question_text,
                    });
                }
                outbox.persist(PersistenceOp::AddProgressMessage {
                    role: Role::Assistant,
                    text: tagged.text.clone(),
                });

                flags.is_phq_question = true;
                flags.phq_type = Some(screening_type);
                flags.phq_question_number = Some(tag.number);
                flags.assessment_id = Some(assessment_id);
                kind = MessageKind::PhqQuestion;
            }
            None => warn!(question = tag.number, "Question tag with no assessment in progress"),
        }
    }

    check_assistant_signals(&tagged.text, state);

    let metadata = serde_json::to_value(&flags).unwrap_or(Value::Null);
    state.append(Message::assistant(tagged.text, kind).with_flags(flags), true, metadata, outbox);
    RouteOutcome::Dialogue
}

/// Compare the assistant's bookkeeping phrases with the engine. Log only.
fn check_assistant_signals(text: &str, state: &SessionState) {
    for signal in markers::scan_assistant_signals(text) {
        match signal {
            AssistantSignal::Acknowledged(value) => {
                let last_answer = state
                    .messages
                    .iter()
                    .rev()
                    .find(|m| m.role == Role::User && m.flags.is_phq_answer)
                    .and_then(|m| m.flags.phq_answer_value);
                if last_answer != Some(value) {
                    warn!(
                        session_id = %state.session.session_id,
                        acknowledged = value,
                        recorded = ?last_answer,
                        "Assistant acknowledgement differs from recorded answer"
                    );
                }
            }
            AssistantSignal::Skipped => debug!(session_id = %state.session.session_id, "Assistant announced a skipped question"),
            AssistantSignal::Completed => {
                if state.engine.is_in_progress() {
                    warn!(
                        session_id = %state.session.session_id,
                        progress = %state.engine.progress_summary(),
                        "Assistant announced completion before all questions were resolved"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona::composer::testing::FixedRandom;
    use crate::persona::UserIdentity;
    use crate::routing::intent::PatternIntentClassifier;
    use crate::screening::{ScreeningType, Severity};

    fn setup() -> (MessageRouter, SessionState, Outbox, FixedRandom) {
        let mut state = SessionState::new(
            UserIdentity::new("u1", Some("Alex Johnson".to_string())),
            HumorLevel::clamped(50),
        );
        state.session.activate().unwrap();
        (
            MessageRouter::new(Box::new(PatternIntentClassifier)),
            state,
            Outbox::new(),
            FixedRandom::new(&[0.9]),
        )
    }

    fn user(router: &MessageRouter, text: &str, state: &mut SessionState, outbox: &mut Outbox, rng: &mut FixedRandom) -> RouteOutcome {
        router.route(Role::User, text, true, state, outbox, rng)
    }

    #[test]
    fn test_plain_dialogue_is_appended_and_counted() {
        let (router, mut state, mut outbox, mut rng) = setup();
        let outcome = user(&router, "I had a long day", &mut state, &mut outbox, &mut rng);

        assert_eq!(outcome, RouteOutcome::Dialogue);
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.session.message_count(), 1);
    }

    #[test]
    fn test_pause_during_assessment_is_never_an_answer() {
        let (router, mut state, mut outbox, mut rng) = setup();
        state.engine.start_assessment(ScreeningType::Phq9);

        let outcome = user(&router, "pause session", &mut state, &mut outbox, &mut rng);

        assert_eq!(outcome, RouteOutcome::Command(Intent::Pause));
        assert_eq!(outbox.controls, vec![ControlRequest::Pause]);
        let question = state.engine.current().unwrap().question(1).unwrap();
        assert_eq!(question.attempts(), 0);
        assert_eq!(question.answer(), None);
        // Confirmation shown, command text hidden, counter untouched
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].role, Role::Assistant);
        assert_eq!(state.session.message_count(), 0);
    }

    #[test]
    fn test_paused_session_ignores_dialogue_and_answers() {
        let (router, mut state, mut outbox, mut rng) = setup();
        state.engine.start_assessment(ScreeningType::Phq2);
        state.session.pause().unwrap();

        assert_eq!(user(&router, "2", &mut state, &mut outbox, &mut rng), RouteOutcome::Ignored);
        assert!(state.messages.is_empty());
        assert_eq!(state.engine.current().unwrap().question(1).unwrap().answer(), None);

        let outcome = user(&router, "pause session", &mut state, &mut outbox, &mut rng);
        assert_eq!(outcome, RouteOutcome::Command(Intent::Pause));
        assert!(outbox.controls.is_empty());
        assert!(state.messages[0].text.starts_with("The session is already paused, Alex."));

        user(&router, "resume session", &mut state, &mut outbox, &mut rng);
        assert_eq!(outbox.controls, vec![ControlRequest::Resume]);
    }

    #[test]
    fn test_resume_when_active_is_reported() {
        let (router, mut state, mut outbox, mut rng) = setup();
        user(&router, "resume session", &mut state, &mut outbox, &mut rng);
        assert!(outbox.controls.is_empty());
        assert_eq!(
            state.messages[0].text,
            "The session is already active, Alex. How can I help you?"
        );
    }

    #[test]
    fn test_humor_command_clamps_and_persists() {
        let (router, mut state, mut outbox, mut rng) = setup();
        user(&router, "set humor level to 250", &mut state, &mut outbox, &mut rng);

        assert_eq!(state.humor.value(), 100);
        assert!(outbox
            .persistence
            .iter()
            .any(|op| matches!(op, PersistenceOp::SaveHumor(level) if level.value() == 100)));
        assert!(state.messages[0].text.starts_with("Humor level adjusted to 100%."));
    }

    #[test]
    fn test_close_command_requests_close() {
        let (router, mut state, mut outbox, mut rng) = setup();
        user(&router, "close session", &mut state, &mut outbox, &mut rng);
        assert_eq!(outbox.controls, vec![ControlRequest::Close]);
        assert_eq!(state.messages[0].kind, MessageKind::SessionClose);
        assert!(state.messages[0].text.starts_with("Thank you for our conversation today, Alex."));
    }

    #[test]
    fn test_question_tag_is_stripped_and_tracked() {
        let (router, mut state, mut outbox, mut rng) = setup();
        let started = state.engine.start_assessment(ScreeningType::Phq2);

        router.route(
            Role::Assistant,
            "[PHQ-Q1] Question 1: How often have you had little interest in doing things?",
            true,
            &mut state,
            &mut outbox,
            &mut rng,
        );

        let message = &state.messages[0];
        assert!(!message.text.contains("[PHQ-Q1]"));
        assert!(message.flags.is_phq_question);
        assert_eq!(message.flags.phq_question_number, Some(1));
        assert_eq!(message.flags.assessment_id.as_deref(), Some(started.assessment_id.as_str()));
        assert!(outbox.persistence.iter().any(|op| matches!(
            op,
            PersistenceOp::SetQuestionText { question_number: 1, text }
                if text == "How often have you had little interest in doing things?"
        )));
    }

    #[test]
    fn test_invalid_answers_then_skip() {
        let (router, mut state, mut outbox, mut rng) = setup();
        state.engine.start_assessment(ScreeningType::Phq9);

        for _ in 0..3 {
            let outcome = user(&router, "maybe", &mut state, &mut outbox, &mut rng);
            assert_eq!(outcome, RouteOutcome::Answer { question_number: 1, value: None });
        }
        assert!(state.engine.current().unwrap().question(1).unwrap().is_skipped());
        assert_eq!(state.engine.next_question().unwrap().number, 2);
    }

    #[test]
    fn test_invalid_answer_reprompts_with_scale() {
        let (router, mut state, mut outbox, mut rng) = setup();
        state.engine.start_assessment(ScreeningType::Phq2);

        user(&router, "maybe", &mut state, &mut outbox, &mut rng);

        let reprompt = state.messages.last().unwrap();
        assert_eq!(reprompt.role, Role::Assistant);
        assert!(reprompt.text.starts_with("I didn't catch a number there, Alex."));
        assert!(reprompt.text.contains("0 = Not at all"));
        assert!(outbox.updates.iter().any(|u| matches!(
            u,
            SessionUpdate::ScreeningPrompt {
                question_number: 1,
                attempts_remaining: Some(2),
                skipped_question: None,
                instruction,
                ..
            } if instruction.contains("[PHQ-Q1]")
        )));
    }

    #[test]
    fn test_skipped_question_moves_conversation_to_next_item() {
        let (router, mut state, mut outbox, mut rng) = setup();
        state.engine.start_assessment(ScreeningType::Phq2);

        for _ in 0..3 {
            user(&router, "maybe", &mut state, &mut outbox, &mut rng);
        }

        let question = state.messages.last().unwrap();
        assert_eq!(question.kind, MessageKind::PhqQuestion);
        assert_eq!(question.flags.phq_question_number, Some(2));
        assert!(question.text.starts_with("Question 2: "));
        assert!(state
            .messages
            .iter()
            .any(|m| m.text == "Let's skip that one and move on, Alex."));
        assert!(outbox.updates.iter().any(|u| matches!(
            u,
            SessionUpdate::ScreeningPrompt {
                question_number: 2,
                skipped_question: Some(1),
                instruction,
                ..
            } if instruction.contains("[PHQ-Q2]")
        )));

        // The next reply belongs to item 2 and completes the screen
        let outcome = user(&router, "2", &mut state, &mut outbox, &mut rng);
        assert_eq!(outcome, RouteOutcome::Answer { question_number: 2, value: Some(2) });
        assert!(outbox
            .updates
            .iter()
            .any(|u| matches!(u, SessionUpdate::AssessmentCompleted { result } if result.skipped == 1 && result.score == 2)));
    }

    #[test]
    fn test_skipping_last_item_completes_without_new_question() {
        let (router, mut state, mut outbox, mut rng) = setup();
        state.engine.start_assessment(ScreeningType::Phq2);
        user(&router, "1", &mut state, &mut outbox, &mut rng);

        for _ in 0..3 {
            user(&router, "no idea", &mut state, &mut outbox, &mut rng);
        }

        assert!(!state.messages.iter().any(|m| m.kind == MessageKind::PhqQuestion));
        assert_eq!(state.messages.last().unwrap().kind, MessageKind::PhqSummary);
        assert!(state.engine.current().is_none());
    }

    #[test]
    fn test_answer_mentioning_help_is_still_an_answer() {
        let (router, mut state, mut outbox, mut rng) = setup();
        state.engine.start_assessment(ScreeningType::Phq9);

        let outcome = user(&router, "I've felt helpless nearly every day", &mut state, &mut outbox, &mut rng);

        assert_eq!(outcome, RouteOutcome::Answer { question_number: 1, value: Some(3) });
        assert!(outbox.controls.is_empty());
    }

    #[test]
    fn test_crisis_message_precedes_summary() {
        let (router, mut state, mut outbox, mut rng) = setup();
        state.engine.start_assessment(ScreeningType::Phq9);

        for answer in ["1", "1", "1", "1", "1", "1", "1", "1", "2"] {
            user(&router, answer, &mut state, &mut outbox, &mut rng);
        }

        let kinds: Vec<MessageKind> = state.messages.iter().map(|m| m.kind).collect();
        let crisis = kinds.iter().position(|k| *k == MessageKind::CrisisResources).unwrap();
        let summary = kinds.iter().position(|k| *k == MessageKind::PhqSummary).unwrap();
        assert!(crisis < summary);
        assert!(state.messages[crisis].text.contains("988"));

        assert!(outbox.persistence.iter().any(|op| matches!(
            op,
            PersistenceOp::CompleteAssessment { score: 10, severity: Severity::Moderate }
        )));
        assert!(outbox
            .updates
            .iter()
            .any(|u| matches!(u, SessionUpdate::AssessmentCompleted { result } if result.crisis_flag)));
        // Engine is reset after completion handling
        assert!(state.engine.current().is_none());
    }

    #[test]
    fn test_acknowledgement_scan_never_mutates_engine() {
        let (router, mut state, mut outbox, mut rng) = setup();
        state.engine.start_assessment(ScreeningType::Phq2);

        router.route(Role::Assistant, "I've recorded your answer as 3.", false, &mut state, &mut outbox, &mut rng);

        assert_eq!(state.engine.current().unwrap().question(1).unwrap().answer(), None);
        assert_eq!(state.engine.next_question().unwrap().number, 1);
    }
}
