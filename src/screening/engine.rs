//! # Screening Engine
//!
//! Question-by-question state machine for one PHQ-2 or PHQ-9 run. The engine
//! has no I/O: the message router feeds it user turns and persists whatever
//! it reports.
//!
//! ## Lifecycle:
//! - **Assessment**: NotStarted → InProgress → Completed → (reset) NotStarted
//! - **Question**: Unasked → Asked → Answered | Skipped
//!
//! ## Invariants:
//! - At most one assessment is in progress; a second start returns the
//!   existing assessment ID.
//! - Answered and Skipped questions never change again.
//! - A question is skipped on its third invalid attempt and the sequence
//!   moves on rather than stalling the conversation.

use crate::error::{AppError, AppResult};
use crate::screening::questionnaire::{ScreeningType, CRISIS_ITEM, MAX_ANSWER, MAX_INVALID_ATTEMPTS};
use crate::screening::scoring::{self, Interpretation, Severity};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::LazyLock;
use uuid::Uuid;

static NUMBER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d+\b").expect("valid number pattern"));

static NUMBER_WORD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(zero|one|two|three)\b").expect("valid number word pattern"));

static SCALE_PHRASE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(not at all|several days|more than half(?: of)? the days|(?:nearly|almost) every ?day)\b")
        .expect("valid scale phrase pattern")
});

/// Per-question progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum QuestionState {
    Unasked,
    Asked,
    Answered(u8),
    Skipped,
}

/// One questionnaire item and its answer state.
#[derive(Debug, Clone, Serialize)]
pub struct Question {
    pub number: u8,
    pub text: String,
    state: QuestionState,
    attempts: u32,
    answered_at: Option<DateTime<Utc>>,
}

impl Question {
    fn new(number: u8, text: &str) -> Self {
        Self {
            number,
            text: text.to_string(),
            state: QuestionState::Unasked,
            attempts: 0,
            answered_at: None,
        }
    }

    #[cfg(test)]
    pub fn state(&self) -> QuestionState {
        self.state
    }

    pub fn answer(&self) -> Option<u8> {
        match self.state {
            QuestionState::Answered(value) => Some(value),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_skipped(&self) -> bool {
        self.state == QuestionState::Skipped
    }

    /// Answered or skipped; no further changes allowed.
    pub fn is_resolved(&self) -> bool {
        matches!(self.state, QuestionState::Answered(_) | QuestionState::Skipped)
    }
}

/// A single screening run.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub assessment_id: String,
    pub screening_type: ScreeningType,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    questions: Vec<Question>,
}

impl Assessment {
    fn new(screening_type: ScreeningType) -> Self {
        let questions = screening_type
            .questions()
            .iter()
            .enumerate()
            .map(|(index, text)| Question::new(index as u8 + 1, text))
            .collect();

        Self {
            assessment_id: format!("phq-{}", Uuid::new_v4().simple()),
            screening_type,
            started_at: Utc::now(),
            completed_at: None,
            questions,
        }
    }

    #[cfg(test)]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn question(&self, number: u8) -> Option<&Question> {
        self.questions.iter().find(|q| q.number == number)
    }

    fn question_mut(&mut self, number: u8) -> AppResult<&mut Question> {
        let screening_type = self.screening_type;
        self.questions
            .iter_mut()
            .find(|q| q.number == number)
            .ok_or_else(|| {
                AppError::ValidationError(format!(
                    "{} has no question {}",
                    screening_type, number
                ))
            })
    }

    pub fn is_completed(&self) -> bool {
        self.questions.iter().all(Question::is_resolved)
    }

    /// Sum of all recorded answers; skipped items count as 0.
    pub fn calculate_score(&self) -> u8 {
        self.questions.iter().filter_map(Question::answer).sum()
    }

    /// PHQ-9 item 9 answered above zero.
    pub fn crisis_flag(&self) -> bool {
        self.screening_type == ScreeningType::Phq9
            && self
                .question(CRISIS_ITEM)
                .and_then(Question::answer)
                .is_some_and(|value| value > 0)
    }

    pub fn answered_count(&self) -> usize {
        self.questions.iter().filter(|q| q.answer().is_some()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.questions.iter().filter(|q| q.is_skipped()).count()
    }

    /// Mark the first unresolved, not-yet-asked question as asked.
    fn advance(&mut self) {
        if let Some(next) = self.questions.iter_mut().find(|q| !q.is_resolved()) {
            if next.state == QuestionState::Unasked {
                next.state = QuestionState::Asked;
            }
        }
        if self.is_completed() && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
    }
}

/// Where the engine is in the assessment lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentPhase {
    NotStarted,
    InProgress,
    Completed,
}

/// Result of a start request.
#[derive(Debug, Clone, PartialEq)]
pub struct StartOutcome {
    pub assessment_id: String,
    pub screening_type: ScreeningType,
    /// True when an assessment was already running and nothing changed.
    pub already_active: bool,
}

/// What happened after an unparseable answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Re-prompt; the question stays open.
    Retry { attempts_remaining: u32 },
    /// Third strike; the question is now skipped.
    Skipped,
}

/// Final numbers for a completed assessment.
#[derive(Debug, Clone, Serialize)]
pub struct AssessmentResult {
    pub assessment_id: String,
    pub screening_type: ScreeningType,
    pub score: u8,
    pub max_score: u8,
    pub severity: Severity,
    pub crisis_flag: bool,
    pub answered: usize,
    pub skipped: usize,
    pub total_questions: usize,
    pub interpretation: Interpretation,
    pub completed_at: DateTime<Utc>,
}

impl AssessmentResult {
    /// Closing message spoken after the last question.
    pub fn summary(&self, first_name: &str) -> String {
        let mut summary = format!(
            "Thank you, {}. You've completed the {} assessment. Your total score is {} out of {}, \
             which falls in the {} range. {}",
            first_name,
            self.screening_type,
            self.score,
            self.max_score,
            self.severity.label().to_lowercase(),
            self.interpretation.text
        );

        if self.skipped > 0 {
            summary.push_str(&format!(
                " {} of {} questions were skipped and counted as zero.",
                self.skipped, self.total_questions
            ));
        }
        if !self.interpretation.recommendations.is_empty() {
            summary.push_str(&format!(
                " Recommendations: {}.",
                self.interpretation.recommendations.join("; ")
            ));
        }
        summary
    }
}

/// Owns the (at most one) active assessment.
#[derive(Debug, Default)]
pub struct ScreeningEngine {
    current: Option<Assessment>,
}

impl ScreeningEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin an assessment, or report the one already running.
    ///
    /// ## State Transition:
    /// NotStarted/Completed → InProgress (question 1 Asked)
    pub fn start_assessment(&mut self, screening_type: ScreeningType) -> StartOutcome {
        if let Some(existing) = self.current.as_ref().filter(|a| !a.is_completed()) {
            return StartOutcome {
                assessment_id: existing.assessment_id.clone(),
                screening_type: existing.screening_type,
                already_active: true,
            };
        }

        let mut assessment = Assessment::new(screening_type);
        assessment.advance();
        let outcome = StartOutcome {
            assessment_id: assessment.assessment_id.clone(),
            screening_type,
            already_active: false,
        };
        self.current = Some(assessment);
        outcome
    }

    pub fn current(&self) -> Option<&Assessment> {
        self.current.as_ref()
    }

    pub fn phase(&self) -> AssessmentPhase {
        match &self.current {
            None => AssessmentPhase::NotStarted,
            Some(a) if a.is_completed() => AssessmentPhase::Completed,
            Some(_) => AssessmentPhase::InProgress,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.phase() == AssessmentPhase::InProgress
    }

    /// First question that is neither answered nor skipped.
    pub fn next_question(&self) -> Option<&Question> {
        self.current
            .as_ref()?
            .questions
            .iter()
            .find(|q| !q.is_resolved())
    }

    /// Record that the assistant has put question `number` to the user.
    pub fn mark_asked(&mut self, number: u8) -> AppResult<()> {
        let assessment = self.active_mut()?;
        let question = assessment.question_mut(number)?;
        if question.state == QuestionState::Unasked {
            question.state = QuestionState::Asked;
        }
        Ok(())
    }

    /// Extract a single 0-3 value from a free-text reply.
    ///
    /// Accepts digits, the words zero to three, and the response-scale
    /// phrases. Returns `None` when nothing is found, when a number is off
    /// the scale, or when the reply mentions two different values.
    pub fn parse_answer(text: &str) -> Option<u8> {
        let mut candidates = BTreeSet::new();

        for found in NUMBER_PATTERN.find_iter(text) {
            let value: u32 = found.as_str().parse().ok()?;
            if value > MAX_ANSWER as u32 {
                return None;
            }
            candidates.insert(value as u8);
        }

        for found in NUMBER_WORD_PATTERN.find_iter(text) {
            let value = match found.as_str().to_ascii_lowercase().as_str() {
                "zero" => 0,
                "one" => 1,
                "two" => 2,
                _ => 3,
            };
            candidates.insert(value);
        }

        for found in SCALE_PHRASE_PATTERN.find_iter(text) {
            let phrase = found.as_str().to_ascii_lowercase();
            let value = if phrase.starts_with("not at all") {
                0
            } else if phrase.starts_with("several") {
                1
            } else if phrase.starts_with("more than half") {
                2
            } else {
                3
            };
            candidates.insert(value);
        }

        match candidates.len() {
            1 => candidates.into_iter().next(),
            _ => None,
        }
    }

    /// Store an answer for question `number`.
    ///
    /// ## State Transition:
    /// Unasked/Asked → Answered(value); the next open question becomes Asked.
    pub fn record_answer(&mut self, number: u8, value: u8) -> AppResult<()> {
        if value > MAX_ANSWER {
            return Err(AppError::InvalidAnswer(format!(
                "Answer {} is outside the 0-{} scale",
                value, MAX_ANSWER
            )));
        }

        let assessment = self.active_mut()?;
        let question = assessment.question_mut(number)?;
        if question.is_resolved() {
            return Err(AppError::InvalidAnswer(format!(
                "Question {} is already {}",
                number,
                if question.is_skipped() { "skipped" } else { "answered" }
            )));
        }

        question.state = QuestionState::Answered(value);
        question.attempts = 0;
        question.answered_at = Some(Utc::now());
        assessment.advance();
        Ok(())
    }

    /// Count an unparseable reply against question `number`.
    ///
    /// ## State Transition:
    /// Asked → Asked (attempts + 1), or → Skipped on the third attempt
    pub fn record_invalid_attempt(&mut self, number: u8) -> AppResult<AttemptOutcome> {
        let assessment = self.active_mut()?;
        let question = assessment.question_mut(number)?;
        if question.is_resolved() {
            return Err(AppError::InvalidAnswer(format!(
                "Question {} is no longer open",
                number
            )));
        }

        question.attempts += 1;
        if question.attempts >= MAX_INVALID_ATTEMPTS {
            question.state = QuestionState::Skipped;
            assessment.advance();
            Ok(AttemptOutcome::Skipped)
        } else {
            Ok(AttemptOutcome::Retry {
                attempts_remaining: MAX_INVALID_ATTEMPTS - question.attempts,
            })
        }
    }

    pub fn calculate_score(&self) -> u8 {
        self.current.as_ref().map(Assessment::calculate_score).unwrap_or(0)
    }

    pub fn determine_severity(score: u8, screening_type: ScreeningType) -> Severity {
        scoring::determine_severity(score, screening_type)
    }

    pub fn crisis_flag(&self) -> bool {
        self.current.as_ref().is_some_and(Assessment::crisis_flag)
    }

    /// Score, severity and interpretation; `None` until every question is resolved.
    pub fn result(&self) -> Option<AssessmentResult> {
        let assessment = self.current.as_ref().filter(|a| a.is_completed())?;
        let score = self.calculate_score();
        let crisis_flag = self.crisis_flag();

        Some(AssessmentResult {
            assessment_id: assessment.assessment_id.clone(),
            screening_type: assessment.screening_type,
            score,
            max_score: assessment.screening_type.max_score(),
            severity: Self::determine_severity(score, assessment.screening_type),
            crisis_flag,
            answered: assessment.answered_count(),
            skipped: assessment.skipped_count(),
            total_questions: assessment.questions.len(),
            interpretation: scoring::interpret(score, assessment.screening_type, crisis_flag),
            completed_at: assessment.completed_at.unwrap_or_else(Utc::now),
        })
    }

    /// "PHQ-9 Progress: 3/9 questions answered, 1 skipped"
    pub fn progress_summary(&self) -> String {
        let Some(assessment) = &self.current else {
            return "No active assessment".to_string();
        };

        let mut summary = format!(
            "{} Progress: {}/{} questions answered",
            assessment.screening_type,
            assessment.answered_count(),
            assessment.questions.len()
        );
        let skipped = assessment.skipped_count();
        if skipped > 0 {
            summary.push_str(&format!(", {} skipped", skipped));
        }
        summary
    }

    pub fn reset(&mut self) {
        self.current = None;
    }

    fn active_mut(&mut self) -> AppResult<&mut Assessment> {
        self.current
            .as_mut()
            .filter(|a| !a.is_completed())
            .ok_or_else(|| AppError::ValidationError("No assessment in progress".to_string()))
    }
}
