//! # Clinical Screening
//!
//! PHQ-2 / PHQ-9 depression screening conducted through conversation.
//!
//! ## Key Components:
//! - **Questionnaire**: fixed item texts and the 0-3 response scale
//! - **Engine**: per-question state machine with the invalid-answer/skip policy
//! - **Scoring**: totals, severity bands, interpretation, crisis resources

pub mod engine;         // Assessment state machine
pub mod questionnaire;  // Item lists and response scale
pub mod scoring;        // Severity bands and interpretation

pub use engine::{AssessmentPhase, AssessmentResult, AttemptOutcome, ScreeningEngine};
pub use questionnaire::ScreeningType;
pub use scoring::Severity;
