//! # Scoring and Severity
//!
//! Deterministic score-band lookup per instrument, clinical interpretation
//! text, and the crisis-resources message.
//!
//! ## Severity bands:
//! - **PHQ-9** (0-27): 0-4 minimal, 5-9 mild, 10-14 moderate,
//!   15-19 moderately severe, 20-27 severe
//! - **PHQ-2** (0-6): 0-1 minimal, 2 mild, 3-4 moderate, 5-6 severe.
//!   A PHQ-2 score of 3 or more is a positive screen.

use crate::screening::questionnaire::ScreeningType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named severity category derived from a total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Minimal,
    Mild,
    Moderate,
    ModeratelySevere,
    Severe,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Minimal => "Minimal",
            Severity::Mild => "Mild",
            Severity::Moderate => "Moderate",
            Severity::ModeratelySevere => "Moderately Severe",
            Severity::Severe => "Severe",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// PHQ-2 score at or above which further evaluation is recommended.
pub const PHQ2_POSITIVE_SCREEN: u8 = 3;

/// Map a total score onto its severity band for the given instrument.
///
/// Scores above the instrument maximum land in the top band.
pub fn determine_severity(score: u8, screening_type: ScreeningType) -> Severity {
    match screening_type {
        ScreeningType::Phq2 => match score {
            0..=1 => Severity::Minimal,
            2 => Severity::Mild,
            3..=4 => Severity::Moderate,
            _ => Severity::Severe,
        },
        ScreeningType::Phq9 => match score {
            0..=4 => Severity::Minimal,
            5..=9 => Severity::Mild,
            10..=14 => Severity::Moderate,
            15..=19 => Severity::ModeratelySevere,
            _ => Severity::Severe,
        },
    }
}

/// Interpretation sentence plus recommendations for a completed assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub text: String,
    pub recommendations: Vec<String>,
}

pub fn interpret(score: u8, screening_type: ScreeningType, crisis_flag: bool) -> Interpretation {
    match screening_type {
        ScreeningType::Phq2 => {
            if score >= PHQ2_POSITIVE_SCREEN {
                Interpretation {
                    text: "Positive screen for depression. Further evaluation recommended.".to_string(),
                    recommendations: vec![
                        "Consider completing PHQ-9 for comprehensive assessment".to_string(),
                        "Discuss results with healthcare provider".to_string(),
                        "Consider mental health professional consultation".to_string(),
                    ],
                }
            } else {
                Interpretation {
                    text: "Negative screen for depression. Low likelihood of major depression.".to_string(),
                    recommendations: vec![
                        "Continue monitoring mood and wellbeing".to_string(),
                        "Seek help if symptoms worsen or persist".to_string(),
                    ],
                }
            }
        }
        ScreeningType::Phq9 => {
            let text = match determine_severity(score, screening_type) {
                Severity::Minimal => "Minimal depression. May not require treatment.",
                Severity::Mild => "Mild depression. Consider counseling, follow-up, or watchful waiting.",
                Severity::Moderate => "Moderate depression. Consider psychotherapy or medication.",
                Severity::ModeratelySevere => "Moderately severe depression. Active treatment recommended.",
                Severity::Severe => "Severe depression. Immediate active treatment required.",
            };

            let mut recommendations = Vec::new();
            if score >= 10 {
                recommendations.push("Consider professional mental health treatment".to_string());
                recommendations.push("Discuss medication options with healthcare provider".to_string());
            }
            if score >= 5 {
                recommendations.push("Consider psychotherapy or counseling".to_string());
                recommendations.push("Monitor symptoms closely".to_string());
            }
            if crisis_flag {
                recommendations.insert(0, "PRIORITY: Seek immediate help for thoughts of self-harm".to_string());
                recommendations.push("Contact crisis line: call or text 988 (US) or local emergency services".to_string());
            }

            Interpretation {
                text: text.to_string(),
                recommendations,
            }
        }
    }
}

/// Message appended ahead of the summary whenever the crisis flag is raised.
pub fn crisis_resources_message(first_name: &str) -> String {
    format!(
        "{}, thank you for answering honestly. You mentioned having thoughts of being better off dead \
         or of hurting yourself. You don't have to go through this alone. If you are in immediate danger, \
         call 911 or your local emergency number now. You can call or text 988 to reach the Suicide & Crisis \
         Lifeline any time, day or night, or text HOME to 741741 to reach the Crisis Text Line.",
        first_name
    )
}
