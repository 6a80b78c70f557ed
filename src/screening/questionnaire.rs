//! # Questionnaire Definitions
//!
//! Fixed item lists and the shared response scale for the PHQ-2 and PHQ-9
//! depression screens. PHQ-2 is the first two items of PHQ-9.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which screening instrument an assessment runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScreeningType {
    #[serde(rename = "PHQ-2")]
    Phq2,
    #[serde(rename = "PHQ-9")]
    Phq9,
}

impl ScreeningType {
    /// Display label ("PHQ-2" / "PHQ-9").
    pub fn label(&self) -> &'static str {
        match self {
            ScreeningType::Phq2 => "PHQ-2",
            ScreeningType::Phq9 => "PHQ-9",
        }
    }

    /// Short form used in function results and transcript metadata.
    pub fn short_code(&self) -> &'static str {
        match self {
            ScreeningType::Phq2 => "phq2",
            ScreeningType::Phq9 => "phq9",
        }
    }

    pub fn question_count(&self) -> usize {
        match self {
            ScreeningType::Phq2 => 2,
            ScreeningType::Phq9 => 9,
        }
    }

    /// Highest possible total score (every item answered 3).
    pub fn max_score(&self) -> u8 {
        (self.question_count() as u8) * MAX_ANSWER
    }

    /// Ordered item texts for this instrument.
    pub fn questions(&self) -> &'static [&'static str] {
        &PHQ9_QUESTIONS[..self.question_count()]
    }
}

impl fmt::Display for ScreeningType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ScreeningType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "phq2" => Ok(ScreeningType::Phq2),
            "phq9" => Ok(ScreeningType::Phq9),
            other => Err(format!("Unknown screening type: {}", other)),
        }
    }
}

/// Highest value on the response scale.
pub const MAX_ANSWER: u8 = 3;

/// Invalid attempts after which a question is skipped.
pub const MAX_INVALID_ATTEMPTS: u32 = 3;

/// PHQ-9 item number that screens for self-harm ideation.
pub const CRISIS_ITEM: u8 = 9;

/// Response scale shared by both instruments.
pub const RESPONSE_SCALE: [(u8, &str); 4] = [
    (0, "Not at all"),
    (1, "Several days"),
    (2, "More than half the days"),
    (3, "Nearly every day"),
];

const PHQ9_QUESTIONS: [&str; 9] = [
    "Over the last 2 weeks, how often have you been bothered by little interest or pleasure in doing things?",
    "Over the last 2 weeks, how often have you been bothered by feeling down, depressed, or hopeless?",
    "Over the last 2 weeks, how often have you been bothered by trouble falling or staying asleep, or sleeping too much?",
    "Over the last 2 weeks, how often have you been bothered by feeling tired or having little energy?",
    "Over the last 2 weeks, how often have you been bothered by poor appetite or overeating?",
    "Over the last 2 weeks, how often have you been bothered by feeling bad about yourself or that you are a failure or have let yourself or your family down?",
    "Over the last 2 weeks, how often have you been bothered by trouble concentrating on things, such as reading the newspaper or watching television?",
    "Over the last 2 weeks, how often have you been bothered by moving or speaking so slowly that other people could have noticed, or the opposite - being so fidgety or restless that you have been moving around a lot more than usual?",
    "Over the last 2 weeks, how often have you been bothered by thoughts that you would be better off dead, or of hurting yourself in some way?",
];

/// Response scale as "0 = Not at all" lines, returned to the model with invoke results.
pub fn response_scale_text() -> String {
    RESPONSE_SCALE
        .iter()
        .map(|(value, text)| format!("{} = {}", value, text))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phq2_is_prefix_of_phq9() {
        let phq2 = ScreeningType::Phq2.questions();
        let phq9 = ScreeningType::Phq9.questions();
        assert_eq!(phq2.len(), 2);
        assert_eq!(phq9.len(), 9);
        assert_eq!(phq2, &phq9[..2]);
    }

    #[test]
    fn test_max_scores() {
        assert_eq!(ScreeningType::Phq2.max_score(), 6);
        assert_eq!(ScreeningType::Phq9.max_score(), 27);
    }

    #[test]
    fn test_type_parsing() {
        assert_eq!("PHQ-9".parse::<ScreeningType>(), Ok(ScreeningType::Phq9));
        assert_eq!("phq2".parse::<ScreeningType>(), Ok(ScreeningType::Phq2));
        assert!("gad7".parse::<ScreeningType>().is_err());
    }

    #[test]
    fn test_response_scale_text() {
        let text = response_scale_text();
        assert!(text.starts_with("0 = Not at all"));
        assert!(text.ends_with("3 = Nearly every day"));
    }
}
