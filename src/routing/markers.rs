//! Hidden markers and phrasing the assistant uses around screening questions.
//!
//! The model prefixes every screening question with `[PHQ-Q<n>]`. The marker
//! is stripped before the message is shown and turned into metadata. The
//! acknowledgement/skip/completion scan is diagnostic only; the screening
//! engine's own interpretation of user turns is authoritative.

use regex::Regex;
use std::sync::LazyLock;

static QUESTION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[PHQ-Q(\d+)\]").expect("valid question tag pattern"));

static QUESTION_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Question \d+:\s*([^?]+\?)").expect("valid question text pattern"));

static ACKNOWLEDGEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:noted|recorded|noted down|captured|registered|logged)\s+(?:your\s+)?(?:response|answer)?\s+(?:as|of)?\s*(\d)")
        .expect("valid acknowledgement pattern")
});

static SKIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:skip|skipping|skipped)\s+(?:this\s+)?(?:question|item)").expect("valid skip pattern")
});

static COMPLETION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:completes?|completed|finished)\s+(?:the\s+)?(?:PHQ-2|PHQ-9|assessment|screening)")
        .expect("valid completion pattern")
});

static EXTRA_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid whitespace pattern"));

/// Question marker found in an assistant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionTag {
    pub number: u8,
    /// Text after "Question <n>:" up to the first question mark, if present
    pub question_text: Option<String>,
}

/// Assistant message with any markers removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedText {
    pub text: String,
    pub tag: Option<QuestionTag>,
}

/// Strip every `[PHQ-Q<n>]` marker; the first one becomes the tag.
pub fn extract_question_tag(text: &str) -> TaggedText {
    let Some(captures) = QUESTION_TAG.captures(text) else {
        return TaggedText {
            text: text.to_string(),
            tag: None,
        };
    };
    // Out-of-range numbers are still stripped, they just carry no tag
    let number = captures[1].parse::<u8>().ok();

    let stripped = QUESTION_TAG.replace_all(text, "");
    let stripped = EXTRA_SPACES.replace_all(stripped.trim(), " ").into_owned();
    let tag = number.map(|number| QuestionTag {
        number,
        question_text: QUESTION_TEXT
            .captures(&stripped)
            .map(|captures| captures[1].trim().to_string()),
    });

    TaggedText { text: stripped, tag }
}

/// Bookkeeping phrases spotted in assistant speech.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantSignal {
    Acknowledged(u8),
    Skipped,
    Completed,
}

pub fn scan_assistant_signals(text: &str) -> Vec<AssistantSignal> {
    let mut signals = Vec::new();

    if let Some(value) = ACKNOWLEDGEMENT
        .captures(text)
        .and_then(|captures| captures[1].parse::<u8>().ok())
    {
        signals.push(AssistantSignal::Acknowledged(value));
    }
    if SKIP.is_match(text) {
        signals.push(AssistantSignal::Skipped);
    }
    if COMPLETION.is_match(text) {
        signals.push(AssistantSignal::Completed);
    }

    signals
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_is_stripped_and_question_extracted() {
        let tagged = extract_question_tag(
            "[PHQ-Q1] Question 1: Over the last 2 weeks, how often have you had little interest in doing things? Take your time.",
        );
        assert_eq!(
            tagged.text,
            "Question 1: Over the last 2 weeks, how often have you had little interest in doing things? Take your time."
        );
        let tag = tagged.tag.unwrap();
        assert_eq!(tag.number, 1);
        assert_eq!(
            tag.question_text.as_deref(),
            Some("Over the last 2 weeks, how often have you had little interest in doing things?")
        );
    }

    #[test]
    fn test_tag_without_question_prefix() {
        let tagged = extract_question_tag("Next one. [PHQ-Q2] How have you been sleeping?");
        assert_eq!(tagged.text, "Next one. How have you been sleeping?");
        let tag = tagged.tag.unwrap();
        assert_eq!(tag.number, 2);
        assert!(tag.question_text.is_none());
    }

    #[test]
    fn test_oversized_tag_is_stripped_without_metadata() {
        let tagged = extract_question_tag("[PHQ-Q300] Question 300: Anything else?");
        assert_eq!(tagged.text, "Question 300: Anything else?");
        assert!(tagged.tag.is_none());
    }

    #[test]
    fn test_untagged_text_is_unchanged() {
        let tagged = extract_question_tag("Hello  there");
        assert_eq!(tagged.text, "Hello  there");
        assert!(tagged.tag.is_none());
    }

    #[test]
    fn test_assistant_signals() {
        assert_eq!(
            scan_assistant_signals("Thanks, I've noted your response as 2."),
            vec![AssistantSignal::Acknowledged(2)]
        );
        assert_eq!(
            scan_assistant_signals("We'll skip this question and move on."),
            vec![AssistantSignal::Skipped]
        );
        assert_eq!(
            scan_assistant_signals("You have completed the PHQ-2."),
            vec![AssistantSignal::Completed]
        );
        assert!(scan_assistant_signals("How are you today?").is_empty());
    }
}
