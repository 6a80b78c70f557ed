//! # Voice Command Intents
//!
//! Intent detection for user utterances. The router only depends on the
//! [`IntentClassifier`] trait; [`PatternIntentClassifier`] is the regex
//! implementation used in production.
//!
//! ## Matching order:
//! humor → close → pause → resume → help. The first match wins, so
//! "stop the session" is a close even though nothing else would claim it.

use regex::Regex;
use std::sync::LazyLock;

/// Recognized control command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Raw requested level; the router clamps it
    SetHumor(i64),
    Close,
    Pause,
    Resume,
    Help,
    None,
}

impl Intent {
    pub fn is_command(&self) -> bool {
        *self != Intent::None
    }
}

pub trait IntentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Intent;
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("command pattern must compile")
}

static HUMOR: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\bset (?:humor|flight ops|ops) (?:level )?to (\d+)"));

static CLOSE: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        compile(r"(?i)^(?:close|end|stop|terminate|exit|quit) (?:the )?(?:session|conversation|chat|call|meeting|app|application)?\.?$"),
        compile(r"(?i)\b(?:close|end|stop|exit)\s+(?:the\s+)?(?:session|conversation|chat|call)\b"),
    ]
});

static PAUSE: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        compile(r"(?i)^(?:pause|hold|suspend) (?:the )?(?:session|conversation|chat|call|meeting)?\.?$"),
        compile(r"(?i)\b(?:pause|hold|suspend)\s+(?:the\s+)?(?:session|conversation|chat)\b"),
    ]
});

static RESUME: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        compile(r"(?i)^(?:resume|continue|restart|unpause) (?:the )?(?:session|conversation|chat|call|meeting)?\.?$"),
        compile(r"(?i)\b(?:resume|continue|restart)\s+(?:the\s+)?(?:session|conversation|chat)\b"),
    ]
});

static HELP: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:help|commands|what can you do|show commands|voice commands)\b"));

/// Regex-based classifier for spoken commands.
#[derive(Debug, Default, Clone, Copy)]
pub struct PatternIntentClassifier;

impl IntentClassifier for PatternIntentClassifier {
    fn classify(&self, text: &str) -> Intent {
        let text = text.trim();

        if let Some(captures) = HUMOR.captures(text) {
            // Digits only, so a parse failure means overflow; clamp handles it later
            let level = captures[1].parse::<i64>().unwrap_or(i64::MAX);
            return Intent::SetHumor(level);
        }
        if CLOSE.iter().any(|re| re.is_match(text)) {
            return Intent::Close;
        }
        if PAUSE.iter().any(|re| re.is_match(text)) {
            return Intent::Pause;
        }
        if RESUME.iter().any(|re| re.is_match(text)) {
            return Intent::Resume;
        }
        if HELP.is_match(text) {
            return Intent::Help;
        }
        Intent::None
    }
}
