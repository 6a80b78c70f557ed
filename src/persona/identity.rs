//! Who the assistant is talking to and how it may address them.

use serde::{Deserialize, Serialize};

/// First name used when no display name is known.
pub const FALLBACK_FIRST_NAME: &str = "Sir";

/// Playful names the casual band may use instead of the first name.
pub const PET_NAMES: [&str; 5] = ["Champ", "Slick", "Ace", "Hotshot", "Chief"];

/// Authenticated user as reported by the client on session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl UserIdentity {
    pub fn new(user_id: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name,
        }
    }

    /// First whitespace token of the display name, or "Sir".
    pub fn first_name(&self) -> String {
        self.display_name
            .as_deref()
            .and_then(|name| name.split_whitespace().next())
            .unwrap_or(FALLBACK_FIRST_NAME)
            .to_string()
    }

    /// Fixed pet names plus an upper-cased three-letter abbreviation of the
    /// last name when it is longer than two characters.
    pub fn pet_name_candidates(&self) -> Vec<String> {
        let mut candidates: Vec<String> = PET_NAMES.iter().map(|name| name.to_string()).collect();

        let parts: Vec<&str> = self
            .display_name
            .as_deref()
            .map(|name| name.split_whitespace().collect())
            .unwrap_or_default();

        if parts.len() > 1 {
            if let Some(last) = parts.last() {
                if last.chars().count() > 2 {
                    candidates.push(last.chars().take(3).collect::<String>().to_uppercase());
                }
            }
        }

        candidates
    }
}

impl Default for UserIdentity {
    fn default() -> Self {
        Self::new("anonymous", None)
    }
}
