//! # Live Transcript Buffer
//!
//! Ring buffer of the most recent partial/final transcript fragments, shown
//! as rolling captions while someone is speaking. Ephemeral: cleared on
//! every session start and end.
//!
//! ## Memory Management:
//! - Fixed capacity; the oldest fragment is discarded when a new one arrives
//!   on a full buffer
//! - `VecDeque` gives O(1) push/pop at both ends

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

/// Number of fragments retained.
pub const LIVE_TRANSCRIPT_CAPACITY: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveFragment {
    pub text: String,
    pub is_final: bool,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct LiveTranscriptBuffer {
    fragments: VecDeque<LiveFragment>,
    capacity: usize,
}

impl LiveTranscriptBuffer {
    pub fn new() -> Self {
        Self::with_capacity(LIVE_TRANSCRIPT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            fragments: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a fragment, evicting the oldest when full.
    pub fn push(&mut self, text: impl Into<String>, is_final: bool) {
        if self.fragments.len() == self.capacity {
            self.fragments.pop_front();
        }
        self.fragments.push_back(LiveFragment {
            text: text.into(),
            is_final,
            received_at: Utc::now(),
        });
    }

    pub fn fragments(&self) -> impl Iterator<Item = &LiveFragment> {
        self.fragments.iter()
    }

    #[cfg(test)]
    pub fn latest(&self) -> Option<&LiveFragment> {
        self.fragments.back()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
    }
}

impl Default for LiveTranscriptBuffer {
    fn default() -> Self {
        Self::new()
    }
}
