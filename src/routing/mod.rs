//! # Message Routing
//!
//! Decides what each finalized utterance is: a voice command, a screening
//! answer, or ordinary dialogue.

pub mod intent;     // IntentClassifier and the regex implementation
pub mod markers;    // [PHQ-Q<n>] tags and assistant bookkeeping phrases
pub mod router;     // Ordered matcher chain

pub use intent::{IntentClassifier, PatternIntentClassifier};
pub use router::MessageRouter;
