//! # Personalization
//!
//! Humor level, user identity, and the composer that turns them into
//! greetings, system instructions and confirmation lines.

pub mod composer;   // Greeting / instruction composition
pub mod humor;      // HumorLevel and its bands
pub mod identity;   // UserIdentity, first name and pet names

pub use composer::{compose, RandomSource, StdRandom};
pub use humor::{HumorBand, HumorLevel};
pub use identity::UserIdentity;
