//! # Session Orchestration
//!
//! One controller per connected client, fed by a single event queue.

pub mod context;        // SessionState and the effect Outbox
pub mod controller;     // Event loop and lifecycle operations
pub mod events;         // Inbound SessionEvent / outbound SessionUpdate
pub mod model;          // Session status and connection status
pub mod notifications;  // Connection-loss notices
pub mod persistence;    // Transcript/progress stores and the write worker
pub mod preferences;    // Persisted humor level
pub mod transport;      // Voice transport seam

#[cfg(test)]
pub(crate) mod testing;

pub use controller::SessionController;
pub use events::{SessionEvent, SessionUpdate};
pub use persistence::{InMemoryProgressStore, InMemoryTranscriptStore, Stores};
pub use preferences::{FilePreferenceStore, InMemoryPreferenceStore, PreferenceStore};
pub use transport::ClientTransport;
