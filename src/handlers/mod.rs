pub mod config;
pub mod preferences;

pub use config::*;
pub use preferences::*;
