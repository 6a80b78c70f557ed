//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Environment variables (APP_SERVER_HOST, APP_REALTIME_VOICE, etc.)
//! 2. Configuration file (config.toml)
//! 3. Default values (defined in the Default impl)
//!
//! ## Sections:
//! - **server**: where the HTTP/WebSocket server listens
//! - **realtime**: parameters handed to the voice transport on session start
//! - **session**: orchestrator timing (grace delays, notification dismissal)
//! - **preferences**: where the humor level is persisted

use anyhow::Result;              // Better error handling with context
use serde::{Deserialize, Serialize};  // For converting to/from TOML, JSON, etc.
use std::env;                    // For reading environment variables

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Breaking configuration into logical groups (server, realtime, session,
/// preferences) keeps each consumer looking only at the settings it needs:
/// the WebSocket bridge reads `session`, the transport config is built from
/// `realtime`, and the preference store only needs `preferences`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub realtime: RealtimeConfig,
    pub session: SessionTimingConfig,
    pub preferences: PreferencesConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Voice transport parameters sent with every `startSession` command.
///
/// ## Fields:
/// - `voice`: voice identity the realtime model speaks with
/// - `temperature`: sampling temperature (the realtime backend rejects values below 0.6)
/// - `turn_detection_threshold`: VAD activation threshold in [0, 1]
/// - `prefix_padding_ms`: audio kept before detected speech starts
/// - `silence_duration_ms`: silence that ends a user turn
/// - `enable_input_transcription`: ask the transport for user-side transcripts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    pub voice: String,
    pub temperature: f32,
    pub turn_detection_threshold: f32,
    pub prefix_padding_ms: u32,
    pub silence_duration_ms: u32,
    pub enable_input_transcription: bool,
}

/// Timers owned by the session controller.
///
/// ## Fields:
/// - `close_grace_ms`: delay between the farewell message and ending the session
/// - `notification_dismiss_ms`: how long a reconnect warning stays visible
/// - `caption_hold_ms`: how long a final assistant caption stays on screen
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTimingConfig {
    pub close_grace_ms: u64,
    pub notification_dismiss_ms: u64,
    pub caption_hold_ms: u64,
}

/// Persisted user preference settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencesConfig {
    /// TOML file holding the humor level between sessions; empty keeps it in memory
    pub store_path: String,
    /// Humor level used when nothing has been stored yet
    pub default_humor_level: u8,
}

/// Provides default configuration values.
///
/// ## Why defaults matter:
/// Default values ensure the server can start even if no configuration file
/// exists. They also document reasonable starting values.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),  // Localhost only (safe for development)
                port: 8080,
            },
            realtime: RealtimeConfig {
                voice: "alloy".to_string(),
                temperature: 0.7,
                turn_detection_threshold: 0.5,
                prefix_padding_ms: 200,
                silence_duration_ms: 300,
                enable_input_transcription: true,
            },
            session: SessionTimingConfig {
                close_grace_ms: 2000,
                notification_dismiss_ms: 5000,
                caption_hold_ms: 8000,
            },
            preferences: PreferencesConfig {
                store_path: "preferences.toml".to_string(),
                default_humor_level: 100,   // Casual until the user says otherwise
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP_
    /// 4. Handle special cases for HOST and PORT environment variables
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER_PORT=3000`: Override server port
    /// - `APP_REALTIME_VOICE=echo`: Override transport voice
    /// - `PORT=3000`: Special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            // 1. Start with defaults - converts our Default impl to config format
            .add_source(config::Config::try_from(&AppConfig::default())?)
            // 2. Load from config.toml file (if it exists)
            .add_source(config::File::with_name("config").required(false))
            // 3. Load from environment variables with APP_ prefix
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        // Deployment platforms commonly set these without the APP_ prefix
        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// ## What this checks:
    /// - Server port is not 0
    /// - Temperature is inside the range the realtime backend accepts
    /// - Turn detection threshold is a probability
    /// - Timers are non-zero (a zero grace delay would end the session
    ///   before the farewell is spoken)
    /// - Default humor level fits the 0-100 scale
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if !(0.6..=1.2).contains(&self.realtime.temperature) {
            return Err(anyhow::anyhow!(
                "Temperature must be between 0.6 and 1.2, got {}",
                self.realtime.temperature
            ));
        }

        if !(0.0..=1.0).contains(&self.realtime.turn_detection_threshold) {
            return Err(anyhow::anyhow!("Turn detection threshold must be between 0 and 1"));
        }

        if self.realtime.voice.trim().is_empty() {
            return Err(anyhow::anyhow!("Voice cannot be empty"));
        }

        if self.session.close_grace_ms == 0
            || self.session.notification_dismiss_ms == 0
            || self.session.caption_hold_ms == 0
        {
            return Err(anyhow::anyhow!("Session timers must be greater than 0"));
        }

        if self.preferences.default_humor_level > 100 {
            return Err(anyhow::anyhow!("Default humor level must be between 0 and 100"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// ## Partial updates:
    /// Only the fields present in the JSON are changed. For example,
    /// `{"realtime": {"voice": "echo"}}` changes only the voice.
    /// Sessions that are already running keep the values they started with.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                self.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                self.server.port = u16::try_from(port)
                    .map_err(|_| anyhow::anyhow!("Port {} is out of range", port))?;
            }
        }

        if let Some(realtime) = partial_config.get("realtime") {
            if let Some(voice) = realtime.get("voice").and_then(|v| v.as_str()) {
                self.realtime.voice = voice.to_string();
            }
            if let Some(temperature) = realtime.get("temperature").and_then(|v| v.as_f64()) {
                self.realtime.temperature = temperature as f32;
            }
            if let Some(threshold) = realtime.get("turn_detection_threshold").and_then(|v| v.as_f64()) {
                self.realtime.turn_detection_threshold = threshold as f32;
            }
            if let Some(padding) = realtime.get("prefix_padding_ms").and_then(|v| v.as_u64()) {
                self.realtime.prefix_padding_ms = padding as u32;
            }
            if let Some(silence) = realtime.get("silence_duration_ms").and_then(|v| v.as_u64()) {
                self.realtime.silence_duration_ms = silence as u32;
            }
            if let Some(enabled) = realtime.get("enable_input_transcription").and_then(|v| v.as_bool()) {
                self.realtime.enable_input_transcription = enabled;
            }
        }

        if let Some(session) = partial_config.get("session") {
            if let Some(ms) = session.get("close_grace_ms").and_then(|v| v.as_u64()) {
                self.session.close_grace_ms = ms;
            }
            if let Some(ms) = session.get("notification_dismiss_ms").and_then(|v| v.as_u64()) {
                self.session.notification_dismiss_ms = ms;
            }
            if let Some(ms) = session.get("caption_hold_ms").and_then(|v| v.as_u64()) {
                self.session.caption_hold_ms = ms;
            }
        }

        if let Some(preferences) = partial_config.get("preferences") {
            if let Some(level) = preferences.get("default_humor_level").and_then(|v| v.as_u64()) {
                self.preferences.default_humor_level = level.min(u8::MAX as u64) as u8;
            }
        }

        // Validate the updated configuration to ensure it's still valid
        self.validate()?;
        Ok(())
    }
}
