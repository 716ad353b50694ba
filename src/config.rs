//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix, `__` between nesting levels)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` environment variables (deployment platforms)
//! 2. Environment variables (APP_SERVER__HOST, APP_MODELS__MODEL_PATH, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! ## Startup-only settings:
//! Everything under `models` is read once when the predictor is loaded. Runtime updates
//! through `PUT /api/v1/config` only touch `server` and `performance`.

use crate::inference::ranker::DEFAULT_TOP_K;
use crate::landmarks::schema::ROWS_PER_FRAME;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub performance: PerformanceConfig,
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

/// Model artifacts and their signature.
///
/// ## Fields:
/// - `model_path`: ONNX export of the sign classifier
/// - `vocab_map_path`: JSON map of ordinal → `{"sign": ...}`, also served to the client
/// - `schema_path`: Optional reference schema file; the built-in holistic layout is used when unset
/// - `fs_contents_path`: Finger-spelling video index served to the client
/// - `input_name` / `output_name`: Tensor names in the model signature
/// - `rows_per_frame`: Landmark rows the model expects per frame
/// - `intra_threads`: ONNX Runtime intra-op threads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub model_path: String,
    pub vocab_map_path: String,
    pub schema_path: Option<String>,
    pub fs_contents_path: String,
    pub input_name: String,
    pub output_name: String,
    pub rows_per_frame: usize,
    pub intra_threads: usize,
}

/// Performance tuning configuration.
///
/// ## Fields:
/// - `max_concurrent_sessions`: Live websocket sessions allowed at once
/// - `top_k`: Candidates returned per prediction
/// - `heartbeat_interval_secs`: How often the server pings websocket clients
/// - `client_timeout_secs`: Silence after which a websocket client is dropped
///
/// ## Memory note:
/// A session's frame buffer grows until the client predicts or disconnects.
/// The heartbeat timeout is what eventually reclaims buffers of vanished clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
    pub top_k: usize,
    pub heartbeat_interval_secs: u64,
    pub client_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5000,
            },
            models: ModelsConfig {
                model_path: "./model/vocab_model.onnx".to_string(),
                vocab_map_path: "./vocab_map.json".to_string(),
                schema_path: None,
                fs_contents_path: "./fs_yt.json".to_string(),
                input_name: "inputs".to_string(),
                output_name: "outputs".to_string(),
                rows_per_frame: ROWS_PER_FRAME,
                intra_threads: 1,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 64,
                top_k: DEFAULT_TOP_K,
                heartbeat_interval_secs: 30,
                client_timeout_secs: 60,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_MODELS__MODEL_PATH=/models/sign.onnx`: Override model location
    /// - `APP_PERFORMANCE__TOP_K=5`: Return five candidates
    /// - `HOST=0.0.0.0` / `PORT=3000`: Deployment platform overrides
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

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
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.models.rows_per_frame == 0 {
            return Err(anyhow::anyhow!("Rows per frame must be greater than 0"));
        }

        if self.models.intra_threads == 0 {
            return Err(anyhow::anyhow!("Intra-op threads must be greater than 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        if self.performance.top_k == 0 || self.performance.top_k > DEFAULT_TOP_K {
            return Err(anyhow::anyhow!("top_k must be between 1 and {}", DEFAULT_TOP_K));
        }

        if self.performance.heartbeat_interval_secs == 0 {
            return Err(anyhow::anyhow!("Heartbeat interval must be greater than 0"));
        }

        if self.performance.client_timeout_secs <= self.performance.heartbeat_interval_secs {
            return Err(anyhow::anyhow!(
                "Client timeout must be longer than the heartbeat interval"
            ));
        }

        Ok(())
    }

    /// Apply a partial JSON update (used by `PUT /api/v1/config`).
    ///
    /// Only runtime-tunable fields are read; for example `{"performance": {"top_k": 5}}`
    /// changes the candidate count and leaves everything else untouched.
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

        if let Some(performance) = partial_config.get("performance") {
            if let Some(sessions) = performance.get("max_concurrent_sessions").and_then(|v| v.as_u64()) {
                self.performance.max_concurrent_sessions = sessions as usize;
            }
            if let Some(top_k) = performance.get("top_k").and_then(|v| v.as_u64()) {
                self.performance.top_k = top_k as usize;
            }
            if let Some(interval) = performance.get("heartbeat_interval_secs").and_then(|v| v.as_u64()) {
                self.performance.heartbeat_interval_secs = interval;
            }
            if let Some(timeout) = performance.get("client_timeout_secs").and_then(|v| v.as_u64()) {
                self.performance.client_timeout_secs = timeout;
            }
        }

        self.validate()?;
        Ok(())
    }
}
