//! Configuration for the Flowdock Server
//!
//! This module contains the configuration types and loading functionality.

use flowdock_core::FlowRuntimeSettings;
use serde::{Deserialize, Serialize};
use std::env;
use tracing::{info, warn};

use crate::error::{ServerError, ServerResult};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Host to bind to
    #[serde(default = "default_host")]
    pub bind_address: String,

    /// Where the flow document lives (`file://<path>` or `memory://`)
    #[serde(default = "default_document_store_url")]
    pub document_store_url: String,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Settings every flow is re-initialized with on reload
    #[serde(default)]
    pub flow_runtime: FlowRuntimeSettings,

    /// Delay before the startup propagation of API components
    #[serde(default = "default_startup_sync_delay_ms")]
    pub startup_sync_delay_ms: u64,

    /// Run registrations one at a time
    #[serde(default = "default_serialize_registrations")]
    pub serialize_registrations: bool,

    /// How often a reload retries after a concurrent document change
    #[serde(default = "default_reload_conflict_retries")]
    pub reload_conflict_retries: u32,

    /// Maximum accepted registration body size
    #[serde(default = "default_max_register_body_bytes")]
    pub max_register_body_bytes: usize,

    /// Timeout for the read-only routes (listing, health)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_port() -> u16 {
    8000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_document_store_url() -> String {
    "file://flowstream/database.json".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_startup_sync_delay_ms() -> u64 {
    2000
}

fn default_serialize_registrations() -> bool {
    true
}

fn default_reload_conflict_retries() -> u32 {
    3
}

fn default_max_register_body_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn env_flag(name: &str, target: &mut bool) {
    if let Ok(value) = env::var(name) {
        match parse_flag(&value) {
            Some(flag) => *target = flag,
            None => warn!("Invalid {} value: {}", name, value),
        }
    }
}

fn env_number<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(value) = env::var(name) {
        match value.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!("Invalid {} value: {}", name, value),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn load() -> ServerResult<Self> {
        // Start with defaults
        let mut config = Self::default();

        env_number("SERVER_PORT", &mut config.port);

        if let Ok(host) = env::var("SERVER_HOST") {
            config.bind_address = host;
        }

        if let Ok(url) = env::var("DOCUMENT_STORE_URL") {
            config.document_store_url = url;
        }

        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.log_level = log_level;
        }

        // Flow runtime settings
        if let Ok(directory) = env::var("FLOWSTREAM_DIRECTORY") {
            config.flow_runtime.directory = directory;
        }
        env_flag("FLOWSTREAM_SANDBOX", &mut config.flow_runtime.sandbox);
        env_number("FLOWSTREAM_MEMORY", &mut config.flow_runtime.memory);
        env_flag("FLOWSTREAM_ASFILES", &mut config.flow_runtime.asfiles);
        if let Ok(worker) = env::var("FLOWSTREAM_WORKER") {
            config.flow_runtime.worker = Some(worker).filter(|w| !w.is_empty());
        }
        if let Ok(flow_env) = env::var("FLOW_ENV") {
            config.flow_runtime.env = flow_env;
        }

        env_number("STARTUP_SYNC_DELAY_MS", &mut config.startup_sync_delay_ms);
        env_flag("SERIALIZE_REGISTRATIONS", &mut config.serialize_registrations);
        env_number("RELOAD_CONFLICT_RETRIES", &mut config.reload_conflict_retries);

        let mut body_mb = config.max_register_body_bytes / (1024 * 1024);
        env_number("MAX_REGISTER_BODY_MB", &mut body_mb);
        config.max_register_body_bytes = body_mb * 1024 * 1024;

        env_number("REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs);

        config.validate()?;

        if !config.serialize_registrations {
            warn!("SERIALIZE_REGISTRATIONS disabled - concurrent registrations may lose updates");
        }

        info!("Loaded server configuration");
        Ok(config)
    }

    /// Check values that cannot be defaulted
    pub fn validate(&self) -> ServerResult<()> {
        if self.document_store_url.is_empty() {
            return Err(ServerError::ConfigError("Document store URL is required".to_string()));
        }

        if self.max_register_body_bytes == 0 {
            return Err(ServerError::ConfigError(
                "Registration body limit must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_host(),
            document_store_url: default_document_store_url(),
            log_level: default_log_level(),
            flow_runtime: FlowRuntimeSettings::default(),
            startup_sync_delay_ms: default_startup_sync_delay_ms(),
            serialize_registrations: default_serialize_registrations(),
            reload_conflict_retries: default_reload_conflict_retries(),
            max_register_body_bytes: default_max_register_body_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}
