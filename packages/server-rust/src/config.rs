//! Server configuration for the dispatch loop and HTTP transport.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchyard_core::{ErrorBodyMode, ErrorSelector, ErrorType, LogFilterRule};

/// Top-level configuration.
///
/// Deserializable from JSON with every field optional; absent fields take
/// the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener.
    pub host: String,
    /// Port to listen on. 0 means OS-assigned.
    pub port: u16,
    /// Maximum time a handler may take before the request is answered with a
    /// timeout error.
    pub timeout_ms: u64,
    /// Emit a per-request latency log line after each request closes.
    pub debug_timing: bool,
    /// Production mode: suppresses untyped error details in response bodies
    /// and the startup route dump.
    pub production: bool,
    /// Error rendered when no route matches the request path.
    pub default_error: ErrorSelector,
    /// Additional error types, registered after the built-ins; an entry with
    /// a built-in name shadows it.
    pub error_types: Vec<ErrorType>,
    /// How error responses are rendered on the wire.
    pub error_body: ErrorBodyMode,
    /// Ordered log severity rules for error responses, last declaration
    /// winning.
    pub error_log_types: Vec<LogFilterRule>,
    /// Allowed CORS origins.
    pub cors_origins: Vec<String>,
    /// Maximum accepted request body size in bytes.
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// The handler timeout as a [`Duration`].
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            timeout_ms: 60_000,
            debug_timing: false,
            production: false,
            default_error: ErrorSelector::from("not_found"),
            error_types: Vec::new(),
            error_body: ErrorBodyMode::Type,
            error_log_types: Vec::new(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: 1_048_576, // 1 MiB
        }
    }
}

#[cfg(test)]
mod tests {
    use switchyard_core::LogLevel;

    use super::*;

    #[test]
    fn server_config_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.timeout_ms, 60_000);
        assert_eq!(config.timeout(), Duration::from_secs(60));
        assert!(!config.debug_timing);
        assert!(!config.production);
        assert_eq!(config.default_error, ErrorSelector::from("not_found"));
        assert!(config.error_types.is_empty());
        assert_eq!(config.error_body, ErrorBodyMode::Type);
        assert!(config.error_log_types.is_empty());
        assert_eq!(config.cors_origins, vec!["*"]);
        assert_eq!(config.max_body_bytes, 1_048_576);
    }

    #[test]
    fn partial_json_takes_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"port":8080,"production":true}"#).expect("config");
        assert_eq!(config.port, 8080);
        assert!(config.production);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.timeout_ms, 60_000);
    }

    #[test]
    fn full_json_round_trip() {
        let config: ServerConfig = serde_json::from_str(
            r#"{
                "timeout_ms": 500,
                "default_error": 404,
                "error_body": "object",
                "error_types": [{"code": 418, "type": "teapot"}],
                "error_log_types": [
                    {"range": 400, "level": "warn"},
                    {"type": "timeout", "level": "debug"}
                ]
            }"#,
        )
        .expect("config");

        assert_eq!(config.timeout_ms, 500);
        assert_eq!(config.default_error, ErrorSelector::Code(404));
        assert_eq!(config.error_body, ErrorBodyMode::Object);
        assert_eq!(config.error_types.len(), 1);
        assert_eq!(config.error_types[0].name, "teapot");
        assert_eq!(config.error_log_types.len(), 2);
        assert_eq!(config.error_log_types[1].level, LogLevel::Debug);
    }
}
