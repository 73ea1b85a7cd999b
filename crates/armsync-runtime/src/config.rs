//! Runtime configuration
//!
//! Loaded from JSON. Every section and field has a default, so an empty
//! object is a valid configuration. Durations are written the humantime
//! way: `"500ms"`, `"2s"`, `"1m 30s"`.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use armsync_core::ArmsyncError;
use armsync_wire::WireFormat;

use crate::surface::{Palette, TechniqueFallback};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

impl From<ConfigError> for ArmsyncError {
    fn from(err: ConfigError) -> Self {
        ArmsyncError::Config(err.to_string())
    }
}

/// Top-level configuration
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub session: JoinConfig,
    pub node: NodeConfig,
    pub presentation: PresentationConfig,
    pub logging: LoggingConfig,
}

impl RuntimeConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }
}

/// Session join sequencing
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    /// Human-readable session name; the session id is derived from it
    pub session_name: String,
    /// Pause between client availability and the join attempt
    #[serde(with = "duration_text")]
    pub auto_join_delay: Duration,
    /// Wait for at least one live connection before joining
    pub require_connection: bool,
    /// Readiness polling period
    #[serde(with = "duration_text")]
    pub poll_interval: Duration,
    /// Give up waiting for readiness after this long; wait forever if unset
    #[serde(with = "duration_text::option")]
    pub ready_timeout: Option<Duration>,
}

impl Default for JoinConfig {
    fn default() -> Self {
        JoinConfig {
            session_name: "armsync-lobby".to_string(),
            auto_join_delay: Duration::from_millis(500),
            require_connection: true,
            poll_interval: Duration::from_millis(10),
            ready_timeout: None,
        }
    }
}

/// Replica actor settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Payload encoding on the session
    pub wire_format: WireFormat,
    /// Capacity of the actor's command queue
    pub command_buffer: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            wire_format: WireFormat::Tagged,
            command_buffer: 64,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    pub palette: Palette,
    pub technique: TechniqueFallback,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directives, overridden by `RUST_LOG`
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// Duration fields as humantime strings
mod duration_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<Duration>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Duration>, D::Error> {
            match Option::<String>::deserialize(deserializer)? {
                Some(text) => humantime::parse_duration(&text)
                    .map(Some)
                    .map_err(serde::de::Error::custom),
                None => Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.session.auto_join_delay, Duration::from_millis(500));
        assert!(config.session.require_connection);
        assert!(config.session.ready_timeout.is_none());
    }

    #[test]
    fn test_parse_sections() {
        let config = RuntimeConfig::from_json(
            r#"{
                "session": {
                    "session_name": "range-7",
                    "auto_join_delay": "1s 250ms",
                    "require_connection": false,
                    "ready_timeout": "30s"
                },
                "node": { "wire_format": "legacy" },
                "logging": { "filter": "armsync=debug", "json": true }
            }"#,
        )
        .unwrap();

        assert_eq!(config.session.session_name, "range-7");
        assert_eq!(config.session.auto_join_delay, Duration::from_millis(1250));
        assert_eq!(config.session.poll_interval, Duration::from_millis(10));
        assert_eq!(config.session.ready_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.node.wire_format, WireFormat::Legacy);
        assert_eq!(config.node.command_buffer, 64);
        assert!(config.logging.json);
    }

    #[test]
    fn test_bad_duration_is_reported() {
        let err = RuntimeConfig::from_json(r#"{"session": {"poll_interval": "soon"}}"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let core: ArmsyncError = err.into();
        assert!(matches!(core, ArmsyncError::Config(_)));
    }

    #[test]
    fn test_serialized_form_reloads() {
        let mut config = RuntimeConfig::default();
        config.session.ready_timeout = Some(Duration::from_secs(5));

        let text = serde_json::to_string(&config).unwrap();
        assert!(text.contains("\"500ms\""));
        assert_eq!(RuntimeConfig::from_json(&text).unwrap(), config);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            RuntimeConfig::load("/nonexistent/armsync.json"),
            Err(ConfigError::Io { .. })
        ));
    }
}
