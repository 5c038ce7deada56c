//! Logging configuration
//!
//! Levels are kept per crate: the identity layer and the primitive layer can
//! be traced independently of each other and of everything else in the
//! process.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Target of identity, channel and package events
pub const IDENTITY_TARGET: &str = "quantumshield_identity";

/// Target of signature, KEM and AEAD primitive events
pub const CRYPTO_TARGET: &str = "quantumshield_crypto";

/// Subscriber configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Level for every target without an entry in `levels`
    pub level: String,

    /// Per-target levels, keyed by target
    #[serde(default)]
    pub levels: BTreeMap<String, String>,

    pub console: ConsoleFormat,

    /// Rolling JSONL file output
    pub file: Option<FileConfig>,

    #[serde(default)]
    pub jsonl: JsonlConfig,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            levels: BTreeMap::new(),
            console: ConsoleFormat::default(),
            file: None,
            jsonl: JsonlConfig::default(),
        }
    }
}

impl LogConfig {
    /// Pretty console, both QuantumShield crates at `debug`
    pub fn development() -> Self {
        Self {
            console: ConsoleFormat::Pretty { ansi: true },
            ..Self::default()
        }
        .with_identity_level("debug")
        .with_crypto_level("debug")
    }

    /// JSONL files only, rotated daily; primitives are quiet unless they fail
    pub fn production(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            console: ConsoleFormat::Off,
            file: Some(FileConfig::new(log_dir)),
            ..Self::default()
        }
        .with_crypto_level("warn")
    }

    pub fn testing() -> Self {
        Self {
            level: "warn".to_string(),
            ..Self::default()
        }
    }

    pub fn with_identity_level(self, level: impl Into<String>) -> Self {
        self.with_target_level(IDENTITY_TARGET, level)
    }

    pub fn with_crypto_level(self, level: impl Into<String>) -> Self {
        self.with_target_level(CRYPTO_TARGET, level)
    }

    pub fn with_target_level(
        mut self,
        target: impl Into<String>,
        level: impl Into<String>,
    ) -> Self {
        self.levels.insert(target.into(), level.into());
        self
    }

    /// Filter directives in `EnvFilter` syntax (`level,target=level,...`)
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.level.clone()];
        directives.extend(
            self.levels
                .iter()
                .map(|(target, level)| format!("{target}={level}")),
        );
        directives.join(",")
    }
}

/// Console output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsoleFormat {
    Off,
    #[default]
    Jsonl,
    Pretty { ansi: bool },
}

/// Rolling file output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub directory: PathBuf,
    pub prefix: String,
    pub rotation: RotationStrategy,
    /// Oldest files beyond this count are deleted on rotation
    pub max_files: Option<usize>,
}

impl FileConfig {
    /// Daily `quantumshield.*.log` files, 30 kept
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            prefix: "quantumshield".to_string(),
            rotation: RotationStrategy::Daily,
            max_files: Some(30),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_rotation(mut self, rotation: RotationStrategy) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_max_files(mut self, max_files: Option<usize>) -> Self {
        self.max_files = max_files;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    Never,
}

/// Shape of each JSONL record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonlConfig {
    /// Put event fields at the top level instead of under `fields`
    pub flatten_events: bool,
    /// Include the list of entered spans (and their identity fields)
    pub include_spans: bool,
    /// Include source file and line
    pub include_location: bool,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            flatten_events: true,
            include_spans: true,
            include_location: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LogConfig::default();
        assert_eq!(config.filter_directives(), "info");
        assert_eq!(config.console, ConsoleFormat::Jsonl);
        assert!(config.file.is_none());
    }

    #[test]
    fn test_development_traces_both_crates() {
        let config = LogConfig::development();
        assert_eq!(config.console, ConsoleFormat::Pretty { ansi: true });
        assert_eq!(
            config.filter_directives(),
            "info,quantumshield_crypto=debug,quantumshield_identity=debug"
        );
    }

    #[test]
    fn test_production_config() {
        let config = LogConfig::production("/var/log/quantumshield");
        assert_eq!(config.console, ConsoleFormat::Off);
        assert_eq!(config.filter_directives(), "info,quantumshield_crypto=warn");
        let file = config.file.unwrap();
        assert_eq!(file.prefix, "quantumshield");
        assert_eq!(file.rotation, RotationStrategy::Daily);
        assert_eq!(file.max_files, Some(30));
    }

    #[test]
    fn test_later_level_wins() {
        let config = LogConfig::testing()
            .with_identity_level("debug")
            .with_target_level(IDENTITY_TARGET, "trace")
            .with_target_level("tokio", "error");
        assert_eq!(
            config.filter_directives(),
            "warn,quantumshield_identity=trace,tokio=error"
        );
    }

    #[test]
    fn test_config_from_json() {
        let config: LogConfig = serde_json::from_value(serde_json::json!({
            "level": "warn",
            "levels": { "quantumshield_identity": "debug" },
            "console": { "pretty": { "ansi": false } },
            "file": null
        }))
        .unwrap();
        assert_eq!(config.console, ConsoleFormat::Pretty { ansi: false });
        assert_eq!(config.filter_directives(), "warn,quantumshield_identity=debug");
        assert!(config.jsonl.flatten_events);
    }
}
