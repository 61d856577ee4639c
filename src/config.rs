//! Runtime configuration types.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default configuration file looked up in the working directory.
pub const CONFIG_FILE: &str = "lox.toml";

/// Output format for `--timings`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimingsFormat {
    #[default]
    Human,
    Json,
}

/// Runtime configuration for the VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Print each instruction and the stack before executing it.
    pub trace_execution: bool,
    /// Print the disassembled script before running it.
    pub dump_bytecode: bool,
    /// Report compile and run durations after execution.
    pub timings: Option<TimingsFormat>,
    /// Install host functions such as `clock` (default: true)
    pub natives: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            trace_execution: false,
            dump_bytecode: false,
            timings: None,
            natives: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl RuntimeConfig {
    /// Load configuration from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load `lox.toml` from `dir` if present, otherwise the defaults.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        let path = dir.join(CONFIG_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}

/// Phase durations of the last `interpret` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Timings {
    pub compile_us: u128,
    pub execute_us: u128,
}

impl Timings {
    pub fn new(compile: Duration, execute: Duration) -> Self {
        Self {
            compile_us: compile.as_micros(),
            execute_us: execute.as_micros(),
        }
    }

    pub fn total_us(&self) -> u128 {
        self.compile_us + self.execute_us
    }

    pub fn render(&self, format: TimingsFormat) -> String {
        match format {
            TimingsFormat::Human => format!(
                "compile: {}us\nexecute: {}us\ntotal:   {}us",
                self.compile_us,
                self.execute_us,
                self.total_us()
            ),
            TimingsFormat::Json => serde_json::json!({
                "compile_us": self.compile_us as u64,
                "execute_us": self.execute_us as u64,
                "total_us": self.total_us() as u64,
            })
            .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert!(config.natives);
        assert!(!config.trace_execution);
        assert_eq!(config.timings, None);
    }

    #[test]
    fn test_partial_toml() {
        let config = RuntimeConfig::from_toml("dump_bytecode = true\ntimings = \"json\"\n").unwrap();
        assert!(config.dump_bytecode);
        assert!(config.natives);
        assert_eq!(config.timings, Some(TimingsFormat::Json));
    }

    #[test]
    fn test_unknown_timings_format() {
        assert!(RuntimeConfig::from_toml("timings = \"xml\"").is_err());
    }

    #[test]
    fn test_load_and_discover() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            RuntimeConfig::discover(dir.path()).unwrap(),
            RuntimeConfig::default()
        );

        fs::write(dir.path().join(CONFIG_FILE), "natives = false\n").unwrap();
        let config = RuntimeConfig::discover(dir.path()).unwrap();
        assert!(!config.natives);

        let err = RuntimeConfig::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(err.to_string().starts_with("failed to read"));
    }

    #[test]
    fn test_timings_render() {
        let timings = Timings {
            compile_us: 10,
            execute_us: 32,
        };
        assert!(timings.render(TimingsFormat::Human).contains("total:   42us"));
        let json: serde_json::Value =
            serde_json::from_str(&timings.render(TimingsFormat::Json)).unwrap();
        assert_eq!(json["total_us"], 42);
        assert_eq!(json["compile_us"], 10);
    }
}
