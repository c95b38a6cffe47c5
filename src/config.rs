//! Configuration management for shell-relay.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Environment variables (`SHELL_RELAY_*`)
//! 2. Configuration file (JSON)
//! 3. Default values

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// One-shot command execution settings.
    pub execution: ExecutionSection,
    /// Persistent and shared terminal settings.
    pub terminal: TerminalSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// One-shot command execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    /// Default wait for a full one-shot command, in seconds.
    pub default_timeout_secs: u64,
    /// Lower clamp bound for per-call timeouts, in seconds.
    pub min_timeout_secs: u64,
    /// Upper clamp bound for per-call timeouts, in seconds.
    pub max_timeout_secs: u64,
    /// Probe window for a password prompt after spawn, in seconds.
    pub password_probe_secs: u64,
    /// Root directory under which one-shot commands run.
    pub working_dir_root: Option<String>,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            default_timeout_secs: 60,
            min_timeout_secs: 1,
            max_timeout_secs: 300,
            password_probe_secs: 5,
            working_dir_root: None,
        }
    }
}

/// Persistent and shared terminal settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalSection {
    /// Shell binary override for persistent terminals.
    pub shell: Option<String>,
    /// Default wait for a shell prompt after a command, in seconds.
    pub default_timeout_secs: u64,
    /// Wait for the initial prompt after spawning a shell, in seconds.
    pub prompt_timeout_secs: u64,
    /// Probe window for the in-band cwd query, in seconds.
    pub cwd_probe_secs: u64,
    /// Directory the shared programs terminal is rooted at.
    pub programs_dir: Option<String>,
    /// Whether the shared terminal is pinned to `programs_dir` even when a
    /// caller requests a different directory.
    pub pin_programs_dir: bool,
    /// Evict sessions idle longer than this, in seconds, when the embedder
    /// drives the reaper. `None` disables idle eviction.
    pub idle_timeout_secs: Option<u64>,
}

impl Default for TerminalSection {
    fn default() -> Self {
        Self {
            shell: None,
            default_timeout_secs: 30,
            prompt_timeout_secs: 10,
            cwd_probe_secs: 2,
            programs_dir: None,
            pin_programs_dir: true,
            idle_timeout_secs: None,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Ok(secs) = std::env::var("SHELL_RELAY_DEFAULT_TIMEOUT") {
            if let Ok(secs) = secs.parse() {
                self.execution.default_timeout_secs = secs;
            }
        }

        if let Ok(root) = std::env::var("SHELL_RELAY_WORKDIR_ROOT") {
            if !root.is_empty() {
                self.execution.working_dir_root = Some(root);
            }
        }

        if let Ok(dir) = std::env::var("SHELL_RELAY_PROGRAMS_DIR") {
            if !dir.is_empty() {
                self.terminal.programs_dir = Some(dir);
            }
        }

        if let Ok(shell) = std::env::var("SHELL_RELAY_SHELL") {
            if !shell.is_empty() {
                self.terminal.shell = Some(shell);
            }
        }

        if let Ok(level) = std::env::var("SHELL_RELAY_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: env vars > config file > defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Clamp a per-call timeout to the configured `[min, max]` range.
    pub fn clamp_timeout(&self, requested: Duration) -> Duration {
        let min = Duration::from_secs(self.execution.min_timeout_secs);
        let max = Duration::from_secs(self.execution.max_timeout_secs);
        // max() first so a misconfigured min > max never panics.
        requested.max(min).min(max.max(min))
    }

    /// Effective one-shot timeout: the clamped request, or the default.
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        let requested =
            requested.unwrap_or(Duration::from_secs(self.execution.default_timeout_secs));
        self.clamp_timeout(requested)
    }

    /// Password-prompt probe window.
    pub fn password_probe(&self) -> Duration {
        Duration::from_secs(self.execution.password_probe_secs)
    }

    /// Effective terminal prompt wait: the clamped request, or the
    /// terminal default.
    pub fn effective_terminal_timeout(&self, requested: Option<Duration>) -> Duration {
        let requested =
            requested.unwrap_or(Duration::from_secs(self.terminal.default_timeout_secs));
        self.clamp_timeout(requested)
    }

    /// Initial-prompt wait after spawning a shell.
    pub fn prompt_timeout(&self) -> Duration {
        Duration::from_secs(self.terminal.prompt_timeout_secs)
    }

    /// Probe window for the in-band cwd query.
    pub fn cwd_probe(&self) -> Duration {
        Duration::from_secs(self.terminal.cwd_probe_secs)
    }

    /// Idle-eviction age, if enabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.terminal.idle_timeout_secs.map(Duration::from_secs)
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
