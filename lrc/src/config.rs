//! User configuration from `~/.config/lrc/config.toml`.
//!
//! ```toml
//! verbose = false
//!
//! [coverage]
//! enabled = true
//! busy_timeout_ms = 5000
//! ```
//!
//! Every key is optional. Config errors are soft failures: the defaults are
//! used and the problem is printed to stderr.

use std::path::{Path, PathBuf};
use std::time::Duration;

use lrc_core::coverage::CoverageOptions;
use lrc_core::layout::RepoLayout;
use serde::Deserialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Debug-level logging without `--verbose`.
    pub verbose: bool,
    pub coverage: CoverageConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoverageConfig {
    pub enabled: bool,
    pub busy_timeout_ms: u64,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self { enabled: true, busy_timeout_ms: 5000 }
    }
}

impl Config {
    /// Loads the user config, falling back to defaults on any problem.
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    /// Loads `path`. A missing file is silently the defaults; an unreadable
    /// or unparsable one is the defaults plus a warning on stderr.
    pub fn load_from(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                eprintln!("lrc: cannot read config {:?}: {}", path, e);
                return Self::default();
            }
        };
        match toml::from_str(&raw) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("lrc: config parse error in {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Coverage settings for the repository at `layout`.
    pub fn coverage_options(&self, layout: RepoLayout) -> CoverageOptions {
        CoverageOptions {
            layout,
            enabled: self.coverage.enabled,
            busy_timeout: Duration::from_millis(self.coverage.busy_timeout_ms),
        }
    }
}

/// Returns the path to the lrc config file.
///
/// Prefers `$XDG_CONFIG_HOME/lrc/config.toml`; falls back to
/// `~/.config/lrc/config.toml` when the env var is absent.
pub fn config_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .ok()
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
        .unwrap_or_else(|| PathBuf::from(".config"));
    base.join("lrc").join("config.toml")
}
