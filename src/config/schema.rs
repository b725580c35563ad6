//! Configuration schema definitions for dotnest.
//!
//! # Schema Overview
//!
//! ```text
//! Config (root)
//! ├── DotnestConfig          - Execution settings (parallelism, timeouts, env)
//! └── BuildConfig            - Build engine settings (restore, properties)
//! ```
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration structure for dotnest.
///
/// # TOML Structure
///
/// ```toml
/// [dotnest]
/// max_parallel = 4
/// unit_timeout_secs = 900
///
/// [dotnest.env]
/// DOTNET_NOLOGO = "1"
///
/// [build]
/// restore_parallel = 8
///
/// [build.properties]
/// Configuration = "Release"
/// ```
///
/// # Example
///
/// ```
/// use dotnest::config::Config;
///
/// let config: Config = toml::from_str(r#"
///     [dotnest]
///     max_parallel = 2
/// "#).unwrap();
/// assert_eq!(config.dotnest.max_parallel, 2);
/// assert_eq!(config.build.dotnet, "dotnet");
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Test application execution settings.
    #[serde(default)]
    pub dotnest: DotnestConfig,

    /// Build engine settings used during restore.
    #[serde(default)]
    pub build: BuildConfig,
}

/// Test application execution settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `max_parallel` | available parallelism |
/// | `unit_timeout_secs` | 900 (15 minutes) |
/// | `stream_output` | false |
/// | `env` | empty |
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DotnestConfig {
    /// Maximum number of test applications running at once.
    ///
    /// Zero is treated as one.
    #[serde(default = "default_parallelism")]
    pub max_parallel: usize,

    /// Timeout for a single test application in seconds.
    ///
    /// Default: 900 (15 minutes)
    #[serde(default = "default_unit_timeout")]
    pub unit_timeout_secs: u64,

    /// Stream test output in real-time instead of buffering.
    ///
    /// Output from parallel units interleaves, each line prefixed with the
    /// unit's name.
    ///
    /// Default: false
    #[serde(default)]
    pub stream_output: bool,

    /// Extra environment variables for every test application.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl Default for DotnestConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_parallelism(),
            unit_timeout_secs: default_unit_timeout(),
            stream_output: false,
            env: BTreeMap::new(),
        }
    }
}

impl DotnestConfig {
    /// The unit timeout as a [`Duration`].
    pub fn unit_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_timeout_secs)
    }
}

/// Build engine settings.
///
/// # Defaults
///
/// | Field | Default |
/// |-------|---------|
/// | `dotnet` | `"dotnet"` |
/// | `restore_parallel` | available parallelism |
/// | `diagnostic_log` | false |
/// | `properties` | empty |
///
/// # Example
///
/// ```toml
/// [build]
/// dotnet = "~/.dotnet/dotnet"
/// restore_parallel = 4
/// diagnostic_log = true
///
/// [build.properties]
/// Configuration = "Release"
/// ContinuousIntegrationBuild = "true"
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BuildConfig {
    /// The `dotnet` executable. A leading `~` and `$VARS` are expanded.
    #[serde(default = "default_dotnet")]
    pub dotnet: String,

    /// Number of projects restored concurrently.
    ///
    /// Zero is treated as one.
    #[serde(default = "default_parallelism")]
    pub restore_parallel: usize,

    /// Write a binary build log for every restore.
    #[serde(default)]
    pub diagnostic_log: bool,

    /// Global properties applied to every project evaluation.
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dotnet: default_dotnet(),
            restore_parallel: default_parallelism(),
            diagnostic_log: false,
            properties: BTreeMap::new(),
        }
    }
}

impl BuildConfig {
    /// Restore worker count, at least one.
    pub fn restore_parallelism(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.restore_parallel).unwrap_or(NonZeroUsize::MIN)
    }

    /// The `dotnet` path with `~` and environment variables expanded.
    ///
    /// Falls back to the configured string if expansion fails.
    pub fn dotnet_path(&self) -> String {
        shellexpand::full(&self.dotnet)
            .map(|s| s.into_owned())
            .unwrap_or_else(|_| self.dotnet.clone())
    }
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn default_unit_timeout() -> u64 {
    900 // 15 minutes
}

fn default_dotnet() -> String {
    "dotnet".to_string()
}
