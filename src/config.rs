//! Configuration loading and schema definitions for dotnest.
//!
//! Configuration comes from an optional TOML file (`dotnest.toml` by
//! default). Command-line flags override individual values.

pub mod schema;

pub use schema::*;

use std::path::Path;

use anyhow::{Context, Result};

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "dotnest.toml";

/// Configuration written by `dotnest init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# dotnest configuration

[dotnest]
# Test applications running at once (default: available parallelism)
# max_parallel = 4
unit_timeout_secs = 900
stream_output = false

[dotnest.env]
DOTNET_NOLOGO = "1"

[build]
dotnet = "dotnet"
# Projects restored at once (default: available parallelism)
# restore_parallel = 8
diagnostic_log = false

[build.properties]
# Configuration = "Release"
"#;

/// Loads dotnest configuration from a TOML file.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read (e.g., doesn't exist or permission denied)
/// - The file contains invalid TOML syntax
/// - The configuration doesn't match the expected schema
///
/// # Example
///
/// ```no_run
/// use dotnest::config::load_config;
/// use std::path::Path;
///
/// let config = load_config(Path::new("dotnest.toml"))?;
/// println!("Max parallel: {}", config.dotnest.max_parallel);
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Loads configuration from `path` if it exists, defaults otherwise.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}

/// Loads dotnest configuration from a TOML string.
///
/// # Example
///
/// ```
/// use dotnest::config::load_config_str;
///
/// let config = load_config_str(r#"
///     [dotnest]
///     max_parallel = 4
///
///     [build.properties]
///     Configuration = "Release"
/// "#)?;
///
/// assert_eq!(config.dotnest.max_parallel, 4);
/// assert_eq!(config.build.properties["Configuration"], "Release");
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn load_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    Ok(config)
}
