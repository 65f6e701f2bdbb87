//! Configuration file management for planpilot.
//!
//! Provides a TOML-based config file at `~/.config/planpilot/config.toml`
//! and a resolution chain: CLI flag > env var > config file > default.
//! The auth token is resolved here, once, and passed down explicitly;
//! nothing deeper in the stack reads the environment.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigFile {
    pub remote: RemoteSection,
    #[serde(default)]
    pub auth: AuthSection,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoteSection {
    /// Provider backend name (e.g. "memory").
    pub provider: String,
    /// Where the plan lives remotely, e.g. "owner/repo".
    pub target: String,
    #[serde(default)]
    pub board_url: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AuthSection {
    /// Provider auth token. Optional; the memory backend needs none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the planpilot config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/planpilot` or
/// `~/.config/planpilot`.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("planpilot");
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("planpilot")
}

/// Return the path to the planpilot config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default location of the sync map, relative to the working directory.
pub const DEFAULT_MAP_PATH: &str = ".planpilot/sync-map.json";

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    let path = config_path();
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    let config: ConfigFile = toml::from_str(&contents).context("failed to parse config file")?;
    Ok(config)
}

/// Serialize and write the config file, creating parent dirs as needed.
/// Sets file permissions to 0600 on Unix (the file may carry a token).
pub fn save_config(config: &ConfigFile) -> Result<()> {
    let path = config_path();
    let dir = config_dir();
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create config directory {}", dir.display()))?;

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(&path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// CLI-level overrides fed into [`PilotConfig::resolve`].
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub provider: Option<String>,
    pub target: Option<String>,
    pub token: Option<String>,
}

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct PilotConfig {
    pub provider: String,
    pub target: String,
    pub board_url: String,
    pub token: Option<String>,
}

impl PilotConfig {
    /// Resolve configuration using the chain: CLI flag > env var >
    /// config file > default.
    ///
    /// - provider: flag > `PLANPILOT_PROVIDER` > file > "memory"
    /// - target:   flag > `PLANPILOT_TARGET` > file > error
    /// - token:    flag > `PLANPILOT_TOKEN` > file > none
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let file_config = load_config().ok();

        let provider = if let Some(provider) = &overrides.provider {
            provider.clone()
        } else if let Ok(provider) = std::env::var("PLANPILOT_PROVIDER") {
            provider
        } else if let Some(ref cfg) = file_config {
            cfg.remote.provider.clone()
        } else {
            "memory".to_owned()
        };

        let target = if let Some(target) = &overrides.target {
            target.clone()
        } else if let Ok(target) = std::env::var("PLANPILOT_TARGET") {
            target
        } else if let Some(ref cfg) = file_config {
            cfg.remote.target.clone()
        } else {
            bail!(
                "remote target not configured; pass --target, set PLANPILOT_TARGET, or run `planpilot init`"
            );
        };

        let token = if let Some(token) = &overrides.token {
            Some(token.clone())
        } else if let Ok(token) = std::env::var("PLANPILOT_TOKEN") {
            Some(token)
        } else {
            file_config.as_ref().and_then(|cfg| cfg.auth.token.clone())
        };

        let board_url = file_config
            .as_ref()
            .map(|cfg| cfg.remote.board_url.clone())
            .unwrap_or_default();

        Ok(Self {
            provider,
            target,
            board_url,
            token,
        })
    }
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
