//! Configuration loading.
//!
//! Settings come from an optional TOML file (default:
//! `~/.passforge/config.toml`) with environment-variable overrides for
//! the values deployments usually inject as secrets:
//!
//! - `DISCORD_TOKEN` — bot authentication token
//! - `CREDENTIAL_SALT` — process-wide hashing salt
//! - `AUTHORIZED_ROLE_ID` — Discord role allowed to use `/register`
//! - `PORT` — HTTP listen port
//!
//! The token and salt are required; startup fails fast without them
//! rather than issuing credentials hashed with an empty salt.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub discord: DiscordConfig,
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token. Never logged.
    pub token: String,
    /// Role ID whose holders may use `/register`.
    pub authorized_role_id: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Process-wide salt mixed into every password digest. Never logged.
    pub salt: String,
}

impl Config {
    /// Default config file location (`~/.passforge/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        directories::UserDirs::new().map(|dirs| dirs.home_dir().join(".passforge/config.toml"))
    }

    /// Load configuration: TOML file (if present), then env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).or_else(Self::default_path);

        let mut config = match path {
            Some(ref p) if p.exists() => {
                let contents = std::fs::read_to_string(p)
                    .with_context(|| format!("Failed to read config: {}", p.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Failed to parse config: {}", p.display()))?
            }
            _ => Self::default(),
        };

        config.override_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply environment-style overrides from a lookup function.
    pub fn override_from<F: Fn(&str) -> Option<String>>(&mut self, get: F) {
        if let Some(token) = get("DISCORD_TOKEN") {
            self.discord.token = token;
        }
        if let Some(role) = get("AUTHORIZED_ROLE_ID") {
            self.discord.authorized_role_id = role;
        }
        if let Some(salt) = get("CREDENTIAL_SALT") {
            self.credentials.salt = salt;
        }
        if let Some(port) = get("PORT") {
            match port.parse() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!("Ignoring non-numeric PORT override: {port}"),
            }
        }
    }

    /// Reject configurations that cannot run safely.
    pub fn validate(&self) -> Result<()> {
        if self.discord.token.trim().is_empty() {
            bail!("Discord bot token is not configured (set DISCORD_TOKEN or [discord] token)");
        }
        if self.credentials.salt.trim().is_empty() {
            bail!("Credential salt is not configured (set CREDENTIAL_SALT or [credentials] salt)");
        }
        if self.discord.authorized_role_id.trim().is_empty() {
            tracing::warn!("No authorized role configured — /register will reject every caller");
        }
        Ok(())
    }
}
