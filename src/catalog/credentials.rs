use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::config::CatalogConfig;

/// Default keys file, looked up in the working directory.
pub const KEYS_FILE: &str = "api_keys.yaml";

/// Client-credentials pair for the catalog API.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    fn is_complete(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }

    /// `CLIENT_ID` / `CLIENT_SECRET` from an environment lookup.
    pub fn from_env_with(get: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let creds = Self::new(get("CLIENT_ID")?, get("CLIENT_SECRET")?);
        creds.is_complete().then_some(creds)
    }

    /// Read a YAML keys file with `client_id` and `client_secret`.
    /// A missing file is `Ok(None)`; an unreadable or malformed one is an error.
    pub fn from_yaml_file(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let creds: Credentials = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(creds.is_complete().then_some(creds))
    }

    fn from_config(config: &CatalogConfig) -> Option<Self> {
        let creds = Self::new(config.client_id.clone()?, config.client_secret.clone()?);
        creds.is_complete().then_some(creds)
    }

    /// Resolve credentials: environment, then the keys file, then the config file.
    pub fn resolve(config: &CatalogConfig, keys_file: &Path) -> Option<Self> {
        Self::resolve_with(config, keys_file, |k| std::env::var(k).ok())
    }

    pub fn resolve_with(
        config: &CatalogConfig,
        keys_file: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Option<Self> {
        if let Some(creds) = Self::from_env_with(env) {
            log::debug!("Catalog credentials from environment");
            return Some(creds);
        }
        match Self::from_yaml_file(keys_file) {
            Ok(Some(creds)) => {
                log::debug!("Catalog credentials from {}", keys_file.display());
                return Some(creds);
            }
            Ok(None) => {}
            Err(e) => log::warn!("{e:#}"),
        }
        let creds = Self::from_config(config);
        if creds.is_some() {
            log::debug!("Catalog credentials from config file");
        } else {
            log::info!("No catalog credentials found ({KEYS_FILE}, CLIENT_ID/CLIENT_SECRET, or config)");
        }
        creds
    }
}
