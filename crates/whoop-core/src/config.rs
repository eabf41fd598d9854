use std::env;
use std::fs;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use directories::ProjectDirs;
use thiserror::Error;
use url::Url;

use crate::auth::{OAuthConfig, DEFAULT_SCOPES};

const TOKENS_FILE: &str = "whoop_tokens.json";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:8501";
const DEFAULT_DATA_START: &str = "2026-01-01";
const DEFAULT_DATA_END: &str = "2026-02-10";

/// Resolves where persisted state lives on disk.
#[derive(Debug, Clone)]
pub struct ConfigLocator {
    root: PathBuf,
}

impl ConfigLocator {
    /// Attempt to discover the persistent configuration directory, creating it if needed.
    pub fn new() -> Result<Self, ConfigError> {
        let dirs =
            ProjectDirs::from("app", "whoop", "whoop-sync").ok_or(ConfigError::MissingProjectDirs)?;
        Self::at(dirs.config_dir())
    }

    /// Use an explicit directory instead of the platform default.
    pub fn at(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(ConfigError::CreateDir)?;
        set_user_only_permissions(dir)?;
        Ok(Self {
            root: dir.to_path_buf(),
        })
    }

    /// Honors `WHOOP_TOKENS_DIR` when set, otherwise the platform config directory.
    pub fn from_env() -> Result<Self, ConfigError> {
        match non_empty(env::var("WHOOP_TOKENS_DIR").ok()) {
            Some(dir) => Self::at(dir),
            None => Self::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the single token file for the configured application.
    pub fn tokens_file(&self) -> PathBuf {
        self.root.join(TOKENS_FILE)
    }
}

fn set_user_only_permissions(path: &Path) -> Result<(), ConfigError> {
    #[cfg(unix)]
    {
        let metadata = fs::metadata(path)?;
        let mut permissions = metadata.permissions();
        permissions.set_mode(0o700);
        fs::set_permissions(path, permissions)?;
        Ok(())
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}

/// Application registration and default fetch window, read from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Url,
    pub scopes: Vec<String>,
    pub data_start: NaiveDate,
    pub data_end: NaiveDate,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| non_empty(lookup(key));

        let client_id = get("WHOOP_CLIENT_ID").ok_or(ConfigError::MissingVar("WHOOP_CLIENT_ID"))?;
        let client_secret =
            get("WHOOP_CLIENT_SECRET").ok_or(ConfigError::MissingVar("WHOOP_CLIENT_SECRET"))?;

        let redirect = get("WHOOP_REDIRECT_URI").unwrap_or_else(|| DEFAULT_REDIRECT_URI.into());
        let redirect_uri = Url::parse(&redirect).map_err(|err| ConfigError::InvalidVar {
            key: "WHOOP_REDIRECT_URI",
            reason: err.to_string(),
        })?;

        let scopes = match get("WHOOP_SCOPES") {
            Some(raw) => raw.split_whitespace().map(str::to_owned).collect(),
            None => DEFAULT_SCOPES.iter().map(|scope| scope.to_string()).collect(),
        };

        let data_start = parse_date(
            "DATA_START_DATE",
            get("DATA_START_DATE").as_deref().unwrap_or(DEFAULT_DATA_START),
        )?;
        let data_end = parse_date(
            "DATA_END_DATE",
            get("DATA_END_DATE").as_deref().unwrap_or(DEFAULT_DATA_END),
        )?;

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            scopes,
            data_start,
            data_end,
        })
    }

    pub fn oauth_config(&self) -> OAuthConfig {
        OAuthConfig::new(
            self.client_id.clone(),
            self.client_secret.clone(),
            self.redirect_uri.clone(),
        )
        .with_scopes(self.scopes.iter().cloned())
    }
}

fn parse_date(key: &'static str, raw: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|err| ConfigError::InvalidVar {
        key,
        reason: format!("'{raw}': {err}"),
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Errors that can occur when loading settings or preparing directories.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to determine configuration directory for whoop-sync")]
    MissingProjectDirs,
    #[error("failed to create configuration directory: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("filesystem error: {0}")]
    Io(#[source] std::io::Error),
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {key}: {reason}")]
    InvalidVar { key: &'static str, reason: String },
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err)
    }
}
