use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{AppError, AppResult};

pub const LOCAL_ENV_FILE: &str = "local.env";
pub const USER_ENV_FILE: &str = "supervisely.env";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub api_token: String,
    pub workspace_id: Option<u64>,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_address: String::new(),
            api_token: String::new(),
            workspace_id: None,
            request_timeout_secs: 120,
        }
    }
}

impl Config {
    /// Load the dotenv sources, then read the process environment.
    /// An explicitly named env file must exist; the default ones are optional.
    pub fn load(extra_env_file: Option<&Path>) -> AppResult<Self> {
        if let Some(path) = extra_env_file {
            load_env_file(path, true)?;
        }
        for path in default_env_files() {
            load_env_file(&path, false)?;
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from any key lookup. Used directly by tests.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        let workspace_id = match lookup("WORKSPACE_ID") {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                AppError::validation("WORKSPACE_ID", "Must be a positive integer")
            })?),
            None => None,
        };

        let request_timeout_secs = match lookup("REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                AppError::validation("REQUEST_TIMEOUT_SECS", "Must be a number of seconds")
            })?,
            None => default.request_timeout_secs,
        };

        let config = Self {
            server_address: lookup("SERVER_ADDRESS")
                .map(|v| v.trim().trim_end_matches('/').to_string())
                .unwrap_or(default.server_address),
            api_token: lookup("API_TOKEN")
                .map(|v| v.trim().to_string())
                .unwrap_or(default.api_token),
            workspace_id,
            request_timeout_secs,
        };

        validate_config(&config)?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn require_workspace_id(&self) -> AppResult<u64> {
        self.workspace_id
            .ok_or_else(|| AppError::Config("WORKSPACE_ID is not set".to_string()))
    }
}

/// Default dotenv files in priority order. Earlier files win because
/// existing variables are never overridden.
pub fn default_env_files() -> Vec<PathBuf> {
    let mut files = vec![PathBuf::from(LOCAL_ENV_FILE)];
    if let Some(home) = dirs::home_dir() {
        files.push(home.join(USER_ENV_FILE));
    }
    files
}

/// Applies a dotenv file to the process environment. The whole file is
/// parsed before any variable is set, so a malformed file changes nothing.
fn load_env_file(path: &Path, required: bool) -> AppResult<()> {
    if !path.exists() {
        if required {
            return Err(AppError::Config(format!(
                "Env file {} does not exist",
                path.display()
            )));
        }
        log::debug!("Env file {} not present, skipping", path.display());
        return Ok(());
    }

    let entries = dotenvy::from_path_iter(path)
        .and_then(|iter| iter.collect::<Result<Vec<_>, _>>())
        .map_err(|e| {
            AppError::Config(format!("Failed to parse env file {}: {}", path.display(), e))
        })?;

    for (key, value) in entries {
        if env::var_os(&key).is_none() {
            env::set_var(key, value);
        }
    }

    log::info!("Loaded environment from {}", path.display());
    Ok(())
}

pub fn validate_config(config: &Config) -> AppResult<()> {
    if config.server_address.is_empty() {
        return Err(AppError::Config("SERVER_ADDRESS is not set".to_string()));
    }

    if !(config.server_address.starts_with("http://")
        || config.server_address.starts_with("https://"))
    {
        return Err(AppError::validation(
            "SERVER_ADDRESS",
            "Must start with http:// or https://",
        ));
    }

    if config.api_token.is_empty() {
        return Err(AppError::Config("API_TOKEN is not set".to_string()));
    }

    if config.request_timeout_secs == 0 || config.request_timeout_secs > 3600 {
        return Err(AppError::validation(
            "REQUEST_TIMEOUT_SECS",
            "Must be between 1 and 3600",
        ));
    }

    Ok(())
}
