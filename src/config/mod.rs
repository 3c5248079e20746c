use std::time::Duration;

use crate::errors::{WatchError, WatchResult};

const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 30;

/// Upper bound for every configured duration (one week)
pub const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub api_user: String,
    pub api_password: String,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    pub notebrook: Option<NotebrookConfig>,
}

#[derive(Debug, Clone)]
pub struct NotebrookConfig {
    pub url: String,
    pub token: String,
    pub channel_prefix: String,
}

impl Config {
    /// Get the directory where the executable is located
    fn exe_dir() -> Option<std::path::PathBuf> {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Load `.env` files, executable directory first, then the working directory
    pub fn load_dotenv() {
        if let Some(dir) = Self::exe_dir() {
            let env_path = dir.join(".env");
            if env_path.exists() {
                dotenvy::from_path(&env_path).ok();
            }
        }
        dotenvy::dotenv().ok();
    }

    /// Read configuration from the environment.
    /// Notebrook settings are only required when `require_notebrook` is set.
    pub fn from_env(require_notebrook: bool) -> WatchResult<Self> {
        Self::load_dotenv();
        Self::from_lookup(|key| std::env::var(key).ok(), require_notebrook)
    }

    pub fn from_lookup<F>(lookup: F, require_notebrook: bool) -> WatchResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| {
            lookup(key).ok_or_else(|| WatchError::MissingEnvVar(key.to_string()))
        };

        let api_user = require("LISTING_API_USER")?;
        let api_password = require("LISTING_API_PASSWORD")?;

        let poll_interval = Duration::from_secs(parse_secs(
            &lookup,
            "ADWATCH_POLL_INTERVAL_SECS",
            DEFAULT_POLL_INTERVAL_SECS,
        )?);
        let fetch_timeout = Duration::from_secs(parse_secs(
            &lookup,
            "ADWATCH_FETCH_TIMEOUT_SECS",
            DEFAULT_FETCH_TIMEOUT_SECS,
        )?);

        let notebrook = if require_notebrook {
            Some(NotebrookConfig {
                url: require("NOTEBROOK_URL")?,
                token: require("NOTEBROOK_TOKEN")?,
                channel_prefix: lookup("NOTEBROOK_CHANNEL")
                    .unwrap_or_else(|| "listings".to_string()),
            })
        } else {
            None
        };

        Ok(Self {
            api_user,
            api_password,
            poll_interval,
            fetch_timeout,
            notebrook,
        })
    }
}

fn parse_secs<F>(lookup: &F, key: &str, default: u64) -> WatchResult<u64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(0) => Err(WatchError::Config(format!("{} must be greater than zero", key))),
            Ok(secs) if secs > MAX_DURATION_SECS => Err(WatchError::Config(format!(
                "{} must be at most {} seconds, got {}",
                key, MAX_DURATION_SECS, secs
            ))),
            Ok(secs) => Ok(secs),
            Err(_) => Err(WatchError::Config(format!(
                "{} must be a number of seconds, got '{}'",
                key, raw
            ))),
        },
    }
}
