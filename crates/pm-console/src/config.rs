use pm_client::{RpcClientConfig, DEFAULT_ENDPOINT_PATH, DEFAULT_TIMEOUT_MS};
use pm_core::jsonrpc::UNAUTHORIZED_CODE;
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Everything in the TOML file is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub base_url: Option<String>,
    pub endpoint_path: Option<String>,
    pub timeout_ms: Option<u64>,
    pub unauthorized_code: Option<i64>,
    pub username: Option<String>,
}

/// Values given on the command line; they win over env and file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub base_url: Option<String>,
    pub endpoint_path: Option<String>,
    pub timeout_ms: Option<u64>,
    pub unauthorized_code: Option<i64>,
    pub username: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    pub base_url: String,
    pub endpoint_path: String,
    pub timeout: Duration,
    pub unauthorized_code: i64,
    pub username: Option<String>,
    pub token: Option<String>,
}

impl ConsoleConfig {
    pub fn rpc_client_config(&self) -> RpcClientConfig {
        let mut config = RpcClientConfig::new(self.base_url.clone()).with_timeout(self.timeout);
        config.endpoint_path = self.endpoint_path.clone();
        config
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pm-console").join("config.toml"))
}

/// Reads the config file. A missing file is only an error when the path was
/// asked for explicitly.
pub fn load_file(path: &Path, explicit: bool) -> Result<FileConfig, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == io::ErrorKind::NotFound && !explicit => {
            return Ok(FileConfig::default())
        }
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    toml::from_str(&contents).map_err(|err| ConfigError::Parse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

/// Layers flags over `PM_*` variables over the file over built-in defaults.
/// `env` is `std::env::var` in production and a map in tests.
pub fn resolve<F>(
    file: FileConfig,
    env: F,
    overrides: Overrides,
) -> Result<ConsoleConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env_value = |key: &str| env(key).filter(|value| !value.trim().is_empty());

    let base_url = overrides
        .base_url
        .or_else(|| env_value("PM_BASE_URL"))
        .or(file.base_url)
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
    let endpoint_path = overrides
        .endpoint_path
        .or_else(|| env_value("PM_ENDPOINT_PATH"))
        .or(file.endpoint_path)
        .unwrap_or_else(|| DEFAULT_ENDPOINT_PATH.to_string());

    let timeout_ms = match overrides.timeout_ms {
        Some(value) => value,
        None => match env_value("PM_TIMEOUT_MS") {
            Some(raw) => parse_number("PM_TIMEOUT_MS", &raw)?,
            None => file.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        },
    };
    if timeout_ms == 0 {
        return Err(ConfigError::InvalidValue {
            key: "timeout_ms",
            value: "0".to_string(),
        });
    }

    let unauthorized_code = match overrides.unauthorized_code {
        Some(value) => value,
        None => match env_value("PM_UNAUTHORIZED_CODE") {
            Some(raw) => parse_number("PM_UNAUTHORIZED_CODE", &raw)?,
            None => file.unauthorized_code.unwrap_or(UNAUTHORIZED_CODE),
        },
    };

    Ok(ConsoleConfig {
        base_url,
        endpoint_path,
        timeout: Duration::from_millis(timeout_ms),
        unauthorized_code,
        username: overrides
            .username
            .or_else(|| env_value("PM_USERNAME"))
            .or(file.username),
        token: overrides.token.or_else(|| env_value("PM_TOKEN")),
    })
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
        })
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
