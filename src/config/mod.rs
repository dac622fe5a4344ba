//! Configuration management.
//!
//! Defaults, then an optional TOML file, then `CONSOLE_*` environment
//! overrides.

use crate::observability::{LogFormat, LoggingConfig};
use crate::security::{NavigationPermissionMap, RouteRule};
use crate::services::DEFAULT_GRANTS_KEY;
use crate::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "console-authz";

/// Main configuration for the console authorization layer.
#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    /// Registry API settings.
    pub api: ApiConfig,
    /// Where granted permissions are persisted.
    pub storage: StorageConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Route-to-permission map used by the route guard.
    pub navigation: NavigationPermissionMap,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
            navigation: NavigationPermissionMap::dashboard(),
        }
    }
}

/// Registry API settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, e.g. `http://localhost:5000/api`.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Bearer token for the signed-in user.
    pub token: Option<SecretString>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api".to_string(),
            timeout_secs: 30,
            token: None,
        }
    }
}

/// Grant persistence settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Directory holding persisted grant sets.
    pub data_dir: PathBuf,
    /// Key under which the session's grants are stored.
    pub grants_key: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data_dir = directories::ProjectDirs::from("", "", APP_DIR).map_or_else(
            || PathBuf::from(".console-authz"),
            |dirs| dirs.data_dir().to_path_buf(),
        );
        Self {
            data_dir,
            grants_key: DEFAULT_GRANTS_KEY.to_string(),
        }
    }
}

/// Configuration file structure (for TOML parsing).
///
/// Not `Debug`: the `[api]` section holds the raw token.
#[derive(Deserialize, Default)]
pub struct ConfigFile {
    /// `[api]` section.
    pub api: Option<ConfigFileApi>,
    /// `[storage]` section.
    pub storage: Option<ConfigFileStorage>,
    /// `[logging]` section.
    pub logging: Option<ConfigFileLogging>,
    /// `[navigation]` section.
    pub navigation: Option<ConfigFileNavigation>,
}

/// `[api]` section.
#[derive(Deserialize, Default)]
pub struct ConfigFileApi {
    /// Base URL.
    pub base_url: Option<String>,
    /// Timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Bearer token; wrapped in a [`SecretString`] as soon as it is read.
    pub token: Option<String>,
}

/// `[storage]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileStorage {
    /// Data directory.
    pub data_dir: Option<String>,
    /// Grants key.
    pub grants_key: Option<String>,
}

/// `[logging]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileLogging {
    /// Filter directive.
    pub level: Option<String>,
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// Log file path.
    pub file: Option<String>,
}

/// `[navigation]` section.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileNavigation {
    /// Extra or overriding route rules.
    #[serde(default)]
    pub routes: Vec<RouteRule>,
}

impl ConsoleConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds an
    /// invalid value.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::operation("read_config_file", format!("{}: {e}", path.display())))?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not valid TOML or holds an invalid
    /// value.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| Error::operation("parse_config_file", e))?;
        Self::from_config_file(file)
    }

    /// Loads configuration from the default location.
    ///
    /// Checks the following paths in order:
    /// 1. Platform-specific config dir (`~/Library/Application Support/console-authz/` on macOS)
    /// 2. `~/.config/console-authz/` for Unix compatibility
    ///
    /// Returns default configuration if no readable file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let candidates = [
            base_dirs.config_dir().join(APP_DIR).join("config.toml"),
            base_dirs
                .home_dir()
                .join(".config")
                .join(APP_DIR)
                .join("config.toml"),
        ];

        for path in candidates.iter().filter(|p| p.exists()) {
            match Self::load_from_file(path) {
                Ok(config) => return config,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                },
            }
        }

        Self::default()
    }

    /// Applies `CONSOLE_*` overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an override holds an invalid value.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Applies `CONSOLE_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if an override holds an invalid value.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("CONSOLE_API_URL") {
            self.api.base_url = url;
        }
        if let Some(raw) = lookup("CONSOLE_API_TIMEOUT_SECS") {
            self.api.timeout_secs = raw.trim().parse().map_err(|_| {
                Error::InvalidInput(format!("CONSOLE_API_TIMEOUT_SECS is not a number: {raw}"))
            })?;
        }
        if let Some(token) = lookup("CONSOLE_API_TOKEN") {
            self.api.token = Some(SecretString::from(token));
        }
        if let Some(dir) = lookup("CONSOLE_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(format) = lookup("CONSOLE_LOG_FORMAT") {
            self.logging.format = parse_log_format(&format)?;
        }
        Ok(self)
    }

    /// Converts a `ConfigFile` to `ConsoleConfig`.
    fn from_config_file(file: ConfigFile) -> Result<Self> {
        let mut config = Self::default();

        if let Some(api) = file.api {
            if let Some(base_url) = api.base_url {
                config.api.base_url = base_url;
            }
            if let Some(timeout) = api.timeout_secs {
                config.api.timeout_secs = timeout;
            }
            if let Some(token) = api.token {
                config.api.token = Some(SecretString::from(token));
            }
        }
        if let Some(storage) = file.storage {
            if let Some(dir) = storage.data_dir {
                config.storage.data_dir = PathBuf::from(dir);
            }
            if let Some(key) = storage.grants_key {
                config.storage.grants_key = key;
            }
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                config.logging.level = level;
            }
            if let Some(format) = logging.format {
                config.logging.format = parse_log_format(&format)?;
            }
            config.logging.file = logging.file.map(PathBuf::from);
        }
        if let Some(navigation) = file.navigation {
            config.navigation.extend(navigation.routes);
        }

        Ok(config)
    }

    /// Sets the registry base URL.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api.base_url = url.into();
        self
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage.data_dir = path.into();
        self
    }
}

fn parse_log_format(raw: &str) -> Result<LogFormat> {
    LogFormat::parse(raw).ok_or_else(|| Error::InvalidInput(format!("unknown log format: {raw}")))
}
