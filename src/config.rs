use crate::error::ThemeSyncError;
use serde::{Deserialize, Serialize};
use std::{
    fs::{read_to_string, write},
    path::{Path, PathBuf},
    time::Duration,
};

/// File name looked up at the theme root by [`TomlConfigProvider::for_root`].
pub const CONFIG_FILE_NAME: &str = "themesync.toml";

pub const ENV_SHOP: &str = "THEMESYNC_SHOP";
pub const ENV_THEME_ID: &str = "THEMESYNC_THEME_ID";
pub const ENV_ACCESS_TOKEN: &str = "THEMESYNC_ACCESS_TOKEN";

fn default_api_version() -> String {
    "unstable".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Theme root. Not read from the file; set by the provider.
    #[serde(skip)]
    pub root: PathBuf,
    pub theme_id: Option<String>,
    pub shop: Option<String>,
    #[serde(skip)]
    pub access_token: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Glob patterns, or regular expressions wrapped in slashes.
    pub ignore_files: Vec<String>,
    /// Explicit root-relative paths to ignore.
    pub ignores: Vec<String>,
    pub upload: UploadConfig,
    pub throttler: ThrottlerConfig,
    pub server: ServerConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            root: PathBuf::from("."),
            theme_id: None,
            shop: None,
            access_token: None,
            api_version: default_api_version(),
            ignore_files: Vec::new(),
            ignores: Vec::new(),
            upload: UploadConfig::default(),
            throttler: ThrottlerConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl SyncConfig {
    pub fn with_root<P: Into<PathBuf>>(root: P) -> Self {
        SyncConfig {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn shop(&self) -> Result<&str, ThemeSyncError> {
        self.shop.as_deref().ok_or_else(|| {
            ThemeSyncError::Config(format!("no shop configured (set `shop` or {ENV_SHOP})"))
        })
    }

    pub fn theme_id(&self) -> Result<&str, ThemeSyncError> {
        self.theme_id.as_deref().ok_or_else(|| {
            ThemeSyncError::Config(format!(
                "no theme id configured (set `theme_id` or {ENV_THEME_ID})"
            ))
        })
    }

    /// Applies `THEMESYNC_*` environment overrides.
    pub fn apply_env(&mut self) {
        if let Ok(shop) = std::env::var(ENV_SHOP) {
            self.shop = Some(shop);
        }
        if let Ok(theme_id) = std::env::var(ENV_THEME_ID) {
            self.theme_id = Some(theme_id);
        }
        if let Ok(token) = std::env::var(ENV_ACCESS_TOKEN) {
            self.access_token = Some(token);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub workers: usize,
    pub backoff_interval_ms: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            workers: 2,
            backoff_interval_ms: 2000,
        }
    }
}

impl UploadConfig {
    pub fn backoff_interval(&self) -> Duration {
        Duration::from_millis(self.backoff_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottlerConfig {
    pub enabled: bool,
    pub max_files: usize,
    pub max_bytes: usize,
    pub flush_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub wait_retries: u32,
    pub wait_interval_ms: u64,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        ThrottlerConfig {
            enabled: false,
            max_files: 10,
            max_bytes: 10_485_760,
            flush_timeout_ms: 200,
            poll_interval_ms: 200,
            wait_retries: 100,
            wait_interval_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub debounce_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 9292,
            debounce_ms: 300,
        }
    }
}

pub trait ConfigProvider: Send + Sync {
    fn load(&self) -> Result<SyncConfig, ThemeSyncError>;
    fn store(&self, config: &SyncConfig) -> Result<(), ThemeSyncError>;
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TomlConfigProvider {
    root: PathBuf,
    path: PathBuf,
}

impl TomlConfigProvider {
    pub fn new(root: PathBuf, path: PathBuf) -> Self {
        TomlConfigProvider { root, path }
    }

    pub fn for_root<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let path = root.join(CONFIG_FILE_NAME);
        TomlConfigProvider::new(root, path)
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn load(&self) -> Result<SyncConfig, ThemeSyncError> {
        tracing::debug!("Attempting to read config from: {:?}", &self.path);
        let mut config = if self.path.exists() {
            let content = read_to_string(&self.path)?;
            toml::from_str::<SyncConfig>(&content)?
        } else {
            tracing::debug!("Config file not found, using defaults.");
            SyncConfig::default()
        };
        config.root = self.root.clone();
        Ok(config)
    }

    fn store(&self, config: &SyncConfig) -> Result<(), ThemeSyncError> {
        tracing::debug!("Attempting to write config to: {:?}", &self.path);
        let toml_string = toml::to_string(config)
            .map_err(|e| ThemeSyncError::Serialization(format!("Toml serialization error: {e}")))?;
        write(&self.path, toml_string)?;
        Ok(())
    }
}
