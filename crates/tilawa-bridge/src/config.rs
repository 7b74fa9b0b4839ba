use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tokio::{
    fs::{OpenOptions, create_dir_all, read_to_string},
    io::AsyncWriteExt,
};

/// Language used for catalog names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum Language {
    #[serde(rename = "ar")]
    Arabic,
    /// Default value.
    #[default]
    #[serde(rename = "eng", alias = "en")]
    English,
}

impl Language {
    /// Code understood by the catalog API.
    pub fn code(self) -> &'static str {
        match self {
            Language::Arabic => "ar",
            Language::English => "eng",
        }
    }

    /// Parses a language code, accepting both `en` and `eng` for English.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "ar" => Some(Language::Arabic),
            "en" | "eng" => Some(Language::English),
            _ => None,
        }
    }
}

/// Where and how the recitation catalog is fetched.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Base URL of the catalog API, ending with a slash.
    pub base_url: String,
    /// Language used until the user picks one.
    pub default_language: Language,
    /// File extension appended to stream URLs.
    pub audio_extension: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: "https://mp3quran.net/api/v3/".to_string(),
            default_language: Language::default(),
            audio_extension: "mp3".to_string(),
        }
    }
}

/// Timeouts and settle delays of the control protocol, in milliseconds.
///
/// The settle delays are empirical: they give asynchronous host creation a
/// moment to finish before a controller proceeds optimistically.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Upper bound for a single command round-trip.
    pub message_timeout_ms: u64,
    /// How long the host waits for a resource to become playable.
    pub load_timeout_ms: u64,
    /// Wait after any answer to a host creation request.
    pub create_settle_ms: u64,
    /// Proceed unconditionally if host creation has not answered by then.
    pub create_fallback_ms: u64,
    pub ping_timeout_ms: u64,
    /// Extra wait after a failed or timed out liveness probe.
    pub ping_settle_ms: u64,
    /// Wait between bootstrap and the single resend.
    pub retry_delay_ms: u64,
    /// Progress broadcast interval while playing.
    pub heartbeat_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            message_timeout_ms: 5000,
            load_timeout_ms: 5000,
            create_settle_ms: 300,
            create_fallback_ms: 500,
            ping_timeout_ms: 1000,
            ping_settle_ms: 250,
            retry_delay_ms: 200,
            heartbeat_ms: 250,
        }
    }
}

impl TimingConfig {
    pub fn message_timeout(&self) -> Duration {
        Duration::from_millis(self.message_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn create_settle(&self) -> Duration {
        Duration::from_millis(self.create_settle_ms)
    }

    pub fn create_fallback(&self) -> Duration {
        Duration::from_millis(self.create_fallback_ms)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }

    pub fn ping_settle(&self) -> Duration {
        Duration::from_millis(self.ping_settle_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_ms)
    }

    /// Longest time a bootstrap pass can take.
    pub fn bootstrap_bound(&self) -> Duration {
        self.create_fallback()
            + self.create_settle()
            + self.ping_timeout()
            + self.ping_settle()
    }
}

/// Global application configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Configuration of the recitation catalog.
    pub catalog: CatalogConfig,
    /// Protocol timeouts and settle delays.
    pub timings: TimingConfig,
}

/// Result of [`load_config`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedConfig {
    pub config: Config,
    /// The file did not exist and was just written with defaults.
    pub first_run: bool,
}

/// Errors raised while locating, reading or creating `config.toml`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No home directory could be resolved for this user.
    #[error("failed to obtain user's directories")]
    DirectoriesNotFound,
    /// Reading the file, or creating it and its directory, failed.
    #[error("failed to access config: {0}")]
    IoError(#[from] std::io::Error),
    #[error("failed to deserialize config: {0}")]
    DeserializeError(#[from] toml::de::Error),
    /// The defaults could not be written out as TOML.
    #[error("failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),
}

/// Returns the user's configuration directory for the application.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    match ProjectDirs::from("net", "tilawa", "tilawa") {
        Some(path) => Ok(path.config_dir().to_path_buf()),
        None => Err(ConfigError::DirectoriesNotFound),
    }
}

/// Loads the application configuration from `config.toml` in the user's
/// configuration directory, writing the defaults there on first run.
pub async fn load_config() -> Result<LoadedConfig, ConfigError> {
    load_config_from(config_dir()?.join("config.toml")).await
}

/// Loads the configuration from an explicit path, creating it with defaults
/// when it does not exist.
pub async fn load_config_from(config_path: PathBuf) -> Result<LoadedConfig, ConfigError> {
    log::info!("Loading configuration from {config_path:?}");
    if config_path.exists() {
        let contents = read_to_string(config_path).await?;
        let config: Config = toml::from_str(&contents)?;
        return Ok(LoadedConfig {
            config,
            first_run: false,
        });
    }

    let config = Config::default();
    if let Some(parent) = config_path.parent() {
        create_dir_all(parent).await?;
    }

    let contents = toml::to_string_pretty(&config)?;
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(config_path)
        .await?;
    file.write_all(contents.as_bytes()).await?;
    file.sync_all().await?;

    Ok(LoadedConfig {
        config,
        first_run: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timings_match_protocol() {
        let timings = TimingConfig::default();
        assert_eq!(timings.message_timeout(), Duration::from_secs(5));
        assert_eq!(timings.load_timeout(), Duration::from_secs(5));
        assert_eq!(timings.create_settle(), Duration::from_millis(300));
        assert_eq!(timings.create_fallback(), Duration::from_millis(500));
        assert_eq!(timings.heartbeat(), Duration::from_millis(250));
        assert_eq!(timings.bootstrap_bound(), Duration::from_millis(2050));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [timings]
            create_settle_ms = 50

            [catalog]
            default_language = "ar"
            "#,
        )
        .unwrap();
        assert_eq!(config.timings.create_settle_ms, 50);
        assert_eq!(config.timings.message_timeout_ms, 5000);
        assert_eq!(config.catalog.default_language, Language::Arabic);
        assert_eq!(config.catalog.audio_extension, "mp3");
    }

    #[test]
    fn parses_language_codes() {
        assert_eq!(Language::from_code("AR"), Some(Language::Arabic));
        assert_eq!(Language::from_code("en"), Some(Language::English));
        assert_eq!(Language::from_code("eng"), Some(Language::English));
        assert_eq!(Language::from_code("fr"), None);
        assert_eq!(Language::English.code(), "eng");
    }

    #[tokio::test]
    async fn writes_defaults_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let loaded = load_config_from(path.clone()).await.unwrap();
        assert!(loaded.first_run);
        assert_eq!(loaded.config.timings, TimingConfig::default());
        assert!(path.exists());

        let reloaded = load_config_from(path).await.unwrap();
        assert!(!reloaded.first_run);
        assert_eq!(reloaded.config, loaded.config);
    }
}
