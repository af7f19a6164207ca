use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::paths::PathSynthesizer;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Shotwell library directory (contains `data/photo.db`).
    #[serde(default = "default_library")]
    pub library: PathBuf,

    /// Only include photos and videos with this rating or greater.
    #[serde(default)]
    pub min_rating: i64,

    #[serde(default)]
    pub timezone: TimeZoneChoice,

    #[serde(default)]
    pub paths: PathConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeZoneChoice {
    #[default]
    Local,
    Utc,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathConfig {
    /// strftime format used to name events that have no name.
    #[serde(default = "default_event_name")]
    pub event_name: String,

    /// strftime + `%{field}` format for event directories (id, name, comment).
    #[serde(default = "default_event_path")]
    pub event_path: String,

    /// strftime + `%{field}` format for photo files (id, title, comment, rating).
    #[serde(default = "default_photo_path")]
    pub photo_path: String,

    /// As `photo_path`, for videos. Falls back to `photo_path`.
    #[serde(default)]
    pub video_path: Option<String>,
}

fn default_event_name() -> String {
    "%d %a".to_string()
}

fn default_event_path() -> String {
    "%Y-%m %{name}".to_string()
}

fn default_photo_path() -> String {
    "%{id}".to_string()
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            event_name: default_event_name(),
            event_path: default_event_path(),
            photo_path: default_photo_path(),
            video_path: None,
        }
    }
}

/// Where the transform identity of a cached file is recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    /// `user.shotwell.transform_id` extended attribute on the cached file.
    #[default]
    Xattr,
    /// `{file}.transform_id` next to the cached file.
    Sidecar,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    /// Defaults to `<library>/fuse/transforms`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default)]
    pub marker: MarkerKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_watch_enabled")]
    pub enabled: bool,

    /// Rescan after this much quiet if a write is never finalized.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_watch_enabled() -> bool {
    true
}

fn default_settle_ms() -> u64 {
    2000
}

fn default_channel_capacity() -> usize {
    64
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: default_watch_enabled(),
            settle_ms: default_settle_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_library() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("shotwell")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            library: default_library(),
            min_rating: 0,
            timezone: TimeZoneChoice::default(),
            paths: PathConfig::default(),
            cache: CacheConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("shotwellfs")
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("SHOTWELLFS_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    pub fn db_path(&self) -> PathBuf {
        self.library.join("data").join("photo.db")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache
            .path
            .clone()
            .unwrap_or_else(|| self.library.join("fuse").join("transforms"))
    }

    /// Apply one `-o key=value` mount option.
    pub fn apply_option(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "rating" => {
                self.min_rating = value
                    .parse()
                    .with_context(|| format!("rating must be an integer, got {:?}", value))?;
            }
            "event_name" => self.paths.event_name = value.to_string(),
            "event_path" => self.paths.event_path = value.to_string(),
            "photo_path" => self.paths.photo_path = value.to_string(),
            "video_path" => self.paths.video_path = Some(value.to_string()),
            _ => bail!("unknown option {:?}", key),
        }
        Ok(())
    }

    /// Apply a comma-separated `key=value` option list.
    pub fn apply_options(&mut self, options: &str) -> Result<()> {
        for option in options.split(',').filter(|o| !o.is_empty()) {
            let (key, value) = option
                .split_once('=')
                .with_context(|| format!("option {:?} is not key=value", option))?;
            self.apply_option(key.trim(), value)?;
        }
        Ok(())
    }

    /// Compile the path templates, failing on unknown fields or specifiers.
    pub fn path_synthesizer(&self) -> Result<PathSynthesizer> {
        PathSynthesizer::new(&self.paths, self.timezone).context("Invalid path template")
    }
}
