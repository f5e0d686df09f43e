use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "/etc/presence/presenced.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    System,
    Session,
}

/// Daemon configuration: optional TOML file, then `PRESENCE_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the roster, gallery, ledger and uploads.
    pub data_dir: PathBuf,
    /// Maximum Euclidean distance for a positive match.
    pub tolerance: f32,
    /// Expected embedding length from the provider.
    pub embedding_dim: usize,
    /// Base URL of the embedding provider service.
    pub provider_url: String,
    pub provider_timeout_secs: u64,
    /// Interval between absence snapshot regenerations.
    pub absence_interval_secs: u64,
    pub bus: BusKind,
    /// Command run (detached) after each kiosk match; `PRESENCE_NAME` carries the name.
    pub notify_command: Option<String>,
    pub kiosk: KioskConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KioskConfig {
    pub enabled: bool,
    /// V4L2 device path.
    pub camera_device: String,
    pub width: u32,
    pub height: u32,
    /// How long recognition stays suspended after a match.
    pub pause_secs: u64,
    /// Delay between recognition attempts.
    pub frame_interval_ms: u64,
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            camera_device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            pause_secs: 10,
            frame_interval_ms: 250,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(|k| std::env::var(k).ok()),
            tolerance: presence_core::DEFAULT_TOLERANCE,
            embedding_dim: presence_core::DEFAULT_EMBEDDING_DIM,
            provider_url: "http://127.0.0.1:8400".to_string(),
            provider_timeout_secs: 10,
            absence_interval_secs: 30,
            bus: BusKind::System,
            notify_command: None,
            kiosk: KioskConfig::default(),
        }
    }
}

impl Config {
    /// Load from `PRESENCE_CONFIG` (or the default path, if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var("PRESENCE_CONFIG").ok();
        let path = explicit.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);

        let contents = match std::fs::read_to_string(path) {
            Ok(s) => Some(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && explicit.is_none() => None,
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_string(),
                    source,
                })
            }
        };
        if contents.is_some() {
            tracing::info!(path, "loading config file");
        }

        Self::from_sources(contents.as_deref(), Path::new(path), |k| std::env::var(k).ok())
    }

    /// Build a config from optional TOML text and an environment lookup.
    pub fn from_sources(
        toml_text: Option<&str>,
        origin: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = match toml_text {
            Some(text) => toml::from_str::<Config>(text).map_err(|source| ConfigError::Parse {
                path: origin.display().to_string(),
                source,
            })?,
            None => Config::default(),
        };
        if !valid_tolerance(config.tolerance) {
            tracing::warn!(tolerance = config.tolerance, "invalid tolerance in config file; using default");
            config.tolerance = presence_core::DEFAULT_TOLERANCE;
        }
        config.apply_env(&env);
        Ok(config)
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("PRESENCE_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = env("PRESENCE_PROVIDER_URL") {
            self.provider_url = v;
        }
        if let Some(v) = env("PRESENCE_NOTIFY_COMMAND") {
            self.notify_command = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = env("PRESENCE_CAMERA_DEVICE") {
            self.kiosk.camera_device = v;
        }
        if let Some(v) = env("PRESENCE_BUS") {
            match v.as_str() {
                "system" => self.bus = BusKind::System,
                "session" => self.bus = BusKind::Session,
                other => tracing::warn!(value = other, "ignoring PRESENCE_BUS"),
            }
        }
        if let Some(v) = env("PRESENCE_KIOSK") {
            self.kiosk.enabled = v != "0";
        }
        let mut tolerance = self.tolerance;
        parse_into(env, "PRESENCE_TOLERANCE", &mut tolerance);
        if valid_tolerance(tolerance) {
            self.tolerance = tolerance;
        } else {
            tracing::warn!(key = "PRESENCE_TOLERANCE", value = tolerance, "ignoring out-of-range value");
        }
        parse_into(env, "PRESENCE_EMBEDDING_DIM", &mut self.embedding_dim);
        parse_into(env, "PRESENCE_PROVIDER_TIMEOUT_SECS", &mut self.provider_timeout_secs);
        parse_into(env, "PRESENCE_ABSENCE_INTERVAL_SECS", &mut self.absence_interval_secs);
        parse_into(env, "PRESENCE_PAUSE_SECS", &mut self.kiosk.pause_secs);
    }
}

fn parse_into<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    if let Some(raw) = env(key) {
        match raw.parse() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable value"),
        }
    }
}

/// A distance threshold must be a finite, non-negative number.
fn valid_tolerance(t: f32) -> bool {
    t.is_finite() && t >= 0.0
}

fn default_data_dir(env: impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("presence")
}
