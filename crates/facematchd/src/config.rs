use facematch_core::{DistanceMetric, MatchPolicy, DEFAULT_MATCH_THRESHOLD};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Daemon configuration.
///
/// Layered: built-in defaults, then the TOML file named by
/// `FACEMATCH_CONFIG` (if set), then `FACEMATCH_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP listen address.
    pub bind: String,
    /// Directory containing the SCRFD and ArcFace ONNX files.
    pub model_dir: PathBuf,
    /// Root directory of the local object store holding known-face images.
    pub store_root: PathBuf,
    /// Object name prefix under which known faces are listed.
    pub known_prefix: String,
    /// SQLite database holding identity records.
    pub db_path: PathBuf,
    /// Distance metric for matching.
    pub metric: DistanceMetric,
    /// Maximum distance accepted as a reliable match.
    pub match_threshold: f32,
    /// Objects processed concurrently during preload.
    pub preload_concurrency: usize,
    /// Upload body limit in bytes.
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = data_dir();
        Self {
            bind: "0.0.0.0:5000".to_string(),
            model_dir: data_dir.join("models"),
            store_root: data_dir.join("bucket"),
            known_prefix: "img/".to_string(),
            db_path: data_dir.join("records.db"),
            metric: DistanceMetric::Euclidean,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            preload_concurrency: 4,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl Config {
    /// Load configuration from the optional TOML file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("FACEMATCH_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_overrides(|key| std::env::var(key).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `FACEMATCH_*` overrides. Unparseable values keep the current setting.
    pub fn with_overrides(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bind: lookup("FACEMATCH_BIND").unwrap_or(self.bind),
            model_dir: lookup("FACEMATCH_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(self.model_dir),
            store_root: lookup("FACEMATCH_STORE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(self.store_root),
            known_prefix: lookup("FACEMATCH_KNOWN_PREFIX").unwrap_or(self.known_prefix),
            db_path: lookup("FACEMATCH_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(self.db_path),
            metric: parsed(&lookup, "FACEMATCH_METRIC", self.metric),
            match_threshold: parsed(&lookup, "FACEMATCH_MATCH_THRESHOLD", self.match_threshold),
            preload_concurrency: parsed(&lookup, "FACEMATCH_PRELOAD_CONCURRENCY", self.preload_concurrency),
            max_upload_bytes: parsed(&lookup, "FACEMATCH_MAX_UPLOAD_BYTES", self.max_upload_bytes),
        }
    }

    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            metric: self.metric,
            threshold: self.match_threshold,
        }
    }
}

fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch")
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    match lookup(key) {
        Some(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring unparseable config override");
                current
            }
        },
        None => current,
    }
}
