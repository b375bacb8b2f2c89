use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_COMPACT_THRESHOLD: u64 = 1000;
const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 2000;
const WAL_FILE_NAME: &str = "requests.wal";

/// What the engine itself needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub wal_path: PathBuf,
    /// Upper bound on each directory lookup.
    pub source_timeout: Duration,
}

impl EngineConfig {
    pub fn new(wal_path: PathBuf) -> Self {
        Self {
            wal_path,
            source_timeout: Duration::from_millis(DEFAULT_SOURCE_TIMEOUT_MS),
        }
    }
}

/// Process configuration, read from `RSVP_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub compact_threshold: u64,
    pub source_timeout: Duration,
    pub metrics_port: Option<u16>,
    /// JSON file seeding the in-process directory.
    pub directory_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparseable values fall back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = lookup("RSVP_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into());
        let compact_threshold = lookup("RSVP_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_COMPACT_THRESHOLD);
        let source_timeout_ms = lookup("RSVP_SOURCE_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SOURCE_TIMEOUT_MS);
        let metrics_port = lookup("RSVP_METRICS_PORT").and_then(|s| s.parse().ok());
        let directory_file = lookup("RSVP_DIRECTORY_FILE").map(PathBuf::from);

        Self {
            data_dir: PathBuf::from(data_dir),
            compact_threshold,
            source_timeout: Duration::from_millis(source_timeout_ms),
            metrics_port,
            directory_file,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            wal_path: self.wal_path(),
            source_timeout: self.source_timeout,
        }
    }
}
