use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Pilot level at or above which turns are never charged
pub const DEFAULT_EXEMPT_LEVEL: i64 = 99;

const DATABASE_FILE: &str = "universe.db";

fn default_exempt_level() -> i64 {
    DEFAULT_EXEMPT_LEVEL
}

/// How transitions consume the `turns` resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TurnPolicy {
    /// Turns are inspected but never charged
    #[default]
    Unmetered,
    /// Every committed transition costs turns, charged in the same commit
    Metered {
        move_cost: i64,
        warp_cost: i64,
        #[serde(default = "default_exempt_level")]
        exempt_level: i64,
    },
}

/// Runtime settings for the navigation engine and its store
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Upper bound for one navigation request, retries included
    pub request_timeout_ms: u64,
    /// How long SQLite waits on a locked database before giving up
    pub busy_timeout_ms: u64,
    /// Extra attempts after a commit conflict
    pub max_conflict_retries: u32,
    /// Keep the universe graph between requests until invalidated
    pub cache_universe: bool,
    pub turn_policy: TurnPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 5_000,
            busy_timeout_ms: 2_000,
            max_conflict_retries: 3,
            cache_universe: true,
            turn_policy: TurnPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load settings from a JSON file, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: EngineConfig = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::debug!("Loaded engine config from {:?}: {:?}", path, config);
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Default database location inside the platform data directory
pub fn default_db_path() -> Result<PathBuf> {
    let proj_dirs = ProjectDirs::from("", "", "galaxy-nav")
        .context("Could not determine data directory")?;
    let data_dir = proj_dirs.data_dir();

    fs::create_dir_all(data_dir).context("Failed to create data directory")?;

    Ok(data_dir.join(DATABASE_FILE))
}
