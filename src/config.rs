//! Configuration management for medalboard.
//!
//! Settings are read from a TOML file, then selected values can be replaced
//! through `MEDALBOARD_*` environment variables before validation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::awards::{MetricDefinition, PointTable, PopulationScope, RecalculationConfig, Tier};
use crate::source::Town;
use crate::stats::StatPath;
use crate::sync::SyncConfig;

pub const ENV_STORAGE_ROOT: &str = "MEDALBOARD_STORAGE_ROOT";
pub const ENV_SYNC_URL: &str = "MEDALBOARD_SYNC_URL";
pub const ENV_SYNC_KEY: &str = "MEDALBOARD_SYNC_KEY";
pub const ENV_SYNC_ENABLED: &str = "MEDALBOARD_SYNC_ENABLED";
pub const ENV_BIND_ADDRESS: &str = "MEDALBOARD_BIND_ADDRESS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration loaded from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedalboardConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub sources: SourceSettings,
    #[serde(default = "default_metrics")]
    pub metrics: Vec<MetricDefinition>,
    #[serde(default)]
    pub points: PointTable,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub schedule: ScheduleSettings,
}

/// Admin HTTP listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Address to bind the admin API to (e.g., "127.0.0.1:8420")
    pub bind_address: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8420".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory holding the per-entity award records
    pub root: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("plugins/medalboard/data"),
        }
    }
}

/// Where player stats and town membership come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceSettings {
    /// World directories, each containing `stats/<uuid>.json`
    pub worlds: Vec<PathBuf>,
    /// Player name cache, `[{"uuid": ..., "name": ...}]`
    pub user_cache: Option<PathBuf>,
    /// Prefix tried when a stat path does not match as written
    pub namespace: String,
    pub towns: TownSettings,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            worlds: vec![
                PathBuf::from("world"),
                PathBuf::from("world_nether"),
                PathBuf::from("world_the_end"),
            ],
            user_cache: Some(PathBuf::from("usercache.json")),
            namespace: crate::stats::aliases::NAMESPACE_PREFIX.to_string(),
            towns: TownSettings::default(),
        }
    }
}

/// Towns are ranked only when at least one is listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TownSettings {
    pub root: PathBuf,
    pub table_prefix: String,
    pub members: Vec<Town>,
}

impl Default for TownSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("plugins/medalboard/towns"),
            table_prefix: "town".to_string(),
            members: Vec::new(),
        }
    }
}

impl TownSettings {
    pub fn enabled(&self) -> bool {
        !self.members.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    /// Seconds between full recalculations (0 disables the task)
    pub interval_secs: u64,
    pub scope: PopulationScope,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            interval_secs: 600,
            scope: PopulationScope::All,
        }
    }
}

impl ScheduleSettings {
    pub fn enabled(&self) -> bool {
        self.interval_secs > 0
    }

    pub fn recalculation(&self) -> RecalculationConfig {
        RecalculationConfig {
            interval: Duration::from_secs(self.interval_secs),
            scope: self.scope,
        }
    }
}

fn default_metrics() -> Vec<MetricDefinition> {
    let metric = |id: &str, name: &str, tier, path: &str| MetricDefinition {
        name: name.to_string(),
        ..MetricDefinition::new(id, tier, path)
    };
    vec![
        metric("stone_miner", "Stone Miner", Tier::Stone, "mined.stone"),
        metric("walker", "Long Walker", Tier::Stone, "custom.walk_one_cm"),
        metric("time_played", "Dedicated", Tier::Iron, "custom.play_time"),
        metric("diamond_miner", "Diamond Miner", Tier::Iron, "mined.diamond_ore"),
        metric("monster_hunter", "Monster Hunter", Tier::Diamond, "killed.total"),
    ]
}

impl Default for MedalboardConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            storage: StorageSettings::default(),
            sources: SourceSettings::default(),
            metrics: default_metrics(),
            points: PointTable::default(),
            sync: SyncConfig::default(),
            schedule: ScheduleSettings::default(),
        }
    }
}

impl MedalboardConfig {
    /// Loads the configuration file, applies environment overrides and
    /// validates the result. A missing file yields the defaults.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = match tokio::fs::read_to_string(path).await {
            Ok(content) => Self::from_toml(&content)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No configuration file, using defaults");
                Self::default()
            }
            Err(err) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Replace settings with values from `lookup`, normally the process
    /// environment.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_STORAGE_ROOT) {
            self.storage.root = PathBuf::from(root);
        }
        if let Some(url) = lookup(ENV_SYNC_URL) {
            self.sync.base_url = url;
        }
        if let Some(key) = lookup(ENV_SYNC_KEY) {
            self.sync.api_key = Some(key).filter(|key| !key.is_empty());
        }
        if let Some(enabled) = lookup(ENV_SYNC_ENABLED) {
            self.sync.enabled = parse_flag(&enabled).ok_or_else(|| {
                ConfigError::Invalid(format!("{ENV_SYNC_ENABLED} must be true or false, got {enabled:?}"))
            })?;
        }
        if let Some(address) = lookup(ENV_BIND_ADDRESS) {
            self.server.bind_address = address;
        }
        Ok(())
    }

    /// Validates the configuration for consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_address()?;

        let mut seen = HashSet::new();
        for metric in &self.metrics {
            if metric.id.trim().is_empty() {
                return Err(ConfigError::Invalid("Metric with an empty id".to_string()));
            }
            if !seen.insert(metric.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate metric id: {}",
                    metric.id
                )));
            }
            if metric.stat_path.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "Metric {} has an empty stat path",
                    metric.id
                )));
            }
            if let Err(err) = StatPath::parse(&metric.stat_path) {
                // Resolution treats this as not-found; nobody will ever rank.
                warn!(metric_id = %metric.id, error = %err, "Metric stat path will never resolve");
            }
        }

        if self.sync.enabled {
            if self.sync.base_url.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "Sync is enabled but no base_url is set".to_string(),
                ));
            }
            if self.sync.max_retries == 0 {
                return Err(ConfigError::Invalid(
                    "Sync is enabled with max_retries = 0".to_string(),
                ));
            }
        }

        Ok(())
    }

    pub fn bind_address(&self) -> Result<SocketAddr, ConfigError> {
        self.server.bind_address.parse().map_err(|_| {
            ConfigError::Invalid(format!(
                "Invalid bind address: {}",
                self.server.bind_address
            ))
        })
    }

    /// Sync settings for the town tables.
    pub fn town_sync(&self) -> SyncConfig {
        SyncConfig {
            table_prefix: self.sources.towns.table_prefix.clone(),
            ..self.sync.clone()
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::awards::MedalType;
    use crate::sync::AggregateMode;
    use rstest::rstest;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[server]
bind_address = "0.0.0.0:9000"

[storage]
root = "/srv/medals"

[sources]
worlds = ["survival"]

[[sources.towns.members]]
id = "t1"
name = "Riverside"
residents = ["p1", "p2"]

[[metrics]]
id = "stone_miner"
name = "Stone Miner"
tier = "stone"
stat_path = "mined.stone"

[[metrics]]
id = "hunter"
name = "Hunter"
tier = "diamond"
stat_path = "killed.total"
enabled = false

[points.iron]
gold = 5.0

[sync]
enabled = true
base_url = "https://db.example.com/rest/v1"
mode = "read_modify_write"
max_retries = 5

[schedule]
interval_secs = 60
scope = "online"
"#;

    #[test]
    fn parses_every_section() {
        let config = MedalboardConfig::from_toml(SAMPLE).unwrap();

        assert_eq!(config.server.bind_address, "0.0.0.0:9000");
        assert_eq!(config.storage.root, PathBuf::from("/srv/medals"));
        assert_eq!(config.sources.worlds, vec![PathBuf::from("survival")]);
        assert!(config.sources.towns.enabled());
        assert_eq!(config.metrics.len(), 2);
        assert!(!config.metrics[1].enabled);
        assert_eq!(config.points.points(Tier::Iron, MedalType::Gold), 5.0);
        // Entries missing from a configured table are worth nothing.
        assert_eq!(config.points.points(Tier::Iron, MedalType::Silver), 0.0);
        assert_eq!(config.points.points(Tier::Stone, MedalType::Gold), 0.0);
        assert_eq!(config.sync.mode, AggregateMode::ReadModifyWrite);
        assert_eq!(config.sync.max_retries, 5);
        assert_eq!(config.sync.request_delay_ms, 250);
        assert_eq!(config.schedule.scope, PopulationScope::Online);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = MedalboardConfig::from_toml("").unwrap();
        assert_eq!(config, MedalboardConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_STORAGE_ROOT, "/tmp/awards"),
            (ENV_SYNC_URL, "https://other.example.com"),
            (ENV_SYNC_KEY, "secret"),
            (ENV_SYNC_ENABLED, "off"),
            (ENV_BIND_ADDRESS, "127.0.0.1:1"),
        ]);
        let mut config = MedalboardConfig::from_toml(SAMPLE).unwrap();

        config
            .apply_overrides(|key| env.get(key).map(|value| value.to_string()))
            .unwrap();

        assert_eq!(config.storage.root, PathBuf::from("/tmp/awards"));
        assert_eq!(config.sync.base_url, "https://other.example.com");
        assert_eq!(config.sync.api_key.as_deref(), Some("secret"));
        assert!(!config.sync.enabled);
        assert_eq!(config.server.bind_address, "127.0.0.1:1");
    }

    #[test]
    fn bad_flag_is_rejected() {
        let mut config = MedalboardConfig::default();
        let result = config.apply_overrides(|key| {
            (key == ENV_SYNC_ENABLED).then(|| "maybe".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[rstest]
    #[case::duplicate_metric(|c: &mut MedalboardConfig| {
        let first = c.metrics[0].clone();
        c.metrics.push(first);
    })]
    #[case::empty_stat_path(|c: &mut MedalboardConfig| c.metrics[0].stat_path = " ".into())]
    #[case::zero_retries(|c: &mut MedalboardConfig| {
        c.sync.enabled = true;
        c.sync.base_url = "https://db.example.com".into();
        c.sync.max_retries = 0;
    })]
    #[case::sync_without_url(|c: &mut MedalboardConfig| c.sync.enabled = true)]
    #[case::bad_bind_address(|c: &mut MedalboardConfig| c.server.bind_address = "nowhere".into())]
    fn invalid_configurations(#[case] break_it: fn(&mut MedalboardConfig)) {
        let mut config = MedalboardConfig::default();
        break_it(&mut config);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_retries_is_fine_while_sync_is_off() {
        let mut config = MedalboardConfig::default();
        config.sync.max_retries = 0;
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = MedalboardConfig::load(&dir.path().join("medalboard.toml"))
            .await
            .unwrap();
        assert_eq!(config.metrics.len(), default_metrics().len());
    }

    #[test]
    fn town_sync_uses_town_tables() {
        let config = MedalboardConfig::default();
        assert_eq!(config.town_sync().tables().awards, "town_awards");
    }
}
