//! harvest.toml configuration parser.
//!
//! Every field has a default so an absent file, or an absent section,
//! yields a working configuration. Command-line flags override on top.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::{PlanMode, Stage};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub paths: PathsConfig,
    pub planner: Tunables,
    pub pacing: PacingConfig,
    pub retry: RetryConfig,
    pub dispatch: DispatchConfig,
    pub selection: SelectionConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding snapshot, fleet, and ranking files.
    pub data_dir: PathBuf,
    /// Directory where payloads are placed, one subdirectory per node.
    pub nodes_dir: PathBuf,
    /// Directory the payload sources are read from.
    pub payload_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            nodes_dir: PathBuf::from("nodes"),
            payload_dir: PathBuf::from("payloads"),
        }
    }
}

/// Global knobs for plan computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tunables {
    pub mode: PlanMode,
    /// Fraction of value one harvest extracts.
    pub harvest_fraction: f64,
    /// Grow while `value < value_threshold_ratio × max_value`.
    pub value_threshold_ratio: f64,
    /// Stabilize-only while `defense > min_defense + defense_slack`.
    pub defense_slack: f64,
}

impl Default for Tunables {
    fn default() -> Self {
        Self {
            mode: PlanMode::Threshold,
            harvest_fraction: 0.25,
            value_threshold_ratio: 0.75,
            defense_slack: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Offset between stage launches in offset-paced modes.
    pub stage_delay_ms: u64,
    /// Added after the completion window before the next snapshot.
    pub cycle_delay_ms: u64,
    /// Added to each stage estimate in sequentially-paced modes.
    pub sequential_padding_ms: u64,
    /// Wait when a cycle has nothing to dispatch or no snapshot.
    pub idle_delay_ms: u64,
    pub completion: CompletionConfig,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            stage_delay_ms: 50,
            cycle_delay_ms: 200,
            sequential_padding_ms: 100,
            idle_delay_ms: 500,
            completion: CompletionConfig::default(),
        }
    }
}

/// How the controller decides a dispatched stage has finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Poll dispatched handles after the estimated window instead of
    /// trusting the estimate alone.
    pub poll: bool,
    pub poll_interval_ms: u64,
    /// Longest extra wait beyond the estimate before giving up.
    pub max_overrun_ms: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            poll: false,
            poll_interval_ms: 250,
            max_overrun_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total allocation attempts per stage, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Also retry the unallocated remainder of a partial allocation.
    pub retry_partial: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 8_000,
            retry_partial: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// The local node; always the first allocation candidate.
    pub home_node: String,
    /// Nodes whose id starts with one of these never receive jobs.
    pub excluded_prefixes: Vec<String>,
    /// Program (and leading arguments) used to launch a job. The payload,
    /// node, thread count, and target are appended.
    pub launcher: Vec<String>,
    pub payloads: PayloadsConfig,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            home_node: "home".to_string(),
            excluded_prefixes: vec!["mgmt".to_string()],
            launcher: vec!["harvest-exec".to_string()],
            payloads: PayloadsConfig::default(),
        }
    }
}

/// Payload file names, relative to `paths.payload_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayloadsConfig {
    pub stabilize: String,
    pub grow: String,
    pub harvest: String,
}

impl PayloadsConfig {
    pub fn for_stage(&self, stage: Stage) -> &str {
        match stage {
            Stage::Stabilize => &self.stabilize,
            Stage::Grow => &self.grow,
            Stage::Harvest => &self.harvest,
        }
    }
}

impl Default for PayloadsConfig {
    fn default() -> Self {
        Self {
            stabilize: "stabilize.js".to_string(),
            grow: "grow.js".to_string(),
            harvest: "harvest.js".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Fixed number of targets to run. Derived from operator skill when unset.
    pub top_k: Option<u32>,
    /// Seconds between ranking refreshes in fleet mode.
    pub refresh_secs: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            top_k: None,
            refresh_secs: 600,
        }
    }
}

impl HarvestConfig {
    /// Parse and validate a config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: HarvestConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`HarvestConfig::from_file`], but an absent file yields defaults.
    pub fn load_or_default(path: &Path) -> ConfigResult<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        let fraction = self.planner.harvest_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "planner.harvest_fraction must be in (0, 1], got {fraction}"
            )));
        }
        let ratio = self.planner.value_threshold_ratio;
        if !(0.0..=1.0).contains(&ratio) {
            return Err(ConfigError::Invalid(format!(
                "planner.value_threshold_ratio must be in [0, 1], got {ratio}"
            )));
        }
        if self.planner.defense_slack < 0.0 {
            return Err(ConfigError::Invalid(
                "planner.defense_slack must not be negative".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.dispatch.launcher.is_empty() {
            return Err(ConfigError::Invalid(
                "dispatch.launcher must name a program".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tunables() {
        let config = HarvestConfig::default();
        assert_eq!(config.planner.harvest_fraction, 0.25);
        assert_eq!(config.planner.value_threshold_ratio, 0.75);
        assert_eq!(config.planner.defense_slack, 5.0);
        assert_eq!(config.pacing.stage_delay_ms, 50);
        assert_eq!(config.pacing.cycle_delay_ms, 200);
        assert_eq!(config.dispatch.home_node, "home");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_partial_file() {
        let toml_str = r#"
[planner]
mode = "batch"
harvest_fraction = 0.1

[retry]
max_attempts = 2
"#;
        let config: HarvestConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.planner.mode, PlanMode::Batch);
        assert_eq!(config.planner.harvest_fraction, 0.1);
        assert_eq!(config.planner.value_threshold_ratio, 0.75);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.initial_backoff_ms, 1_000);
    }

    #[test]
    fn rejects_out_of_range_fraction() {
        let mut config = HarvestConfig::default();
        config.planner.harvest_fraction = 1.5;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_attempts() {
        let mut config = HarvestConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = HarvestConfig::load_or_default(&dir.path().join("harvest.toml")).unwrap();
        assert_eq!(config, HarvestConfig::default());
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.toml");
        let mut config = HarvestConfig::default();
        config.selection.top_k = Some(12);
        config.dispatch.excluded_prefixes.push("srv-private".to_string());
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let back = HarvestConfig::from_file(&path).unwrap();
        assert_eq!(back, config);
    }
}
