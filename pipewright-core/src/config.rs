//! Pipeline configuration: `<project>/config/pipeline_config.json`.
//!
//! Loaded once at startup; a change requires a restart. When the file is
//! absent, [`load_or_init_at`] synthesizes [`PipelineConfig::default`] and
//! writes it back so the user has something to edit.
//!
//! Saves use the same `.tmp` + `rename` pattern as the report store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::{io_err, ConfigError};
use crate::types::Gate;

pub const CONFIG_DIR: &str = "config";
pub const CONFIG_FILE: &str = "pipeline_config.json";

pub const DEFAULT_GATE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DEBOUNCE_MS: u64 = 2_000;
pub const DEFAULT_MAX_CONCURRENT_AGENTS: usize = 3;

// ---------------------------------------------------------------------------
// Document model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentSettings>,
    #[serde(default)]
    pub validation: ValidationSection,
    #[serde(default)]
    pub monitoring: MonitoringSection,
    #[serde(default)]
    pub watch: WatchSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSection {
    #[serde(default = "default_pipeline_name")]
    pub name: String,
    #[serde(default = "default_pipeline_version")]
    pub version: String,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default = "default_true")]
    pub watch_mode: bool,
    #[serde(default = "default_max_concurrent_agents")]
    pub max_concurrent_agents: usize,
}

/// Per-agent block: `enabled`, `required`, plus free-form agent settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Whether a failure of this agent fails the phase that dispatched it.
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateSetting {
    pub name: Gate,
    #[serde(default = "default_true")]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationSection {
    #[serde(default)]
    pub gates: Vec<GateSetting>,
    #[serde(default = "default_true")]
    pub strict_mode: bool,
    /// Hard deadline for a single gate check, in seconds.
    #[serde(default = "default_gate_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Seconds between status reports while watching.
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval: u64,
    #[serde(default)]
    pub alert_channels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchSection {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Top-level directories (relative to the project root) whose events are dropped.
    #[serde(default = "default_watch_ignore")]
    pub ignore: Vec<String>,
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_pipeline_name() -> String {
    "Web3 AI Pipeline".to_string()
}

fn default_pipeline_version() -> String {
    "1.0.0".to_string()
}

fn default_max_concurrent_agents() -> usize {
    DEFAULT_MAX_CONCURRENT_AGENTS
}

fn default_gate_timeout_secs() -> u64 {
    DEFAULT_GATE_TIMEOUT_SECS
}

fn default_metrics_interval() -> u64 {
    60
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_watch_ignore() -> Vec<String> {
    ["reports", "logs", "cache", "artifacts", "node_modules", ".git", "config"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
            version: default_pipeline_version(),
            auto_start: false,
            watch_mode: true,
            max_concurrent_agents: DEFAULT_MAX_CONCURRENT_AGENTS,
        }
    }
}

impl Default for ValidationSection {
    fn default() -> Self {
        let gate = |name, required| GateSetting { name, required };
        Self {
            gates: vec![
                gate(Gate::Requirements, true),
                gate(Gate::Architecture, true),
                gate(Gate::Security, true),
                gate(Gate::CodeQuality, false),
                gate(Gate::Performance, false),
            ],
            strict_mode: true,
            timeout_secs: DEFAULT_GATE_TIMEOUT_SECS,
        }
    }
}

impl Default for MonitoringSection {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics_interval: default_metrics_interval(),
            alert_channels: vec![],
        }
    }
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            ignore: default_watch_ignore(),
        }
    }
}

impl AgentSettings {
    /// An enabled, required agent carrying the given settings object.
    pub fn enabled_with(settings: Value) -> Self {
        let settings = match settings {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            enabled: true,
            required: true,
            settings,
        }
    }

    pub fn setting_bool(&self, key: &str) -> Option<bool> {
        self.settings.get(key).and_then(Value::as_bool)
    }

    pub fn setting_str(&self, key: &str) -> Option<&str> {
        self.settings.get(key).and_then(Value::as_str)
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut agents = BTreeMap::new();
        agents.insert(
            "contract_generator".to_string(),
            AgentSettings::enabled_with(json!({
                "provider": "template",
                "auto_save": true,
                "validate_after_generate": true,
            })),
        );
        agents.insert(
            "security_auditor".to_string(),
            AgentSettings::enabled_with(json!({
                "tools": ["slither", "mythril"],
                "auto_fix": false,
            })),
        );
        agents.insert(
            "test_generator".to_string(),
            AgentSettings::enabled_with(json!({
                "framework": "hardhat",
                "coverage_target": 80,
            })),
        );
        agents.insert(
            "deployment_manager".to_string(),
            AgentSettings::enabled_with(json!({
                "networks": ["hardhat", "sepolia"],
                "auto_verify": true,
            })),
        );

        Self {
            pipeline: PipelineSection::default(),
            agents,
            validation: ValidationSection::default(),
            monitoring: MonitoringSection::default(),
            watch: WatchSection::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

impl PipelineConfig {
    /// Whether a failing `gate` fails the phase that ran it.
    ///
    /// Gates listed under `validation.gates` use their own flag; unlisted
    /// gates are required only in strict mode.
    pub fn gate_required(&self, gate: Gate) -> bool {
        self.validation
            .gates
            .iter()
            .find(|g| g.name == gate)
            .map(|g| g.required)
            .unwrap_or(self.validation.strict_mode)
    }

    /// Whether a failing agent fails the phase that dispatched it.
    /// Agents missing from the configuration count as required.
    pub fn agent_required(&self, agent: &str) -> bool {
        self.agents.get(agent).map(|a| a.required).unwrap_or(true)
    }

    pub fn gate_timeout(&self) -> Duration {
        Duration::from_secs(self.validation.timeout_secs)
    }

    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.watch.debounce_ms)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_concurrent_agents == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.max_concurrent_agents must be at least 1".to_string(),
            ));
        }
        if self.validation.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "validation.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

/// `<root>/config/pipeline_config.json`: pure, no I/O.
pub fn config_path_at(root: &Path) -> PathBuf {
    root.join(CONFIG_DIR).join(CONFIG_FILE)
}

/// Load and validate the configuration under `root`.
pub fn load_at(root: &Path) -> Result<PipelineConfig, ConfigError> {
    let path = config_path_at(root);
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let config: PipelineConfig =
        serde_json::from_str(&contents).map_err(|e| ConfigError::Parse { path, source: e })?;
    config.validate()?;
    Ok(config)
}

/// Atomically save `config` under `root`: `.json.tmp` sibling → `rename`.
pub fn save_at(root: &Path, config: &PipelineConfig) -> Result<(), ConfigError> {
    let path = config_path_at(root);
    let dir = root.join(CONFIG_DIR);
    std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;

    let json = serde_json::to_string_pretty(config)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
    if let Err(e) = std::fs::rename(&tmp, &path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(&path, e));
    }
    Ok(())
}

/// Load the configuration, or synthesize and persist the default when absent.
///
/// Returns the configuration and whether it was freshly created.
pub fn load_or_init_at(root: &Path) -> Result<(PipelineConfig, bool), ConfigError> {
    if config_path_at(root).exists() {
        return Ok((load_at(root)?, false));
    }
    let config = PipelineConfig::default();
    save_at(root, &config)?;
    Ok((config, true))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_gate_requirements_follow_document() {
        let config = PipelineConfig::default();
        assert!(config.gate_required(Gate::Requirements));
        assert!(config.gate_required(Gate::Security));
        assert!(!config.gate_required(Gate::CodeQuality));
        assert!(!config.gate_required(Gate::Performance));
        // Compliance is not listed: strict mode makes it required.
        assert!(config.gate_required(Gate::Compliance));
    }

    #[test]
    fn unlisted_gate_is_advisory_without_strict_mode() {
        let mut config = PipelineConfig::default();
        config.validation.strict_mode = false;
        assert!(!config.gate_required(Gate::Compliance));
    }

    #[test]
    fn load_or_init_writes_default_once() {
        let root = TempDir::new().expect("tempdir");
        let (config, created) = load_or_init_at(root.path()).expect("init");
        assert!(created);
        assert!(config_path_at(root.path()).exists());
        assert_eq!(config, PipelineConfig::default());

        let (again, created) = load_or_init_at(root.path()).expect("reload");
        assert!(!created);
        assert_eq!(again, config);
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut config = PipelineConfig::default();
        config.pipeline.max_concurrent_agents = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn agent_settings_keep_free_form_keys() {
        let config = PipelineConfig::default();
        let generator = &config.agents["contract_generator"];
        assert_eq!(generator.setting_bool("auto_save"), Some(true));
        assert_eq!(generator.setting_str("provider"), Some("template"));

        let json = serde_json::to_value(&config).expect("serialize");
        assert_eq!(json["agents"]["test_generator"]["coverage_target"], 80);
        assert_eq!(json["agents"]["test_generator"]["enabled"], true);
    }
}
