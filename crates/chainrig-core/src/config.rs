//! Run configuration loaded from TOML.
//!
//! ```toml
//! log_dir = "target/chainrig-logs"
//!
//! [network]
//! beacon_nodes = 2
//! validators = 64
//! builder = "proxy"
//! remote_signer = false
//!
//! [evaluation]
//! epochs = 10
//! seed = 7
//! evaluators = ["healthz", "inject_double_vote@5", "validators_slashed@7"]
//!
//! [timeouts]
//! gate_timeout_secs = 120
//! ```
//!
//! Every table and field is optional; missing values take their defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chainrig_api::{ChainSpec, Epoch};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::evaluation::evaluator::Evaluator;
use crate::evaluation::scheduler::SchedulerConfig;
use crate::evaluators::{self, DEFAULT_EVALUATORS};
use crate::orchestrator::OrchestratorConfig;
use crate::readiness::GateConfig;
use crate::topology::{BuilderSlot, TopologyConfig};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub beacon_nodes: usize,
    pub validators: u64,
    pub builder: BuilderSlot,
    pub remote_signer: bool,
    pub tracing_sink: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        let topology = TopologyConfig::default();
        Self {
            beacon_nodes: topology.beacon_nodes,
            validators: 64,
            builder: topology.builder,
            remote_signer: topology.remote_signer,
            tracing_sink: topology.tracing_sink,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Last epoch to evaluate (inclusive).
    pub epochs: Epoch,
    pub seed: u64,
    /// Evaluator names in dispatch order, e.g. `inject_double_vote@5`.
    pub evaluators: Vec<String>,
    pub parallel: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            epochs: SchedulerConfig::default().epochs,
            seed: 0,
            evaluators: DEFAULT_EVALUATORS.iter().map(|s| s.to_string()).collect(),
            parallel: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub gate_timeout_secs: u64,
    pub gate_poll_millis: u64,
    pub epoch_timeout_secs: u64,
    pub epoch_poll_millis: u64,
    pub request_deadline_millis: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            gate_timeout_secs: 120,
            gate_poll_millis: 500,
            epoch_timeout_secs: 600,
            epoch_poll_millis: 1_000,
            request_deadline_millis: 10_000,
        }
    }
}

impl TimeoutConfig {
    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_millis)
    }
}

/// Top-level run configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub network: NetworkConfig,
    pub evaluation: EvaluationConfig,
    pub timeouts: TimeoutConfig,
    pub chain: ChainSpec,
    /// Directory for per-component logs and run reports.
    pub log_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            evaluation: EvaluationConfig::default(),
            timeouts: TimeoutConfig::default(),
            chain: ChainSpec::default(),
            log_dir: PathBuf::from("chainrig-logs"),
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        let config: RunConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reject values no run can work with.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.network.beacon_nodes == 0 {
            return Err(ConfigError::Invalid(
                "network.beacon_nodes must be at least 1".to_string(),
            ));
        }
        if self.network.validators == 0 {
            return Err(ConfigError::Invalid(
                "network.validators must be at least 1".to_string(),
            ));
        }
        if self.chain.slots_per_epoch == 0 || self.chain.slot_duration_ms == 0 {
            return Err(ConfigError::Invalid(
                "chain.slots_per_epoch and chain.slot_duration_ms must be positive".to_string(),
            ));
        }
        if self.chain.min_slashing_penalty_quotient == 0 {
            return Err(ConfigError::Invalid(
                "chain.min_slashing_penalty_quotient must be positive".to_string(),
            ));
        }
        if self.timeouts.gate_poll_millis == 0 || self.timeouts.epoch_poll_millis == 0 {
            return Err(ConfigError::Invalid("poll intervals must be positive".to_string()));
        }
        self.evaluators().map(|_| ())
    }

    pub fn topology(&self) -> TopologyConfig {
        TopologyConfig {
            beacon_nodes: self.network.beacon_nodes,
            builder: self.network.builder,
            remote_signer: self.network.remote_signer,
            tracing_sink: self.network.tracing_sink,
        }
    }

    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            timeout: Duration::from_secs(self.timeouts.gate_timeout_secs),
            poll_interval: Duration::from_millis(self.timeouts.gate_poll_millis),
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            gate: self.gate_config(),
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            epochs: self.evaluation.epochs,
            parallel: self.evaluation.parallel,
            epoch_timeout: Duration::from_secs(self.timeouts.epoch_timeout_secs),
            poll_interval: Duration::from_millis(self.timeouts.epoch_poll_millis),
        }
    }

    /// Resolve the configured evaluator names through the registry.
    pub fn evaluators(&self) -> ConfigResult<Vec<Evaluator>> {
        evaluators::build_all(&self.evaluation.evaluators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = RunConfig::from_toml_str("").unwrap();
        assert_eq!(config, RunConfig::default());
        assert_eq!(config.evaluators().unwrap().len(), DEFAULT_EVALUATORS.len());
    }

    #[test]
    fn test_partial_tables_merge_with_defaults() {
        let config = RunConfig::from_toml_str(
            r#"
            log_dir = "/tmp/run"

            [network]
            beacon_nodes = 4
            builder = "proxy"

            [evaluation]
            epochs = 12
            seed = 99
            evaluators = ["healthz", "inject_double_vote@5", "validators_slashed@8"]

            [chain]
            slot_duration_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.network.beacon_nodes, 4);
        assert_eq!(config.network.validators, 64);
        assert_eq!(config.topology().builder, BuilderSlot::Proxy);
        assert_eq!(config.evaluation.seed, 99);
        assert_eq!(config.scheduler_config().epochs, 12);
        assert_eq!(config.chain.slot_duration_ms, 500);
        assert_eq!(config.chain.slots_per_epoch, 8);
        assert_eq!(config.evaluators().unwrap().len(), 3);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/run"));
    }

    #[test]
    fn test_unknown_evaluator_rejected_at_load() {
        let err = RunConfig::from_toml_str(
            r#"
            [evaluation]
            evaluators = ["healthz", "teleport"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEvaluator { ref name } if name == "teleport"));
    }

    #[test]
    fn test_zero_beacon_nodes_invalid() {
        let err = RunConfig::from_toml_str("[network]\nbeacon_nodes = 0\n").unwrap_err();
        assert!(err.to_string().contains("beacon_nodes"));
    }

    #[test]
    fn test_load_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = RunConfig::load(&missing).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));

        let present = dir.path().join("run.toml");
        std::fs::write(&present, "[timeouts]\ngate_timeout_secs = 0\n").unwrap();
        let config = RunConfig::load(&present).unwrap();
        assert_eq!(config.gate_config().timeout, Duration::ZERO);
    }
}
