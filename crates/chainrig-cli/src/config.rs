//! `chainrig.toml`: the run configuration plus per-role launch specs.
//!
//! ```toml
//! log_dir = "/tmp/chainrig"
//!
//! [network]
//! beacon_nodes = 2
//!
//! [components.beacon-node]
//! binary = "/usr/local/bin/beacon-chain"
//! args = ["--datadir={log_dir}/{name}", "--http-port=350{index}"]
//! readiness = { kind = "http", url = "http://127.0.0.1:350{index}/eth/v1/node/health" }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chainrig_core::RunConfig;
use chainrig_proc::ProcessSpec;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CliConfig {
    #[serde(flatten)]
    pub run: RunConfig,
    /// Launch specs keyed by role name (`bootnode`, `beacon-node`, ...).
    #[serde(default)]
    pub components: BTreeMap<String, ProcessSpec>,
}

impl CliConfig {
    pub fn parse(raw: &str) -> Result<Self> {
        let config: CliConfig = toml::from_str(raw).context("invalid chainrig config")?;
        config.run.validate()?;
        Ok(config)
    }

    /// Load `path`, or the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("in {}", path.display()))
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub epochs: Option<u64>,
    pub seed: Option<u64>,
    pub validators: Option<u64>,
    pub beacon_nodes: Option<usize>,
    pub slot_millis: Option<u64>,
    pub log_dir: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(&self, run: &mut RunConfig) -> Result<()> {
        if let Some(epochs) = self.epochs {
            run.evaluation.epochs = epochs;
        }
        if let Some(seed) = self.seed {
            run.evaluation.seed = seed;
        }
        if let Some(validators) = self.validators {
            run.network.validators = validators;
        }
        if let Some(beacon_nodes) = self.beacon_nodes {
            run.network.beacon_nodes = beacon_nodes;
        }
        if let Some(ms) = self.slot_millis {
            run.chain = run.chain.clone().with_slot_duration(Duration::from_millis(ms));
        }
        if let Some(dir) = &self.log_dir {
            run.log_dir = dir.clone();
        }
        run.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainrig_core::ComponentRole;
    use chainrig_proc::ReadinessProbe;

    #[test]
    fn test_components_sit_beside_run_tables() {
        let config = CliConfig::parse(
            r#"
            log_dir = "/tmp/chainrig"

            [network]
            beacon_nodes = 3

            [evaluation]
            epochs = 6

            [components.bootnode]
            binary = "/usr/local/bin/bootnode"

            [components.beacon-node]
            binary = "/usr/local/bin/beacon-chain"
            args = ["--http-port=350{index}"]
            readiness = { kind = "http", url = "http://127.0.0.1:350{index}/eth/v1/node/health" }
            "#,
        )
        .unwrap();

        assert_eq!(config.run.network.beacon_nodes, 3);
        assert_eq!(config.run.evaluation.epochs, 6);
        assert_eq!(config.run.log_dir, PathBuf::from("/tmp/chainrig"));
        assert_eq!(config.components.len(), 2);
        assert!(matches!(
            config.components["beacon-node"].readiness,
            ReadinessProbe::Http { .. }
        ));
        assert!("beacon-node".parse::<ComponentRole>().is_ok());
    }

    #[test]
    fn test_invalid_run_section_is_rejected() {
        let err = CliConfig::parse("[network]\nbeacon_nodes = 0\n").unwrap_err();
        assert!(format!("{err:#}").contains("beacon_nodes"));
    }

    #[test]
    fn test_load_without_path_gives_defaults() {
        let config = CliConfig::load(None).unwrap();
        assert_eq!(config.run, RunConfig::default());
        assert!(config.components.is_empty());
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chainrig.toml");
        std::fs::write(&path, "[evaluation]\nseed = 9\n").unwrap();
        let config = CliConfig::load(Some(&path)).unwrap();
        assert_eq!(config.run.evaluation.seed, 9);

        let missing = CliConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(missing.to_string().contains("failed to read config"));
    }

    #[test]
    fn test_overrides_win_and_are_validated() {
        let mut run = RunConfig::default();
        Overrides {
            epochs: Some(4),
            seed: Some(7),
            slot_millis: Some(200),
            ..Overrides::default()
        }
        .apply(&mut run)
        .unwrap();
        assert_eq!(run.evaluation.epochs, 4);
        assert_eq!(run.evaluation.seed, 7);
        assert_eq!(run.chain.slot_duration(), Duration::from_millis(200));

        let bad = Overrides {
            validators: Some(0),
            ..Overrides::default()
        };
        assert!(bad.apply(&mut run).is_err());
    }
}
