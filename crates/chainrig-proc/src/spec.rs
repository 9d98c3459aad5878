//! How to launch one component process.
//!
//! Strings in `args`, `extra_flags`, `env` values and probe fields may use
//! placeholders, expanded per instance:
//!
//! - `{name}`: instance name (`beacon-node-1`)
//! - `{index}`: set member index, `0` for single components
//! - `{log_dir}`: the run's log directory

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// When a spawned process counts as started.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadinessProbe {
    /// Started as soon as the process is running.
    #[default]
    Immediate,
    /// Started once the log file contains `pattern`.
    LogLine { pattern: String },
    /// Started once `url` answers with a success status.
    Http { url: String },
}

/// Launch description for one component role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSpec {
    pub binary: PathBuf,
    pub args: Vec<String>,
    /// Appended after `args`; per-run tweaks without repeating the base args.
    pub extra_flags: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub readiness: ReadinessProbe,
}

/// Values substituted into a spec for one instance.
#[derive(Debug, Clone)]
pub struct Placeholders<'a> {
    pub name: &'a str,
    pub index: usize,
    pub log_dir: &'a Path,
}

impl Placeholders<'_> {
    pub fn expand(&self, raw: &str) -> String {
        raw.replace("{name}", self.name)
            .replace("{index}", &self.index.to_string())
            .replace("{log_dir}", &self.log_dir.display().to_string())
    }
}

impl ProcessSpec {
    /// A copy with every placeholder expanded.
    pub fn resolve(&self, vars: &Placeholders<'_>) -> ProcessSpec {
        let expand_all = |v: &[String]| v.iter().map(|s| vars.expand(s)).collect::<Vec<_>>();
        ProcessSpec {
            binary: self.binary.clone(),
            args: expand_all(&self.args),
            extra_flags: expand_all(&self.extra_flags),
            env: self
                .env
                .iter()
                .map(|(k, v)| (k.clone(), vars.expand(v)))
                .collect(),
            working_dir: self.working_dir.clone(),
            readiness: match &self.readiness {
                ReadinessProbe::Immediate => ReadinessProbe::Immediate,
                ReadinessProbe::LogLine { pattern } => ReadinessProbe::LogLine {
                    pattern: vars.expand(pattern),
                },
                ReadinessProbe::Http { url } => ReadinessProbe::Http {
                    url: vars.expand(url),
                },
            },
        }
    }

    /// Full argument list: `args` then `extra_flags`.
    pub fn argv(&self) -> impl Iterator<Item = &String> {
        self.args.iter().chain(self.extra_flags.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_expands_every_field() {
        let spec = ProcessSpec {
            binary: PathBuf::from("beacon"),
            args: vec!["--datadir={log_dir}/{name}".to_string()],
            extra_flags: vec!["--port=900{index}".to_string()],
            env: BTreeMap::from([("NODE".to_string(), "{name}".to_string())]),
            working_dir: None,
            readiness: ReadinessProbe::Http {
                url: "http://127.0.0.1:350{index}/eth/v1/node/health".to_string(),
            },
        };
        let resolved = spec.resolve(&Placeholders {
            name: "beacon-node-1",
            index: 1,
            log_dir: Path::new("/tmp/logs"),
        });

        assert_eq!(resolved.args, vec!["--datadir=/tmp/logs/beacon-node-1"]);
        assert_eq!(resolved.extra_flags, vec!["--port=9001"]);
        assert_eq!(resolved.env["NODE"], "beacon-node-1");
        assert_eq!(
            resolved.readiness,
            ReadinessProbe::Http {
                url: "http://127.0.0.1:3501/eth/v1/node/health".to_string()
            }
        );
        let argv: Vec<&String> = resolved.argv().collect();
        assert_eq!(argv.len(), 2);
    }

    #[test]
    fn test_probe_kinds_parse_from_toml() {
        let spec: ProcessSpec = toml::from_str(
            r#"
            binary = "/usr/local/bin/beacon"
            args = ["--network=devnet"]

            [readiness]
            kind = "log_line"
            pattern = "HTTP server started"
            "#,
        )
        .unwrap();
        assert_eq!(
            spec.readiness,
            ReadinessProbe::LogLine {
                pattern: "HTTP server started".to_string()
            }
        );
        assert!(spec.env.is_empty());

        let bare: ProcessSpec = toml::from_str(r#"binary = "bootnode""#).unwrap();
        assert_eq!(bare.readiness, ReadinessProbe::Immediate);
    }
}
