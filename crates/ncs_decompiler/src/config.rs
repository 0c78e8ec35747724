use std::path::Path;

use anyhow::{Context, Result};
use log::LevelFilter;
use serde::{Deserialize, Serialize};

/// Knobs of the prototype inference run.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct InferenceConfig {
    /// Report every subroutine that needed the heuristic fallback.
    pub strict: bool,
    /// Upper bound on structural passes per call-graph component.
    pub max_scc_passes: usize,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            strict: false,
            max_scc_passes: 3,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LoggerConfig {
    pub level_filter: LevelFilter,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level_filter: LevelFilter::Info,
        }
    }
}

/// Contents of the `--config` YAML file.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ToolConfig {
    pub logger: LoggerConfig,
    pub inference: InferenceConfig,
}

impl ToolConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        serde_yaml::from_str(s).context("parsing tool configuration")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration: {}", path.display()))?;
        Self::from_yaml_str(&s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg = ToolConfig::from_yaml_str("inference:\n  strict: true\n").unwrap();
        assert!(cfg.inference.strict);
        assert_eq!(cfg.inference.max_scc_passes, 3);
        assert_eq!(cfg.logger.level_filter, LevelFilter::Info);
    }

    #[test]
    fn level_filter_parses() {
        let cfg = ToolConfig::from_yaml_str("logger:\n  level_filter: DEBUG\n").unwrap();
        assert_eq!(cfg.logger.level_filter, LevelFilter::Debug);
    }
}
