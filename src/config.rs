//! Top-level JSON configuration. Every field falls back to its
//! default, so a config file only needs the options it changes.

use crate::functionals::FunctionalsConfig;
use crate::pipeline::PipelineConfig;
use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    pub pipeline: PipelineConfig,
    pub functionals: FunctionalsConfig,
}

impl CadenceConfig {
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_is_default_config() {
        let config: CadenceConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.pipeline.frame_size, 0.025);
        assert_eq!(config.pipeline.frame_step, 0.010);
    }

    #[test]
    fn test_partial_override() {
        let config: CadenceConfig = serde_json::from_str(
            r#"{
                "pipeline": { "frame_step": 0.02, "pitch": { "n_candidates": 4 } },
                "functionals": { "moments": { "enabled": true } }
            }"#,
        )
        .unwrap();
        assert_eq!(config.pipeline.frame_step, 0.02);
        assert_eq!(config.pipeline.pitch.n_candidates, 4);
        assert!(config.functionals.moments.enabled);
        // untouched fields keep their defaults
        assert_eq!(config.pipeline.frame_size, 0.025);
        assert!(!config.functionals.means.enabled);
    }

    #[test]
    fn test_roundtrip_through_json() {
        let config = CadenceConfig::default();
        let text = serde_json::to_string(&config).unwrap();
        let back: CadenceConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.pipeline.pitch.n_candidates, config.pipeline.pitch.n_candidates);
    }
}
