use serde::Deserialize;
use shipyard_engine::EngineConfig;
use shipyard_orchestrator::OrchestratorConfig;
use std::path::Path;
use tracing::{info, warn};

/// Contents of `shipyard.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct ShipyardConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl ShipyardConfig {
    /// Read the config file. A missing file means defaults.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            }
        };
        let config: ShipyardConfig = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("Invalid config file '{}': {}", path.display(), e))?;
        info!(path = %path.display(), "config loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ShipyardConfig::load(&dir.path().join("shipyard.toml"))
            .await
            .unwrap();
        assert_eq!(config.orchestrator.num_workers, 4);
        assert_eq!(config.engine.binary, "claude");
    }

    #[tokio::test]
    async fn test_sections_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipyard.toml");
        std::fs::write(
            &path,
            r#"
[orchestrator]
num_workers = 2
max_refine_rounds = 3
review_completed = true

[engine]
model_id = "opus"
max_turns = 40
extra_args = ["--verbose"]
"#,
        )
        .unwrap();

        let config = ShipyardConfig::load(&path).await.unwrap();
        assert_eq!(config.orchestrator.num_workers, 2);
        assert_eq!(config.orchestrator.max_refine_rounds, 3);
        assert!(config.orchestrator.review_completed);
        assert_eq!(config.orchestrator.max_replan_rounds, 1);
        assert_eq!(config.engine.model_id, "opus");
        assert_eq!(config.engine.max_turns, 40);
        assert_eq!(config.engine.extra_args, vec!["--verbose"]);
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipyard.toml");
        std::fs::write(&path, "[orchestrator\nnum_workers = ").unwrap();
        assert!(ShipyardConfig::load(&path).await.is_err());
    }
}
