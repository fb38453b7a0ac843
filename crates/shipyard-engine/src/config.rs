use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How to invoke the `claude` CLI for every engine call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Executable name or path.
    #[serde(default = "default_binary")]
    pub binary: String,
    /// Model alias passed with `--model`. Empty or `"default"` omits the flag.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Turn budget passed with `--max-turns`.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    /// Directory the CLI runs in. Defaults to the current directory.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// `--permission-mode` value, if any.
    #[serde(default)]
    pub permission_mode: Option<String>,
    /// Extra arguments appended verbatim.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_binary() -> String {
    "claude".to_string()
}

fn default_model_id() -> String {
    "sonnet".to_string()
}

fn default_max_turns() -> u32 {
    20
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            model_id: default_model_id(),
            max_turns: default_max_turns(),
            working_dir: None,
            permission_mode: None,
            extra_args: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// The `--model` argument, if one should be passed.
    pub fn model_arg(&self) -> Option<&str> {
        if self.model_id.is_empty() || self.model_id == "default" {
            None
        } else {
            Some(&self.model_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.binary, "claude");
        assert_eq!(config.model_id, "sonnet");
        assert_eq!(config.max_turns, 20);
        assert!(config.working_dir.is_none());
        assert!(config.extra_args.is_empty());
    }

    #[test]
    fn test_model_arg_skips_default() {
        let mut config = EngineConfig::default();
        assert_eq!(config.model_arg(), Some("sonnet"));
        config.model_id = "default".into();
        assert_eq!(config.model_arg(), None);
        config.model_id.clear();
        assert_eq!(config.model_arg(), None);
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config: EngineConfig = toml::from_str(
            r#"
            binary = "/opt/claude/bin/claude"
            max_turns = 50
            extra_args = ["--verbose"]
            "#,
        )
        .unwrap();
        assert_eq!(config.binary, "/opt/claude/bin/claude");
        assert_eq!(config.max_turns, 50);
        assert_eq!(config.extra_args, vec!["--verbose".to_string()]);
        assert_eq!(config.model_id, "sonnet");
    }
}
