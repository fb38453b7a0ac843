use super::{EngineStream, ExecutionEngine};
use crate::config::EngineConfig;
use async_trait::async_trait;
use shipyard_core::{ShipyardError, ShipyardResult};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

/// Claude Code CLI engine.
///
/// Runs the `claude` CLI in headless mode (`-p`). Non-streaming calls use
/// `--output-format json`; streaming calls use plain text and forward stdout
/// line by line. Child processes are killed when the call is dropped, so a
/// timed-out or cancelled call never leaks a process.
pub struct ClaudeCodeEngine {
    config: EngineConfig,
}

impl ClaudeCodeEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn command(&self, prompt: &str, output_format: &str) -> Command {
        let mut cmd = Command::new(&self.config.binary);
        cmd.arg("-p").arg(prompt);
        cmd.arg("--output-format").arg(output_format);
        cmd.arg("--max-turns").arg(self.config.max_turns.to_string());

        if let Some(model) = self.config.model_arg() {
            cmd.arg("--model").arg(model);
        }
        if let Some(mode) = &self.config.permission_mode {
            cmd.arg("--permission-mode").arg(mode);
        }
        cmd.args(&self.config.extra_args);

        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        cmd
    }

    fn spawn_error(&self, e: std::io::Error) -> ShipyardError {
        ShipyardError::Engine(format!(
            "Failed to run '{}'. Is Claude Code installed? Error: {e}",
            self.config.binary
        ))
    }
}

/// Extract the answer from `--output-format json` stdout.
///
/// A run that stopped on its turn budget is returned as text that says so
/// rather than as an error: the call itself succeeded and the caller decides
/// what an exhausted run means.
pub(crate) fn parse_json_result(stdout: &str) -> ShipyardResult<String> {
    let result_json: serde_json::Value = stdout
        .lines()
        .rev()
        .find_map(|line| serde_json::from_str(line).ok())
        .ok_or_else(|| {
            ShipyardError::Engine(format!(
                "Could not parse Claude Code output as JSON. stdout: {}",
                stdout.chars().take(500).collect::<String>()
            ))
        })?;

    if result_json["subtype"].as_str() == Some("error_max_turns") {
        let turns = result_json["num_turns"].as_u64().unwrap_or(0);
        return Ok(format!("Error: Reached max turns ({turns})"));
    }

    let result_text = result_json["result"]
        .as_str()
        .unwrap_or_default()
        .to_string();

    if result_json["is_error"].as_bool().unwrap_or(false) {
        return Err(ShipyardError::Engine(format!(
            "Claude Code error: {result_text}"
        )));
    }

    if let Some(cost) = result_json["total_cost_usd"].as_f64() {
        tracing::debug!(
            cost_usd = cost,
            input_tokens = result_json["usage"]["input_tokens"].as_u64().unwrap_or(0),
            output_tokens = result_json["usage"]["output_tokens"].as_u64().unwrap_or(0),
            num_turns = result_json["num_turns"].as_u64().unwrap_or(0),
            "ClaudeCode: response received"
        );
    }

    Ok(result_text)
}

#[async_trait]
impl ExecutionEngine for ClaudeCodeEngine {
    async fn execute(&self, prompt: &str, timeout: Duration) -> ShipyardResult<String> {
        let mut cmd = self.command(prompt, "json");

        tracing::debug!(prompt_len = prompt.len(), "ClaudeCode: spawning claude CLI");

        let output = match tokio::time::timeout(timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| self.spawn_error(e))?,
            Err(_) => {
                tracing::warn!(timeout_secs = timeout.as_secs(), "ClaudeCode: call timed out");
                return Err(ShipyardError::Timeout(timeout));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if !output.status.success() {
            // The CLI exits non-zero on max turns but still prints its JSON.
            if let Ok(text) = parse_json_result(&stdout) {
                return Ok(text);
            }
            return Err(ShipyardError::Engine(format!(
                "Claude Code CLI failed (exit {}): {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        parse_json_result(&stdout)
    }

    async fn execute_stream(&self, prompt: &str, timeout: Duration) -> ShipyardResult<EngineStream> {
        let mut cmd = self.command(prompt, "text");
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        tracing::debug!(prompt_len = prompt.len(), "ClaudeCode: spawning streaming claude CLI");

        let mut child = cmd.spawn().map_err(|e| self.spawn_error(e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ShipyardError::Engine("claude CLI stdout unavailable".into()))?;
        let stderr = child.stderr.take();

        let (tx, rx) = mpsc::channel::<String>(256);
        let handle = tokio::spawn(async move {
            let stderr_task = tokio::spawn(async move {
                let mut text = String::new();
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_string(&mut text).await;
                }
                text
            });

            let run = async {
                let mut lines = BufReader::new(stdout).lines();
                let mut collected = Vec::new();
                while let Some(line) = lines.next_line().await? {
                    // A dropped receiver only stops forwarding, not collection.
                    let _ = tx.send(line.clone()).await;
                    collected.push(line);
                }
                let status = child.wait().await?;
                Ok::<_, ShipyardError>((status, collected.join("\n")))
            };

            let (status, output) = match tokio::time::timeout(timeout, run).await {
                Ok(result) => result?,
                Err(_) => {
                    stderr_task.abort();
                    return Err(ShipyardError::Timeout(timeout));
                }
            };

            if !status.success() {
                let stderr = stderr_task.await.unwrap_or_default();
                return Err(ShipyardError::Engine(format!(
                    "Claude Code CLI failed (exit {}): {}",
                    status.code().unwrap_or(-1),
                    stderr.trim()
                )));
            }
            Ok(output)
        });

        Ok((rx, handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_result() {
        let stdout = r#"{"type":"result","subtype":"success","is_error":false,"result":"done","num_turns":3}"#;
        assert_eq!(parse_json_result(stdout).unwrap(), "done");
    }

    #[test]
    fn test_parse_uses_last_json_line() {
        let stdout = "warming up\n{\"result\":\"first\"}\n{\"result\":\"second\"}\n";
        assert_eq!(parse_json_result(stdout).unwrap(), "second");
    }

    #[test]
    fn test_parse_max_turns_is_reported_as_text() {
        let stdout = r#"{"type":"result","subtype":"error_max_turns","is_error":true,"num_turns":20}"#;
        let text = parse_json_result(stdout).unwrap();
        assert!(text.to_lowercase().contains("reached max turns"));
        assert!(text.contains("20"));
    }

    #[test]
    fn test_parse_is_error() {
        let stdout = r#"{"is_error":true,"result":"rate limited"}"#;
        let err = parse_json_result(stdout).unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_parse_garbage() {
        let err = parse_json_result("not json at all").unwrap_err();
        assert!(matches!(err, ShipyardError::Engine(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_engine_error() {
        let engine = ClaudeCodeEngine::new(EngineConfig {
            binary: "/nonexistent/shipyard-claude".into(),
            ..EngineConfig::default()
        });
        let err = engine
            .execute("hello", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ShipyardError::Engine(_)));
        assert!(err.to_string().contains("Is Claude Code installed"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stream_forwards_stdout_lines() {
        // `echo` prints its argv, which includes the prompt.
        let engine = ClaudeCodeEngine::new(EngineConfig {
            binary: "echo".into(),
            ..EngineConfig::default()
        });
        let (mut rx, handle) = engine
            .execute_stream("stream-me", Duration::from_secs(5))
            .await
            .unwrap();
        let mut seen = Vec::new();
        while let Some(line) = rx.recv().await {
            seen.push(line);
        }
        let output = handle.await.unwrap().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(output.contains("stream-me"));
        assert!(output.contains("--max-turns"));
    }
}
