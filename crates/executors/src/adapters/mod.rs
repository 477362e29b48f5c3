mod aider;
mod claude_code;
mod codex;

use std::{collections::HashMap, path::PathBuf, time::Duration};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use openclaw_utils::process::{CommandSpec, run_command};

use crate::prompt::{self, PromptInput};

pub use aider::AiderAdapter;
pub use claude_code::ClaudeCodeAdapter;
pub use codex::CodexAdapter;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("unknown adapter '{name}'; available: {available}")]
    UnknownAdapter { name: String, available: String },
    #[error("adapter '{name}' not available: {reason}")]
    Unavailable { name: String, reason: String },
    #[error("failed to prepare adapter environment: {0}")]
    Io(#[from] std::io::Error),
}

/// Everything an adapter needs to spawn a coding agent in the right context.
/// Credentials and callback URLs travel in `env_overrides`, never in the
/// prompt text.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Argv of the tool-bridge helper the CLI connects to over stdio.
    pub mcp_server_command: Vec<String>,
    /// Base URL the tool-bridge calls back into.
    pub api_url: String,
    /// Worktree (or repository) root the CLI runs in.
    pub working_directory: PathBuf,
    pub agent_id: Uuid,
    pub team_id: Uuid,
    pub task_id: Option<i64>,
    pub timeout_seconds: u64,
    pub env_overrides: HashMap<String, String>,
}

/// Structured outcome of one coding-agent run, identical across adapters.
#[derive(Debug, Clone, Serialize)]
pub struct AdapterResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_seconds: f64,
    pub error: Option<String>,
}

impl AdapterResult {
    pub fn ok(&self) -> bool {
        self.exit_code == 0 && self.error.is_none()
    }

    pub fn timed_out(&self) -> bool {
        self.error
            .as_deref()
            .is_some_and(|e| e.contains("timed out"))
    }
}

/// Pluggable coding-agent backend. Implementations supply the argv and any
/// CLI-specific configuration files; subprocess lifetime, timeout handling
/// and prompt templating are shared.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Adapter identifier, e.g. `claude_code`.
    fn name(&self) -> &'static str;

    /// Check the CLI is installed. Returns `(ok, message)`.
    fn validate_environment(&self) -> (bool, String);

    fn build_prompt(&self, input: &PromptInput) -> String {
        prompt::render(input)
    }

    async fn run(&self, prompt: &str, config: &AdapterConfig) -> Result<AdapterResult, AdapterError>;
}

/// Run the CLI through the shared subprocess contract: merged env, piped
/// output, kill-and-reap on timeout, lossy UTF-8 decode, wall-clock duration.
pub(crate) async fn run_cli(
    program: &str,
    args: Vec<String>,
    config: &AdapterConfig,
) -> Result<AdapterResult, AdapterError> {
    let output = run_command(
        CommandSpec::new(program)
            .args(args)
            .cwd(&config.working_directory)
            .envs(&config.env_overrides)
            .timeout(Duration::from_secs(config.timeout_seconds)),
    )
    .await?;

    let error = if output.timed_out {
        Some(format!("timed out after {}s", config.timeout_seconds))
    } else if output.exit_code != 0 {
        Some(format!("process exited with code {}", output.exit_code))
    } else {
        None
    };

    Ok(AdapterResult {
        exit_code: output.exit_code,
        stdout: output.stdout,
        stderr: output.stderr,
        duration_seconds: output.duration.as_secs_f64(),
        error,
    })
}

/// Write the MCP server configuration the CLIs read, pointing them at the
/// tool-bridge with the callback URL in its environment.
pub(crate) fn write_mcp_config(
    config: &AdapterConfig,
) -> Result<(tempfile::TempDir, PathBuf), AdapterError> {
    let (command, args) = config
        .mcp_server_command
        .split_first()
        .map(|(c, rest)| (c.clone(), rest.to_vec()))
        .unwrap_or_default();

    let mcp_config = serde_json::json!({
        "mcpServers": {
            "openclaw": {
                "command": command,
                "args": args,
                "env": {
                    "OPENCLAW_API_URL": config.api_url,
                }
            }
        }
    });

    let dir = tempfile::Builder::new().prefix("openclaw-mcp-").tempdir()?;
    let path = dir.path().join("mcp-config.json");
    let body = serde_json::to_vec_pretty(&mcp_config).map_err(std::io::Error::from)?;
    std::fs::write(&path, body)?;
    Ok((dir, path))
}

const ADAPTER_NAMES: &[&str] = &["aider", "claude_code", "codex"];

/// Look an adapter up by name.
pub fn get_adapter(name: &str) -> Result<Box<dyn AgentAdapter>, AdapterError> {
    match name {
        "claude_code" => Ok(Box::new(ClaudeCodeAdapter)),
        "codex" => Ok(Box::new(CodexAdapter)),
        "aider" => Ok(Box::new(AiderAdapter)),
        other => Err(AdapterError::UnknownAdapter {
            name: other.to_string(),
            available: ADAPTER_NAMES.join(", "),
        }),
    }
}

pub fn list_adapters() -> Vec<&'static str> {
    ADAPTER_NAMES.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> AdapterConfig {
        AdapterConfig {
            mcp_server_command: vec!["node".into(), "/opt/bridge/index.js".into()],
            api_url: "http://localhost:8000".into(),
            working_directory: std::env::temp_dir(),
            agent_id: Uuid::new_v4(),
            team_id: Uuid::new_v4(),
            task_id: Some(7),
            timeout_seconds: 5,
            env_overrides: HashMap::new(),
        }
    }

    #[test]
    fn registry_knows_every_adapter() {
        for name in list_adapters() {
            let adapter = get_adapter(name).expect("registered adapter");
            assert_eq!(adapter.name(), name);
        }
        assert!(matches!(
            get_adapter("emacs"),
            Err(AdapterError::UnknownAdapter { .. })
        ));
    }

    #[test]
    fn mcp_config_points_at_the_bridge() {
        let (dir, path) = write_mcp_config(&test_config()).expect("write config");
        let raw = std::fs::read_to_string(&path).expect("read back");
        let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
        assert_eq!(parsed["mcpServers"]["openclaw"]["command"], "node");
        assert_eq!(
            parsed["mcpServers"]["openclaw"]["env"]["OPENCLAW_API_URL"],
            "http://localhost:8000"
        );
        drop(dir);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn run_cli_classifies_timeout() {
        let mut config = test_config();
        config.timeout_seconds = 1;
        let result = run_cli("sleep", vec!["30".into()], &config)
            .await
            .expect("spawn ok");
        assert_eq!(result.exit_code, -1);
        assert!(result.timed_out());
        assert!(!result.ok());
    }

    #[tokio::test]
    async fn run_cli_reports_nonzero_exit() {
        let config = test_config();
        let result = run_cli("sh", vec!["-c".into(), "exit 9".into()], &config)
            .await
            .expect("spawn ok");
        assert_eq!(result.exit_code, 9);
        assert_eq!(
            result.error.as_deref(),
            Some("process exited with code 9")
        );
    }
}
