use async_trait::async_trait;

use super::{AdapterConfig, AdapterError, AdapterResult, AgentAdapter, run_cli, write_mcp_config};

/// Adapter for the Claude Code CLI (`claude`). Runs in `--print` mode with a
/// temporary MCP config pointing at the tool-bridge; only the bridge tools
/// are allowed so the agent talks to the platform exclusively through it.
pub struct ClaudeCodeAdapter;

#[async_trait]
impl AgentAdapter for ClaudeCodeAdapter {
    fn name(&self) -> &'static str {
        "claude_code"
    }

    fn validate_environment(&self) -> (bool, String) {
        match which::which("claude") {
            Ok(_) => (true, "Claude Code CLI found".to_string()),
            Err(_) => (
                false,
                "Claude Code CLI not found on PATH. Install with: npm install -g @anthropic-ai/claude-code"
                    .to_string(),
            ),
        }
    }

    async fn run(
        &self,
        prompt: &str,
        config: &AdapterConfig,
    ) -> Result<AdapterResult, AdapterError> {
        let (_guard, config_path) = write_mcp_config(config)?;

        let args = vec![
            "--print".to_string(),
            "--mcp-config".to_string(),
            config_path.display().to_string(),
            "--allowedTools".to_string(),
            "mcp__openclaw__*".to_string(),
            "--max-turns".to_string(),
            "100".to_string(),
            prompt.to_string(),
        ];

        run_cli("claude", args, config).await
    }
}
