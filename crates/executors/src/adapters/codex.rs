use async_trait::async_trait;

use super::{AdapterConfig, AdapterError, AdapterResult, AgentAdapter, run_cli, write_mcp_config};

/// Adapter for the OpenAI Codex CLI. Same shape as Claude Code: temp MCP
/// config, non-interactive full-auto mode, shared subprocess contract.
pub struct CodexAdapter;

#[async_trait]
impl AgentAdapter for CodexAdapter {
    fn name(&self) -> &'static str {
        "codex"
    }

    fn validate_environment(&self) -> (bool, String) {
        match which::which("codex") {
            Ok(_) => (true, "Codex CLI found".to_string()),
            Err(_) => (
                false,
                "Codex CLI not found on PATH. Install with: npm install -g @openai/codex"
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
            "--full-auto".to_string(),
            "--mcp-config".to_string(),
            config_path.display().to_string(),
            prompt.to_string(),
        ];

        run_cli("codex", args, config).await
    }
}
