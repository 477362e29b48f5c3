use async_trait::async_trait;

use super::{AdapterConfig, AdapterError, AdapterResult, AgentAdapter, run_cli};
use crate::prompt::PromptInput;

/// Adapter for the Aider CLI. Aider has no MCP support, so instead of a
/// bridge config the prompt carries REST instructions and the callback URL
/// travels in the environment for the shell commands the agent runs.
pub struct AiderAdapter;

#[async_trait]
impl AgentAdapter for AiderAdapter {
    fn name(&self) -> &'static str {
        "aider"
    }

    fn validate_environment(&self) -> (bool, String) {
        match which::which("aider") {
            Ok(_) => (true, "Aider CLI found".to_string()),
            Err(_) => (
                false,
                "Aider CLI not found on PATH. Install with: pip install aider-chat".to_string(),
            ),
        }
    }

    fn build_prompt(&self, input: &PromptInput) -> String {
        let mut prompt = crate::prompt::render(input);
        prompt.push_str(
            "\nNOTE: your MCP tools are unavailable in this environment. Call the\n\
             equivalent REST endpoints instead, e.g. to finish the task:\n\
             curl -s -X POST \"$OPENCLAW_API_URL/tasks/<task_id>/status\" \\\n\
               -H 'Content-Type: application/json' \\\n\
               -d '{\"status\": \"in_review\", \"actor_id\": \"<agent_id>\"}'\n",
        );
        prompt
    }

    async fn run(
        &self,
        prompt: &str,
        config: &AdapterConfig,
    ) -> Result<AdapterResult, AdapterError> {
        let args = vec![
            "--message".to_string(),
            prompt.to_string(),
            "--yes-always".to_string(),
            "--no-auto-commits".to_string(),
            "--no-git".to_string(),
        ];

        // The curl commands in the prompt resolve the backend through this.
        let mut config = config.clone();
        let api_url = config.api_url.clone();
        config
            .env_overrides
            .entry("OPENCLAW_API_URL".to_string())
            .or_insert(api_url);

        run_cli("aider", args, &config).await
    }
}
