use std::env;

/// Process configuration, read once from the `OPENCLAW_*` environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub default_adapter: String,
    pub default_agent_model: String,
    pub agent_timeout_seconds: u64,
    pub max_concurrent_agents: usize,
    /// Explicit path to the tool-bridge entry point. When unset the runner
    /// probes the conventional monorepo locations.
    pub mcp_server_path: Option<String>,
    pub cors_origins: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://openclaw.sqlite".to_string(),
            host: "0.0.0.0".to_string(),
            port: 8000,
            default_adapter: "claude_code".to_string(),
            default_agent_model: "claude-sonnet-4-20250514".to_string(),
            agent_timeout_seconds: 1800,
            max_concurrent_agents: 32,
            mcp_server_path: None,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            database_url: var("OPENCLAW_DATABASE_URL").unwrap_or(defaults.database_url),
            host: var("OPENCLAW_HOST").unwrap_or(defaults.host),
            port: parsed("OPENCLAW_PORT").unwrap_or(defaults.port),
            default_adapter: var("OPENCLAW_DEFAULT_ADAPTER").unwrap_or(defaults.default_adapter),
            default_agent_model: var("OPENCLAW_DEFAULT_MODEL")
                .unwrap_or(defaults.default_agent_model),
            agent_timeout_seconds: parsed("OPENCLAW_AGENT_TIMEOUT_SECONDS")
                .unwrap_or(defaults.agent_timeout_seconds),
            max_concurrent_agents: parsed("OPENCLAW_MAX_CONCURRENT_AGENTS")
                .unwrap_or(defaults.max_concurrent_agents),
            mcp_server_path: var("OPENCLAW_MCP_SERVER_PATH"),
            cors_origins: var("OPENCLAW_CORS_ORIGINS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
                .unwrap_or(defaults.cors_origins),
        }
    }

    pub fn api_url(&self) -> String {
        format!("http://localhost:{}", self.port)
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    var(key).and_then(|v| v.parse().ok())
}
