use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 18789;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_PAYLOAD_BYTES: usize = 128 * 1024; // 128 KB hard cap per frame
pub const MAX_BUFFERED_BYTES: usize = 1024 * 1024; // 1 MB: slow consumer threshold
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000; // close if client doesn't auth in 10s
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30; // tick event cadence

pub const MAX_CONTEXT_TOKENS: usize = 8_000;
pub const DEFAULT_DAILY_TOKEN_BUDGET: u64 = 500_000;

/// Paths under `$HOME` that are always denied to file reads and always
/// shadowed (tmpfs'd) inside a sandbox, regardless of policy decision.
///
/// Grounded verbatim on `original_source/src/constants.py::SENSITIVE_PATHS`.
pub const SENSITIVE_PATHS: &[&str] = &[
    ".ssh",
    ".gnupg",
    ".aws",
    ".azure",
    ".gcloud",
    ".env",
    "credentials",
    ".gitconfig",
    "vault.age",
    "id_rsa",
    "id_ed25519",
    ".npmrc",
    ".pypirc",
];

/// Top-level config (aegis.toml + AEGIS_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AegisConfig {
    pub gateway: GatewayConfig,
    pub agent: AgentConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub sandbox: SandboxSettingsConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Default for AegisConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            gateway: GatewayConfig {
                port: DEFAULT_PORT,
                bind: DEFAULT_BIND.to_string(),
                session_timeout_secs: 3600,
            },
            agent: AgentConfig {
                model: "claude-sonnet-4-6".to_string(),
                max_iterations: 8,
                daily_budget_usd: default_daily_budget_usd(),
            },
            vault: VaultConfig::default(),
            policy: PolicyConfig::default(),
            sandbox: SandboxSettingsConfig::default(),
            providers: ProvidersConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Idle timeout for an authenticated session, in seconds.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Maximum tool-call round-trips per turn before the brain force-stops.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Process-wide spend cap per UTC day, summed across every conversation
    /// and provider. A turn that would start beyond the cap is refused
    /// before the first LLM call goes out.
    #[serde(default = "default_daily_budget_usd")]
    pub daily_budget_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default = "default_vault_path")]
    pub path: String,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            path: default_vault_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub autonomy_level: u8,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { autonomy_level: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSettingsConfig {
    #[serde(default = "default_sandbox_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_sandbox_memory_mb")]
    pub max_memory_mb: u64,
    #[serde(default)]
    pub allow_network: bool,
}

impl Default for SandboxSettingsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_sandbox_timeout(),
            max_memory_mb: default_sandbox_memory_mb(),
            allow_network: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProvidersConfig {
    pub anthropic: Option<AnthropicConfig>,
    pub openai: Option<OpenAiProviderConfig>,
    pub ollama: Option<OllamaConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    pub api_key: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnthropicConfig {
    pub api_key: String,
    #[serde(default = "default_anthropic_base_url")]
    pub base_url: String,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_session_timeout() -> u64 {
    3600
}
fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}
fn default_max_iterations() -> u32 {
    8
}
fn default_daily_budget_usd() -> f64 {
    10.0
}
fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_sandbox_timeout() -> u64 {
    30
}
fn default_sandbox_memory_mb() -> u64 {
    512
}
fn default_db_path() -> String {
    format!("{}/aegis.db", data_dir())
}
fn default_vault_path() -> String {
    format!("{}/vault.age", data_dir())
}

fn data_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.aegis", home)
}

impl AegisConfig {
    /// Load config from a TOML file with AEGIS_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.aegis/aegis.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: AegisConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("AEGIS_").split("_"))
            .extract()
            .map_err(|e| crate::error::AegisError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    format!("{}/aegis.toml", data_dir())
}
