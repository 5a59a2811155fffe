use std::net::SocketAddr;
use std::sync::Arc;

use aegis_agent::prompt::PromptBuilder;
use aegis_agent::{AgentBrain, AgentRuntime};
use aegis_audit::AuditLog;
use aegis_core::config::AegisConfig;
use aegis_core::types::AutonomyLevel;
use aegis_memory::{db, MemoryManager};
use aegis_security::{CanarySystem, EgressFilter, PolicyEngine};
use aegis_skills::SkillRegistry;
use tracing::info;

mod app;
mod auth;
mod http;
mod middleware;
mod ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aegis_gateway=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("AEGIS_CONFIG").ok();
    let config = AegisConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({e}), using defaults");
        AegisConfig::default()
    });

    let bind: std::net::IpAddr = config.gateway.bind.parse()?;
    if bind.is_unspecified() && std::env::var("AEGIS_ALLOW_WILDCARD_BIND").is_err() {
        anyhow::bail!(
            "refusing to bind the wildcard address {bind} — this gateway is loopback-only by \
             design; set AEGIS_ALLOW_WILDCARD_BIND=1 to override"
        );
    }
    let addr = SocketAddr::new(bind, config.gateway.port);

    let conn = rusqlite::Connection::open(&config.database.path)?;
    db::init_db(&conn)?;
    let memory = Arc::new(MemoryManager::new(conn));

    let audit = Arc::new(AuditLog::new(
        std::path::Path::new(&config.database.path)
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."))
            .join("audit"),
    )?);

    let registry = Arc::new(SkillRegistry::new());

    let policy = Arc::new(PolicyEngine::new(AutonomyLevel(config.policy.autonomy_level)));
    let canary = Arc::new(CanarySystem::new());
    let egress = Arc::new(EgressFilter::new());
    let executor = Arc::new(aegis_agent::ToolExecutor::new(
        registry.clone(),
        policy,
        canary.clone(),
        egress,
        audit.clone(),
    ));

    let provider = build_provider(&config)?;
    let prompt = PromptBuilder::load(None, None);
    let runtime = Arc::new(AgentRuntime::new(provider, prompt, config.agent.model.clone()));

    let brain = Arc::new(AgentBrain::new(
        runtime,
        memory.clone(),
        executor,
        registry.clone(),
        canary,
        &config.agent,
        AutonomyLevel(config.policy.autonomy_level),
    ));

    let idle_timeout = config.gateway.session_timeout_secs;
    let state = Arc::new(app::AppState {
        config,
        brain,
        memory,
        audit,
        registry,
        auth: auth::AuthSessionStore::new(idle_timeout),
    });

    let router = app::build_router(state);

    info!("aegis gateway listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Resolve every configured provider into priority-ordered `ProviderRouter`
/// slots — Anthropic first, then OpenAI, then a local Ollama endpoint —
/// so a mid-conversation outage on the primary provider fails over instead
/// of ending the turn.
fn build_provider(config: &AegisConfig) -> anyhow::Result<Box<dyn aegis_agent::LlmProvider>> {
    let mut slots = Vec::new();

    if let Some(anthropic) = &config.providers.anthropic {
        slots.push(aegis_agent::ProviderSlot::new(
            Box::new(aegis_agent::anthropic::AnthropicProvider::new(
                anthropic.api_key.clone(),
                Some(anthropic.base_url.clone()),
            )),
            2,
        ));
    }
    if let Some(openai) = &config.providers.openai {
        slots.push(aegis_agent::ProviderSlot::new(
            Box::new(aegis_agent::openai::OpenAiProvider::new(
                openai.api_key.clone(),
                Some(openai.base_url.clone()),
            )),
            2,
        ));
    }
    if let Some(ollama) = &config.providers.ollama {
        slots.push(aegis_agent::ProviderSlot::new(
            Box::new(aegis_agent::openai::OpenAiProvider::with_path(
                "ollama",
                String::new(),
                ollama.base_url.clone(),
                "/v1/chat/completions".to_string(),
            )),
            1,
        ));
    }

    if slots.is_empty() {
        anyhow::bail!(
            "no LLM provider configured — set [providers.anthropic], [providers.openai], or \
             [providers.ollama]"
        );
    }
    Ok(Box::new(aegis_agent::ProviderRouter::new(slots)))
}
