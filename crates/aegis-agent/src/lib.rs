//! aegis-agent — the LLM-facing half of the platform: provider
//! abstraction and failover routing (C11), per-turn context assembly
//! (C12), the tool-call execution pipeline (C10), and the brain that
//! drives a turn end to end (C13).

pub mod anthropic;
pub mod anthropic_stream;
pub mod brain;
pub mod context;
pub mod error;
pub mod executor;
pub mod health;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod registry;
pub mod router;
pub mod runtime;
pub mod stream;
pub mod thinking;

pub use brain::{AgentBrain, TurnOutcome};
pub use context::{BuiltContext, ContextBuilder, TurnContext};
pub use error::{BrainError, Result};
pub use executor::{ExecutionOutcome, ToolExecutor};
pub use provider::{ChatRequest, ChatResponse, LlmProvider, Message, ProviderError, Role, ToolCall, ToolDefinition};
pub use router::{ProviderRouter, ProviderSlot};
pub use runtime::AgentRuntime;
