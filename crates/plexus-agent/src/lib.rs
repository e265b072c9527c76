//! Planning loop, session lifecycle, and LLM planner for the Plexus query
//! agent.

pub mod config;
pub mod error;
pub mod history;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod openai;
pub mod planner;
pub mod provider;
pub mod result;
pub mod session;

pub use config::{Config, Credentials};
pub use error::{AgentError, LlmError};
pub use history::ToolCallRecord;
pub use openai::OpenAiProvider;
pub use planner::{LlmPlanner, PlanStep, Planner, ToolRequest};
pub use provider::{LlmProvider, Message, Role};
pub use result::QueryResult;
pub use session::{AgentSession, SessionConfig, ToolDispatcher, initialize_agent};
