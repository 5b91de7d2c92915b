//! # korgym-core
//!
//! Drives an agent through KORGym games and turns play-throughs into lessons.
//!
//! ## Core Concepts
//! - **Registry**: static game table (category, single/multi-turn)
//! - **Client**: `/generate`, `/print_board`, `/verify` over a [`GameTransport`]
//! - **Session**: one seeded play-through, producing a [`SessionResult`]
//! - **Action extraction**: `Answer: ...` out of free-form agent text
//! - **Experience**: one `[L0-Case]` lesson per session, LLM-written with a
//!   deterministic fallback
//! - **Provider**: OpenAI-compatible chat completions behind [`LlmProvider`]

pub mod action;
pub mod agent;
pub mod client;
pub mod experience;
pub mod provider;
pub mod registry;
pub mod session;
pub mod state;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use action::extract_action;
pub use agent::{Agent, AgentOutput, LlmAgent};
pub use client::{GameClient, GameServerConfig, GameTransport, HttpTransport, VerifyOutcome};
pub use experience::{Experience, ExperienceExtractor, L0_TAG};
pub use korgym_error::{Error, ErrorKind, ErrorStatus, Result};
pub use provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, OpenAIProvider,
    ProviderConfig, ProviderError, Role, Usage, UsageTracker,
};
pub use registry::{Category, GameDescriptor, InteractionType};
pub use session::{GameSession, PreparedGame, SessionConfig, SessionResult};
pub use state::GameState;
