//! # Game Client
//!
//! Protocol client for a KORGym game server:
//!
//! | Endpoint       | Request                 | Response used          |
//! |----------------|-------------------------|------------------------|
//! | `/generate`    | `{seed, level}`         | whole body → state     |
//! | `/print_board` | current state           | `board`                |
//! | `/verify`      | state with `action` set | merged into the state  |
//!
//! `generate` and `render_prompt` fail loudly with `GameUnavailable`
//! (`GameProtocol` when a board is missing from an otherwise valid reply).
//! `verify` never fails: a broken verify call ends the game with a zero
//! score ([`VerifyOutcome::Degraded`]) so a multi-turn loop cannot spin
//! against a dead backend.

use crate::state::GameState;
use korgym_error::{Error, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub const GENERATE: &str = "/generate";
pub const PRINT_BOARD: &str = "/print_board";
pub const VERIFY: &str = "/verify";

/// Where the game server lives and how long one call may take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameServerConfig {
    pub host: String,
    pub port: u16,
    /// Per-call timeout, fixed for the lifetime of the client
    pub timeout_secs: u64,
}

impl Default for GameServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8775,
            timeout_secs: 30,
        }
    }
}

impl GameServerConfig {
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// JSON-over-POST transport to one game server.
#[allow(async_fn_in_trait)]
pub trait GameTransport: Send + Sync {
    /// POST `body` to `endpoint` and return the decoded JSON body
    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value>;
}

/// reqwest-backed transport. No retries.
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &GameServerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                Error::config_invalid("cannot build game server HTTP client")
                    .with_operation("transport::new")
                    .set_source(e)
            })?;

        Ok(Self {
            client,
            base_url: config.base_url(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl GameTransport for HttpTransport {
    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::game_unavailable(endpoint, e.to_string()).set_source(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(
                Error::game_unavailable(endpoint, format!("HTTP {}: {}", status.as_u16(), text))
                    .with_context("status", status.as_u16().to_string()),
            );
        }

        response.json::<Value>().await.map_err(|e| {
            Error::game_unavailable(endpoint, format!("response is not JSON: {}", e)).set_source(e)
        })
    }
}

/// Result of a verify call.
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    /// The server scored the action; its fields are merged into the state
    Verified(GameState),
    /// The call failed; the state is forced to `score = 0, is_end = true`
    Degraded { state: GameState, reason: String },
}

impl VerifyOutcome {
    pub fn state(&self) -> &GameState {
        match self {
            VerifyOutcome::Verified(state) => state,
            VerifyOutcome::Degraded { state, .. } => state,
        }
    }

    pub fn into_state(self) -> GameState {
        match self {
            VerifyOutcome::Verified(state) => state,
            VerifyOutcome::Degraded { state, .. } => state,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, VerifyOutcome::Degraded { .. })
    }
}

pub struct GameClient<T = HttpTransport> {
    transport: T,
}

impl GameClient<HttpTransport> {
    /// Client for a real game server over HTTP
    pub fn connect(config: &GameServerConfig) -> Result<Self> {
        Ok(Self::new(HttpTransport::new(config)?))
    }
}

impl<T: GameTransport> GameClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Create a game instance for `seed`.
    ///
    /// The returned state carries the seed and an empty response log.
    #[instrument(skip(self), level = "debug")]
    pub async fn generate(&self, seed: u64, level: u32) -> Result<GameState> {
        let body = json!({ "seed": seed, "level": level });
        let value = self.transport.post(GENERATE, &body).await.map_err(|e| {
            e.with_operation("client::generate")
                .with_context("seed", seed.to_string())
        })?;

        let mut state = GameState::from_value(value).map_err(|e| {
            Error::game_unavailable(GENERATE, "response is not a game state")
                .with_operation("client::generate")
                .set_source(e)
        })?;
        state.seed = Some(seed);
        state.response = Vec::new();

        debug!(fields = state.extra.len(), "game generated");
        Ok(state)
    }

    /// Render the current state as the text prompt shown to the agent
    pub async fn render_prompt(&self, state: &GameState) -> Result<String> {
        let body = state
            .to_value()
            .map_err(|e| e.with_operation("client::render_prompt"))?;
        let value = self
            .transport
            .post(PRINT_BOARD, &body)
            .await
            .map_err(|e| e.with_operation("client::render_prompt"))?;

        match value.get("board") {
            Some(Value::String(board)) => Ok(board.clone()),
            Some(Value::Null) | None => Err(Error::game_protocol(
                PRINT_BOARD,
                "response has no 'board' field",
            )
            .with_operation("client::render_prompt")),
            Some(other) => Ok(other.to_string()),
        }
    }

    /// Score the action attached to `state`.
    pub async fn verify(&self, state: GameState) -> VerifyOutcome {
        match self.try_verify(&state).await {
            Ok(next) => VerifyOutcome::Verified(next),
            Err(err) => {
                warn!(
                    seed = ?state.seed,
                    action = %state.action,
                    error = %err,
                    "verify failed, ending game with zero score"
                );
                VerifyOutcome::Degraded {
                    state: state.degraded(),
                    reason: err.to_string(),
                }
            }
        }
    }

    async fn try_verify(&self, state: &GameState) -> Result<GameState> {
        let body = state.to_value()?;
        let value = self
            .transport
            .post(VERIFY, &body)
            .await
            .map_err(|e| e.with_operation("client::verify"))?;

        let Value::Object(fields) = value else {
            return Err(Error::game_protocol(VERIFY, "response is not a JSON object"));
        };

        let mut next = state.clone();
        next.merge(fields)?;
        Ok(next)
    }
}
