//! # Game Session
//!
//! One play-through of one seeded game instance.
//!
//! ```text
//! Created -> Generated -> (Prompted -> Acted -> Verified)* -> Ended
//! ```
//!
//! Single-turn games run the round body once. Multi-turn games repeat it
//! until the server reports `is_end` or `max_rounds` is reached. Rounds never
//! overlap: round N's verify result is applied before round N+1 is rendered.

use crate::action::extract_action;
use crate::agent::Agent;
use crate::client::{GameClient, GameTransport, HttpTransport};
use crate::registry::{self, Category, InteractionType};
use crate::state::GameState;
use chrono::Utc;
use korgym_error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, trace, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Difficulty level sent to `/generate`
    pub level: u32,
    /// Hard cap on rounds for multi-turn games
    pub max_rounds: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            level: 4,
            max_rounds: 100,
        }
    }
}

impl SessionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_rounds == 0 {
            return Err(Error::config_invalid("session.max_rounds must be at least 1")
                .with_context("field", "session.max_rounds"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Generated,
    Prompted,
    Acted,
    Verified,
    Ended,
}

impl Phase {
    fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Created, Generated)
                | (Generated, Prompted)
                | (Prompted, Acted)
                | (Acted, Verified)
                | (Verified, Prompted)
                | (Verified, Ended)
        )
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.can_advance_to(next),
            "illegal session transition {:?} -> {:?}",
            self,
            next
        );
        trace!(from = ?self, to = ?next, "session phase");
        *self = next;
    }
}

/// Outcome of one play-through. Plain data, produced once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub game_name: String,
    pub game_category: Category,
    pub seed: u64,
    /// State after each verified round. Only the last state carries the
    /// server-side response log; earlier snapshots leave it empty.
    pub trajectory: Vec<GameState>,
    /// Raw agent replies, one per round
    pub responses: Vec<String>,
    #[serde(alias = "score")]
    pub final_score: f64,
    pub success: bool,
    pub is_end: bool,
    pub rounds: usize,
    /// Seconds spent waiting on the agent, summed over rounds
    pub response_time: f64,
    pub round_id: String,
}

impl SessionResult {
    pub fn final_state(&self) -> Option<&GameState> {
        self.trajectory.last()
    }

    /// Extracted action for each round
    pub fn actions(&self) -> Vec<&str> {
        self.trajectory.iter().map(|s| s.action.as_str()).collect()
    }
}

/// `{game}_{seed}_{utc timestamp with millis}`
pub fn round_id(game_id: &str, seed: u64) -> String {
    format!("{}_{}_{}", game_id, seed, Utc::now().format("%Y%m%d%H%M%S%3f"))
}

/// A generated game with its first prompt, waiting for an external answer.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedGame {
    pub seed: u64,
    pub state: GameState,
    pub prompt: String,
}

pub struct GameSession<'c, T = HttpTransport> {
    game_id: String,
    category: Category,
    interaction: InteractionType,
    client: &'c GameClient<T>,
    config: SessionConfig,
}

impl<'c, T: GameTransport> GameSession<'c, T> {
    pub fn new(game_id: impl Into<String>, client: &'c GameClient<T>, config: SessionConfig) -> Self {
        let game_id = game_id.into();
        Self {
            category: registry::category_of(&game_id),
            interaction: registry::interaction_type_of(&game_id),
            game_id,
            client,
            config,
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn interaction(&self) -> InteractionType {
        self.interaction
    }

    /// Play one seed to the end.
    ///
    /// Failures of `generate`, `render_prompt` and the agent propagate and no
    /// result is produced. A failed verify ends the game with score 0.
    #[instrument(skip_all, fields(game = %self.game_id, seed = seed))]
    pub async fn play<A: Agent>(&self, agent: &A, seed: u64) -> Result<SessionResult> {
        self.play_rounds(agent, seed).await.map_err(|e| {
            e.with_operation("session::play")
                .with_context("game", self.game_id.clone())
                .with_context("seed", seed.to_string())
        })
    }

    async fn play_rounds<A: Agent>(&self, agent: &A, seed: u64) -> Result<SessionResult> {
        let max_rounds = match self.interaction {
            InteractionType::Multiple => self.config.max_rounds.max(1),
            InteractionType::Single => 1,
            InteractionType::Unknown => {
                warn!(game = %self.game_id, "unknown interaction type, playing as single-turn");
                1
            }
        };

        let mut phase = Phase::Created;
        let mut state = self.client.generate(seed, self.config.level).await?;
        phase.advance(Phase::Generated);

        let mut trajectory = Vec::new();
        let mut responses = Vec::new();
        let mut waited = Duration::ZERO;

        loop {
            let round = trajectory.len() + 1;

            let prompt = self.client.render_prompt(&state).await?;
            phase.advance(Phase::Prompted);

            let started = Instant::now();
            let output = agent
                .run(&prompt)
                .await
                .map_err(|e| e.with_context("round", round.to_string()))?;
            waited += started.elapsed();

            let raw = output.final_output.unwrap_or_default();
            state.action = extract_action(Some(&raw));
            state.response.push(raw.clone());
            responses.push(raw);
            phase.advance(Phase::Acted);

            state = self.client.verify(state).await.into_state();
            phase.advance(Phase::Verified);
            debug!(round, score = state.score, is_end = state.is_end, action = %state.action, "round verified");
            let log = std::mem::take(&mut state.response);
            trajectory.push(state.clone());
            state.response = log;

            if state.is_end || trajectory.len() >= max_rounds {
                break;
            }
        }
        phase.advance(Phase::Ended);
        if let Some(last) = trajectory.last_mut() {
            last.response = state.response;
        }

        Ok(self.finish(seed, trajectory, responses, waited))
    }

    /// Generate `seed` and render its first prompt without calling an agent.
    pub async fn prepare(&self, seed: u64) -> Result<PreparedGame> {
        let state = self
            .client
            .generate(seed, self.config.level)
            .await
            .map_err(|e| e.with_operation("session::prepare"))?;
        let prompt = self
            .client
            .render_prompt(&state)
            .await
            .map_err(|e| e.with_operation("session::prepare"))?;

        Ok(PreparedGame { seed, state, prompt })
    }

    /// Score an answer obtained elsewhere for a prepared game. One round.
    pub async fn score(
        &self,
        prepared: PreparedGame,
        response: Option<&str>,
        response_time: Duration,
    ) -> SessionResult {
        let PreparedGame { seed, mut state, .. } = prepared;
        let raw = response.unwrap_or_default().to_string();

        state.action = extract_action(response);
        state.response.push(raw.clone());
        let state = self.client.verify(state).await.into_state();

        self.finish(seed, vec![state], vec![raw], response_time)
    }

    fn finish(
        &self,
        seed: u64,
        trajectory: Vec<GameState>,
        responses: Vec<String>,
        waited: Duration,
    ) -> SessionResult {
        let (final_score, is_end) = trajectory
            .last()
            .map(|s| (s.score, s.is_end))
            .unwrap_or((0.0, false));

        SessionResult {
            game_name: self.game_id.clone(),
            game_category: self.category,
            seed,
            rounds: trajectory.len(),
            trajectory,
            responses,
            final_score,
            success: final_score > 0.0,
            is_end,
            response_time: waited.as_secs_f64(),
            round_id: round_id(&self.game_id, seed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{GENERATE, PRINT_BOARD, VERIFY};
    use crate::testing::{ScriptedAgent, ScriptedTransport};
    use korgym_error::ErrorKind;
    use serde_json::json;

    fn board_server() -> ScriptedTransport {
        ScriptedTransport::new()
            .reply(GENERATE, json!({"board": "start"}))
            .reply(PRINT_BOARD, json!({"board": "rendered board"}))
    }

    #[tokio::test]
    async fn test_single_turn_session() {
        let client = GameClient::new(board_server().reply(VERIFY, json!({"score": 1, "is_end": true})));
        let session = GameSession::new("1-DateCount", &client, SessionConfig::default());
        let agent = ScriptedAgent::new().reply("thinking...\nAnswer: 2024-01-01");

        let result = session.play(&agent, 11).await.unwrap();
        assert_eq!(result.rounds, 1);
        assert_eq!(result.trajectory.len(), 1);
        assert!(result.success);
        assert!(result.is_end);
        assert_eq!(result.final_score, 1.0);
        assert_eq!(result.game_category, Category::MathLogic);
        assert_eq!(result.actions(), vec!["2024-01-01"]);
        assert!(result.round_id.starts_with("1-DateCount_11_"));
        assert_eq!(agent.prompts(), vec!["rendered board".to_string()]);

        let (_, verify_body) = &client.transport().requests()[2];
        assert_eq!(verify_body["action"], "2024-01-01");
        assert_eq!(verify_body["seed"], 11);
        assert_eq!(verify_body["response"], json!(["thinking...\nAnswer: 2024-01-01"]));
    }

    #[tokio::test]
    async fn test_single_turn_ignores_is_end_false() {
        let client = GameClient::new(board_server().reply(VERIFY, json!({"score": 0, "is_end": false})));
        let session = GameSession::new("2-GuessWord", &client, SessionConfig::default());

        let result = session.play(&ScriptedAgent::new().reply("Answer: x"), 1).await.unwrap();
        assert_eq!(result.rounds, 1);
        assert!(!result.success);
        assert!(!result.is_end);
    }

    #[tokio::test]
    async fn test_multi_turn_until_end() {
        let mut transport = board_server();
        for _ in 0..4 {
            transport = transport.reply(VERIFY, json!({"score": 0, "is_end": false}));
        }
        let transport = transport.reply(VERIFY, json!({"score": 8, "is_end": true}));
        let client = GameClient::new(transport);
        let session = GameSession::new("3-2048", &client, SessionConfig::default());
        let agent = ScriptedAgent::new().reply("Answer: left");

        let result = session.play(&agent, 3).await.unwrap();
        assert_eq!(result.rounds, 5);
        assert_eq!(result.trajectory.len(), 5);
        assert_eq!(result.responses.len(), 5);
        assert_eq!(result.final_score, 8.0);
        assert!(result.success);
        assert_eq!(client.transport().calls(PRINT_BOARD), 5);
        assert_eq!(result.trajectory[4].response.len(), 5);
        assert!(result.trajectory[..4].iter().all(|s| s.response.is_empty()));

        let sent = client.transport().requests();
        let last_verify = sent.iter().filter(|(endpoint, _)| endpoint == VERIFY).last().unwrap();
        assert_eq!(last_verify.1["response"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_multi_turn_round_cap() {
        let client = GameClient::new(board_server().reply(VERIFY, json!({"score": 0, "is_end": false})));
        let config = SessionConfig {
            max_rounds: 3,
            ..Default::default()
        };
        let session = GameSession::new("33-wordle", &client, config);

        let result = session.play(&ScriptedAgent::new().reply("Answer: crane"), 9).await.unwrap();
        assert_eq!(result.rounds, 3);
        assert_eq!(result.trajectory.len(), 3);
        assert!(!result.is_end);
        assert_eq!(client.transport().calls(VERIFY), 3);
    }

    #[tokio::test]
    async fn test_verify_failure_ends_session() {
        let transport = board_server()
            .reply(VERIFY, json!({"score": 2, "is_end": false}))
            .fail(VERIFY, "server exploded");
        let client = GameClient::new(transport);
        let session = GameSession::new("24-snake", &client, SessionConfig::default());

        let result = session.play(&ScriptedAgent::new().reply("Answer: up"), 4).await.unwrap();
        assert_eq!(result.rounds, 2);
        let last = result.final_state().unwrap();
        assert_eq!(last.score, 0.0);
        assert!(last.is_end);
        assert!(!result.success);
        assert_eq!(client.transport().calls(VERIFY), 2);
    }

    #[tokio::test]
    async fn test_generate_failure_is_fatal() {
        let client = GameClient::new(ScriptedTransport::new().fail(GENERATE, "refused"));
        let session = GameSession::new("3-2048", &client, SessionConfig::default());

        let err = session.play(&ScriptedAgent::new().reply("Answer: up"), 5).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::GameUnavailable);
        assert_eq!(err.operation(), "session::play");
        assert_eq!(err.context_value("game"), Some("3-2048"));
    }

    #[tokio::test]
    async fn test_agent_failure_propagates() {
        let client = GameClient::new(board_server().reply(VERIFY, json!({"score": 1, "is_end": true})));
        let session = GameSession::new("1-DateCount", &client, SessionConfig::default());

        let err = session.play(&ScriptedAgent::new().fail("model offline"), 5).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AgentFailed);
        assert_eq!(err.context_value("round"), Some("1"));
        assert_eq!(client.transport().calls(VERIFY), 0);
    }

    #[tokio::test]
    async fn test_unknown_game_plays_single_turn() {
        let client = GameClient::new(board_server().reply(VERIFY, json!({"score": 0, "is_end": false})));
        let session = GameSession::new("99-not_a_game", &client, SessionConfig::default());
        assert_eq!(session.interaction(), InteractionType::Unknown);

        let result = session.play(&ScriptedAgent::new().silent(), 1).await.unwrap();
        assert_eq!(result.rounds, 1);
        assert_eq!(result.game_category, Category::Unknown);
        assert_eq!(result.actions(), vec![""]);
    }

    #[tokio::test]
    async fn test_prepare_then_score() {
        let client = GameClient::new(board_server().reply(VERIFY, json!({"score": 0.5, "is_end": true})));
        let session = GameSession::new("8-word_puzzle", &client, SessionConfig::default());

        let prepared = session.prepare(21).await.unwrap();
        assert_eq!(prepared.prompt, "rendered board");
        assert_eq!(prepared.state.seed, Some(21));

        let result = session
            .score(prepared, Some("Answer: \\boxed{apple}"), Duration::from_millis(1500))
            .await;
        assert_eq!(result.seed, 21);
        assert_eq!(result.actions(), vec!["apple"]);
        assert_eq!(result.final_score, 0.5);
        assert!(result.success);
        assert_eq!(result.response_time, 1.5);
    }

    #[test]
    fn test_result_accepts_score_alias() {
        let raw = json!({
            "game_name": "3-2048",
            "game_category": "control_interaction",
            "seed": 1,
            "trajectory": [],
            "responses": [],
            "score": 4.0,
            "success": true,
            "is_end": true,
            "rounds": 0,
            "response_time": 0.0,
            "round_id": "3-2048_1_x",
        });
        let result: SessionResult = serde_json::from_value(raw).unwrap();
        assert_eq!(result.final_score, 4.0);
        assert!(result.final_state().is_none());
    }

    #[test]
    fn test_phase_transitions() {
        assert!(Phase::Verified.can_advance_to(Phase::Prompted));
        assert!(Phase::Verified.can_advance_to(Phase::Ended));
        assert!(!Phase::Generated.can_advance_to(Phase::Ended));
        assert!(!Phase::Acted.can_advance_to(Phase::Prompted));
    }

    #[test]
    fn test_config_validation() {
        assert!(SessionConfig::default().validate().is_ok());
        let config = SessionConfig {
            max_rounds: 0,
            ..Default::default()
        };
        assert_eq!(config.validate().unwrap_err().kind(), ErrorKind::ConfigInvalid);
    }
}
