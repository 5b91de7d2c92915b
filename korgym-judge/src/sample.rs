//! Per-seed evaluation record.

use korgym_core::session::round_id;
use korgym_core::SessionResult;
use korgym_error::Error;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSample {
    pub game_name: String,
    pub seed: u64,
    pub score: f64,
    pub success: bool,
    pub rounds: usize,
    pub response_time: f64,
    pub round_id: String,
    /// Set when the seed could not be played at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EvaluationSample {
    pub fn from_result(result: &SessionResult) -> Self {
        Self {
            game_name: result.game_name.clone(),
            seed: result.seed,
            score: result.final_score,
            success: result.success,
            rounds: result.rounds,
            response_time: result.response_time,
            round_id: result.round_id.clone(),
            error: None,
        }
    }

    /// Zero-score record for a seed whose session raised
    pub fn failure(game_name: &str, seed: u64, error: &Error) -> Self {
        Self {
            game_name: game_name.to_string(),
            seed,
            score: 0.0,
            success: false,
            rounds: 0,
            response_time: 0.0,
            round_id: round_id(game_name, seed),
            error: Some(error.to_string()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}
