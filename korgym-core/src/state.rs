//! # Game State
//!
//! The mutable record passed between the adapter and the game server. A few
//! fields are well known to the harness; everything else the server sends is
//! kept verbatim in [`GameState::extra`] so a state survives the JSON round
//! trip unchanged, whatever the game.

use korgym_error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// Seed the instance was generated from (set by the client, not the server)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Action submitted for the current round
    #[serde(default)]
    pub action: String,
    #[serde(default, deserialize_with = "lenient_score")]
    pub score: f64,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub is_end: bool,
    /// Raw agent responses, oldest first
    #[serde(default)]
    pub response: Vec<String>,
    /// Game-specific server fields (board, puzzle, history, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GameState {
    /// Build a state from a server JSON object
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(Error::serialization_failed(format!(
                "game state must be a JSON object, got {}",
                value_kind(&value)
            )));
        }
        serde_json::from_value(value).map_err(|e| {
            Error::serialization_failed(format!("invalid game state: {}", e)).set_source(e)
        })
    }

    pub fn to_value(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| {
            Error::serialization_failed(format!("cannot encode game state: {}", e)).set_source(e)
        })
    }

    /// Overlay server fields onto this state; server values win.
    pub fn merge(&mut self, fields: Map<String, Value>) -> Result<()> {
        let Value::Object(mut merged) = self.to_value()? else {
            return Err(Error::unexpected("game state did not encode as an object"));
        };
        merged.extend(fields);
        *self = Self::from_value(Value::Object(merged))?;
        Ok(())
    }

    /// Force the terminal zero-score state used when verification fails
    pub fn degraded(mut self) -> Self {
        self.score = 0.0;
        self.is_end = true;
        self
    }

    /// Look up a game-specific field
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// Servers report scores as ints, floats, numeric strings or null.
fn lenient_score<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Null => Ok(0.0),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom("score out of range")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("score is not numeric: {:?}", s))),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        other => Err(serde::de::Error::custom(format!(
            "score must be a number, got {}",
            value_kind(other)
        ))),
    }
}

// `is_end` arrives as a bool from most games and as 0/1 from a few.
fn lenient_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" | "" => Ok(false),
            _ => Err(serde::de::Error::custom(format!("is_end is not a flag: {:?}", s))),
        },
        other => Err(serde::de::Error::custom(format!(
            "is_end must be a boolean, got {}",
            value_kind(other)
        ))),
    }
}
