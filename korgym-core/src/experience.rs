//! # L0 Experience Extraction
//!
//! Turns one [`SessionResult`] into one tagged lesson,
//! `[L0-Case] <title>: <description>`, with a single LLM call. Extraction
//! never fails: a provider error or an empty reply falls back to a fixed
//! success-pattern or failure-analysis sentence.

use crate::action::extract_action;
use crate::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::registry::{Category, InteractionType};
use crate::session::SessionResult;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::Semaphore;
use tracing::{debug, instrument, warn};

pub const L0_TAG: &str = "[L0-Case]";

/// Longest single-turn response quoted in the extraction prompt, in chars
const MAX_QUOTED_RESPONSE: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Experience(String);

impl Experience {
    pub fn new(title: impl AsRef<str>, description: impl AsRef<str>) -> Self {
        Self(format!(
            "{} {}: {}",
            L0_TAG,
            title.as_ref().trim(),
            description.as_ref().trim()
        ))
    }

    /// Accept `[L0-Case] <title>: <description>` with both parts non-empty.
    pub fn parse(text: &str) -> Option<Self> {
        let body = text.trim().strip_prefix(L0_TAG)?;
        let (title, description) = body.split_once(':')?;
        if title.trim().is_empty() || description.trim().is_empty() {
            return None;
        }
        Some(Self::new(title, description))
    }

    fn body(&self) -> &str {
        self.0.strip_prefix(L0_TAG).unwrap_or(&self.0).trim_start()
    }

    pub fn title(&self) -> &str {
        match self.body().split_once(':') {
            Some((title, _)) => title.trim(),
            None => self.body(),
        }
    }

    pub fn description(&self) -> &str {
        self.body()
            .split_once(':')
            .map(|(_, desc)| desc.trim())
            .unwrap_or("")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Experience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct ExperienceExtractor<P> {
    provider: P,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
}

impl<P: LlmProvider> ExperienceExtractor<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            model: None,
            temperature: Some(0.3),
            max_tokens: Some(512),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Extract one lesson from a finished session.
    #[instrument(skip_all, fields(game = %result.game_name, seed = result.seed))]
    pub async fn extract(
        &self,
        result: &SessionResult,
        category: Category,
        interaction: InteractionType,
    ) -> Experience {
        let prompt = build_prompt(result, category, interaction);
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)])
            .with_model(self.model.as_deref())
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        match self.provider.complete(request).await {
            Ok(response) => {
                let text = response.content.unwrap_or_default();
                match normalize(&text, &result.game_name) {
                    Some(experience) => {
                        debug!(title = experience.title(), "experience extracted");
                        experience
                    }
                    None => {
                        warn!("extraction returned no usable text, using fallback");
                        fallback(result)
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "extraction call failed, using fallback");
                fallback(result)
            }
        }
    }

    /// Extract lessons for many sessions with at most `max_concurrent` calls
    /// in flight. Output order matches input order; 0 is treated as 1.
    pub async fn extract_batch(
        &self,
        results: &[SessionResult],
        category: Category,
        interaction: InteractionType,
        max_concurrent: usize,
    ) -> Vec<Experience> {
        let semaphore = Semaphore::new(max_concurrent.max(1));
        let semaphore = &semaphore;

        let tasks = results.iter().map(|result| async move {
            // acquire() only errs once the semaphore is closed; it never is here.
            let _permit = semaphore.acquire().await.ok();
            self.extract(result, category, interaction).await
        });

        join_all(tasks).await
    }
}

fn build_prompt(result: &SessionResult, category: Category, interaction: InteractionType) -> String {
    let outcome = if result.success { "success" } else { "failure" };
    let mut prompt = format!(
        "You are reviewing one play-through of the KORGym game '{}'.\n\
         Category: {}\n\
         Interaction: {}\n\
         Seed: {}\n\
         Final score: {}\n\
         Outcome: {}\n\
         Rounds played: {}\n\n",
        result.game_name,
        category,
        interaction,
        result.seed,
        format_score(result.final_score),
        outcome,
        result.rounds,
    );

    if interaction.is_multi_turn() {
        prompt.push_str("Trajectory:\n| Round | Action | Score | Ended |\n|---|---|---|---|\n");
        for (i, state) in result.trajectory.iter().enumerate() {
            prompt.push_str(&format!(
                "| {} | {} | {} | {} |\n",
                i + 1,
                table_cell(&state.action),
                format_score(state.score),
                state.is_end
            ));
        }
    } else {
        let response = result.responses.first().map(String::as_str).unwrap_or("");
        let action = result
            .final_state()
            .map(|s| s.action.clone())
            .unwrap_or_else(|| extract_action(Some(response)));
        prompt.push_str(&format!(
            "Agent response:\n{}\n\nExtracted action: {}\n",
            truncate_chars(response, MAX_QUOTED_RESPONSE),
            if action.is_empty() { "(none)" } else { action.as_str() }
        ));
    }

    prompt.push_str(&format!(
        "\nWrite exactly one lesson a player should remember for the next game, \
         on a single line, in the form:\n{} <short title>: <what to repeat or avoid>\n",
        L0_TAG
    ));
    prompt
}

/// Pull the tagged line out of a model reply. Untagged text, or a tagged
/// line without a title, is filed under the game name.
fn normalize(text: &str, game_name: &str) -> Option<Experience> {
    let text = strip_markup(text);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(line) = text.lines().find(|line| line.contains(L0_TAG)) {
        let start = line.find(L0_TAG).unwrap_or(0);
        let line = collapse_whitespace(&line[start..]);
        if let Some(experience) = Experience::parse(&line) {
            return Some(experience);
        }
        let body = line.strip_prefix(L0_TAG).unwrap_or(&line).trim_matches([' ', ':']);
        return (!body.is_empty()).then(|| Experience::new(game_name, body));
    }

    Some(Experience::new(game_name, collapse_whitespace(text)))
}

/// Drop markdown emphasis and code marks.
fn strip_markup(text: &str) -> String {
    text.replace("**", "").replace("__", "").replace('`', "")
}

fn fallback(result: &SessionResult) -> Experience {
    let score = format_score(result.final_score);
    if result.success {
        Experience::new(
            format!("{} success pattern", result.game_name),
            format!(
                "the approach used here reached score {} in {} round(s); reuse it on similar instances",
                score, result.rounds
            ),
        )
    } else {
        let last_action = result
            .final_state()
            .map(|s| s.action.as_str())
            .filter(|a| !a.is_empty())
            .unwrap_or("(none)");
        Experience::new(
            format!("{} failure analysis", result.game_name),
            format!(
                "the approach scored {} after {} round(s) with final action {}; check the rules and answer format before committing",
                score, result.rounds, last_action
            ),
        )
    }
}

fn format_score(score: f64) -> String {
    if score.is_finite() && score.fract() == 0.0 {
        format!("{:.0}", score)
    } else {
        format!("{}", score)
    }
}

fn table_cell(text: &str) -> String {
    let cell = collapse_whitespace(text).replace('|', "\\|");
    if cell.is_empty() {
        "(none)".to_string()
    } else {
        cell
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
