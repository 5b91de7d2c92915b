//! # Evaluation Runner
//!
//! Plays many seeds of one game and summarizes them. A seed that raises
//! (game server down, agent error) becomes a zero-score failure sample; the
//! remaining seeds still run.

use crate::sample::EvaluationSample;
use chrono::Utc;
use futures_util::future::join_all;
use korgym_core::registry::{self, Category};
use korgym_core::{
    Agent, Experience, ExperienceExtractor, GameClient, GameSession, GameTransport, HttpTransport,
    LlmProvider, SessionConfig, SessionResult,
};
use korgym_error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Sessions in flight at once
    pub max_concurrent: usize,
    /// Extract experiences after every evaluation
    pub extract_experiences: bool,
    /// Extraction calls in flight at once
    pub extraction_concurrency: usize,
    /// Where the file-backed experience cache lives
    pub cache_dir: PathBuf,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            extract_experiences: false,
            extraction_concurrency: 8,
            cache_dir: PathBuf::from(".korgym_cache"),
        }
    }
}

impl JudgeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(Error::config_invalid("judge.max_concurrent must be at least 1")
                .with_context("field", "judge.max_concurrent"));
        }
        if self.extraction_concurrency == 0 {
            return Err(Error::config_invalid("judge.extraction_concurrency must be at least 1")
                .with_context("field", "judge.extraction_concurrency"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub game_name: String,
    pub category: Category,
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    /// successes / total (0 when empty)
    pub accuracy: f64,
    pub mean_score: f64,
    pub samples: Vec<EvaluationSample>,
    /// RFC 3339, UTC
    pub created_at: String,
}

impl EvaluationReport {
    pub fn new(game_name: &str, samples: Vec<EvaluationSample>) -> Self {
        let total = samples.len();
        let successes = samples.iter().filter(|s| s.success).count();
        let failures = samples.iter().filter(|s| s.is_failure()).count();
        let (accuracy, mean_score) = if total == 0 {
            (0.0, 0.0)
        } else {
            (
                successes as f64 / total as f64,
                samples.iter().map(|s| s.score).sum::<f64>() / total as f64,
            )
        };

        Self {
            game_name: game_name.to_string(),
            category: registry::category_of(game_name),
            total,
            successes,
            failures,
            accuracy,
            mean_score,
            samples,
            created_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)
            .map_err(|e| Error::serialization_failed("cannot encode report").set_source(e))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                Error::from(e)
                    .with_operation("report::write_json")
                    .with_context("path", parent.display().to_string())
            })?;
        }
        fs::write(path, format!("{}\n", contents)).map_err(|e| {
            Error::from(e)
                .with_operation("report::write_json")
                .with_context("path", path.display().to_string())
        })
    }
}

/// Runs sessions for one game server.
pub struct Judge<'c, T = HttpTransport> {
    client: &'c GameClient<T>,
    session: SessionConfig,
    config: JudgeConfig,
}

impl<'c, T: GameTransport> Judge<'c, T> {
    pub fn new(client: &'c GameClient<T>, session: SessionConfig, config: JudgeConfig) -> Self {
        Self {
            client,
            session,
            config,
        }
    }

    pub fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// Play every seed and report. Sample order matches `seeds`.
    #[instrument(skip_all, fields(game = game_id, seeds = seeds.len()))]
    pub async fn evaluate<A: Agent>(&self, agent: &A, game_id: &str, seeds: &[u64]) -> EvaluationReport {
        self.play_all(agent, game_id, seeds).await.0
    }

    /// Like [`Judge::evaluate`], then extract one experience per played
    /// session. Seeds that failed outright have no session and yield none.
    #[instrument(skip_all, fields(game = game_id, seeds = seeds.len()))]
    pub async fn evaluate_and_learn<A: Agent, P: LlmProvider>(
        &self,
        agent: &A,
        game_id: &str,
        seeds: &[u64],
        extractor: &ExperienceExtractor<P>,
    ) -> (EvaluationReport, Vec<Experience>) {
        let (report, results) = self.play_all(agent, game_id, seeds).await;
        let experiences = extractor
            .extract_batch(
                &results,
                registry::category_of(game_id),
                registry::interaction_type_of(game_id),
                self.config.extraction_concurrency,
            )
            .await;
        info!(count = experiences.len(), "experiences extracted");
        (report, experiences)
    }

    async fn play_all<A: Agent>(
        &self,
        agent: &A,
        game_id: &str,
        seeds: &[u64],
    ) -> (EvaluationReport, Vec<SessionResult>) {
        let session = GameSession::new(game_id, self.client, self.session.clone());
        let semaphore = Semaphore::new(self.config.max_concurrent.max(1));
        let (session, semaphore) = (&session, &semaphore);

        let plays = seeds.iter().map(|&seed| async move {
            let _permit = semaphore.acquire().await.ok();
            (seed, session.play(agent, seed).await)
        });
        let outcomes = join_all(plays).await;

        let mut samples = Vec::with_capacity(outcomes.len());
        let mut results = Vec::new();
        for (seed, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    samples.push(EvaluationSample::from_result(&result));
                    results.push(result);
                }
                Err(err) => {
                    warn!(seed, error = %err, "seed failed, recording zero score");
                    samples.push(EvaluationSample::failure(game_id, seed, &err));
                }
            }
        }

        let report = EvaluationReport::new(game_id, samples);
        info!(
            accuracy = report.accuracy,
            mean_score = report.mean_score,
            failures = report.failures,
            "evaluation finished"
        );
        (report, results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use korgym_core::client::{GENERATE, PRINT_BOARD, VERIFY};
    use korgym_core::testing::{ScriptedAgent, ScriptedProvider, ScriptedTransport};
    use serde_json::{json, Value};

    /// Scores 1 when the action equals the seed, else 0; seed 13 cannot be generated.
    struct SeedEchoServer;

    impl GameTransport for SeedEchoServer {
        async fn post(&self, endpoint: &str, body: &Value) -> Result<Value> {
            tokio::task::yield_now().await;
            match endpoint {
                GENERATE if body["seed"] == 13 => Err(Error::game_unavailable(endpoint, "seed 13 crashed")),
                GENERATE => Ok(json!({"board": format!("seed {}", body["seed"])})),
                PRINT_BOARD => Ok(json!({"board": body["board"].clone()})),
                VERIFY => {
                    let hit = body["action"].as_str() == Some(body["seed"].to_string().as_str());
                    Ok(json!({"score": if hit { 1 } else { 0 }, "is_end": true}))
                }
                _ => Err(Error::game_unavailable(endpoint, "unknown endpoint")),
            }
        }
    }

    #[tokio::test]
    async fn test_evaluate_records_failures_and_keeps_order() {
        let client = GameClient::new(SeedEchoServer);
        let judge = Judge::new(&client, SessionConfig::default(), JudgeConfig::default());
        let agent = ScriptedAgent::new().reply("Answer: 2");

        let report = judge.evaluate(&agent, "1-DateCount", &[1, 2, 13, 4]).await;

        let seeds: Vec<u64> = report.samples.iter().map(|s| s.seed).collect();
        assert_eq!(seeds, vec![1, 2, 13, 4]);
        assert_eq!(report.total, 4);
        assert_eq!(report.successes, 1);
        assert_eq!(report.failures, 1);
        assert_eq!(report.accuracy, 0.25);
        assert_eq!(report.mean_score, 0.25);
        assert_eq!(report.category, Category::MathLogic);

        let failed = &report.samples[2];
        assert_eq!(failed.score, 0.0);
        assert!(failed.error.as_deref().unwrap().contains("seed 13 crashed"));
        assert!(report.samples[1].success);
    }

    #[tokio::test]
    async fn test_agent_failure_becomes_sample() {
        let transport = ScriptedTransport::new()
            .reply(GENERATE, json!({"board": "b"}))
            .reply(PRINT_BOARD, json!({"board": "b"}));
        let client = GameClient::new(transport);
        let judge = Judge::new(&client, SessionConfig::default(), JudgeConfig::default());
        let agent = ScriptedAgent::new().fail("rate limited");

        let report = judge.evaluate(&agent, "3-2048", &[5, 6]).await;
        assert_eq!(report.failures, 2);
        assert_eq!(report.accuracy, 0.0);
        assert!(report.samples.iter().all(|s| s.error.is_some()));
        assert_eq!(client.transport().calls(VERIFY), 0);
    }

    #[tokio::test]
    async fn test_evaluate_and_learn_skips_failed_seeds() {
        let client = GameClient::new(SeedEchoServer);
        let config = JudgeConfig {
            max_concurrent: 2,
            extraction_concurrency: 1,
            ..Default::default()
        };
        let judge = Judge::new(&client, SessionConfig::default(), config);
        let agent = ScriptedAgent::new().reply("Answer: 1");
        let extractor = ExperienceExtractor::new(ScriptedProvider::failing());

        let (report, experiences) = judge
            .evaluate_and_learn(&agent, "1-DateCount", &[1, 13, 3], &extractor)
            .await;
        assert_eq!(report.total, 3);
        assert_eq!(experiences.len(), 2);
        assert!(experiences[0].title().ends_with("success pattern"));
        assert!(experiences[1].title().ends_with("failure analysis"));
        assert_eq!(extractor.provider().max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_empty_seed_list() {
        let client = GameClient::new(SeedEchoServer);
        let judge = Judge::new(&client, SessionConfig::default(), JudgeConfig::default());
        let report = judge.evaluate(&ScriptedAgent::new(), "1-DateCount", &[]).await;
        assert_eq!(report.total, 0);
        assert_eq!(report.accuracy, 0.0);
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("1-DateCount.json");
        let report = EvaluationReport::new("1-DateCount", vec![]);

        report.write_json(&path).unwrap();
        let loaded: EvaluationReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded, report);
    }

    #[test]
    fn test_config_validation() {
        assert!(JudgeConfig::default().validate().is_ok());
        let config = JudgeConfig {
            max_concurrent: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
