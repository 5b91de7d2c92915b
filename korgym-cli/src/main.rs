//! # korgym
//!
//! Command-line interface for playing and evaluating KORGym games.
//!
//! Usage:
//!   korgym games [--category <CATEGORY>]
//!   korgym play <GAME> --seed <N>
//!   korgym eval <GAME> --seeds <RANGE> [--output <FILE>] [--experiment <NAME> --step <K>]
//!   korgym experiences show <EXPERIMENT> <STEP>
//!   korgym experiences clear <EXPERIMENT>
//!   korgym show-config
//!
//! Examples:
//!   korgym play 3-2048 --seed 7
//!   korgym eval 33-wordle --seeds 1..51 --output reports/wordle.json
//!   korgym eval 1-DateCount --seeds 1..=20 --experiment grpo-date --step 3 --lessons grpo-date:2

mod config;
mod logging;

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use config::HarnessConfig;
use korgym_core::registry::{self, Category};
use korgym_core::{
    Experience, ExperienceExtractor, GameClient, GameSession, LlmAgent, OpenAIProvider,
};
use korgym_error::Error;
use korgym_judge::{EvaluationReport, ExperienceCache, Judge};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "korgym")]
#[command(author, version, about = "Play, evaluate and learn from KORGym games")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the TOML config file
    #[arg(short, long, global = true, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Debug logging for the harness crates (RUST_LOG wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered games
    Games {
        /// Only games in this category (e.g. puzzle, math_logic)
        #[arg(long)]
        category: Option<Category>,
    },
    /// Play one seed and print the session result as JSON
    Play {
        game: String,

        #[arg(long)]
        seed: u64,

        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Evaluate a range of seeds
    Eval(EvalArgs),
    /// Inspect or clear cached experiences
    Experiences {
        #[command(subcommand)]
        command: ExperienceCommand,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

#[derive(Args)]
struct AgentArgs {
    /// Prime the agent with cached lessons, as EXPERIMENT:STEP
    #[arg(long, value_parser = parse_lessons_ref)]
    lessons: Option<(String, u64)>,

    /// Play games that are missing from the registry (as single-turn)
    #[arg(long)]
    allow_unknown: bool,
}

#[derive(Args)]
struct EvalArgs {
    game: String,

    /// Seeds: `A..B` (end excluded), `A..=B`, or a list `1,4,9`
    #[arg(long, value_parser = parse_seeds)]
    seeds: SeedList,

    /// Write the report JSON here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Extract experiences and cache them under this experiment
    #[arg(long, requires = "step")]
    experiment: Option<String>,

    #[arg(long)]
    step: Option<u64>,

    #[arg(long)]
    epoch: Option<u32>,

    #[arg(long)]
    batch: Option<u32>,

    #[command(flatten)]
    agent: AgentArgs,
}

#[derive(Subcommand)]
enum ExperienceCommand {
    /// Print the lessons cached for one step
    Show { experiment: String, step: u64 },
    /// List cached steps of an experiment
    Steps { experiment: String },
    /// Delete every cached step of an experiment
    Clear { experiment: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SeedList(Vec<u64>);

fn parse_seeds(text: &str) -> std::result::Result<SeedList, String> {
    let text = text.trim();
    let parse = |s: &str| {
        s.trim()
            .parse::<u64>()
            .map_err(|_| format!("'{}' is not a seed", s.trim()))
    };

    let seeds: Vec<u64> = if let Some((start, end)) = text.split_once("..=") {
        (parse(start)?..=parse(end)?).collect()
    } else if let Some((start, end)) = text.split_once("..") {
        (parse(start)?..parse(end)?).collect()
    } else {
        text.split(',').map(parse).collect::<std::result::Result<_, _>>()?
    };

    if seeds.is_empty() {
        return Err(format!("'{}' selects no seeds", text));
    }
    Ok(SeedList(seeds))
}

fn parse_lessons_ref(text: &str) -> std::result::Result<(String, u64), String> {
    let (experiment, step) = text
        .rsplit_once(':')
        .ok_or_else(|| format!("expected EXPERIMENT:STEP, got '{}'", text))?;
    if experiment.is_empty() {
        return Err("experiment name is empty".to_string());
    }
    let step = step
        .parse()
        .map_err(|_| format!("'{}' is not a step number", step))?;
    Ok((experiment.to_string(), step))
}

fn check_game(game: &str, allow_unknown: bool) -> Result<()> {
    if registry::descriptor(game).is_some() {
        return Ok(());
    }
    if allow_unknown {
        warn!(game, "game is not registered, playing as single-turn");
        return Ok(());
    }
    Err(Error::unknown_game(game).into())
}

fn build_agent(cfg: &HarnessConfig, args: &AgentArgs) -> Result<LlmAgent<OpenAIProvider>> {
    let provider = OpenAIProvider::new(cfg.llm.provider_config())?;
    let mut agent = LlmAgent::new(provider);
    if let Some(temperature) = cfg.llm.temperature {
        agent = agent.with_temperature(temperature);
    }
    if let Some(max_tokens) = cfg.llm.max_tokens {
        agent = agent.with_max_tokens(max_tokens);
    }

    if let Some((experiment, step)) = &args.lessons {
        let cache = ExperienceCache::file(&cfg.judge.cache_dir)?;
        let lessons = cache
            .load(experiment, *step)
            .with_context(|| format!("no experiences cached for {} step {}", experiment, step))?;
        info!(experiment = %experiment, step, count = lessons.len(), "agent primed with lessons");
        agent = agent.with_experiences(&lessons);
    }
    Ok(agent)
}

fn list_games(category: Option<Category>) {
    for game in registry::games() {
        if let Some(category) = category {
            if !game.categories.contains(&category) {
                continue;
            }
        }
        let categories: Vec<&str> = game.categories.iter().map(|c| c.as_str()).collect();
        println!("{:<40} {:<9} {}", game.id, game.interaction.as_str(), categories.join(", "));
    }
}

async fn play(cfg: &HarnessConfig, game: &str, seed: u64, args: &AgentArgs) -> Result<()> {
    check_game(game, args.allow_unknown)?;
    let client = GameClient::connect(&cfg.server)?;
    let agent = build_agent(cfg, args)?;
    let session = GameSession::new(game, &client, cfg.session.clone());

    let started = Instant::now();
    let result = session.play(&agent, seed).await?;
    info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        tokens = agent.usage().total_tokens(),
        "session finished"
    );

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn eval(cfg: &HarnessConfig, args: &EvalArgs) -> Result<()> {
    check_game(&args.game, args.agent.allow_unknown)?;
    let client = GameClient::connect(&cfg.server)?;
    let agent = build_agent(cfg, &args.agent)?;
    let judge = Judge::new(&client, cfg.session.clone(), cfg.judge.clone());

    let learn = args.experiment.is_some() || cfg.judge.extract_experiences;
    let report = if learn {
        let mut extractor = ExperienceExtractor::new(OpenAIProvider::new(cfg.llm.provider_config())?);
        if let Some(max_tokens) = cfg.llm.max_tokens {
            extractor = extractor.with_max_tokens(max_tokens);
        }
        let (report, experiences) = judge
            .evaluate_and_learn(&agent, &args.game, &args.seeds.0, &extractor)
            .await;
        store_experiences(cfg, args, &experiences)?;
        report
    } else {
        judge.evaluate(&agent, &args.game, &args.seeds.0).await
    };

    emit_report(&report, args.output.as_deref())
}

fn store_experiences(cfg: &HarnessConfig, args: &EvalArgs, experiences: &[Experience]) -> Result<()> {
    match (&args.experiment, args.step) {
        (Some(experiment), Some(step)) => {
            let mut cache = ExperienceCache::file(&cfg.judge.cache_dir)?;
            let saved = cache.save(experiment, step, experiences, args.epoch, args.batch)?;
            eprintln!(
                "{} {} experiences for {} step {}",
                if saved.is_created() { "Cached" } else { "Replaced" },
                experiences.len(),
                experiment,
                step
            );
        }
        _ => {
            for experience in experiences {
                eprintln!("{}", experience);
            }
        }
    }
    Ok(())
}

fn emit_report(report: &EvaluationReport, output: Option<&std::path::Path>) -> Result<()> {
    eprintln!(
        "{}: {}/{} solved (accuracy {:.3}, mean score {:.3}, {} failed)",
        report.game_name,
        report.successes,
        report.total,
        report.accuracy,
        report.mean_score,
        report.failures
    );
    match output {
        Some(path) => {
            report.write_json(path)?;
            eprintln!("Report written to {}", path.display());
        }
        None => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

fn experiences(cfg: &HarnessConfig, command: &ExperienceCommand) -> Result<()> {
    match command {
        ExperienceCommand::Show { experiment, step } => {
            let cache = ExperienceCache::file(&cfg.judge.cache_dir)?;
            let Some(entry) = cache.entry(experiment, *step) else {
                bail!("no experiences cached for {} step {}", experiment, step);
            };
            println!("# {} step {} (saved {})", experiment, step, entry.saved_at);
            for experience in &entry.experiences {
                println!("{}", experience);
            }
        }
        ExperienceCommand::Steps { experiment } => {
            let cache = ExperienceCache::file(&cfg.judge.cache_dir)?;
            for step in cache.steps(experiment) {
                println!("{}", step);
            }
        }
        ExperienceCommand::Clear { experiment } => {
            let mut cache = ExperienceCache::file(&cfg.judge.cache_dir)?;
            if cache.delete_all(experiment)? {
                println!("Cleared experiences for {}", experiment);
            } else {
                println!("Nothing cached for {}", experiment);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let cfg = config::load_config(&cli.config)?;

    match &cli.command {
        Commands::Games { category } => list_games(*category),
        Commands::Play { game, seed, agent } => play(&cfg, game, *seed, agent).await?,
        Commands::Eval(args) => eval(&cfg, args).await?,
        Commands::Experiences { command } => experiences(&cfg, command)?,
        Commands::ShowConfig => print!("{}", cfg.to_toml()?),
    }
    Ok(())
}
