//! Queryloom CLI — thin driver for the orchestration pipeline.
//!
//! Ingests a JSONL passage file into the in-memory index, routes and
//! answers questions, and prints the staged result. All orchestration
//! logic lives in `queryloom-core`.

use anyhow::{Context, Result};
use clap::Parser;
use queryloom_core::config::load_config;
use queryloom_core::embed::build_embedder;
use queryloom_core::generate::{Generator, OpenAiCompatibleGenerator};
use queryloom_core::pipeline::{Pipeline, PipelineAnswer};
use queryloom_core::retrieve::MemoryIndex;
use queryloom_core::router::{RuleRouter, SemanticRouter, StrategyRouter};
use queryloom_core::synthesize::SynthesisResolution;
use queryloom_core::{FusionPolicy, Passage, Query, StrategyTag};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Queryloom: multi-query retrieval orchestration
#[derive(Parser, Debug)]
#[command(name = "queryloom", version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Answer a question over a passage file
    Ask {
        /// The question to answer
        question: String,

        /// JSONL file of passages: {"text": ..., "source_locator": ...}
        #[arg(short, long)]
        passages: PathBuf,

        /// Force a strategy instead of routing: decompose, hyde, stepback, direct
        #[arg(short, long)]
        strategy: Option<String>,

        /// Use the consensus filter instead of reciprocal rank fusion
        #[arg(long)]
        consensus: bool,

        /// Answer decomposed queries sub-query by sub-query
        #[arg(long)]
        sequential: bool,

        /// Route with the embedding-nearest-neighbor router
        #[arg(long)]
        semantic: bool,
    },
    /// Print the routed strategy for a question
    Route {
        question: String,

        /// Route with the embedding-nearest-neighbor router
        #[arg(long)]
        semantic: bool,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn parse_strategy(s: &str) -> Result<StrategyTag> {
    match s.to_lowercase().as_str() {
        "decompose" => Ok(StrategyTag::Decompose),
        "hyde" => Ok(StrategyTag::Hyde),
        "stepback" => Ok(StrategyTag::StepBack),
        "direct" => Ok(StrategyTag::Direct),
        other => anyhow::bail!("unknown strategy '{other}'"),
    }
}

fn load_passages(path: &PathBuf) -> Result<Vec<Passage>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening passage file {}", path.display()))?;
    let mut passages = Vec::new();
    for (line_no, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let passage: Passage = serde_json::from_str(&line)
            .with_context(|| format!("parsing passage on line {}", line_no + 1))?;
        passages.push(passage);
    }
    Ok(passages)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Route { question, semantic } => {
            let router: Arc<dyn StrategyRouter> = if semantic {
                let embedder = build_embedder(&config.embedding)?;
                Arc::new(SemanticRouter::with_default_exemplars(embedder).await?)
            } else {
                Arc::new(RuleRouter::new())
            };
            let tag = router.classify(&Query::new(&question)).await?;
            println!("{tag}");
        }
        Commands::Ask {
            question,
            passages,
            strategy,
            consensus,
            sequential,
            semantic,
        } => {
            let embedder = build_embedder(&config.embedding)?;
            let index = Arc::new(MemoryIndex::new(embedder.clone()));
            let loaded = load_passages(&passages)?;
            let count = index.add(loaded).await?;
            tracing::info!(count, "Indexed passages");

            let generator = Arc::new(OpenAiCompatibleGenerator::new(&config.generation)?);
            tracing::info!(model = generator.model_name(), "Generation provider ready");
            let router: Arc<dyn StrategyRouter> = if semantic {
                Arc::new(SemanticRouter::with_default_exemplars(embedder).await?)
            } else {
                Arc::new(RuleRouter::new())
            };

            let mut pipeline_config = config.pipeline.clone();
            if consensus {
                pipeline_config.fusion_policy = FusionPolicy::Consensus;
            }
            if sequential {
                pipeline_config.sequential_decomposition = true;
            }

            let pipeline = Pipeline::new(router, generator, index, pipeline_config);

            let response = match strategy {
                Some(s) => {
                    let tag = parse_strategy(&s)?;
                    pipeline.run_with_strategy(Query::new(&question), tag).await?
                }
                None => pipeline.run(&question).await?,
            };

            println!("strategy: {}", response.strategy);
            for sub in &response.sub_queries {
                println!("sub-query {} ({}): {}", sub.index + 1, sub.origin, sub.text);
            }
            println!();

            match response.answer {
                PipelineAnswer::Staged(staged) => {
                    for stage in &staged.stages {
                        println!("[{:?}] {}", stage.stage, stage.content);
                    }
                    match staged.resolution {
                        SynthesisResolution::Final { content, sources } => {
                            println!("\nanswer: {content}");
                            if !sources.is_empty() {
                                println!("sources: {}", sources.join(", "));
                            }
                        }
                        SynthesisResolution::Unavailable => {
                            println!("\nanswer unavailable: no well-formed final response");
                        }
                    }
                }
                PipelineAnswer::Decomposed(decomposed) => {
                    for sub in &decomposed.sub_answers {
                        println!("- {} => {}", sub.sub_query, sub.answer);
                    }
                    println!("\nanswer: {}", decomposed.final_answer);
                }
            }
        }
    }

    Ok(())
}
