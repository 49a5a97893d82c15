//! rndsearch CLI
//!
//! One-shot questions (`ask`) or an interactive chat loop (`chat`) against
//! the configured backends.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use rndsearch_core::{Config, Level};
use rndsearch_embeddings::ApiEmbeddingProvider;
use rndsearch_llm::LlmClient;
use rndsearch_storage::{EsClient, GraphClient, PostgresClient, QdrantStore};
use rndsearch_workflow::WorkflowContext;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rndsearch", about = "Multi-source R&D retrieval orchestrator", version)]
struct Cli {
    /// Config file path (TOML); environment overrides use RNDSEARCH_*
    #[arg(long, global = true, default_value = "rndsearch.toml")]
    config: PathBuf,

    /// Print sources and stage timing with the answer
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a single question and print the answer
    Ask {
        /// The question
        query: String,

        /// Session id for conversation continuity
        #[arg(long, default_value = "default")]
        session: String,

        /// Literacy level (L1..L6)
        #[arg(long, default_value = "L3")]
        level: String,

        /// Restrict the search to these entity types (repeatable)
        #[arg(long = "entity")]
        entity_types: Vec<String>,
    },

    /// Interactive chat loop
    Chat {
        #[arg(long, default_value = "default")]
        session: String,

        #[arg(long, default_value = "L3")]
        level: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("rndsearch=info,rndsearch_workflow=info,warn")
        }))
        .init();

    let cli = Cli::parse();

    let config = Config::from_file(&cli.config).context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;

    let ctx = Arc::new(build_context(config).await?);

    match cli.command {
        Command::Ask {
            query,
            session,
            level,
            entity_types,
        } => {
            let entity_types = (!entity_types.is_empty()).then_some(entity_types);
            let result = ctx
                .run_workflow(&query, &session, Level::parse(&level), entity_types)
                .await;
            print_result(&result, cli.verbose);
        }
        Command::Chat { session, level } => {
            let level = Level::parse(&level);
            println!("rndsearch chat ('quit'로 종료)");
            let stdin = std::io::stdin();
            loop {
                print!("> ");
                std::io::stdout().flush()?;
                let mut line = String::new();
                if stdin.lock().read_line(&mut line)? == 0 {
                    break;
                }
                let query = line.trim();
                if query.is_empty() {
                    continue;
                }
                if query == "quit" || query == "exit" {
                    break;
                }
                let result = ctx.run_workflow(query, &session, level, None).await;
                print_result(&result, cli.verbose);
            }
        }
    }

    Ok(())
}

async fn build_context(config: Config) -> Result<WorkflowContext> {
    info!("initializing backends");

    let llm = Arc::new(LlmClient::new(&config.llm)?);
    let embeddings = Arc::new(ApiEmbeddingProvider::new(&config.embeddings)?);
    let vector = Arc::new(QdrantStore::new(&config.qdrant)?);
    let es = Arc::new(EsClient::new(&config.elasticsearch)?);
    let graph = Arc::new(GraphClient::new(&config.graph)?);
    let sql = Arc::new(
        PostgresClient::connect(&config.database)
            .await
            .context("failed to connect to PostgreSQL")?,
    );

    Ok(WorkflowContext::new(
        config, llm, embeddings, vector, es, graph, sql,
    ))
}

fn print_result(result: &rndsearch_workflow::WorkflowResult, verbose: bool) {
    println!("{}", result.response);

    if verbose {
        if let Some(sql) = &result.generated_sql {
            println!("\n[SQL] {sql}");
        }
        if !result.sources.is_empty() {
            println!("\n[sources]");
            for source in &result.sources {
                println!(
                    "  - {} {}",
                    source.kind,
                    source
                        .title
                        .as_deref()
                        .or(source.node_id.as_deref())
                        .unwrap_or("")
                );
            }
        }
        println!("\n[timing]");
        let mut timings: Vec<_> = result.stage_timing.iter().collect();
        timings.sort_by(|a, b| a.0.cmp(b.0));
        for (stage, ms) in timings {
            println!("  {stage}: {ms:.1}ms");
        }
        println!("  total: {:.1}ms (quality {:.2})", result.elapsed_ms, result.context_quality);
        if let Some(error) = &result.error {
            println!("\n[errors] {error}");
        }
    }
}
