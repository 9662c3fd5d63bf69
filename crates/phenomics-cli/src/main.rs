//! Phenomics CLI - ask questions of a biomedical knowledge graph

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use phenomics_core::agent::{QueryAgent, prompts};
use phenomics_core::config::Config;
use phenomics_core::database::{GraphBackend, Neo4jBackend, ReplayBackend, parse_params};
use phenomics_core::evaluation::{
    EvaluationLog, EvaluationOrchestrator, EvaluationOutcome, EvaluationRecord, LlmReviewer,
    OrchestratorConfig,
};
use phenomics_core::graph::{ClassifiedResult, GraphProjector, QualifierLabels, ResultShape};
use phenomics_core::llm::LlmClient;
use phenomics_core::query::QueryExecutor;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "phenomics")]
#[command(author, version, about = "Ask questions of a biomedical knowledge graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Serve query results from a recorded fixture instead of Neo4j
    #[arg(long, global = true, value_name = "PATH")]
    fixture: Option<PathBuf>,
}

#[derive(Clone, Copy, Default, PartialEq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one Cypher query through evaluation
    Query {
        /// Cypher query text
        cypher: String,
        /// Query parameters as a JSON object
        #[arg(short, long)]
        params: Option<String>,
        /// Result shape (auto, graph or table)
        #[arg(short, long, default_value = "auto")]
        shape: String,
        /// Skip the reviewer; only the size budget applies
        #[arg(long)]
        no_review: bool,
    },

    /// Ask a single question
    Ask {
        /// Question in plain language
        question: String,
    },

    /// Start an interactive conversation
    Chat,

    /// List node labels in the graph
    Labels,

    /// List relationship types in the graph
    Relationships,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run health check
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
    /// Reset to defaults
    Reset,
    /// Show config file path
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("phenomics=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let fixture = cli.fixture.as_deref();

    match cli.command {
        Commands::Query {
            cypher,
            params,
            shape,
            no_review,
        } => {
            cmd_query(
                &cypher,
                params.as_deref(),
                &shape,
                no_review,
                fixture,
                cli.format,
                cli.quiet,
            )
            .await
        }

        Commands::Ask { question } => cmd_ask(&question, fixture, cli.format, cli.quiet).await,

        Commands::Chat => cmd_chat(fixture, cli.quiet).await,

        Commands::Labels => cmd_labels(false, fixture, cli.format).await,

        Commands::Relationships => cmd_labels(true, fixture, cli.format).await,

        Commands::Config { action } => cmd_config(action, cli.quiet),

        Commands::Doctor => cmd_doctor(fixture, cli.quiet).await,
    }
}

/// Attach the error's suggestion, if it has one
fn hint(error: phenomics_core::Error) -> anyhow::Error {
    match error.suggestion() {
        Some(suggestion) => anyhow::anyhow!("[{}] {}\n  Try: {}", error.code(), error, suggestion),
        None => anyhow::anyhow!("[{}] {}", error.code(), error),
    }
}

async fn open_backend(
    config: &Config,
    fixture: Option<&Path>,
) -> anyhow::Result<Arc<dyn GraphBackend>> {
    let backend: Arc<dyn GraphBackend> = match fixture {
        Some(path) => {
            info!(fixture = %path.display(), "Using recorded results");
            Arc::new(ReplayBackend::from_file(path).map_err(hint)?)
        }
        None => Arc::new(Neo4jBackend::connect(&config.database).await.map_err(hint)?),
    };
    Ok(backend)
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn cmd_query(
    cypher: &str,
    params: Option<&str>,
    shape: &str,
    no_review: bool,
    fixture: Option<&Path>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let shape: ResultShape = shape.parse().map_err(hint)?;
    let params = params.map(parse_params).transpose().map_err(hint)?;

    let config = Config::load()?;
    let backend = open_backend(&config, fixture).await?;

    let executor = QueryExecutor::from_config(backend, &config.database)
        .with_projector(GraphProjector::default().with_qualifiers(QualifierLabels::monarch()));
    let mut orchestrator = EvaluationOrchestrator::new(executor)
        .with_config(OrchestratorConfig::from(&config.evaluation));

    if config.evaluation.reviewer_enabled && !no_review {
        let model = LlmClient::from_config(&config.llm).map_err(hint)?;
        let summary = prompts::load_graph_summary(config.agent.graph_summary_path.as_deref())
            .map_err(hint)?;
        let reviewer = LlmReviewer::new(Arc::new(model))
            .with_model(config.evaluation.reviewer_model.clone())
            .with_system_prompt(prompts::evaluator_system_prompt(&summary))
            .with_instructions(prompts::INSTRUCTIONS);
        orchestrator = orchestrator.with_reviewer(Arc::new(reviewer));
    }

    let mut log = EvaluationLog::new();
    let outcome = orchestrator
        .evaluate_as(cypher, params.as_ref(), shape, &[], &mut log)
        .await
        .map_err(hint)?;

    if !quiet && format == OutputFormat::Text {
        print_evaluations(log.entries());
    }

    match outcome {
        EvaluationOutcome::Accepted { result, .. } => {
            print_result(&result, format)?;
            Ok(())
        }
        EvaluationOutcome::Retry(failure) => {
            if format == OutputFormat::Json {
                print_result(&ClassifiedResult::from(&failure), format)?;
            }
            Err(anyhow::anyhow!("{}", failure))
        }
    }
}

async fn build_agent(fixture: Option<&Path>) -> anyhow::Result<QueryAgent> {
    let config = Config::load()?;
    let backend = open_backend(&config, fixture).await?;
    let model = LlmClient::from_config(&config.llm).map_err(hint)?;

    QueryAgent::from_config(&config, backend, Arc::new(model))
        .await
        .map_err(hint)
}

async fn cmd_ask(
    question: &str,
    fixture: Option<&Path>,
    format: OutputFormat,
    quiet: bool,
) -> anyhow::Result<()> {
    let mut agent = build_agent(fixture).await?;
    let turn = agent.ask(question).await.map_err(hint)?;

    match format {
        OutputFormat::Json => {
            let result = turn.result.as_ref().map(ClassifiedResult::to_json).transpose()?;
            let output = json!({
                "answer": turn.answer,
                "result": result,
                "evaluations": turn.evaluations,
                "tool_calls": turn.tool_calls,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            if !quiet {
                print_evaluations(&turn.evaluations);
            }
            println!("{}", turn.answer);
        }
    }
    Ok(())
}

async fn cmd_chat(fixture: Option<&Path>, quiet: bool) -> anyhow::Result<()> {
    let mut agent = build_agent(fixture).await?;
    let mut editor = DefaultEditor::new()?;

    if !quiet {
        println!("{}", prompts::GREETING);
        println!("\nType :reset to start over, :quit to exit. Ctrl-C cancels a question.");
    }

    loop {
        let line = match editor.readline("phenomics> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(anyhow::anyhow!("readline error: {}", e)),
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        editor.add_history_entry(line)?;

        match line {
            ":quit" | ":q" | "exit" => break,
            ":reset" => {
                agent.reset();
                println!("Conversation cleared.");
                continue;
            }
            _ => {}
        }

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        let outcome = agent.ask_cancellable(line, &cancel).await;
        watcher.abort();

        match outcome {
            Ok(turn) => {
                if !quiet {
                    print_evaluations(&turn.evaluations);
                }
                println!("\n{}\n", turn.answer);
            }
            Err(phenomics_core::Error::UserCancelled) => println!("(cancelled)"),
            Err(e) => {
                warn!(error = %e, "Question failed");
                eprintln!("{}", hint(e));
            }
        }
    }
    Ok(())
}

async fn cmd_labels(
    relationships: bool,
    fixture: Option<&Path>,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let config = Config::load()?;
    let backend = open_backend(&config, fixture).await?;
    let executor = QueryExecutor::from_config(backend, &config.database);

    let names = if relationships {
        executor.list_relationship_types().await
    } else {
        executor.list_labels().await
    }
    .map_err(hint)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&names)?),
        OutputFormat::Text => {
            for name in names {
                println!("{}", name);
            }
        }
    }
    Ok(())
}

fn cmd_config(action: ConfigAction, quiet: bool) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            let value = config.get(&key)?;
            println!("{}", value);
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            config.save()?;
            if !quiet {
                println!("Set {} = {}", key, value);
            }
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for (key, value) in config.list()? {
                println!("{} = {}", key, value);
            }
        }
        ConfigAction::Reset => {
            Config::reset()?;
            if !quiet {
                println!("Configuration reset to defaults.");
            }
        }
        ConfigAction::Path => {
            let path = Config::config_path()?;
            println!("{}", path.display());
        }
    }
    Ok(())
}

async fn cmd_doctor(fixture: Option<&Path>, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("Phenomics Health Check");
        println!("======================");
        println!();
    }

    let mut all_ok = true;

    let config = match Config::load() {
        Ok(config) => {
            if !quiet {
                println!("[OK] Configuration: Valid");
            }
            Some(config)
        }
        Err(e) => {
            all_ok = false;
            if !quiet {
                println!("[!!] Configuration: Error - {}", e);
            }
            None
        }
    };

    if !quiet {
        match Config::config_path() {
            Ok(path) if path.exists() => println!("[OK] Config file: {}", path.display()),
            Ok(path) => println!("[--] Config file: {} (using defaults)", path.display()),
            Err(e) => println!("[!!] Config file: Error - {}", e),
        }
    }

    if let Some(config) = &config {
        match config.llm.resolved_api_key() {
            Ok(Some(_)) => {
                if !quiet {
                    let redacted = config.llm.redacted_api_key()?.unwrap_or_default();
                    println!("[OK] API Key: Configured ({})", redacted);
                }
            }
            Ok(None) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] API Key: Not configured");
                    println!("     Set PHENOMICS_API_KEY or OPENROUTER_API_KEY environment variable");
                }
            }
            Err(e) => {
                all_ok = false;
                if !quiet {
                    println!("[!!] API Key: Error - {}", e);
                }
            }
        }

        if let Some(path) = fixture {
            match ReplayBackend::from_file(path) {
                Ok(_) => {
                    if !quiet {
                        println!("[OK] Fixture: {}", path.display());
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] Fixture: {}", e);
                    }
                }
            }
        } else {
            let database = match Neo4jBackend::connect(&config.database).await {
                Ok(backend) => backend.ping().await.map(|_| backend),
                Err(e) => Err(e),
            };
            match database {
                Ok(_) => {
                    if !quiet {
                        println!("[OK] Database: Connected ({})", config.database.uri);
                    }
                }
                Err(e) => {
                    all_ok = false;
                    if !quiet {
                        println!("[!!] Database: {} - {}", config.database.uri, e);
                        println!("     Set NEO4J_URI, NEO4J_USER and NEO4J_PASSWORD or run `phenomics config set database.uri <uri>`");
                    }
                }
            }
        }
    }

    if !quiet {
        println!();
        if all_ok {
            println!("All checks passed!");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }

    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_evaluations(entries: &[EvaluationRecord]) {
    for entry in entries {
        if entry.is_accepted() {
            println!("[OK] {}", entry.verdict.query_summary);
        } else {
            let reason = entry.reason.map_or("rejected", |r| r.as_str());
            println!("[!!] {}: {}", reason, entry.verdict.suggestion);
        }
    }
}

fn print_result(result: &ClassifiedResult, format: OutputFormat) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    match result {
        ClassifiedResult::Graph { graph, rows } => {
            println!(
                "Graph: {} nodes, {} edges",
                graph.nodes.len(),
                graph.edges.len()
            );
            for node in &graph.nodes {
                match node.category() {
                    Some(category) => println!("  {} [{}] {}", node.id, category, node.caption),
                    None => println!("  {} {}", node.id, node.caption),
                }
            }
            for edge in &graph.edges {
                println!("  {} -[{}]-> {}", edge.source, edge.edge_type, edge.target);
            }
            for row in rows {
                println!("  {}", serde_json::Value::Object(row.clone()));
            }
        }
        ClassifiedResult::Table { rows } => {
            println!("Table: {} rows", rows.len());
            for row in rows {
                println!("  {}", serde_json::Value::Object(row.clone()));
            }
        }
        ClassifiedResult::Error { message } => println!("Error: {}", message),
    }
    Ok(())
}
