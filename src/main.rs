//! Callsight CLI - structured insights from call transcripts
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments, wiring the pipeline together and handling top-level errors.

use anyhow::Context;
use callsight::eval::{self, Check, EvalSummary};
use callsight::{agent, pipeline::ErrorKind, Analyzer, Config, InsightStore, PromptBuilder, SearchIndex};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "callsight")]
#[command(author, version, about = "Structured insights from call transcripts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze a transcript and store the resulting insight
    Analyze {
        /// Transcript text; read from --file or stdin when omitted
        transcript: Option<String>,
        /// Read the transcript from a file
        #[arg(long, short, conflicts_with = "transcript")]
        file: Option<PathBuf>,
    },
    /// Show a stored call record as JSON
    Show {
        /// Record id
        id: u64,
    },
    /// List all stored call records
    List,
    /// Search stored call records
    Search {
        /// Search query
        query: String,
        /// Maximum number of results
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Print the JSON Schema of the insight contract
    Schema,
    /// Score the pipeline against a labelled dataset
    Eval {
        /// JSON array of labelled calls
        dataset: PathBuf,
        /// Print the full report as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze { transcript, file } => {
            let transcript = read_transcript(transcript, file)?;
            let code = analyze(&transcript).await?;
            if code != 0 {
                std::process::exit(code);
            }
        }
        Commands::Show { id } => {
            let store = open_store(&Config::load()?)?;
            match store.get(id)? {
                Some(record) => println!("{}", serde_json::to_string_pretty(&record)?),
                None => anyhow::bail!("no call record with id {}", id),
            }
        }
        Commands::List => {
            let store = open_store(&Config::load()?)?;
            let records = store.list_all()?;

            if records.is_empty() {
                println!("No stored call records found.");
            } else {
                println!("Stored call records ({}):\n", records.len());
                for record in &records {
                    print_record_line(record);
                }
            }
        }
        Commands::Search { query, limit } => {
            let config = Config::load()?;
            let store = open_store(&config)?;

            // Try tantivy first, fall back to simple search
            let results = match SearchIndex::open(config.search_index_path()?) {
                Ok(index) => match index.search(&query, limit) {
                    Ok(ids) if !ids.is_empty() => ids,
                    _ => simple_search(&store, &query)?,
                },
                Err(_) => simple_search(&store, &query)?,
            };

            if results.is_empty() {
                println!("No results found for: {}", query);
            } else {
                println!("Search results for '{}':\n", query);
                for id in results.into_iter().take(limit) {
                    if let Ok(Some(record)) = store.get(id) {
                        print_record_line(&record);
                    }
                }
            }
        }
        Commands::Schema => {
            println!("{}", serde_json::to_string_pretty(&callsight::insight::json_schema())?);
        }
        Commands::Eval { dataset, json } => {
            let calls = eval::load_dataset(&dataset)
                .with_context(|| format!("failed to load {}", dataset.display()))?;
            let (config, analyzer) = build_analyzer()?;

            let outcomes = eval::run(&analyzer, &calls).await;
            for outcome in &outcomes {
                if let eval::CaseResult::Analyzed { record_id, .. } = outcome.result {
                    index_record(&config, analyzer.store(), record_id);
                }
            }

            let summary = EvalSummary::compile(&outcomes);
            if json {
                let report = serde_json::json!({ "summary": summary, "cases": outcomes });
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_eval_report(&summary, &outcomes);
            }
        }
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("callsight=info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Run one transcript through the pipeline and print the outcome as JSON.
///
/// Startup problems are returned as errors; pipeline failures are printed and
/// turned into the process exit code.
async fn analyze(transcript: &str) -> anyhow::Result<i32> {
    let (config, analyzer) = build_analyzer()?;

    match analyzer.analyze(transcript).await {
        Ok(analysis) => {
            index_record(&config, analyzer.store(), analysis.record_id);
            println!("{}", serde_json::to_string_pretty(&analysis)?);
            Ok(0)
        }
        Err(err) => {
            let kind = err.kind();
            let body = serde_json::json!({
                "error": kind,
                "message": err.to_string(),
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(exit_code(kind))
        }
    }
}

/// Load and validate config, then wire the model and store into an `Analyzer`.
fn build_analyzer() -> anyhow::Result<(Config, Analyzer)> {
    let config = Config::load()?;
    config.validate().context("refusing to start")?;

    let store = open_store(&config)?;
    let invoker = agent::from_config(&config)?;
    let analyzer = Analyzer::new(Arc::from(invoker), store, config.agent.timeout())
        .with_prompt(PromptBuilder::new(config.agent.persona.clone()))
        .with_raw_output_logging(config.diagnostics.log_raw_output);
    Ok((config, analyzer))
}

fn exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::InvalidInput => 2,
        ErrorKind::GenerationFailure => 3,
        ErrorKind::ParseFailure => 4,
        ErrorKind::SchemaFailure => 5,
        ErrorKind::PersistenceFailure => 6,
    }
}

/// Best-effort: a failed index never fails the analysis.
fn index_record(config: &Config, store: &InsightStore, record_id: u64) {
    let indexed = config
        .search_index_path()
        .map_err(anyhow::Error::from)
        .and_then(|path| Ok(SearchIndex::open(path)?))
        .and_then(|index| {
            if let Some(record) = store.get(record_id)? {
                index.index_record(&record)?;
            }
            Ok(())
        });
    if let Err(e) = indexed {
        tracing::warn!(record_id, error = %e, "failed to index call record");
    }
}

fn open_store(config: &Config) -> anyhow::Result<InsightStore> {
    let store = InsightStore::open(config.storage_path()?)?;
    store.ensure_schema()?;
    Ok(store)
}

fn read_transcript(arg: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    if let Some(text) = arg {
        return Ok(text);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read transcript from {}", path.display()));
    }
    if atty::is(atty::Stream::Stdin) {
        anyhow::bail!("no transcript given: pass it as an argument, with --file, or on stdin");
    }
    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;
    Ok(text)
}

fn print_record_line(record: &callsight::CallRecord) {
    let insight = &record.insight;
    let flag = if insight.action_required {
        "action required".red().to_string()
    } else {
        "no action".green().to_string()
    };
    println!(
        "📞 #{} {} ({})",
        record.id.to_string().bold(),
        insight.call_purpose,
        record.created_at.format("%Y-%m-%d %H:%M")
    );
    println!(
        "   {} → {} | rating {}/10 | {}",
        insight.sentiment_start, insight.sentiment_end, insight.agent_performance_rating, flag
    );
    println!("   {}\n", insight.summary);
}

fn print_eval_report(summary: &EvalSummary, outcomes: &[eval::CaseOutcome]) {
    println!("{}", "Evaluation report".bold());
    println!(
        "Calls: {} | analyzed: {} | failed: {} | success rate: {:.1}%",
        summary.total, summary.successful, summary.failed, summary.success_rate
    );

    if !summary.accuracy.is_empty() {
        println!("\nAccuracy:");
        for field in &summary.accuracy {
            let line = format!("  {:<20} {:>5.1}%", field.check.as_str(), field.percent);
            match field.check.target() {
                Some(target) if field.percent < target => println!("{}", line.yellow()),
                _ => println!("{}", line),
            }
        }
    }

    println!("\nBy stage:");
    for stage in &summary.stages {
        println!("  {}: {}/{}", stage.stage, stage.successful, stage.total);
    }

    println!("\nCalls:");
    for outcome in outcomes {
        match &outcome.result {
            eval::CaseResult::Analyzed { record_id, scores } => {
                let missed: Vec<&str> = Check::ALL
                    .iter()
                    .filter(|&&check| !scores.passed(check))
                    .map(|check| check.as_str())
                    .collect();
                let status = if missed.is_empty() {
                    "all checks passed".green().to_string()
                } else {
                    format!("missed: {}", missed.join(", ")).yellow().to_string()
                };
                println!("  #{} {} → record {} | {}", outcome.id, outcome.stage, record_id, status);
            }
            eval::CaseResult::Failed { error, message } => {
                println!(
                    "  #{} {} → {}",
                    outcome.id,
                    outcome.stage,
                    format!("{}: {}", error, message).red()
                );
            }
        }
    }

    let shortfalls = summary.shortfalls();
    if !shortfalls.is_empty() {
        println!("\nBelow target:");
        for note in shortfalls {
            println!("  - {}", note);
        }
    }
}

/// Simple text-based search fallback when tantivy index is not available
fn simple_search(store: &InsightStore, query: &str) -> anyhow::Result<Vec<u64>> {
    let query_lower = query.to_lowercase();
    let records = store.list_all()?;

    let results: Vec<u64> = records
        .into_iter()
        .filter(|record| {
            let insight = &record.insight;
            [
                record.transcript.as_str(),
                insight.customer_intent.as_str(),
                insight.call_purpose.as_str(),
                insight.key_results.as_str(),
                insight.summary.as_str(),
            ]
            .iter()
            .any(|text| text.to_lowercase().contains(&query_lower))
        })
        .map(|record| record.id)
        .collect();

    Ok(results)
}
