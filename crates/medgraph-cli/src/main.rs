//! Medgraph CLI
//!
//! Command-line interface for:
//! - Importing disease/symptom CSV sources into the graph store (`import`)
//! - Checking what an import produced (`verify`, `schema show`)
//! - Answering medical questions from the graph through an LLM (`ask`)

use anyhow::{bail, Context, Result};
use clap::builder::RangedU64ValueParser;
use clap::{Parser, Subcommand};
use colored::Colorize;
use medgraph_ingest_csv::{
    verify, GraphMergeBuilder, IngestOptions, IngestReport, IngestSource, SourceKind, VerificationSummary,
};
use medgraph_llm::{
    render_schema, LlmConfig, OpenAiClient, QaOptions, QaOutcome, QaPipeline, DEFAULT_MAX_RECORDS,
};
use medgraph_storage::{GraphStore, Neo4jStore, SchemaReport};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod config;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "medgraph")]
#[command(
    author,
    version,
    about = "Medgraph: disease-symptom knowledge graph ingestion and question answering"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import CSV sources into the graph, then verify the result.
    ///
    /// Every row becomes identity merges keyed on the normalized name, so
    /// re-importing the same files leaves the graph unchanged.
    Import {
        /// Directory holding diseases.csv, disease_details.csv and symptoms.csv
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Disease catalog: one disease per row, one symptom per column
        #[arg(long = "diseases")]
        diseases: Vec<PathBuf>,
        /// Disease details: one disease per row, symptoms in one delimited field
        #[arg(long = "details")]
        details: Vec<PathBuf>,
        /// Symptom catalog: one symptom per row with attributes
        #[arg(long = "symptoms")]
        symptoms: Vec<PathBuf>,
        /// Delete every node and relationship before importing
        #[arg(long)]
        reset: bool,
        /// Log progress every N rows (0 disables)
        #[arg(long, default_value_t = 100)]
        progress_every: usize,
    },

    /// Print graph counts, sample pairs and warnings.
    Verify {
        /// Number of (disease, symptom) pairs to sample
        #[arg(long, default_value_t = 5)]
        samples: usize,
    },

    /// Schema management.
    Schema {
        #[command(subcommand)]
        command: SchemaCommands,
    },

    /// Delete every node and relationship.
    Reset {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },

    /// Answer questions from the graph.
    ///
    /// Each question is translated to one Cypher query, executed, and
    /// answered only from the rows it returned.
    Ask {
        /// Print outcomes as JSON
        #[arg(long)]
        json: bool,
        /// Maximum records passed to answer synthesis (at least 1)
        #[arg(
            long,
            default_value_t = DEFAULT_MAX_RECORDS,
            value_parser = RangedU64ValueParser::<usize>::new().range(1..)
        )]
        max_records: usize,
        /// LLM request timeout in seconds, overriding MEDGRAPH_LLM_TIMEOUT_SECS (0 disables)
        #[arg(long)]
        llm_timeout_secs: Option<u64>,
        /// Extra attempts for retryable LLM failures, overriding MEDGRAPH_LLM_MAX_RETRIES
        #[arg(long)]
        llm_retries: Option<u32>,
        /// One or more questions
        #[arg(required = true)]
        questions: Vec<String>,
    },
}

#[derive(Subcommand)]
enum SchemaCommands {
    /// Create labels and name-uniqueness constraints (idempotent)
    Init,
    /// Print the live schema as the query translator sees it
    Show,
}

fn main() -> Result<()> {
    let dotenv = config::load_dotenv();
    init_tracing();
    if let Some(path) = dotenv {
        tracing::debug!(path = %path.display(), "loaded .env");
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Import {
            data_dir,
            diseases,
            details,
            symptoms,
            reset,
            progress_every,
        } => {
            let sources = collect_sources(data_dir, diseases, details, symptoms)?;
            cmd_import(&sources, reset, progress_every)?;
        }
        Commands::Verify { samples } => cmd_verify(samples)?,
        Commands::Schema { command } => match command {
            SchemaCommands::Init => cmd_schema_init()?,
            SchemaCommands::Show => cmd_schema_show()?,
        },
        Commands::Reset { yes } => cmd_reset(yes)?,
        Commands::Ask {
            json,
            max_records,
            llm_timeout_secs,
            llm_retries,
            questions,
        } => {
            let llm = config::with_llm_overrides(
                AppConfig::llm_from_env()?,
                llm_timeout_secs,
                llm_retries,
            );
            cmd_ask(&questions, llm, json, max_records)?
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn connect(config: &AppConfig) -> Result<Neo4jStore> {
    Neo4jStore::connect(&config.graph)
        .with_context(|| format!("failed to connect to graph store at {}", config.graph.uri))
}

// ============================================================================
// Import / Verify
// ============================================================================

fn collect_sources(
    data_dir: Option<PathBuf>,
    diseases: Vec<PathBuf>,
    details: Vec<PathBuf>,
    symptoms: Vec<PathBuf>,
) -> Result<Vec<IngestSource>> {
    let mut sources = Vec::new();
    if let Some(dir) = data_dir {
        if !dir.is_dir() {
            bail!("data directory {} does not exist", dir.display());
        }
        for source in IngestSource::from_data_dir(&dir) {
            if source.path.exists() {
                sources.push(source);
            } else {
                tracing::warn!(path = %source.path.display(), "expected source file not found; skipping");
            }
        }
    }
    // Symptom attributes first, then disease rows that reference them.
    sources.extend(symptoms.into_iter().map(|p| IngestSource::new(SourceKind::SymptomCatalog, p)));
    sources.extend(diseases.into_iter().map(|p| IngestSource::new(SourceKind::DiseaseCatalog, p)));
    sources.extend(details.into_iter().map(|p| IngestSource::new(SourceKind::DiseaseDetails, p)));

    if sources.is_empty() {
        bail!("no sources given; pass --data-dir or --diseases/--details/--symptoms");
    }
    Ok(sources)
}

fn cmd_import(sources: &[IngestSource], reset: bool, progress_every: usize) -> Result<()> {
    let config = AppConfig::from_env()?;
    let store = connect(&config)?;

    if reset {
        store.reset().context("failed to reset graph")?;
        eprintln!("{} cleared all nodes and relationships", "reset".yellow().bold());
    }
    let schema = store.ensure_schema().context("schema initialization failed")?;
    print_schema_report(&schema);

    eprintln!("{} {} sources", "Importing".green().bold(), sources.len());
    let options = IngestOptions {
        progress_every,
        ..IngestOptions::default()
    };
    let report = GraphMergeBuilder::new(&store, options).ingest_all(sources);
    print_ingest_report(&report);

    let summary = verify(&store, Some(&report), 5).context("verification failed")?;
    print_verification(&summary);
    Ok(())
}

fn cmd_verify(samples: usize) -> Result<()> {
    let config = AppConfig::from_env()?;
    let store = connect(&config)?;
    let summary = verify(&store, None, samples).context("verification failed")?;
    print_verification(&summary);
    Ok(())
}

fn print_ingest_report(report: &IngestReport) {
    for source in &report.sources {
        println!(
            "{} {} [{}] {}: rows={} merged={} skipped={} failed={} malformed={} edges={}",
            "ok".green().bold(),
            source.path.display(),
            source.encoding,
            format!("{:?}", source.kind).dimmed(),
            source.rows_seen,
            source.rows_merged,
            source.rows_skipped,
            source.rows_failed,
            source.malformed_rows,
            source.edge_merges,
        );
        for failure in &source.failures {
            println!(
                "  {} line {}: {:?}: {}",
                "failed".red(),
                failure.line,
                failure.item,
                failure.error
            );
        }
    }
    for unreadable in &report.unreadable {
        println!(
            "{} {}: {}",
            "unreadable".red().bold(),
            unreadable.path.display(),
            unreadable.reason
        );
    }
    let elapsed = report.finished_at - report.started_at;
    println!(
        "imported {} of {} rows in {}ms",
        report.rows_merged(),
        report.rows_seen(),
        elapsed.num_milliseconds()
    );
}

fn print_verification(summary: &VerificationSummary) {
    println!("{}", "Graph".cyan().bold());
    println!("  Disease nodes:           {}", summary.counts.diseases);
    println!("  Symptom nodes:           {}", summary.counts.symptoms);
    println!("  HAS_SYMPTOM relationships: {}", summary.counts.has_symptom);
    if !summary.samples.is_empty() {
        println!("{}", "Samples".cyan().bold());
        for (disease, symptom) in &summary.samples {
            println!("  {disease} -[HAS_SYMPTOM]-> {symptom}");
        }
    }
    for warning in &summary.warnings {
        println!("{} {warning}", "warning:".yellow().bold());
    }
    if summary.is_clean() {
        println!("{}", "verification clean".green());
    }
}

// ============================================================================
// Schema / Reset
// ============================================================================

fn cmd_schema_init() -> Result<()> {
    let config = AppConfig::from_env()?;
    let store = connect(&config)?;
    let report = store.ensure_schema().context("schema initialization failed")?;
    print_schema_report(&report);
    Ok(())
}

fn cmd_schema_show() -> Result<()> {
    let config = AppConfig::from_env()?;
    let store = connect(&config)?;
    eprintln!("{} {:?}", "dialect".dimmed(), store.dialect());
    let labels = store.labels().context("failed to read labels")?;
    let counts = store.counts().ok();
    print!("{}", render_schema(&labels, counts.as_ref()));
    Ok(())
}

fn print_schema_report(report: &SchemaReport) {
    for name in &report.created {
        eprintln!("{} {name}", "created".green());
    }
    for name in &report.existing {
        eprintln!("{} {name}", "exists".dimmed());
    }
}

fn cmd_reset(yes: bool) -> Result<()> {
    if !yes {
        bail!("refusing to delete the whole graph without --yes");
    }
    let config = AppConfig::from_env()?;
    let store = connect(&config)?;
    store.reset().context("failed to reset graph")?;
    println!("{} cleared all nodes and relationships", "ok".green().bold());
    Ok(())
}

// ============================================================================
// Ask
// ============================================================================

fn cmd_ask(questions: &[String], llm: LlmConfig, json: bool, max_records: usize) -> Result<()> {
    let config = AppConfig::from_env()?;
    let store = connect(&config)?;
    let client = OpenAiClient::new(llm).context("failed to build LLM client")?;
    let endpoint = client.config();
    tracing::info!(
        model = %endpoint.model,
        url = %endpoint.chat_completions_url(),
        timeout = ?endpoint.timeout,
        retries = endpoint.max_retries,
        "using LLM endpoint"
    );

    let options = QaOptions {
        max_records,
        ..QaOptions::default()
    };
    let pipeline = QaPipeline::new(&store, &client, options);

    let mut outcomes = Vec::with_capacity(questions.len());
    for question in questions {
        let outcome = pipeline.ask(question);
        if !json {
            print_outcome(&outcome);
        }
        outcomes.push(outcome);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
    }

    if outcomes.iter().all(|o| !o.is_answered()) {
        bail!("all {} questions failed", outcomes.len());
    }
    Ok(())
}

fn print_outcome(outcome: &QaOutcome) {
    println!("{} {}", "Q:".cyan().bold(), outcome.question);
    if let Some(query) = &outcome.query {
        println!("{} {}", "Cypher:".dimmed(), query.dimmed());
    }
    if outcome.total_records > 0 {
        let note = if outcome.truncated {
            format!(" (first {} passed on)", outcome.records.len())
        } else {
            String::new()
        };
        println!("{} {}{note}", "Records:".dimmed(), outcome.total_records);
    }
    match (&outcome.answer, &outcome.error) {
        (Some(answer), _) => println!(
            "{} {answer} {}",
            "A:".green().bold(),
            format!("[{}]", outcome.model).dimmed()
        ),
        (None, Some(err)) => {
            let hint = if err.retryable { " (retryable)" } else { "" };
            println!("{} [{}] {}{hint}", "error:".red().bold(), err.kind, err.message);
        }
        (None, None) => {}
    }
    println!();
}
