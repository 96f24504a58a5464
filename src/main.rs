use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use strike_ledger::app::LedgerUseCase;
use strike_ledger::config::PipelineConfig;
use strike_ledger::infra::{PipeTableAdapter, StaticGazetteer};
use strike_ledger::logging;
use strike_ledger::pipeline::ingestion::{read_candidates, IngestBatch};
use strike_ledger::pipeline::CandidateStore;

const CONFIG_ENV: &str = "STRIKE_LEDGER_CONFIG";

#[derive(Parser)]
#[command(name = "strike_ledger")]
#[command(about = "Deduplicates and validates strike incident reports into one table")]
#[command(version)]
struct Cli {
    /// Pipeline configuration (TOML). Falls back to $STRIKE_LEDGER_CONFIG, then defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the incident table from a JSONL file of candidate reports
    Run {
        #[arg(long)]
        input: PathBuf,
        /// Pipe-delimited table to write
        #[arg(long)]
        output: PathBuf,
        /// JSON run report; defaults to <output>.report.json
        #[arg(long)]
        report: Option<PathBuf>,
        /// Gazetteer table (TOML); overrides [gazetteer].path
        #[arg(long)]
        gazetteer: Option<PathBuf>,
    },
    /// Report which candidates would be admitted, without clustering
    Check {
        #[arg(long)]
        input: PathBuf,
    },
}

fn load_config(flag: Option<PathBuf>) -> Result<PipelineConfig> {
    let path = flag.or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));
    match path {
        Some(path) => PipelineConfig::load(&path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn read_input(path: &Path) -> Result<IngestBatch> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    Ok(read_candidates(BufReader::new(file))?)
}

async fn run(
    config: PipelineConfig,
    input: PathBuf,
    output: PathBuf,
    report: Option<PathBuf>,
    gazetteer: Option<PathBuf>,
) -> Result<()> {
    let gazetteer = match gazetteer.or_else(|| config.gazetteer.path.clone()) {
        Some(path) => StaticGazetteer::load(&path)
            .with_context(|| format!("failed to load gazetteer from {}", path.display()))?,
        None => {
            warn!("No gazetteer configured; coordinate checks will treat every place as unknown");
            StaticGazetteer::new()
        }
    };
    let adapter = PipeTableAdapter::new(output, report);
    let table_path = adapter.table_path().to_path_buf();
    let report_path = adapter.report_path().to_path_buf();

    let batch = read_input(&input)?;
    let use_case = LedgerUseCase::new(config, Arc::new(gazetteer), Arc::new(adapter))?;
    let report = use_case.run(batch).await?;

    println!("\n📊 Ledger Results:");
    println!("   Lines read: {}", report.stats.lines_read);
    println!("   Admitted: {}", report.stats.candidates_admitted);
    println!("   Rejected: {}", report.stats.candidates_rejected);
    println!("   Records: {} ({} merged)", report.entries.len(), report.quality.merged_records);
    println!("   Quality: {} ({})", report.quality.score, report.quality.grade);
    println!("   Table: {}", table_path.display());
    println!("   Report: {}", report_path.display());
    Ok(())
}

fn check(input: PathBuf) -> Result<()> {
    let batch = read_input(&input)?;
    let mut store = CandidateStore::new();
    let mut rejections = batch.rejections;
    for candidate in batch.candidates {
        if let Err(rejection) = store.admit(candidate) {
            rejections.push(rejection);
        }
    }

    println!("\n🔍 Admission check for {}", input.display());
    println!("   Lines read: {}", batch.lines);
    println!("   Admissible: {}", store.len());
    println!("   Rejected: {}", rejections.len());
    for rejection in &rejections {
        let id = rejection.id.as_ref().map(|id| id.to_string()).unwrap_or_default();
        match rejection.line {
            Some(line) => println!("   - line {}: {} {} ({})", line, rejection.reason, id, rejection.detail),
            None => println!("   - {} {} ({})", rejection.reason, id, rejection.detail),
        }
    }
    let gaps: usize = store.records().iter().map(|r| r.gaps.len()).sum();
    if gaps > 0 {
        println!("   Extraction gaps: {}", gaps);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let config = load_config(cli.config)?;
    let _guard = logging::init_logging(&config.output.log_dir);

    match cli.command {
        Commands::Run {
            input,
            output,
            report,
            gazetteer,
        } => {
            info!("Running ledger over {}", input.display());
            run(config, input, output, report, gazetteer).await
        }
        Commands::Check { input } => check(input),
    }
}
