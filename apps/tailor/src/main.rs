mod config;
mod errors;
mod export;
mod generation;
mod llm_client;
mod models;
mod render;
mod store;
#[cfg(test)]
mod testing;

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::{load_dotenv, require_env, RunConfig};
use crate::export::{prepare_run_dir, write_snapshot};
use crate::generation::pipeline::{Pipeline, RunMode};
use crate::generation::tailoring::TailoringMode;
use crate::llm_client::{GenerativePort, LlmClient};
use crate::models::bank::CoverLetterBank;
use crate::models::run_record::{RunInputs, RunRecord};

#[derive(Debug, Parser)]
#[command(name = "tailor")]
#[command(about = "Tailor a resume and cover letter to a job description", long_about = None)]
#[command(version)]
struct Cli {
    /// Run configuration file
    #[arg(long, env = "TAILOR_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Generate the resume
    #[arg(long = "cv", visible_alias = "resume")]
    cv: bool,

    /// Generate the cover letter
    #[arg(long = "cl", visible_alias = "cover-letter")]
    cl: bool,

    /// Override the tailoring mode from the config
    #[arg(long, value_enum)]
    tailoring: Option<TailoringMode>,

    /// Run the critic gate after assembly
    #[arg(long)]
    critic: bool,
}

impl Cli {
    /// The mode selected by flags, if any.
    fn mode(&self) -> Option<RunMode> {
        match (self.cv, self.cl) {
            (true, true) => Some(RunMode::Both),
            (true, false) => Some(RunMode::Resume),
            (false, true) => Some(RunMode::CoverLetter),
            (false, false) => None,
        }
    }
}

fn parse_mode_answer(answer: &str) -> Option<RunMode> {
    match answer.trim().to_lowercase().as_str() {
        "r" | "resume" | "cv" => Some(RunMode::Resume),
        "c" | "cl" | "cover letter" => Some(RunMode::CoverLetter),
        "b" | "both" => Some(RunMode::Both),
        _ => None,
    }
}

fn prompt_for_mode() -> Result<RunMode> {
    let stdin = io::stdin();
    loop {
        print!("Generate (r)esume, (c)over letter or (b)oth? ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            bail!("No generation mode selected");
        }
        match parse_mode_answer(&line) {
            Some(mode) => return Ok(mode),
            None => println!("Please answer r, c or b."),
        }
    }
}

/// Everything a run needs before the first stage: the model port and its own directory.
struct RunSetup {
    port: Arc<dyn GenerativePort>,
    run_id: Uuid,
    started_at: DateTime<Local>,
    run_dir: PathBuf,
}

/// Builds the client first so a missing API key never leaves an empty run directory.
fn open_run(config: &RunConfig) -> Result<RunSetup> {
    let api_key = require_env(&config.llm.api_key_env)?;
    let client = LlmClient::new(api_key, config.llm.clone())
        .context("Failed to build LLM client")?;

    let run_id = Uuid::new_v4();
    let started_at = Local::now();
    let run_dir = prepare_run_dir(&config.paths.out_dir, started_at, run_id)
        .context("Failed to create run directory")?;

    Ok(RunSetup {
        port: Arc::new(client),
        run_id,
        started_at,
        run_dir,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    load_dotenv();
    let cli = Cli::parse();

    let mut config = RunConfig::from_file(&cli.config)?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.log_level))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tailor v{}", env!("CARGO_PKG_VERSION"));

    if let Some(mode) = cli.tailoring {
        config.tailoring_type = mode;
    }
    let critic = cli.critic || config.critic.enabled;
    let mode = match cli.mode() {
        Some(mode) => mode,
        None => prompt_for_mode()?,
    };
    info!(
        "Mode: {mode:?}, tailoring: {:?}, critic: {critic}",
        config.tailoring_type
    );

    // Load inputs
    let paths = config.paths.clone();
    let jd_raw = store::load_jd(&paths.jd)?;
    let profile = store::load_profile(&paths.profile)?;
    let bank = store::load_bank(&paths.bank_dir)?;
    let cl_bank = if mode.includes_cover_letter() {
        let cl_bank = store::load_cover_letter_bank(&paths.cl_bank_dir)?;
        if cl_bank.is_empty() {
            warn!("Cover letter bank is empty, the letter will rely on the JD and profile only");
        }
        cl_bank
    } else {
        CoverLetterBank::default()
    };
    info!(
        "Loaded JD ({} chars), {} bank items, {} cover letter items",
        jd_raw.len(),
        bank.len(),
        cl_bank.len()
    );

    let RunSetup {
        port,
        run_id,
        started_at,
        run_dir,
    } = open_run(&config)?;
    info!("Run {run_id} writing to {}", run_dir.display());

    let mut record = RunRecord::with_identity(
        RunInputs {
            jd_raw,
            bank,
            profile,
            cl_bank,
            config,
            run_dir,
        },
        run_id,
        started_at,
    );

    let pipeline = Pipeline::for_mode(mode, port, critic)?;
    info!("Pipeline: {}", pipeline.stage_names().join(" → "));
    let outcome = pipeline.run(&mut record).await;

    match write_snapshot(&record) {
        Ok(path) => info!("Run record saved to {}", path.display()),
        Err(e) => warn!("Failed to save run record: {e}"),
    }
    outcome.context("Pipeline aborted")?;

    for error in &record.meta.errors {
        warn!("Recorded error: {error}");
    }

    if let Some(path) = record.artifacts.get("resume") {
        println!("\n✓ Resume exported to: {}", path.display());
    }
    if let Some(path) = record.artifacts.get("cover_letter") {
        println!("✓ Cover letter exported to: {}", path.display());
    }
    if let Some(result) = &record.critic_result {
        println!(
            "Critic result: gate_passed={}, missing_topics=[{}]",
            result.gate_passed,
            result.missing_topics.join(", ")
        );
    }

    if mode.includes_resume() && !record.artifacts.contains_key("resume") {
        error!("Resume was requested but no resume artifact was produced");
        println!("✗ Error: No resume produced");
        std::process::exit(1);
    }

    Ok(())
}
