//! CLI binary for resume-pipeline.
//!
//! A thin shim over the library crate: maps flags to `PipelineConfig`,
//! wires the filesystem stores under `--data-dir` and prints results.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use resume_pipeline::record::{AtsTip, CategoryFeedback, TipKind};
use resume_pipeline::store::fs::{FsBlobStore, FsKeyValueStore};
use resume_pipeline::{
    input, wipe, AnalysisFeedback, ArtifactStore, JobId, JobRecord, JobRecords, LoadedJob,
    Orchestrator, PipelineConfig, PipelineObserver, ProgressCallback, Stage, StageFailure,
    Submission, COMPANY_NAME, JOB_DESCRIPTION, JOB_TITLE,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Spinner whose message follows the current stage.
struct CliObserver {
    bar: ProgressBar,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style =
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Resume");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineObserver for CliObserver {
    fn on_stage(&self, stage: Stage) {
        if stage > Stage::Uploading {
            self.bar.println(format!("  {} {}", green("✓"), dim(&stage_done_label(stage))));
        }
        self.bar.set_message(stage.status_text());
    }

    fn on_record_persisted(&self, id: &JobId) {
        self.bar
            .println(format!("  {} record {}", cyan("◆"), bold(id.as_str())));
    }

    // The status line itself is reported once, by `main`'s error.
    fn on_failed(&self, failure: &StageFailure) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", red("✘"), failure.stage.failure_label());
    }

    fn on_done(&self, _id: &JobId) {
        self.bar.finish_and_clear();
        eprintln!("{} Analysis Done", green("✔"));
    }
}

/// What finished when `next` starts.
fn stage_done_label(next: Stage) -> String {
    match next {
        Stage::Uploading => String::new(),
        Stage::Rasterizing => "document uploaded".into(),
        Stage::UploadingImage => "first page rendered".into(),
        Stage::PersistingRecord => "image uploaded".into(),
        Stage::Analyzing => "record saved".into(),
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyse a resume against a job
  resume-pipeline submit cv.pdf --job-title "Backend Engineer" --company Acme \
      --job-description-file job.txt

  # From a URL, with a specific model
  resume-pipeline submit https://example.com/cv.pdf --provider openai --model gpt-4.1-mini

  # List stored jobs, then inspect one
  resume-pipeline list
  resume-pipeline show 7c1e0b0a-... --image-out page1.png

  # Re-run a failed analysis
  resume-pipeline retry 7c1e0b0a-...

  # Delete every stored artifact and record
  resume-pipeline wipe --yes

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY           OpenAI API key
  ANTHROPIC_API_KEY        Anthropic API key
  GEMINI_API_KEY           Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER   Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL          Override model ID
  PDFIUM_LIB_PATH          Path to libpdfium (file or directory)
  RESUME_PIPELINE_DATA_DIR Where artifacts and records are stored
"#;

/// Score resumes against a target job using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "resume-pipeline",
    version,
    about = "Upload a resume PDF, render its first page and have a Vision LLM score it",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory holding `blobs/` and `kv.json`.
    #[arg(long, global = true, env = "RESUME_PIPELINE_DATA_DIR", default_value = "resume-data")]
    data_dir: PathBuf,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "RESUME_PIPELINE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "RESUME_PIPELINE_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline on a local PDF or URL.
    Submit(SubmitArgs),
    /// Print a stored job and its feedback.
    Show(ShowArgs),
    /// List stored jobs.
    List {
        /// Output JSON records.
        #[arg(long)]
        json: bool,
    },
    /// Re-run analysis for a stored job that has no feedback yet.
    Retry {
        id: String,
        #[command(flatten)]
        llm: LlmArgs,
        /// Disable the progress spinner.
        #[arg(long, env = "RESUME_PIPELINE_NO_PROGRESS")]
        no_progress: bool,
    },
    /// Delete every stored artifact and record.
    Wipe {
        /// Required: confirm the deletion.
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Args, Debug)]
struct SubmitArgs {
    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// Target company.
    #[arg(long)]
    company: Option<String>,

    /// Target job title.
    #[arg(long)]
    job_title: Option<String>,

    /// Target job description.
    #[arg(long, conflicts_with = "job_description_file")]
    job_description: Option<String>,

    /// Read the job description from a file.
    #[arg(long)]
    job_description_file: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "RESUME_PIPELINE_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    #[command(flatten)]
    llm: LlmArgs,

    /// Disable the progress spinner.
    #[arg(long, env = "RESUME_PIPELINE_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ShowArgs {
    id: String,

    /// Output the JSON record.
    #[arg(long)]
    json: bool,

    /// Write the rendered first page to this file.
    #[arg(long)]
    image_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct LlmArgs {
    /// Raster scale relative to page size (1.0–8.0).
    #[arg(long, env = "RESUME_PIPELINE_RENDER_SCALE", default_value_t = 4.0)]
    render_scale: f32,

    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "RESUME_PIPELINE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// Max LLM output tokens.
    #[arg(long, env = "RESUME_PIPELINE_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "RESUME_PIPELINE_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// LLM call timeout in seconds.
    #[arg(long, env = "RESUME_PIPELINE_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner carries the stage status; INFO logs would tear it.
    let spinner = !cli.quiet
        && match &cli.command {
            Command::Submit(args) => !args.no_progress,
            Command::Retry { no_progress, .. } => !no_progress,
            _ => false,
        };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let blobs = Arc::new(FsBlobStore::new(cli.data_dir.join("blobs")));
    let kv = Arc::new(FsKeyValueStore::new(cli.data_dir.join("kv.json")));
    let observer: Option<ProgressCallback> = if spinner {
        Some(CliObserver::new() as ProgressCallback)
    } else {
        None
    };

    match &cli.command {
        Command::Submit(args) => {
            let config = build_config(&args.llm, Some(args.download_timeout), observer).await?;
            let orchestrator = Orchestrator::from_config(&config, blobs, kv)
                .context("Failed to set up the pipeline")?;

            let doc = input::acquire(&args.input, config.download_timeout_secs)
                .await
                .with_context(|| format!("Failed to read {}", args.input))?;

            let job_description = match &args.job_description_file {
                Some(path) => Some(
                    tokio::fs::read_to_string(path)
                        .await
                        .with_context(|| format!("Failed to read job description from {:?}", path))?,
                ),
                None => args.job_description.clone(),
            };

            let submission = Submission::from(doc)
                .with_metadata(COMPANY_NAME, args.company.clone().unwrap_or_default())
                .with_metadata(JOB_TITLE, args.job_title.clone().unwrap_or_default())
                .with_metadata(JOB_DESCRIPTION, job_description.unwrap_or_default());

            let id = orchestrator.submit(submission).await.map_err(|f| {
                let hint = f
                    .record_id
                    .as_ref()
                    .map(|id| format!("\nThe record was saved; run `resume-pipeline retry {id}`."))
                    .unwrap_or_default();
                anyhow::anyhow!("{}{}", f.status_text(), hint)
            })?;

            if !cli.quiet {
                if let Some(record) = orchestrator.records().get(&id).await? {
                    print_record(&record);
                }
            }
            println!("{id}");
        }

        Command::Show(args) => {
            let artifacts = ArtifactStore::new(blobs);
            let records = JobRecords::new(kv);
            let id = JobId::from(args.id.as_str());
            let Some(job) = LoadedJob::load(&artifacts, &records, &id)
                .await
                .context("Failed to load job")?
            else {
                bail!("No job with id {}", id);
            };

            if let Some(ref path) = args.image_out {
                write_file(path, &job.image).await?;
                if !cli.quiet {
                    eprintln!("{} wrote {}", green("✔"), path.display());
                }
            }

            if args.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&job.record).context("Failed to serialise record")?
                );
            } else {
                print_record(&job.record);
                println!(
                    "{}",
                    dim(&format!(
                        "document {} bytes, image {} bytes",
                        job.document.len(),
                        job.image.len()
                    ))
                );
            }
        }

        Command::List { json } => {
            let records = JobRecords::new(kv);
            let jobs = records.list().await.context("Failed to list jobs")?;
            if *json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&jobs).context("Failed to serialise records")?
                );
            } else if jobs.is_empty() {
                eprintln!("No jobs stored in {}", cli.data_dir.display());
            } else {
                for job in &jobs {
                    let score = job
                        .result
                        .as_ref()
                        .map(|r| format!("{:>3}/100", r.overall_score))
                        .unwrap_or_else(|| dim("pending"));
                    println!(
                        "{}  {}  {}  {}",
                        job.id,
                        score,
                        bold(job.metadata_value(JOB_TITLE).unwrap_or("-")),
                        job.metadata_value(COMPANY_NAME).unwrap_or("-"),
                    );
                }
            }
        }

        Command::Retry { id, llm, .. } => {
            let config = build_config(llm, None, observer).await?;
            let orchestrator = Orchestrator::from_config(&config, blobs, kv)
                .context("Failed to set up the pipeline")?;
            let record = orchestrator
                .retry_analysis(&JobId::from(id.as_str()))
                .await
                .map_err(|f| anyhow::anyhow!(f.status_text()))?;
            if !cli.quiet {
                print_record(&record);
            }
        }

        Command::Wipe { yes } => {
            if !yes {
                bail!("Refusing to wipe {} without --yes", cli.data_dir.display());
            }
            let deleted = wipe(blobs.as_ref(), kv.as_ref(), "./")
                .await
                .context("Wipe failed")?;
            if !cli.quiet {
                eprintln!("{} deleted {} files and every record", green("✔"), deleted);
            }
        }
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(
    llm: &LlmArgs,
    download_timeout: Option<u64>,
    progress: Option<ProgressCallback>,
) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .render_scale(llm.render_scale)
        .max_tokens(llm.max_tokens)
        .temperature(llm.temperature)
        .api_timeout_secs(llm.api_timeout);

    if let Some(secs) = download_timeout {
        builder = builder.download_timeout_secs(secs);
    }
    if let Some(ref path) = llm.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref model) = llm.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = llm.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}

// ── Feedback rendering ──────────────────────────────────────────────────────

fn print_record(record: &JobRecord) {
    let title = record.metadata_value(JOB_TITLE).unwrap_or("(no title)");
    let company = record.metadata_value(COMPANY_NAME).unwrap_or("(no company)");
    println!("{} {}  {}", cyan("◆"), bold(title), dim(company));

    match &record.result {
        Some(feedback) => print_feedback(feedback),
        None => println!("  {}", dim("no feedback yet")),
    }
}

fn print_feedback(feedback: &AnalysisFeedback) {
    println!("  Overall      {}", score(feedback.overall_score));
    println!("  ATS          {}", score(feedback.ats.score));
    for tip in &feedback.ats.tips {
        print_ats_tip(tip);
    }
    for (name, category) in [
        ("Tone & Style", &feedback.tone_and_style),
        ("Content", &feedback.content),
        ("Structure", &feedback.structure),
        ("Skills", &feedback.skills),
    ] {
        print_category(name, category);
    }
}

fn print_ats_tip(tip: &AtsTip) {
    println!("      {} {}", marker(tip.kind), tip.tip);
}

fn print_category(name: &str, category: &CategoryFeedback) {
    println!("  {:<12} {}", name, score(category.score));
    for tip in &category.tips {
        println!("      {} {}", marker(tip.kind), tip.tip);
        println!("        {}", dim(&tip.explanation));
    }
}

fn marker(kind: TipKind) -> String {
    match kind {
        TipKind::Good => green("✓"),
        TipKind::Improve => cyan("⚠"),
    }
}

/// Score coloured by band: ≥70 green, ≥50 plain, else red.
fn score(value: u32) -> String {
    let text = format!("{value:>3}/100");
    if value >= 70 {
        green(&text)
    } else if value >= 50 {
        text
    } else {
        red(&text)
    }
}
