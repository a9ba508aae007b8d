use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vidstamp::{
    BatchConfig, BatchCoordinator, BatchObserver, CancelToken, DataRecord, FfmpegBackend,
    OutputPreset, RenderExecutor, RenderResult, RenderStatus, SkipPolicy, Template,
};

#[derive(Parser, Debug)]
#[command(name = "vidstamp", version, about = "Render one video per data record from a template")]
struct Cli {
    /// Log at debug level (overrides RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render every record (requires `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Bind every record and print the resolved plans as JSON without rendering.
    Plan(BatchArgs),
    /// Check the template, and optionally that every record binds.
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct BatchArgs {
    /// Template JSON.
    #[arg(long)]
    template: PathBuf,

    /// Records as a JSON array or JSON Lines.
    #[arg(long)]
    records: PathBuf,

    /// Batch config JSON.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory (overrides the config).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Output resolution preset, replacing the template canvas.
    #[arg(long)]
    preset: Option<OutputPreset>,
}

#[derive(Args, Debug)]
struct RenderArgs {
    #[command(flatten)]
    batch: BatchArgs,

    /// Number of videos rendered at once.
    #[arg(long, short = 'j')]
    jobs: Option<usize>,

    /// Retries for transient failures.
    #[arg(long)]
    retries: Option<u32>,

    /// Re-render items even when a finished output exists.
    #[arg(long)]
    force: bool,

    /// Write the batch report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Template JSON.
    #[arg(long)]
    template: PathBuf,

    /// Records to bind against the template.
    #[arg(long)]
    records: Option<PathBuf>,
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Render(args) => cmd_render(args),
        Command::Plan(args) => cmd_plan(args),
        Command::Validate(args) => cmd_validate(args),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn assets_root(template: &Path) -> PathBuf {
    template
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf()
}

fn load_template(path: &Path, preset: Option<OutputPreset>) -> anyhow::Result<Template> {
    let template =
        Template::from_path(path).with_context(|| format!("load template '{}'", path.display()))?;
    Ok(match preset {
        Some(p) => template.with_preset(p),
        None => template,
    })
}

fn load_records(path: &Path) -> anyhow::Result<Vec<DataRecord>> {
    vidstamp::load_records(path).with_context(|| format!("load records '{}'", path.display()))
}

fn load_config(args: &BatchArgs) -> anyhow::Result<BatchConfig> {
    let mut cfg = match &args.config {
        Some(p) => BatchConfig::from_path(p)?,
        None => BatchConfig::default(),
    };
    if let Some(out) = &args.out {
        cfg.output_root = out.clone();
    }
    Ok(cfg)
}

fn coordinator(
    cfg: &BatchConfig,
    template_path: &Path,
    backend: FfmpegBackend,
) -> BatchCoordinator {
    let executor = RenderExecutor::new(Arc::new(backend), Arc::new(cfg.asset_cache()));
    BatchCoordinator::new(
        executor,
        cfg.bind_context(assets_root(template_path)),
        cfg.batch_options(),
    )
}

/// Logs `n/total` as items finish.
struct ProgressLog {
    done: AtomicUsize,
    total: usize,
}

impl BatchObserver for ProgressLog {
    fn on_item_finished(&self, result: &RenderResult) {
        let n = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        match result.status {
            RenderStatus::Failed => tracing::warn!(
                index = result.index,
                id = %result.item_id,
                "{n}/{} failed",
                self.total
            ),
            status => tracing::info!(
                index = result.index,
                id = %result.item_id,
                ?status,
                "{n}/{}",
                self.total
            ),
        }
    }
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<ExitCode> {
    let template = load_template(&args.batch.template, args.batch.preset)?;
    let records = load_records(&args.batch.records)?;

    let mut cfg = load_config(&args.batch)?;
    if let Some(jobs) = args.jobs {
        cfg.concurrency_limit = jobs;
    }
    if let Some(retries) = args.retries {
        cfg.max_retries = retries;
    }
    if args.force {
        cfg.skip_policy = SkipPolicy::Never;
    }
    cfg.validate()?;

    let backend = FfmpegBackend::new(cfg.encoder.clone());
    if !backend.is_available() {
        anyhow::bail!(
            "'{}' is not runnable; install ffmpeg or set encoder.program in the config",
            cfg.encoder.program.display()
        );
    }

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupted: finishing in-flight renders, not starting new ones");
        on_signal.cancel();
    })
    .context("install Ctrl-C handler")?;

    let report = coordinator(&cfg, &args.batch.template, backend)
        .with_cancel_token(cancel)
        .with_observer(Arc::new(ProgressLog {
            done: AtomicUsize::new(0),
            total: records.len(),
        }))
        .run(&template, &records)?;

    eprintln!("{report}");
    for f in report.failures() {
        let msg = f.error.as_ref().map(|e| e.message.as_str()).unwrap_or("unknown error");
        eprintln!("  [{}] {}: {msg}", f.index, f.item_id);
    }
    if let Some(path) = &args.report {
        report.write_json(path)?;
        eprintln!("wrote {}", path.display());
    }

    Ok(if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn cmd_plan(args: BatchArgs) -> anyhow::Result<ExitCode> {
    let template = load_template(&args.template, args.preset)?;
    let records = load_records(&args.records)?;
    let cfg = load_config(&args)?;

    let plans = coordinator(&cfg, &args.template, FfmpegBackend::default())
        .plan(&template, &records)?;
    let mut ok = true;
    let items: Vec<serde_json::Value> = plans
        .iter()
        .enumerate()
        .map(|(index, plan)| match plan {
            Ok(plan) => serde_json::json!({ "index": index, "plan": plan }),
            Err(e) => {
                ok = false;
                serde_json::json!({ "index": index, "error": e.to_string() })
            }
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&items).context("serialize plans")?);
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn cmd_validate(args: ValidateArgs) -> anyhow::Result<ExitCode> {
    let template = load_template(&args.template, None)?;
    let Some(records_path) = &args.records else {
        eprintln!("template ok: {}", args.template.display());
        return Ok(ExitCode::SUCCESS);
    };
    let records = load_records(records_path)?;

    let plans = coordinator(
        &BatchConfig::default(),
        &args.template,
        FfmpegBackend::default(),
    )
    .plan(&template, &records)?;
    let failures: Vec<(usize, String)> = plans
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.as_ref().err().map(|e| (i, e.to_string())))
        .collect();
    for (i, e) in &failures {
        eprintln!("  [{i}] {e}");
    }
    eprintln!(
        "{} of {} records bind",
        records.len() - failures.len(),
        records.len()
    );
    Ok(if failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
