//! CLI binary for report-assembler.
//!
//! A thin shim over the library crate that reads a JSON manifest, maps CLI
//! flags to `AssemblyConfig` and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use report_assembler::{
    assemble_with_cancel, finalize_file, inspect, parse_report_ids, select_jobs, AssemblyConfig,
    AssemblyOutput, AssemblyProgressCallback, AssemblyRequest, AssemblyStage,
    ClassifierThresholds, FinalizeStatus, PageStats, ProgressCallback, ReportJob, ReportKind,
    ReportMeta, ReportPayload,
};
use serde::Deserialize;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
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

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per report. Reports complete out of
/// order, so every line carries its own label.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl AssemblyProgressCallback for CliProgressCallback {
    fn on_assembly_start(&self, total_reports: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>2}/{len} reports  ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        self.bar.set_length(total_reports as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Rendering");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Rendering {total_reports} reports…"))
        ));
    }

    fn on_report_start(&self, _kind: ReportKind, label: &str) {
        self.bar.set_message(label.to_string());
    }

    fn on_report_complete(&self, _kind: ReportKind, label: &str, duration_ms: u64) {
        self.bar.println(format!(
            "  {} {:<14} {}",
            green("✓"),
            label,
            dim(&format!("{:.1}s", duration_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_report_error(&self, _kind: ReportKind, label: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar
            .println(format!("  {} {:<14} {}", red("✗"), label, red(&msg)));
        self.bar.inc(1);
    }

    fn on_stage(&self, stage: AssemblyStage) {
        self.bar.set_prefix("Assembling");
        self.bar.set_message(stage.to_string());
    }

    fn on_assembly_complete(&self, succeeded: usize, removed_pages: usize) {
        self.bar.finish_and_clear();
        let failed = self.errors.load(Ordering::SeqCst);
        let mark = if failed == 0 { green("✔") } else { cyan("⚠") };
        eprintln!(
            "{} {} reports assembled  ({} failed, {} blank pages removed)",
            mark,
            bold(&succeeded.to_string()),
            failed,
            removed_pages
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Assemble from a manifest (output name derived from client and period)
  assemble-report manifest.json

  # Only the cash-flow reports and the indicators, with a cover
  assemble-report manifest.json --reports 1,2,3,7 --cover capa.pdf -o out.pdf

  # Page statistics of an existing PDF, nothing modified
  assemble-report --analyze-only relatorio.pdf

  # Strip blank pages from an existing PDF in place
  assemble-report --finalize-only relatorio.pdf

MANIFEST:
  {
    "meta": { "client_name": "ACME", "month_name": "Setembro", "year": 2024 },
    "jobs": [
      { "kind": 1, "payload": { "type": "report", "sections": { ... } } },
      { "kind": 7, "label": "Indicadores", "payload": { "type": "report", "sections": { ... } } }
    ],
    "cover": "capa.pdf",
    "marketing": ["insert1.pdf"]
  }
  kind 0 is the index; it is generated from the selection when absent.

ENVIRONMENT VARIABLES:
  WKHTMLTOPDF_CMD     Converter executable (default: wkhtmltopdf)
  RODAPE_IMG_PATH     Footer image (default: assets/icons/rodape.png)
  KEEP_WKHTML_HTML    Set to 1 to keep intermediate HTML/PDF files
  RUST_LOG            Log filter, overrides --verbose/--quiet
"#;

/// Assemble rendered financial reports into one PDF.
#[derive(Parser, Debug)]
#[command(
    name = "assemble-report",
    version,
    about = "Assemble financial reports into one PDF and strip blank pages",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// JSON manifest, or a PDF with --analyze-only / --finalize-only.
    input: PathBuf,

    /// Output PDF. Default: Relatorio_<client>_<month>_<year>.pdf.
    #[arg(short, long, env = "REPORT_OUTPUT")]
    output: Option<PathBuf>,

    /// Report ids to include, e.g. "1,3,7" or "Relatório 7, Relatório 8".
    #[arg(long, env = "REPORT_IDS")]
    reports: Option<String>,

    /// Cover PDF copied verbatim as the first pages.
    #[arg(long)]
    cover: Option<PathBuf>,

    /// Marketing PDF appended verbatim after the reports (repeatable).
    #[arg(long)]
    marketing: Vec<PathBuf>,

    /// Directory holding <template_id>/template.html.
    #[arg(long, env = "REPORT_TEMPLATES_DIR", default_value = "templates")]
    templates: PathBuf,

    /// HTML→PDF converter executable.
    #[arg(long, env = "WKHTMLTOPDF_CMD", default_value = "wkhtmltopdf")]
    converter: String,

    /// Footer image.
    #[arg(long, env = "RODAPE_IMG_PATH")]
    footer_image: Option<PathBuf>,

    /// Logo embedded in the index page.
    #[arg(long, env = "REPORT_LOGO_PATH")]
    logo_image: Option<PathBuf>,

    /// Number of reports rendered concurrently.
    #[arg(short, long, env = "REPORT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Per-report converter timeout in seconds.
    #[arg(long, env = "REPORT_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Keep intermediate HTML/PDF files for debugging.
    #[arg(long, env = "KEEP_WKHTML_HTML")]
    keep_temp: bool,

    /// Skip blank-page removal.
    #[arg(long)]
    keep_blank_pages: bool,

    /// Print page statistics for an existing PDF, nothing modified.
    #[arg(long, conflicts_with = "finalize_only")]
    analyze_only: bool,

    /// Remove blank pages from an existing PDF in place.
    #[arg(long)]
    finalize_only: bool,

    /// Output structured JSON instead of a summary.
    #[arg(long, env = "REPORT_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "REPORT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "REPORT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "REPORT_QUIET")]
    quiet: bool,
}

/// On-disk manifest. Labels and templates default per slot.
#[derive(Debug, Deserialize)]
struct Manifest {
    meta: ReportMeta,
    #[serde(default)]
    jobs: Vec<ManifestJob>,
    #[serde(default)]
    cover: Option<PathBuf>,
    #[serde(default)]
    marketing: Vec<PathBuf>,
    #[serde(default)]
    output_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct ManifestJob {
    kind: ReportKind,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    template_id: Option<String>,
    payload: ReportPayload,
}

impl From<ManifestJob> for ReportJob {
    fn from(m: ManifestJob) -> Self {
        let mut job = ReportJob::new(m.kind, m.payload);
        if let Some(label) = m.label {
            job = job.with_label(label);
        }
        if let Some(template_id) = m.template_id {
            job = job.with_template(template_id);
        }
        job
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let standalone = cli.analyze_only || cli.finalize_only;
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !standalone;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
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

    let thresholds = ClassifierThresholds::default();

    // ── Analyze-only mode ────────────────────────────────────────────────
    if cli.analyze_only {
        let stats = inspect(&cli.input, &thresholds)
            .await
            .context("Failed to analyze PDF")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&stats).context("Failed to serialize stats")?
            );
        } else {
            print_stats(&cli.input, &stats);
        }
        return Ok(());
    }

    // ── Finalize-only mode ───────────────────────────────────────────────
    if cli.finalize_only {
        let report = finalize_file(&cli.input, &thresholds)
            .await
            .context("Failed to remove blank pages")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("Failed to serialize report")?
            );
        } else if !cli.quiet {
            eprintln!(
                "{} {}  {} → {} pages  removed {:?}",
                green("✔"),
                bold(&report.path.display().to_string()),
                report.original_pages,
                report.final_pages,
                report.removed_pages
            );
        }
        return Ok(());
    }

    // ── Build request and config ─────────────────────────────────────────
    let request = build_request(&cli).await?;
    let output_path = request.output_path.clone();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AssemblyProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run assembly ─────────────────────────────────────────────────────
    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let output = assemble_with_cancel(request, &config, cancel)
        .await
        .with_context(|| format!("Assembly of {} failed", output_path.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&output);
    }
    Ok(())
}

/// Load the manifest and apply CLI overrides.
async fn build_request(cli: &Cli) -> Result<AssemblyRequest> {
    let raw = tokio::fs::read_to_string(&cli.input)
        .await
        .with_context(|| format!("Failed to read manifest {:?}", cli.input))?;
    let manifest: Manifest = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid manifest {:?}", cli.input))?;

    let jobs: Vec<ReportJob> = manifest.jobs.into_iter().map(ReportJob::from).collect();
    let selection = cli
        .reports
        .as_deref()
        .map(parse_report_ids)
        .transpose()
        .context("Invalid --reports")?;
    let jobs = select_jobs(jobs, selection.as_deref(), &manifest.meta);

    let output_path = cli
        .output
        .clone()
        .or(manifest.output_path)
        .unwrap_or_else(|| PathBuf::from(manifest.meta.default_file_name()));

    let mut request = AssemblyRequest::new(manifest.meta, output_path);
    request.jobs = jobs;
    request.cover = cli.cover.clone().or(manifest.cover);
    request.marketing = if cli.marketing.is_empty() {
        manifest.marketing
    } else {
        cli.marketing.clone()
    };
    Ok(request)
}

/// Map CLI args to `AssemblyConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AssemblyConfig> {
    let mut builder = AssemblyConfig::builder()
        .concurrency(cli.concurrency)
        .converter_command(cli.converter.clone())
        .render_timeout_secs(cli.timeout)
        .template_dir(cli.templates.clone())
        .keep_temp_files(cli.keep_temp)
        .remove_blank_pages(!cli.keep_blank_pages);
    if let Some(ref path) = cli.footer_image {
        builder = builder.footer_image(path.clone());
    }
    if let Some(ref path) = cli.logo_image {
        builder = builder.logo_image(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    builder.build().context("Invalid configuration")
}

fn print_summary(output: &AssemblyOutput) {
    let stats = &output.stats;
    eprintln!(
        "{}  {} pages  {}ms  →  {}",
        if output.failed.is_empty() { green("✔") } else { cyan("⚠") },
        stats.final_pages,
        stats.total_duration_ms,
        bold(&output.output_path.display().to_string()),
    );
    for failed in &output.failed {
        eprintln!("   {} {}: {}", red("✗"), failed.label, dim(&failed.error.to_string()));
    }
    match &output.finalize {
        FinalizeStatus::Trimmed { removed_pages } => {
            eprintln!("   removed blank pages {}", dim(&format!("{removed_pages:?}")))
        }
        FinalizeStatus::AlreadyClean => eprintln!("   {}", dim("no blank pages")),
        FinalizeStatus::Skipped => eprintln!("   {}", dim("blank-page removal skipped")),
        FinalizeStatus::Failed { reason } => {
            eprintln!("   {} generated but not page-trimmed: {}", cyan("⚠"), reason)
        }
    }
}

fn print_stats(path: &std::path::Path, stats: &PageStats) {
    println!("File:        {}", path.display());
    println!("Pages:       {}", stats.total_pages);
    println!("Empty:       {} {:?}", stats.empty_pages.len(), stats.empty_pages);
    println!(
        "Suspicious:  {} {:?}",
        stats.suspicious_pages.len(),
        stats.suspicious_pages
    );
    println!("Good:        {}", stats.good_pages.len());
    if !stats.error_pages.is_empty() {
        println!("Unreadable:  {} {:?}", stats.error_pages.len(), stats.error_pages);
    }
}
