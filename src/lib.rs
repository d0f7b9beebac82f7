//! # report-assembler
//!
//! Assemble monthly financial reports into one printable PDF and strip the
//! blank pages that HTML→PDF conversion leaves behind.
//!
//! ## Pipeline Overview
//!
//! ```text
//! jobs (index + reports 1–8)
//!  │
//!  ├─ 1. Markup    fill each report template (tera)
//!  ├─ 2. Render    external HTML→PDF converter, bounded concurrency
//!  ├─ 3. Plan      cover, index, reports by canonical key, marketing
//!  ├─ 4. Combine   merge with lopdf, coarse "has content" filter
//!  └─ 5. Finalize  classify every page, remove truly empty ones in place
//! ```
//!
//! Reports render concurrently and finish in any order; the final document
//! is always ordered by each report's canonical key. A failed report is left
//! out and listed in [`AssemblyOutput::failed`]; only a run in which nothing
//! rendered is an error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use report_assembler::{assemble, AssemblyConfig, AssemblyRequest, ReportData, ReportJob,
//!     ReportKind, ReportMeta, ReportPayload};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let meta = ReportMeta::new("ACME Ltda", "Setembro", 2024);
//!     let request = AssemblyRequest::new(meta.clone(), meta.default_file_name())
//!         .job(ReportJob::index(&[1, 7], &meta))
//!         .job(ReportJob::new(
//!             ReportKind::Report(1),
//!             ReportPayload::Report(ReportData::new(serde_json::json!({ "receita": 125000.0 }))),
//!         ))
//!         .cover("assets/capa.pdf");
//!
//!     let config = AssemblyConfig::from_env();
//!     let output = assemble(request, &config).await?;
//!     eprintln!(
//!         "{} reports, {} blank pages removed",
//!         output.succeeded.len(),
//!         output.removed_pages.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `assemble-report` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! report-assembler = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assemble;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod report;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assemble::{assemble, assemble_sync, assemble_with_cancel, finalize_file, inspect, AssemblyRequest};
pub use config::{AssemblyConfig, AssemblyConfigBuilder, ClassifierThresholds, PageLayout};
pub use error::{ClassifyError, CombineError, FinalizeError, PipelineError, RenderError};
pub use output::{AssemblyOutput, AssemblyStats, FailedReport, FinalizeStatus, RenderOutcome};
pub use pipeline::classify::PageStats;
pub use pipeline::finalize::FinalizeReport;
pub use pipeline::render::{ConversionRequest, HtmlConverter, WkhtmltopdfConverter};
pub use progress::{AssemblyProgressCallback, AssemblyStage, NoopProgressCallback, ProgressCallback};
pub use report::{
    parse_report_ids, select_jobs, IndexData, ReportData, ReportJob, ReportKind, ReportMeta, ReportPayload,
};
