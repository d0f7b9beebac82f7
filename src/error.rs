//! Error types for the report-assembler library.
//!
//! Two distinct layers reflect two distinct failure modes:
//!
//! * [`PipelineError`] is **fatal**: the run cannot produce a document at all
//!   (no report rendered, the converter binary is missing, nothing survived
//!   combining). Returned as `Err(PipelineError)` from the top-level
//!   `assemble*` functions, and no file is left at the output path.
//!
//! * [`RenderError`] is **non-fatal**: a single report failed to render but
//!   the others are fine. Stored inside [`crate::output::RenderOutcome`] so
//!   callers see which reports were excluded instead of losing the whole
//!   document to one bad template.
//!
//! The stage errors ([`CombineError`], [`ClassifyError`], [`FinalizeError`])
//! belong to the blocking PDF stages. Only [`CombineError`] is promoted to a
//! fatal error; classification and finalization failures degrade to
//! "generated but not page-trimmed".

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the report-assembler library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The requested report selection could not be parsed.
    #[error("Invalid report selection '{input}': {reason}")]
    InvalidReportSelection { input: String, reason: String },

    // ── Rendering errors ──────────────────────────────────────────────────
    /// Every dispatched report failed; an empty document is never produced.
    #[error("No valid report was rendered ({attempted} attempted).\nFirst error: {first_error}")]
    NoValidReports {
        attempted: usize,
        first_error: String,
    },

    /// The external HTML→PDF converter could not be started for any report.
    #[error(
        "PDF converter '{command}' is unavailable: {detail}\n\
Install wkhtmltopdf or point WKHTMLTOPDF_CMD at an existing binary."
    )]
    RendererUnavailable { command: String, detail: String },

    // ── Combining errors ──────────────────────────────────────────────────
    /// Combining the rendered documents failed.
    #[error(transparent)]
    Combine(#[from] CombineError),

    // ── Standalone page-trimming errors ───────────────────────────────────
    /// Inspecting an existing document failed (`inspect` only).
    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// Trimming an existing document failed (`finalize_file` only). Inside
    /// `assemble` this degrades to a finalize status instead.
    #[error(transparent)]
    Finalize(#[from] FinalizeError),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create the per-run working directory.
    #[error("Failed to create working directory: {0}")]
    TempDir(#[source] std::io::Error),

    /// Could not create or write the output PDF.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The run was aborted by the caller before a document was produced.
    #[error("Assembly cancelled before completion")]
    Cancelled,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single report.
///
/// Stored in [`crate::output::RenderOutcome`] when a report fails. The run
/// continues unless ALL reports fail.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum RenderError {
    /// The converter ran but exited with a non-zero status.
    #[error("{label}: converter exited with {status}: {stderr}")]
    ConversionFailed {
        label: String,
        status: String,
        stderr: String,
    },

    /// The converter produced no file, an empty file, or an unreadable PDF.
    #[error("{label}: converter output is empty or unreadable: {detail}")]
    EmptyOutput { label: String, detail: String },

    /// The converter binary could not be spawned at all.
    #[error("{label}: cannot start converter '{command}': {detail}")]
    ConverterUnavailable {
        label: String,
        command: String,
        detail: String,
    },

    /// The converter did not finish within its time budget and was killed.
    #[error("{label}: converter timed out after {secs}s")]
    Timeout { label: String, secs: u64 },

    /// The payload does not match the report slot it was supplied for.
    #[error("{label}: invalid payload: {detail}")]
    InvalidPayload { label: String, detail: String },

    /// Template lookup or rendering failed.
    #[error("{label}: template '{template}' failed: {detail}")]
    Template {
        label: String,
        template: String,
        detail: String,
    },

    /// Writing an intermediate artifact failed.
    #[error("{label}: I/O error: {detail}")]
    Io { label: String, detail: String },
}

impl RenderError {
    /// True when the failure says nothing about the report itself, only that
    /// the converter could not be launched.
    pub fn is_converter_unavailable(&self) -> bool {
        matches!(self, RenderError::ConverterUnavailable { .. })
    }
}

/// Errors raised while merging source documents into one output.
#[derive(Debug, Error)]
pub enum CombineError {
    /// Every page was filtered out or no source could be read.
    #[error("No valid page was found to combine into '{path}'")]
    EmptyResult { path: PathBuf },

    /// lopdf failed while building or serialising the merged document.
    #[error("PDF error while combining: {0}")]
    Pdf(String),

    /// Writing the combined document failed.
    #[error("Failed to write combined PDF '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised by the blank-page classifier.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// The document could not be loaded.
    #[error("Cannot read PDF '{path}': {detail}")]
    Unreadable { path: PathBuf, detail: String },

    /// Removing the detected pages would leave nothing behind.
    #[error("All {total} pages were classified as empty; refusing to write an empty document")]
    WouldBeEmpty { total: usize },

    /// lopdf failed while inspecting a page.
    #[error("Page {page}: {detail}")]
    Page { page: usize, detail: String },
}

/// Errors raised while replacing a document with its trimmed version.
///
/// Whatever the variant, the file at the original path is a valid PDF when
/// this error is returned.
#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("PDF not found: '{path}'")]
    NotFound { path: PathBuf },

    #[error(transparent)]
    Classify(#[from] ClassifyError),

    /// The trimmed copy could not be written or failed validation.
    #[error("Trimmed copy '{path}' is invalid: {detail}")]
    InvalidReplacement { path: PathBuf, detail: String },

    /// A rename during the swap failed; the original was restored.
    #[error("Swap step '{step}' failed for '{path}': {source}")]
    SwapFailed {
        step: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The trimmed document is in place but the backup could not be removed.
    #[error("Backup '{path}' could not be removed: {source}")]
    BackupNotRemoved {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
