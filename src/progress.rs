//! Progress-callback trait for per-report assembly events.
//!
//! Inject an [`Arc<dyn AssemblyProgressCallback>`] via
//! [`crate::config::AssemblyConfigBuilder::progress_callback`] to receive
//! events as reports are rendered and the document is assembled.
//!
//! The trait is `Send + Sync` because reports render concurrently: report
//! events may arrive from several tasks at once and in completion order, not
//! canonical order.
//!
//! # Example
//!
//! ```rust
//! use report_assembler::{AssemblyConfig, AssemblyProgressCallback, ReportKind};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     rendered: AtomicUsize,
//! }
//!
//! impl AssemblyProgressCallback for CountingCallback {
//!     fn on_report_complete(&self, kind: ReportKind, label: &str, duration_ms: u64) {
//!         self.rendered.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{kind} ({label}) rendered in {duration_ms}ms");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { rendered: AtomicUsize::new(0) });
//!
//! let config = AssemblyConfig::builder()
//!     .progress_callback(counter as Arc<dyn AssemblyProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::report::ReportKind;
use std::fmt;
use std::sync::Arc;

/// Coarse pipeline stages reported after rendering finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyStage {
    Combining,
    Finalizing,
}

impl fmt::Display for AssemblyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssemblyStage::Combining => f.write_str("combining"),
            AssemblyStage::Finalizing => f.write_str("removing blank pages"),
        }
    }
}

/// Called by the assembly pipeline as it processes each report.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `on_report_*` may be called concurrently; protect
/// shared mutable state with `Mutex` or atomics.
pub trait AssemblyProgressCallback: Send + Sync {
    /// Called once before any report is dispatched.
    ///
    /// # Arguments
    /// * `total_reports`: number of jobs that will be rendered
    fn on_assembly_start(&self, total_reports: usize) {
        let _ = total_reports;
    }

    /// Called just before the converter is launched for a report.
    fn on_report_start(&self, kind: ReportKind, label: &str) {
        let _ = (kind, label);
    }

    /// Called when a report rendered successfully.
    fn on_report_complete(&self, kind: ReportKind, label: &str, duration_ms: u64) {
        let _ = (kind, label, duration_ms);
    }

    /// Called when a report failed; it will be left out of the document.
    fn on_report_error(&self, kind: ReportKind, label: &str, error: &str) {
        let _ = (kind, label, error);
    }

    /// Called when the pipeline moves past rendering.
    fn on_stage(&self, stage: AssemblyStage) {
        let _ = stage;
    }

    /// Called once after the output document is in place.
    ///
    /// # Arguments
    /// * `succeeded`    : reports included in the document
    /// * `removed_pages`: pages dropped by the blank-page finalizer
    fn on_assembly_complete(&self, succeeded: usize, removed_pages: usize) {
        let _ = (succeeded, removed_pages);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AssemblyProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AssemblyConfig`].
pub type ProgressCallback = Arc<dyn AssemblyProgressCallback>;
