//! Replace a combined document with its blank-page-free version.
//!
//! The trimmed document is written next to the original, reloaded to check
//! it, and only then swapped in:
//!
//! ```text
//! original ──rename──▶ original.backup
//! side     ──rename──▶ original
//! original.backup ──▶ deleted
//! ```
//!
//! If the second rename fails the backup is renamed back, so the original
//! path always holds a valid PDF.

use crate::config::ClassifierThresholds;
use crate::error::{ClassifyError, FinalizeError};
use crate::pipeline::{classify, pdf};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct FinalizeReport {
    pub path: PathBuf,
    pub original_pages: usize,
    /// 1-based page numbers removed, relative to the original document.
    pub removed_pages: Vec<usize>,
    pub final_pages: usize,
    /// False when nothing was removed and the file was left untouched.
    pub rewritten: bool,
}

/// Remove truly empty pages from the PDF at `path`, in place.
///
/// Blocking; call from `spawn_blocking` in async contexts.
pub fn finalize(path: &Path, t: &ClassifierThresholds) -> Result<FinalizeReport, FinalizeError> {
    if !path.is_file() {
        return Err(FinalizeError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let mut doc = pdf::load(path).map_err(|e| ClassifyError::Unreadable {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let stats = classify::analyze(&doc, t);
    if !stats.has_empty_pages() {
        info!("No empty pages in {}; leaving it untouched", path.display());
        return Ok(FinalizeReport {
            path: path.to_path_buf(),
            original_pages: stats.total_pages,
            removed_pages: Vec::new(),
            final_pages: stats.total_pages,
            rewritten: false,
        });
    }
    debug!(
        "{}: {} empty, {} suspicious, {} good, {} unreadable pages",
        path.display(),
        stats.empty_pages.len(),
        stats.suspicious_pages.len(),
        stats.good_pages.len(),
        stats.error_pages.len()
    );

    let report = classify::classify(&doc, t)?;
    classify::remove_pages(&mut doc, &report.removed);

    let side = sibling(path, "trimmed.tmp");
    if let Err(e) = doc.save(&side) {
        remove_quietly(&side);
        return Err(FinalizeError::InvalidReplacement {
            path: side,
            detail: e.to_string(),
        });
    }
    match pdf::page_count(&side) {
        Ok(n) if n > 0 && n == report.kept() => {}
        Ok(n) => {
            remove_quietly(&side);
            return Err(FinalizeError::InvalidReplacement {
                path: side,
                detail: format!("reloaded with {n} pages, expected {}", report.kept()),
            });
        }
        Err(detail) => {
            remove_quietly(&side);
            return Err(FinalizeError::InvalidReplacement { path: side, detail });
        }
    }

    swap(path, &side)?;
    info!(
        "Removed {} empty pages from {} ({} → {} pages)",
        report.removed.len(),
        path.display(),
        report.total_pages,
        report.kept()
    );
    Ok(FinalizeReport {
        path: path.to_path_buf(),
        original_pages: report.total_pages,
        final_pages: report.kept(),
        removed_pages: report.removed,
        rewritten: true,
    })
}

fn swap(original: &Path, side: &Path) -> Result<(), FinalizeError> {
    let backup = sibling(original, "backup");

    if let Err(source) = std::fs::rename(original, &backup) {
        remove_quietly(side);
        return Err(FinalizeError::SwapFailed {
            step: "backup original",
            path: original.to_path_buf(),
            source,
        });
    }

    if let Err(source) = std::fs::rename(side, original) {
        if let Err(e) = std::fs::rename(&backup, original) {
            error!(
                "Could not restore {} from {}: {}",
                original.display(),
                backup.display(),
                e
            );
        }
        remove_quietly(side);
        return Err(FinalizeError::SwapFailed {
            step: "install trimmed copy",
            path: original.to_path_buf(),
            source,
        });
    }

    std::fs::remove_file(&backup).map_err(|source| FinalizeError::BackupNotRemoved {
        path: backup,
        source,
    })
}

/// `<dir>/<file name>.<suffix>`.
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "document.pdf".to_string());
    path.with_file_name(format!("{name}.{suffix}"))
}

fn remove_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}
