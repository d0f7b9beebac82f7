//! Pipeline stages for report assembly.
//!
//! Each submodule implements one step. The async orchestration lives in
//! [`crate::assemble`]; everything here except [`render`] is synchronous and
//! runs under `spawn_blocking` when driven from async code.
//!
//! ## Data Flow
//!
//! ```text
//! markup ──▶ render ──▶ plan ──▶ combine ──▶ finalize
//! (tera)    (converter) (order)  (lopdf)    (classify + swap)
//! ```
//!
//! 1. [`markup`]  : fill a template with the report payload
//! 2. [`render`]  : write markup and footer, run the HTML→PDF converter,
//!    validate its output; one task per report, bounded concurrency
//! 3. [`plan`]    : order cover, index, reports and marketing inserts by
//!    canonical key, independent of completion order
//! 4. [`combine`] : merge the planned documents, dropping pages with no
//!    text and no XObjects from generated reports
//! 5. [`finalize`]: classify every page with [`classify`] and replace the
//!    document in place with a version free of truly empty pages
//!
//! [`tempfiles`] owns the per-run working directory, [`assets`] resolves the
//! footer image and logo, and [`pdf`] holds the lopdf helpers shared by the
//! PDF stages.

pub mod assets;
pub mod classify;
pub mod combine;
pub mod finalize;
pub mod markup;
pub mod pdf;
pub mod plan;
pub mod render;
pub mod tempfiles;

#[cfg(test)]
pub mod fixtures;
