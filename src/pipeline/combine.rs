//! Concatenate the planned sources into one PDF.
//!
//! Each source is loaded, renumbered past the objects already collected, and
//! its pages are appended in page order under a single new page tree.
//! Attributes a page inherits from its original page tree (resources, boxes,
//! rotation) are copied onto the page itself on load, since that tree is
//! dropped.
//!
//! Generated report pages pass a coarse content filter: a page is copied if it
//! has extractable text or declares XObjects. Cover and marketing pages are
//! always copied. The output is written once, atomically, after every source
//! has been processed.

use crate::error::CombineError;
use crate::pipeline::pdf::{self, PageResources};
use crate::pipeline::plan::{AssemblyPlan, PlanEntry, SourceRole};
use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What the combiner did with each source.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CombineSummary {
    pub pages_written: usize,
    /// Report pages dropped by the content filter.
    pub pages_filtered: usize,
    pub sources: Vec<SourceSummary>,
    /// Sources that were missing, empty or unreadable.
    pub skipped: Vec<SkippedSource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub label: String,
    pub role: SourceRole,
    pub pages_in: usize,
    pub pages_out: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedSource {
    pub label: String,
    pub path: PathBuf,
    pub reason: String,
}

/// Combine every source of `plan` into `output`.
///
/// Blocking; call from `spawn_blocking` in async contexts.
pub fn combine(plan: &AssemblyPlan, output: &Path) -> Result<CombineSummary, CombineError> {
    let mut summary = CombineSummary::default();
    let mut max_id: u32 = 1;
    let mut page_order: Vec<ObjectId> = Vec::new();
    let mut page_dicts: BTreeMap<ObjectId, Dictionary> = BTreeMap::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for entry in plan.entries() {
        let mut doc = match load_source(&entry.path) {
            Ok(doc) => doc,
            Err(reason) => {
                warn!("Skipping {} ({}): {}", entry.label, entry.path.display(), reason);
                summary.skipped.push(SkippedSource {
                    label: entry.label.clone(),
                    path: entry.path.clone(),
                    reason,
                });
                continue;
            }
        };

        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        let pages = doc.get_pages();
        let pages_in = pages.len();
        let mut pages_out = 0;
        for (&page_no, &page_id) in &pages {
            if !entry.role.is_verbatim() && !has_coarse_content(&doc, entry, page_no, page_id) {
                summary.pages_filtered += 1;
                continue;
            }
            match flatten_page(&doc, page_id) {
                Some(dict) => {
                    page_order.push(page_id);
                    page_dicts.insert(page_id, dict);
                    pages_out += 1;
                }
                None => warn!("{}: page {} has no page dictionary; skipped", entry.label, page_no),
            }
        }

        for (object_id, object) in doc.objects {
            match object.type_name().unwrap_or(b"") {
                b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline" => {}
                _ => {
                    objects.insert(object_id, object);
                }
            }
        }

        debug!("{}: {}/{} pages copied", entry.label, pages_out, pages_in);
        summary.sources.push(SourceSummary {
            label: entry.label.clone(),
            role: entry.role,
            pages_in,
            pages_out,
        });
    }

    if page_order.is_empty() {
        return Err(CombineError::EmptyResult {
            path: output.to_path_buf(),
        });
    }

    let mut document = Document::with_version("1.5");
    document.objects.extend(objects);
    document.max_id = max_id;
    let pages_id = document.new_object_id();

    let kids: Vec<Object> = page_order.iter().map(|&id| Object::Reference(id)).collect();
    for id in &page_order {
        if let Some(mut dict) = page_dicts.remove(id) {
            dict.set("Parent", Object::Reference(pages_id));
            document.objects.insert(*id, Object::Dictionary(dict));
        }
    }
    document.objects.insert(
        pages_id,
        Object::Dictionary(Dictionary::from_iter([
            ("Type", Object::Name(b"Pages".to_vec())),
            ("Count", Object::Integer(page_order.len() as i64)),
            ("Kids", Object::Array(kids)),
        ])),
    );
    let catalog_id = document.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    document.trailer.set("Root", Object::Reference(catalog_id));

    // Drops content streams and resources of filtered pages.
    document.prune_objects();
    document.renumber_objects();
    document.compress();

    summary.pages_written = page_order.len();
    save_atomic(&mut document, output)?;
    info!(
        "Combined {} pages from {} sources into {} ({} filtered, {} sources skipped)",
        summary.pages_written,
        summary.sources.len(),
        output.display(),
        summary.pages_filtered,
        summary.skipped.len()
    );
    Ok(summary)
}

fn load_source(path: &Path) -> Result<Document, String> {
    let meta = std::fs::metadata(path).map_err(|e| e.to_string())?;
    if meta.len() == 0 {
        return Err("file is empty".to_string());
    }
    pdf::load(path).map_err(|e| e.to_string())
}

fn has_coarse_content(doc: &Document, entry: &PlanEntry, page_no: u32, page_id: ObjectId) -> bool {
    match pdf::page_text(doc, page_no) {
        Ok(text) if !text.trim().is_empty() => return true,
        Ok(_) => {}
        Err(e) => {
            debug!("{}: text extraction failed on page {} ({}); keeping it", entry.label, page_no, e);
            return true;
        }
    }
    if PageResources::inspect(doc, page_id).has_xobject_entry {
        return true;
    }
    warn!("{}: page {} has no text and no XObjects; dropped", entry.label, page_no);
    false
}

/// Clone a page dictionary loaded through [`pdf::load`], with a default A4
/// `MediaBox` when the source declared none.
fn flatten_page(doc: &Document, page_id: ObjectId) -> Option<Dictionary> {
    let mut dict = pdf::dict_of(doc, doc.objects.get(&page_id)?)?.clone();
    if !dict.has(b"MediaBox") {
        dict.set(
            "MediaBox",
            Object::Array(vec![0.into(), 0.into(), 595.into(), 842.into()]),
        );
    }
    Some(dict)
}

fn save_atomic(document: &mut Document, output: &Path) -> Result<(), CombineError> {
    let io_err = |source| CombineError::Io {
        path: output.to_path_buf(),
        source,
    };
    let dir = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".combine-")
        .suffix(".pdf.tmp")
        .tempfile_in(&dir)
        .map_err(io_err)?;
    document
        .save_to(&mut tmp)
        .map_err(|e| CombineError::Pdf(e.to_string()))?;
    tmp.flush().map_err(io_err)?;
    tmp.persist(output).map_err(|e| io_err(e.error))?;
    Ok(())
}
