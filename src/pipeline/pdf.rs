//! Low-level lopdf helpers shared by the combiner and the classifier.
//!
//! Page attributes may be inherited from ancestor `Pages` nodes, and any value
//! may be an indirect reference, so nothing here reads a page dictionary
//! directly without going through [`resolve`] or [`inherited`].

use lopdf::{Dictionary, Document, Object, ObjectId};
use std::path::Path;

/// Limit for reference chains and `Parent` walks; guards against cycles in
/// malformed files.
const MAX_DEPTH: usize = 32;

/// Follow indirect references until a direct object.
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    let mut current = obj;
    for _ in 0..MAX_DEPTH {
        match current {
            Object::Reference(id) => current = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

/// Dictionary behind `obj`, including a stream's dictionary.
pub fn dict_of<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(d) => Some(d),
        Object::Stream(s) => Some(&s.dict),
        _ => None,
    }
}

/// Page attribute looked up on the page, then on each ancestor.
pub fn inherited<'a>(doc: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = dict_of(doc, doc.objects.get(&page_id)?)?;
    for _ in 0..MAX_DEPTH {
        if let Ok(value) = node.get(key) {
            return Some(value);
        }
        node = dict_of(doc, node.get(b"Parent").ok()?)?;
    }
    None
}

/// Effective resource dictionary of a page.
pub fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    dict_of(doc, inherited(doc, page_id, b"Resources")?)
}

/// Text of one page (1-based page number).
///
/// Only reads the page's own `Resources`; run [`materialize_inherited`] first
/// on documents that may keep fonts on the page tree.
pub fn page_text(doc: &Document, page_no: u32) -> Result<String, String> {
    doc.extract_text(&[page_no]).map_err(|e| e.to_string())
}

/// Page attributes a page may inherit from its ancestors.
pub const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Copy every inherited attribute onto the page dictionary itself.
///
/// lopdf's text extraction does not follow `Parent` for fonts, so a page whose
/// fonts live on the page tree would otherwise read as having no text.
pub fn materialize_inherited(doc: &mut Document) {
    let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
    for page_id in page_ids {
        let missing: Vec<(&[u8], Object)> = {
            let Some(own) = doc.objects.get(&page_id).and_then(|o| dict_of(doc, o)) else {
                continue;
            };
            INHERITABLE
                .iter()
                .filter(|key| !own.has(key))
                .filter_map(|&key| inherited(doc, page_id, key).map(|v| (key, v.clone())))
                .collect()
        };
        if missing.is_empty() {
            continue;
        }
        if let Some(Object::Dictionary(dict)) = doc.objects.get_mut(&page_id) {
            for (key, value) in missing {
                dict.set(key.to_vec(), value);
            }
        }
    }
}

/// Load a document with inherited page attributes made explicit.
pub fn load(path: &Path) -> Result<Document, lopdf::Error> {
    let mut doc = Document::load(path)?;
    materialize_inherited(&mut doc);
    Ok(doc)
}

/// Load a document and count its pages.
pub fn page_count(path: &Path) -> Result<usize, String> {
    Document::load(path)
        .map(|doc| doc.get_pages().len())
        .map_err(|e| e.to_string())
}

/// What a page's resource dictionary declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageResources {
    /// The resource dictionary has an `XObject` key, even an empty one.
    pub has_xobject_entry: bool,
    /// Distinct entries in the `XObject` dictionary.
    pub xobject_count: usize,
    /// XObjects whose `Subtype` is `Image`.
    pub image_count: usize,
    pub has_fonts: bool,
    pub has_ext_gstate: bool,
    pub has_color_space: bool,
    pub has_shading: bool,
    pub has_pattern: bool,
}

impl PageResources {
    pub fn inspect(doc: &Document, page_id: ObjectId) -> Self {
        let Some(res) = page_resources(doc, page_id) else {
            return Self::default();
        };

        let non_empty = |key: &[u8]| {
            res.get(key)
                .ok()
                .and_then(|o| dict_of(doc, o))
                .is_some_and(|d| !d.is_empty())
        };

        let (xobject_count, image_count) = match res.get(b"XObject").ok().and_then(|o| dict_of(doc, o)) {
            Some(xobjects) => (
                xobjects.len(),
                xobjects.iter().filter(|(_, v)| is_image(doc, v)).count(),
            ),
            None => (0, 0),
        };

        Self {
            has_xobject_entry: res.has(b"XObject"),
            xobject_count,
            image_count,
            has_fonts: non_empty(b"Font"),
            has_ext_gstate: non_empty(b"ExtGState"),
            has_color_space: non_empty(b"ColorSpace"),
            has_shading: non_empty(b"Shading"),
            has_pattern: non_empty(b"Pattern"),
        }
    }

    /// Drawing resources other than fonts: any XObject, graphics state,
    /// colour space, shading or pattern.
    pub fn has_visual(&self) -> bool {
        self.xobject_count > 0
            || self.has_ext_gstate
            || self.has_color_space
            || self.has_shading
            || self.has_pattern
    }
}

fn is_image(doc: &Document, obj: &Object) -> bool {
    match resolve(doc, obj) {
        Some(Object::Stream(s)) => matches!(s.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image"),
        _ => false,
    }
}
