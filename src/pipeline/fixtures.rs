//! In-memory PDF fixtures for unit tests.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct PageSpec {
    lines: Vec<String>,
    images: usize,
    forms: usize,
    ext_gstate: bool,
}

impl PageSpec {
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn text(text: &str) -> Self {
        Self::lines(&[text])
    }

    pub fn lines(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn with_images(mut self, n: usize) -> Self {
        self.images = n;
        self
    }

    pub fn with_forms(mut self, n: usize) -> Self {
        self.forms = n;
        self
    }

    pub fn with_ext_gstate(mut self) -> Self {
        self.ext_gstate = true;
        self
    }
}

#[derive(Debug, Default)]
pub struct PdfBuilder {
    pages: Vec<PageSpec>,
    inherit_resources: bool,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, spec: PageSpec) -> Self {
        self.pages.push(spec);
        self
    }

    /// Put the font resources on the `Pages` node instead of each page.
    pub fn inherit_resources(mut self) -> Self {
        self.inherit_resources = true;
        self
    }

    pub fn build(self) -> Document {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        let fonts = || dictionary! { "F1" => font_id };

        let mut kids: Vec<Object> = Vec::new();
        for spec in &self.pages {
            let page_id = add_page(&mut doc, pages_id, spec, font_id, self.inherit_resources);
            kids.push(page_id.into());
        }

        let mut pages = dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        if self.inherit_resources {
            pages.set("Resources", dictionary! { "Font" => fonts() });
        }
        doc.objects.insert(pages_id, Object::Dictionary(pages));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc
    }

    pub fn to_bytes(self) -> Vec<u8> {
        let mut doc = self.build();
        let mut out = Vec::new();
        doc.save_to(&mut out).unwrap();
        out
    }

    pub fn save(self, path: &Path) {
        std::fs::write(path, self.to_bytes()).unwrap();
    }
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    spec: &PageSpec,
    font_id: ObjectId,
    inherit: bool,
) -> ObjectId {
    let mut ops = Vec::new();
    let mut resources = Dictionary::new();

    if !spec.lines.is_empty() {
        ops.push(Operation::new("BT", vec![]));
        ops.push(Operation::new("Tf", vec!["F1".into(), 11.into()]));
        ops.push(Operation::new("Td", vec![40.into(), 800.into()]));
        for line in &spec.lines {
            ops.push(Operation::new("Tj", vec![Object::string_literal(latin1(line))]));
            ops.push(Operation::new("Td", vec![0.into(), (-14).into()]));
        }
        ops.push(Operation::new("ET", vec![]));
        if !inherit {
            resources.set("Font", dictionary! { "F1" => font_id });
        }
    }

    let mut xobjects = Dictionary::new();
    for i in 0..spec.images {
        let image = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0x80],
        );
        xobjects.set(format!("Im{i}"), doc.add_object(image));
    }
    for i in 0..spec.forms {
        let form = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 10.into(), 10.into()],
            },
            b"0 0 10 10 re f".to_vec(),
        );
        xobjects.set(format!("Fm{i}"), doc.add_object(form));
    }
    if !xobjects.is_empty() {
        let names: Vec<Vec<u8>> = xobjects.iter().map(|(k, _)| k.clone()).collect();
        for name in names {
            ops.push(Operation::new("q", vec![]));
            ops.push(Operation::new(
                "cm",
                vec![100.into(), 0.into(), 0.into(), 100.into(), 100.into(), 400.into()],
            ));
            ops.push(Operation::new("Do", vec![Object::Name(name)]));
            ops.push(Operation::new("Q", vec![]));
        }
        resources.set("XObject", xobjects);
    }
    if spec.ext_gstate {
        resources.set(
            "ExtGState",
            dictionary! { "GS1" => dictionary! { "Type" => "ExtGState", "CA" => 1 } },
        );
    }

    let content = Content { operations: ops };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));

    let mut page = dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    };
    if !resources.is_empty() {
        page.set("Resources", resources);
    }
    doc.add_object(page)
}

fn latin1(s: &str) -> Vec<u8> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
        .collect()
}
