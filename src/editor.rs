//! Drawing white-out rectangles and text onto PDF pages
//!
//! Edits are appended after the page's existing content. The original
//! content is wrapped in `q ... Q` first so a dangling graphics state
//! (an unbalanced `cm`, a fill colour) cannot leak into the edits.

use crate::geometry::Rect;
use crate::resolver::TextPlacement;
use crate::LabelPatchError;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use std::collections::BTreeMap;

/// Preferred resource name for the inserted text font; a numeric suffix is
/// appended when a page already uses it for another font
pub const FONT_RESOURCE: &str = "LPHelv";

/// A loaded document plus the state needed to draw on it
pub struct DocumentEditor {
    doc: Document,
    font_id: Option<ObjectId>,
}

impl DocumentEditor {
    pub fn new(doc: Document) -> Self {
        Self { doc, font_id: None }
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Page ids keyed by 1-indexed page number
    pub fn pages(&self) -> BTreeMap<u32, ObjectId> {
        self.doc.get_pages()
    }

    /// Draw opaque white rectangles, then black text, on one page
    pub fn draw(
        &mut self,
        page_id: ObjectId,
        remove_areas: &[Rect],
        add_text: &[TextPlacement],
    ) -> Result<(), LabelPatchError> {
        if remove_areas.is_empty() && add_text.is_empty() {
            return Ok(());
        }

        let mut operations = vec![Operation::new("q", vec![])];
        if !remove_areas.is_empty() {
            operations.push(Operation::new(
                "rg",
                vec![Object::Real(1.0), Object::Real(1.0), Object::Real(1.0)],
            ));
            for rect in remove_areas {
                operations.push(Operation::new(
                    "re",
                    vec![
                        Object::Real(rect.x),
                        Object::Real(rect.y),
                        Object::Real(rect.width),
                        Object::Real(rect.height),
                    ],
                ));
            }
            operations.push(Operation::new("f", vec![]));
        }

        if !add_text.is_empty() {
            let font_name = self.ensure_font(page_id)?;
            operations.push(Operation::new(
                "rg",
                vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
            ));
            for placement in add_text {
                operations.extend([
                    Operation::new("BT", vec![]),
                    Operation::new(
                        "Tf",
                        vec![
                            Object::Name(font_name.as_bytes().to_vec()),
                            Object::Real(placement.font_size),
                        ],
                    ),
                    Operation::new(
                        "Td",
                        vec![Object::Real(placement.x), Object::Real(placement.y)],
                    ),
                    Operation::new(
                        "Tj",
                        vec![Object::String(
                            to_win_ansi(&placement.text),
                            StringFormat::Literal,
                        )],
                    ),
                    Operation::new("ET", vec![]),
                ]);
            }
        }
        operations.push(Operation::new("Q", vec![]));

        let edits = Content { operations }
            .encode()
            .map_err(|e| LabelPatchError::Parse(e.to_string()))?;

        let original = self.doc.get_page_content(page_id)?;
        let mut content = Vec::with_capacity(original.len() + edits.len() + 8);
        content.extend_from_slice(b"q\n");
        content.extend_from_slice(&original);
        content.extend_from_slice(b"\nQ\n");
        content.extend_from_slice(&edits);

        let content_id = self.doc.add_object(Stream::new(dictionary! {}, content));
        self.doc
            .get_dictionary_mut(page_id)?
            .set("Contents", Object::Reference(content_id));
        Ok(())
    }

    /// Serialize the edited document, dropping replaced content streams
    pub fn save(mut self) -> Result<Vec<u8>, LabelPatchError> {
        let pruned = self.doc.prune_objects();
        log::debug!("pruned {} unreferenced objects", pruned.len());

        let mut output = Vec::new();
        self.doc
            .save_to(&mut output)
            .map_err(|e| LabelPatchError::Parse(e.to_string()))?;
        Ok(output)
    }

    fn font_object(&mut self) -> ObjectId {
        if let Some(id) = self.font_id {
            return id;
        }
        let id = self.doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });
        self.font_id = Some(id);
        id
    }

    /// Register the text font in the page's resources and return its name
    fn ensure_font(&mut self, page_id: ObjectId) -> Result<String, LabelPatchError> {
        let font_id = self.font_object();

        let (resources_ref, has_inline) = {
            let page = self.doc.get_dictionary(page_id)?;
            match page.get(b"Resources") {
                Ok(Object::Reference(id)) => (Some(*id), false),
                Ok(Object::Dictionary(_)) => (None, true),
                _ => (None, false),
            }
        };

        if resources_ref.is_none() && !has_inline {
            let inherited = inherited_resources(&self.doc, page_id);
            self.doc
                .get_dictionary_mut(page_id)?
                .set("Resources", Object::Dictionary(inherited));
        }

        let (fonts_ref, name) = {
            let resources = match resources_ref {
                Some(id) => self.doc.get_dictionary(id)?,
                None => self.doc.get_dictionary(page_id)?.get(b"Resources")?.as_dict()?,
            };
            match resources.get(b"Font") {
                Ok(Object::Reference(id)) => {
                    let fonts = self.doc.get_dictionary(*id)?;
                    (Some(*id), free_font_name(Some(fonts), font_id))
                }
                Ok(Object::Dictionary(fonts)) => (None, free_font_name(Some(fonts), font_id)),
                _ => (None, free_font_name(None, font_id)),
            }
        };

        if let Some(id) = fonts_ref {
            self.doc
                .get_dictionary_mut(id)?
                .set(name.as_str(), Object::Reference(font_id));
            return Ok(name);
        }

        let resources = match resources_ref {
            Some(id) => self.doc.get_dictionary_mut(id)?,
            None => self
                .doc
                .get_dictionary_mut(page_id)?
                .get_mut(b"Resources")?
                .as_dict_mut()?,
        };
        match resources.get_mut(b"Font") {
            Ok(Object::Dictionary(fonts)) => fonts.set(name.as_str(), Object::Reference(font_id)),
            _ => {
                let mut fonts = Dictionary::new();
                fonts.set(name.as_str(), Object::Reference(font_id));
                resources.set("Font", Object::Dictionary(fonts));
            }
        }
        Ok(name)
    }
}

/// First resource name, starting at [`FONT_RESOURCE`], that is unused or
/// already points at `font_id`
fn free_font_name(fonts: Option<&Dictionary>, font_id: ObjectId) -> String {
    let taken = |name: &str| {
        fonts
            .and_then(|f| f.get(name.as_bytes()).ok())
            .is_some_and(|existing| existing.as_reference().ok() != Some(font_id))
    };

    let mut name = FONT_RESOURCE.to_string();
    let mut suffix = 1;
    while taken(&name) {
        name = format!("{}{}", FONT_RESOURCE, suffix);
        suffix += 1;
    }
    name
}

/// Resources a page inherits from its page-tree ancestors
fn inherited_resources(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut current = doc
        .get_dictionary(page_id)
        .and_then(|d| d.get(b"Parent"))
        .and_then(Object::as_reference)
        .ok();

    for _ in 0..64 {
        let Some(id) = current else { break };
        let Ok(node) = doc.get_dictionary(id) else {
            break;
        };
        match node.get(b"Resources") {
            Ok(Object::Dictionary(dict)) => return dict.clone(),
            Ok(Object::Reference(res_id)) => {
                if let Ok(dict) = doc.get_dictionary(*res_id) {
                    return dict.clone();
                }
            }
            _ => {}
        }
        current = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    Dictionary::new()
}

/// Encode text for the WinAnsi-encoded standard font; unmappable chars become `?`
fn to_win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u8,
            _ => b'?',
        })
        .collect()
}
