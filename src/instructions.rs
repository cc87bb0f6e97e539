//! Modification instruction set
//!
//! Wire format, one object per request:
//!
//! ```json
//! { "pages": [ { "removeAreas": [{"x":0,"y":0,"width":10,"height":5}],
//!                "addText": [{"text":"Made in China","x":0,"y":0,"fontSize":8}] } ] }
//! ```
//!
//! Entry `i` applies to page `i` in document order. Trailing pages may be
//! omitted and an entry may be empty.

use crate::geometry::Rect;
use crate::resolver::TextPlacement;
use crate::LabelPatchError;
use serde::{Deserialize, Serialize};

/// Edits for a single page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInstructions {
    #[serde(default)]
    pub remove_areas: Vec<Rect>,
    #[serde(default)]
    pub add_text: Vec<TextPlacement>,
}

impl PageInstructions {
    pub fn is_empty(&self) -> bool {
        self.remove_areas.is_empty() && self.add_text.is_empty()
    }
}

/// Edits for a whole document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstructionSet {
    pub pages: Vec<PageInstructions>,
}

impl InstructionSet {
    /// Parse the JSON payload
    pub fn from_json(payload: &str) -> Result<Self, LabelPatchError> {
        if payload.trim().is_empty() {
            return Err(LabelPatchError::Instructions(
                "instruction payload is empty".to_string(),
            ));
        }
        Ok(serde_json::from_str(payload)?)
    }

    /// Check the set against a document with `page_count` pages
    pub fn validate(&self, page_count: usize) -> Result<(), LabelPatchError> {
        if self.pages.len() > page_count {
            return Err(LabelPatchError::Instructions(format!(
                "{} page entries for a document with {} pages",
                self.pages.len(),
                page_count
            )));
        }

        for (idx, page) in self.pages.iter().enumerate() {
            for rect in &page.remove_areas {
                if !rect.is_finite() || rect.width < 0.0 || rect.height < 0.0 {
                    return Err(LabelPatchError::Instructions(format!(
                        "page {}: invalid remove area {:?}",
                        idx + 1,
                        rect
                    )));
                }
            }
            for text in &page.add_text {
                if !(text.x.is_finite() && text.y.is_finite())
                    || !text.font_size.is_finite()
                    || text.font_size <= 0.0
                {
                    return Err(LabelPatchError::Instructions(format!(
                        "page {}: invalid text placement for {:?}",
                        idx + 1,
                        text.text
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn total_edits(&self) -> usize {
        self.pages
            .iter()
            .map(|p| p.remove_areas.len() + p.add_text.len())
            .sum()
    }
}
