//! Removal areas and text placement inside a label

use crate::extractor::estimate_text_width;
use crate::geometry::{Bounds, Rect};
use crate::labels::Label;
use serde::{Deserialize, Serialize};

/// Margins and width heuristic for region resolution
#[derive(Debug, Clone)]
pub struct ResolveConfig {
    /// Padding around removal areas and above the label bottom for inserted text
    pub margin: f32,
    /// Average glyph width as a fraction of the font size
    pub glyph_width_ratio: f32,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            margin: 2.0,
            glyph_width_ratio: 0.55,
        }
    }
}

/// Where to draw a string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextPlacement {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub font_size: f32,
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Area to white out for `search` inside `label`, in the label-local frame.
///
/// A member matches when its normalized text is contained in the
/// normalized search phrase. Returns `None` when nothing matches.
pub fn removal_area(label: &Label, search: &str, config: &ResolveConfig) -> Option<Rect> {
    let needle = normalize(search);
    if needle.is_empty() {
        return None;
    }

    let union = label
        .items
        .iter()
        .filter(|t| {
            let text = normalize(&t.text);
            !text.is_empty() && needle.contains(&text)
        })
        .fold(Bounds::empty(), |b, t| b.add_rect(&t.rect()));
    if union.is_empty() {
        return None;
    }

    let m = config.margin;
    let expanded = Rect::new(
        union.min_x,
        union.min_y,
        union.max_x - union.min_x,
        union.max_y - union.min_y,
    )
    .expand(m);

    // Flip into the label frame
    Some(Rect {
        y: label.bbox.height + label.bbox.y - union.max_y - m,
        ..expanded
    })
}

/// Center `text` horizontally in `target`, `margin` above its bottom edge
pub fn text_placement(
    text: &str,
    font_size: f32,
    target: &Rect,
    config: &ResolveConfig,
) -> TextPlacement {
    let width = estimate_text_width(text, font_size, config.glyph_width_ratio);
    TextPlacement {
        text: text.to_string(),
        x: target.x + target.width / 2.0 - width / 2.0,
        y: target.y + config.margin,
        font_size,
    }
}
