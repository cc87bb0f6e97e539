//! Label detection around product identifiers
//!
//! A label is every token inside a fixed window around an identifier token
//! (`X00…` or `B0…`). Labels are built per anchor and never merged, so two
//! identifiers printed close together produce overlapping labels.

use crate::extractor::Token;
use crate::geometry::{Bounds, Rect};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ANCHOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:X00|B0)[A-Z0-9]{8,10}$").unwrap());

/// Whether the trimmed text is a product identifier
pub fn is_anchor(text: &str) -> bool {
    ANCHOR_RE.is_match(text.trim())
}

/// Search window around each anchor
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Half-width of the horizontal window
    pub window_x: f32,
    /// Half-height of the vertical window
    pub window_y: f32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            window_x: 120.0,
            window_y: 60.0,
        }
    }
}

/// Tokens gathered around one anchor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    /// Union of member boxes, bottom-left origin
    #[serde(rename = "box")]
    pub bbox: Rect,
    /// Member tokens in stream order, top-left origin
    pub items: Vec<Token>,
    /// The identifier token this label was built from
    pub anchor: Token,
}

impl Label {
    /// Distance from the page top to the label's top edge
    pub fn top_offset(&self) -> f32 {
        self.items
            .iter()
            .map(|t| t.y)
            .fold(f32::INFINITY, f32::min)
    }

    /// Convert a label-local rectangle from the resolver to page space
    pub fn to_page_rect(&self, local: &Rect) -> Rect {
        Rect {
            y: local.y + self.top_offset(),
            ..*local
        }
    }
}

fn in_window(anchor: &Token, candidate: &Token, config: &ClusterConfig) -> bool {
    let dx = candidate.x - anchor.x;
    let dy = candidate.center_y() - anchor.y;
    dx > -config.window_x && dx < config.window_x && dy > -config.window_y && dy < config.window_y
}

/// Group page tokens into one label per anchor.
///
/// `tokens` must already be in top-left space. The anchor is always a
/// member of its own label, whatever the window bounds say.
pub fn cluster_labels(tokens: &[Token], page_height: f32, config: &ClusterConfig) -> Vec<Label> {
    let mut labels = Vec::new();

    for (anchor_idx, anchor) in tokens.iter().enumerate() {
        if !is_anchor(&anchor.text) {
            continue;
        }

        let items: Vec<Token> = tokens
            .iter()
            .enumerate()
            .filter(|&(idx, t)| idx == anchor_idx || in_window(anchor, t, config))
            .map(|(_, t)| t.clone())
            .collect();

        let bounds = items
            .iter()
            .fold(Bounds::empty(), |b, t| b.add_rect(&t.rect()));
        // The anchor is always a member, so bounds are never empty here
        let Some(union) = bounds.to_rect() else {
            continue;
        };

        let bbox = Rect {
            y: page_height - bounds.max_y,
            ..union
        };

        log::debug!(
            "label {} with {} items at ({:.1}, {:.1}) {:.1}x{:.1}",
            anchor.text.trim(),
            items.len(),
            bbox.x,
            bbox.y,
            bbox.width,
            bbox.height
        );

        labels.push(Label {
            bbox,
            items,
            anchor: anchor.clone(),
        });
    }

    labels
}
