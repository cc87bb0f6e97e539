//! Positioned text tokens from raw page content streams
//!
//! The scan is a small lexer over the content-stream bytes rather than a
//! full content parser. Only these instruction shapes inside a `BT ... ET`
//! block produce output:
//!
//! - `a b c d e f Tm` sets the positioning matrix
//! - `(text) Tj` and `(text) '` show a string (hex `<...>` strings too)
//! - `aw ac (text) "` shows a string
//! - `[(te) -20 (xt)] TJ` shows the concatenated string elements
//!
//! Everything else is lexed and ignored. A text show with no `Tm` before it
//! in the same block is dropped, as are whitespace-only strings.

use crate::geometry::Rect;
use crate::LabelPatchError;
use lopdf::{Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// A shown string with its heuristic extent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub text: String,
    /// X position (matrix translation `e`)
    pub x: f32,
    /// Y position; bottom-left origin as extracted, top-left after `to_top_left`
    pub y: f32,
    /// Estimated from character count and font size, not glyph metrics
    pub width: f32,
    /// Font size inferred from the text matrix
    pub height: f32,
}

impl Token {
    pub fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }
}

/// Tokens of a single page together with the page height
#[derive(Debug, Clone)]
pub struct PageTokens {
    /// Page number (1-indexed)
    pub page: u32,
    pub page_height: f32,
    /// Tokens in content-stream coordinates (origin bottom-left)
    pub tokens: Vec<Token>,
}

/// Options for token extraction
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Average glyph width as a fraction of the font size
    pub glyph_width_ratio: f32,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            glyph_width_ratio: 0.55,
        }
    }
}

/// Heuristic rendered width of `text` at `font_size`
pub fn estimate_text_width(text: &str, font_size: f32, glyph_width_ratio: f32) -> f32 {
    text.chars().count() as f32 * font_size * glyph_width_ratio
}

/// Font size read off a text matrix: `a` unless it is zero, then `d`.
///
/// Rotated or skewed matrices give wrong sizes; that is accepted.
fn matrix_font_size(m: &[f32; 6]) -> f32 {
    if m[0] != 0.0 {
        m[0].abs()
    } else {
        m[3].abs()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Number(f32),
    Bytes(Vec<u8>),
    Array(Vec<Operand>),
    Other,
}

#[derive(Debug, PartialEq)]
enum Lexeme<'a> {
    Operand(Operand),
    ArrayStart,
    ArrayEnd,
    Operator(&'a [u8]),
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\0' | b'\t' | b'\n' | 0x0C | b'\r' | b' ')
}

fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(b) = self.peek() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn read_regular(&mut self) -> &'a [u8] {
        let start = self.pos;
        while self.peek().is_some_and(is_regular) {
            self.pos += 1;
        }
        &self.data[start..self.pos]
    }

    /// Literal string body after the opening parenthesis
    fn read_literal(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut depth = 1usize;
        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(b);
                }
                b'\\' => self.read_escape(&mut out),
                _ => out.push(b),
            }
        }
        out
    }

    fn read_escape(&mut self, out: &mut Vec<u8>) {
        let Some(b) = self.peek() else {
            return;
        };
        self.pos += 1;
        match b {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0C),
            b'0'..=b'7' => {
                let mut value = u32::from(b - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                out.push((value & 0xFF) as u8);
            }
            // Line continuation
            b'\r' => {
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            b'\n' => {}
            other => out.push(other),
        }
    }

    /// Hex string body after the opening angle bracket
    fn read_hex(&mut self) -> Vec<u8> {
        let mut digits = Vec::new();
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'>' {
                break;
            }
            if let Some(d) = (b as char).to_digit(16) {
                digits.push(d as u8);
            }
        }
        if digits.len() % 2 == 1 {
            digits.push(0);
        }
        digits.chunks_exact(2).map(|p| p[0] << 4 | p[1]).collect()
    }

    /// Skip inline image data up to and including `EI`
    fn skip_inline_image(&mut self) {
        while self.pos + 1 < self.data.len() {
            let at_ei = self.data[self.pos] == b'E'
                && self.data[self.pos + 1] == b'I'
                && (self.pos == 0 || is_whitespace(self.data[self.pos - 1]))
                && self
                    .data
                    .get(self.pos + 2)
                    .map_or(true, |&b| is_whitespace(b) || is_delimiter(b));
            if at_ei {
                self.pos += 2;
                return;
            }
            self.pos += 1;
        }
        self.pos = self.data.len();
    }

    fn next_lexeme(&mut self) -> Option<Lexeme<'a>> {
        self.skip_whitespace_and_comments();
        let b = self.peek()?;
        match b {
            b'(' => {
                self.pos += 1;
                Some(Lexeme::Operand(Operand::Bytes(self.read_literal())))
            }
            b'<' => {
                if self.data.get(self.pos + 1) == Some(&b'<') {
                    self.pos += 2;
                    Some(Lexeme::Operand(Operand::Other))
                } else {
                    self.pos += 1;
                    Some(Lexeme::Operand(Operand::Bytes(self.read_hex())))
                }
            }
            b'>' => {
                self.pos += if self.data.get(self.pos + 1) == Some(&b'>') { 2 } else { 1 };
                Some(Lexeme::Operand(Operand::Other))
            }
            b'[' => {
                self.pos += 1;
                Some(Lexeme::ArrayStart)
            }
            b']' => {
                self.pos += 1;
                Some(Lexeme::ArrayEnd)
            }
            b'/' => {
                self.pos += 1;
                self.read_regular();
                Some(Lexeme::Operand(Operand::Other))
            }
            b'{' | b'}' | b')' => {
                self.pos += 1;
                Some(Lexeme::Operand(Operand::Other))
            }
            b'+' | b'-' | b'.' | b'0'..=b'9' => {
                let word = self.read_regular();
                let number = std::str::from_utf8(word)
                    .ok()
                    .and_then(|s| s.parse::<f32>().ok());
                Some(Lexeme::Operand(match number {
                    Some(n) => Operand::Number(n),
                    None => Operand::Other,
                }))
            }
            _ => Some(Lexeme::Operator(self.read_regular())),
        }
    }
}

/// Decode string bytes: UTF-16BE with BOM, otherwise Latin-1
fn decode_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let utf16: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|chunk| u16::from_be_bytes([chunk[0], chunk[1]]))
            .collect();
        return String::from_utf16_lossy(&utf16);
    }
    bytes.iter().map(|&b| b as char).collect()
}

fn shown_bytes(op: &[u8], operands: &[Operand]) -> Option<Vec<u8>> {
    match (op, operands.last()?) {
        (b"Tj" | b"'" | b"\"", Operand::Bytes(bytes)) => Some(bytes.clone()),
        (b"TJ", Operand::Array(items)) => {
            let mut joined = Vec::new();
            for item in items {
                if let Operand::Bytes(bytes) = item {
                    joined.extend_from_slice(bytes);
                }
            }
            Some(joined)
        }
        _ => None,
    }
}

fn matrix_operands(operands: &[Operand]) -> Option<[f32; 6]> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = [0.0f32; 6];
    for (slot, operand) in m.iter_mut().zip(&operands[operands.len() - 6..]) {
        match operand {
            Operand::Number(n) => *slot = *n,
            _ => return None,
        }
    }
    Some(m)
}

/// Scan a decoded content stream for positioned text tokens.
///
/// Output follows stream order. Malformed blocks are dropped without error.
pub fn extract_tokens(stream: &[u8], opts: &ExtractOptions) -> Vec<Token> {
    let mut lexer = Lexer::new(stream);
    let mut tokens = Vec::new();

    let mut operands: Vec<Operand> = Vec::new();
    let mut arrays: Vec<Vec<Operand>> = Vec::new();

    let mut in_text_block = false;
    let mut text_matrix: Option<[f32; 6]> = None;
    let mut dropped = 0usize;

    while let Some(lexeme) = lexer.next_lexeme() {
        match lexeme {
            Lexeme::Operand(operand) => match arrays.last_mut() {
                Some(array) => array.push(operand),
                None => operands.push(operand),
            },
            Lexeme::ArrayStart => arrays.push(Vec::new()),
            Lexeme::ArrayEnd => {
                if let Some(array) = arrays.pop() {
                    let operand = Operand::Array(array);
                    match arrays.last_mut() {
                        Some(outer) => outer.push(operand),
                        None => operands.push(operand),
                    }
                }
            }
            Lexeme::Operator(op) => {
                // An operator inside an open array means the array was never closed
                arrays.clear();
                match op {
                    b"BT" => {
                        in_text_block = true;
                        text_matrix = None;
                    }
                    b"ET" => {
                        in_text_block = false;
                        text_matrix = None;
                    }
                    b"BI" => lexer.skip_inline_image(),
                    b"Tm" if in_text_block => {
                        if let Some(m) = matrix_operands(&operands) {
                            text_matrix = Some(m);
                        }
                    }
                    b"Tj" | b"TJ" | b"'" | b"\"" if in_text_block => {
                        match (text_matrix, shown_bytes(op, &operands)) {
                            (Some(m), Some(bytes)) => {
                                let text = decode_text(&bytes);
                                if !text.trim().is_empty() {
                                    let font_size = matrix_font_size(&m);
                                    tokens.push(Token {
                                        width: estimate_text_width(
                                            &text,
                                            font_size,
                                            opts.glyph_width_ratio,
                                        ),
                                        height: font_size,
                                        x: m[4],
                                        y: m[5],
                                        text,
                                    });
                                }
                            }
                            _ => dropped += 1,
                        }
                    }
                    _ => {}
                }
                operands.clear();
            }
        }
    }

    if dropped > 0 {
        log::debug!("dropped {} text shows without a usable matrix or string", dropped);
    }

    tokens
}

/// Re-express tokens with a top-left origin: `y' = page_height - y - height`
pub fn to_top_left(tokens: &[Token], page_height: f32) -> Vec<Token> {
    tokens
        .iter()
        .map(|t| Token {
            y: page_height - t.y - t.height,
            ..t.clone()
        })
        .collect()
}

/// Helper to get f32 from Object
fn get_number(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

/// Page height from the (possibly inherited) MediaBox
pub fn page_height(doc: &Document, page_id: ObjectId) -> Result<f32, LabelPatchError> {
    let mut current = Some(page_id);
    // Bounded walk so a cyclic Parent chain cannot loop forever
    for _ in 0..64 {
        let Some(id) = current else { break };
        let dict = doc.get_dictionary(id).map_err(|_| {
            LabelPatchError::InvalidStructure(format!("object {:?} is not a dictionary", id))
        })?;

        if let Ok(media_box) = dict.get(b"MediaBox") {
            if let Ok(values) = resolve(doc, media_box).as_array() {
                let nums: Vec<f32> = values
                    .iter()
                    .filter_map(|v| get_number(resolve(doc, v)))
                    .collect();
                if nums.len() == 4 {
                    return Ok((nums[3] - nums[1]).abs());
                }
            }
        }

        current = dict.get(b"Parent").and_then(Object::as_reference).ok();
    }

    Err(LabelPatchError::InvalidStructure(format!(
        "page {:?} has no usable MediaBox",
        page_id
    )))
}

/// Extract tokens from a single page of a loaded document
pub fn extract_page_tokens(
    doc: &Document,
    page_id: ObjectId,
    page_num: u32,
    opts: &ExtractOptions,
) -> Result<PageTokens, LabelPatchError> {
    let page_height = page_height(doc, page_id)?;

    let tokens = match doc.get_page_content(page_id) {
        Ok(content) => extract_tokens(&content, opts),
        Err(e) => {
            log::warn!("page {}: content stream unreadable ({}), no tokens", page_num, e);
            Vec::new()
        }
    };
    log::debug!("page {}: {} tokens", page_num, tokens.len());

    Ok(PageTokens {
        page: page_num,
        page_height,
        tokens,
    })
}

/// Extract tokens from every page, in page order
pub fn extract_document_tokens(
    doc: &Document,
    opts: &ExtractOptions,
) -> Result<Vec<PageTokens>, LabelPatchError> {
    doc.get_pages()
        .iter()
        .map(|(&page_num, &page_id)| extract_page_tokens(doc, page_id, page_num, opts))
        .collect()
}

/// Extract tokens from a PDF file
pub fn extract_tokens_from_file<P: AsRef<Path>>(
    path: P,
    opts: &ExtractOptions,
) -> Result<Vec<PageTokens>, LabelPatchError> {
    let doc = crate::load_document(path)?;
    extract_document_tokens(&doc, opts)
}

/// Extract tokens from a PDF memory buffer
pub fn extract_tokens_mem(
    buffer: &[u8],
    opts: &ExtractOptions,
) -> Result<Vec<PageTokens>, LabelPatchError> {
    let doc = crate::load_document_mem(buffer)?;
    extract_document_tokens(&doc, opts)
}
