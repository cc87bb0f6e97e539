//! Product label detection and relabelling for PDF pages using lopdf
//!
//! This crate provides:
//! - Positioned text tokens from raw page content streams
//! - Label regions clustered around product identifiers (`X00…`, `B0…`)
//! - White-out areas and centered text placements inside each label
//! - Application of edits, computed here or supplied as JSON, to the document

pub mod editor;
pub mod extractor;
pub mod geometry;
pub mod instructions;
pub mod labels;
pub mod resolver;

pub use editor::DocumentEditor;
pub use extractor::{extract_tokens, to_top_left, ExtractOptions, PageTokens, Token};
pub use geometry::{Bounds, Rect};
pub use instructions::{InstructionSet, PageInstructions};
pub use labels::{cluster_labels, is_anchor, ClusterConfig, Label};
pub use resolver::{removal_area, text_placement, ResolveConfig, TextPlacement};

use lopdf::Document;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Labels found on one page
#[derive(Debug, Clone, Serialize)]
pub struct PageLabels {
    /// Page number (1-indexed)
    pub page: u32,
    pub page_height: f32,
    pub labels: Vec<Label>,
}

/// Options for automatic relabelling
#[derive(Debug, Clone)]
pub struct RelabelOptions {
    /// Phrase to white out inside each label; empty removes nothing
    pub search_text: String,
    /// Text placed at the bottom of every label
    pub replacement_text: Option<String>,
    /// Font size of the replacement text
    pub font_size: f32,
    pub extract: ExtractOptions,
    pub cluster: ClusterConfig,
    pub resolve: ResolveConfig,
}

impl Default for RelabelOptions {
    fn default() -> Self {
        Self {
            search_text: String::new(),
            replacement_text: Some("Made in China".to_string()),
            font_size: 8.0,
            extract: ExtractOptions::default(),
            cluster: ClusterConfig::default(),
            resolve: ResolveConfig::default(),
        }
    }
}

/// Per-page outcome of a relabel run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSummary {
    pub page: u32,
    pub labels: usize,
    pub areas_removed: usize,
    pub texts_added: usize,
}

/// Relabelled document plus what was done to it
#[derive(Debug)]
pub struct RelabelResult {
    pub pdf: Vec<u8>,
    pub pages: Vec<PageSummary>,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// Load a PDF file, rejecting encrypted documents
pub fn load_document<P: AsRef<Path>>(path: P) -> Result<Document, LabelPatchError> {
    let buffer = read_input(path)?;
    load_document_mem(&buffer)
}

/// Load a PDF from memory, rejecting encrypted documents
pub fn load_document_mem(buffer: &[u8]) -> Result<Document, LabelPatchError> {
    let doc = Document::load_mem(buffer)?;
    check_document(doc)
}

fn check_document(doc: Document) -> Result<Document, LabelPatchError> {
    if doc.is_encrypted() {
        return Err(LabelPatchError::Encrypted);
    }
    Ok(doc)
}

/// Labels in one page content stream; `page_height` flips coordinates
pub fn detect_labels(
    stream: &[u8],
    page_height: f32,
    extract: &ExtractOptions,
    cluster: &ClusterConfig,
) -> Vec<Label> {
    let tokens = extract_tokens(stream, extract);
    labels_from_tokens(&tokens, page_height, cluster)
}

fn labels_from_tokens(tokens: &[Token], page_height: f32, cluster: &ClusterConfig) -> Vec<Label> {
    let top_left = to_top_left(tokens, page_height);
    cluster_labels(&top_left, page_height, cluster)
}

/// Edits for one label in page coordinates
pub fn resolve_label(label: &Label, opts: &RelabelOptions) -> PageInstructions {
    let remove_areas = removal_area(label, &opts.search_text, &opts.resolve)
        .map(|local| label.to_page_rect(&local))
        .into_iter()
        .collect();
    let add_text = opts
        .replacement_text
        .iter()
        .filter(|text| !text.trim().is_empty())
        .map(|text| text_placement(text, opts.font_size, &label.bbox, &opts.resolve))
        .collect();

    PageInstructions {
        remove_areas,
        add_text,
    }
}

/// Find labels on every page of a PDF file
pub fn scan_labels<P: AsRef<Path>>(
    path: P,
    extract: &ExtractOptions,
    cluster: &ClusterConfig,
) -> Result<Vec<PageLabels>, LabelPatchError> {
    let doc = load_document(path)?;
    scan_document(&doc, extract, cluster)
}

/// Find labels on every page of a PDF memory buffer
pub fn scan_labels_mem(
    buffer: &[u8],
    extract: &ExtractOptions,
    cluster: &ClusterConfig,
) -> Result<Vec<PageLabels>, LabelPatchError> {
    let doc = load_document_mem(buffer)?;
    scan_document(&doc, extract, cluster)
}

fn scan_document(
    doc: &Document,
    extract: &ExtractOptions,
    cluster: &ClusterConfig,
) -> Result<Vec<PageLabels>, LabelPatchError> {
    let pages = extractor::extract_document_tokens(doc, extract)?;
    Ok(pages
        .into_iter()
        .map(|p| PageLabels {
            page: p.page,
            page_height: p.page_height,
            labels: labels_from_tokens(&p.tokens, p.page_height, cluster),
        })
        .collect())
}

/// Read a caller-supplied file; a missing path is reported as an input error
pub fn read_input<P: AsRef<Path>>(path: P) -> Result<Vec<u8>, LabelPatchError> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|e| missing_or_io(path, e))
}

/// Read a caller-supplied UTF-8 file, such as an instruction payload
pub fn read_input_to_string<P: AsRef<Path>>(path: P) -> Result<String, LabelPatchError> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|e| missing_or_io(path, e))
}

fn missing_or_io(path: &Path, e: std::io::Error) -> LabelPatchError {
    if e.kind() == std::io::ErrorKind::NotFound {
        LabelPatchError::MissingFile(path.to_path_buf())
    } else {
        LabelPatchError::Io(e)
    }
}

/// Relabel a PDF file
pub fn relabel_pdf<P: AsRef<Path>>(
    path: P,
    opts: &RelabelOptions,
) -> Result<RelabelResult, LabelPatchError> {
    let buffer = read_input(path)?;
    relabel_pdf_mem(&buffer, opts)
}

/// Relabel a PDF from memory.
///
/// All edits are computed before the first page is touched; any failure
/// aborts the run without output.
pub fn relabel_pdf_mem(
    buffer: &[u8],
    opts: &RelabelOptions,
) -> Result<RelabelResult, LabelPatchError> {
    let start = std::time::Instant::now();

    if !(opts.font_size.is_finite() && opts.font_size > 0.0) {
        return Err(LabelPatchError::Instructions(format!(
            "font size must be positive, got {}",
            opts.font_size
        )));
    }

    let mut editor = DocumentEditor::new(load_document_mem(buffer)?);

    let mut planned = Vec::new();
    for (page_num, page_id) in editor.pages() {
        let page =
            extractor::extract_page_tokens(editor.document(), page_id, page_num, &opts.extract)?;
        let labels = labels_from_tokens(&page.tokens, page.page_height, &opts.cluster);

        let mut edits = PageInstructions::default();
        for label in &labels {
            let resolved = resolve_label(label, opts);
            edits.remove_areas.extend(resolved.remove_areas);
            edits.add_text.extend(resolved.add_text);
        }

        planned.push((
            page_id,
            PageSummary {
                page: page_num,
                labels: labels.len(),
                areas_removed: edits.remove_areas.len(),
                texts_added: edits.add_text.len(),
            },
            edits,
        ));
    }

    let mut pages = Vec::with_capacity(planned.len());
    for (page_id, summary, edits) in planned {
        editor.draw(page_id, &edits.remove_areas, &edits.add_text)?;
        pages.push(summary);
    }

    log::info!(
        "relabelled {} pages: {} labels, {} areas removed",
        pages.len(),
        pages.iter().map(|p| p.labels).sum::<usize>(),
        pages.iter().map(|p| p.areas_removed).sum::<usize>()
    );

    Ok(RelabelResult {
        pdf: editor.save()?,
        pages,
        processing_time_ms: start.elapsed().as_millis() as u64,
    })
}

/// Apply a JSON instruction payload to a PDF file
pub fn apply_instructions<P: AsRef<Path>>(
    path: P,
    payload: &str,
) -> Result<Vec<u8>, LabelPatchError> {
    let instructions = InstructionSet::from_json(payload)?;
    let buffer = read_input(path)?;
    apply_instruction_set(&buffer, &instructions)
}

/// Apply a JSON instruction payload to a PDF in memory
pub fn apply_instructions_mem(buffer: &[u8], payload: &str) -> Result<Vec<u8>, LabelPatchError> {
    let instructions = InstructionSet::from_json(payload)?;
    apply_instruction_set(buffer, &instructions)
}

/// Apply parsed instructions; validated against the page count before drawing
pub fn apply_instruction_set(
    buffer: &[u8],
    instructions: &InstructionSet,
) -> Result<Vec<u8>, LabelPatchError> {
    let mut editor = DocumentEditor::new(load_document_mem(buffer)?);
    let pages = editor.pages();
    instructions.validate(pages.len())?;

    for (page, &page_id) in instructions.pages.iter().zip(pages.values()) {
        editor.draw(page_id, &page.remove_areas, &page.add_text)?;
    }
    log::info!(
        "applied {} edits across {} pages",
        instructions.total_edits(),
        instructions.pages.len()
    );

    editor.save()
}

#[derive(Debug, thiserror::Error)]
pub enum LabelPatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("File not found: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("PDF is encrypted")]
    Encrypted,
    #[error("Invalid PDF structure: {0}")]
    InvalidStructure(String),
    #[error("Invalid instructions: {0}")]
    Instructions(String),
    #[error("Invalid instruction JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<lopdf::Error> for LabelPatchError {
    fn from(e: lopdf::Error) -> Self {
        LabelPatchError::Parse(e.to_string())
    }
}

impl LabelPatchError {
    /// Caller-side errors, reported before any page is modified
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            LabelPatchError::MissingFile(_)
                | LabelPatchError::Instructions(_)
                | LabelPatchError::Json(_)
        )
    }
}
