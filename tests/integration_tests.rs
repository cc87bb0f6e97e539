//! Integration tests for label-patch

use label_patch::extractor::{extract_tokens_mem, ExtractOptions};
use label_patch::{
    apply_instructions_mem, cluster_labels, is_anchor, relabel_pdf, relabel_pdf_mem,
    removal_area, scan_labels, scan_labels_mem, text_placement, ClusterConfig, LabelPatchError,
    Rect, RelabelOptions, ResolveConfig, Token,
};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::Write;

// Builds a PDF with one page per content string; MediaBox and Resources
// live on the page tree node so pages inherit them.
fn build_pdf(contents: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! {
            "F1" => font_id,
        },
    });

    let mut kids: Vec<Object> = Vec::new();
    for content in contents {
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.as_bytes().to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => contents.len() as i64,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 800.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer).unwrap();
    buffer
}

// Anchor at raw (100, 90) and "SomeText" at raw (90, 100), both 10pt.
// On an 800pt page that is top-left (100, 700) and (90, 690).
const LABEL_PAGE: &str = "BT /F1 1 Tf 10 0 0 10 100 90 Tm (B0ABCDEFGH) Tj ET\n\
                          BT /F1 1 Tf 10 0 0 10 90 100 Tm (SomeText) Tj ET\n\
                          BT /F1 1 Tf 10 0 0 10 400 500 Tm (Unrelated) Tj ET";

fn token(text: &str, x: f32, y: f32, size: f32) -> Token {
    Token {
        text: text.into(),
        x,
        y,
        width: text.chars().count() as f32 * size * 0.55,
        height: size,
    }
}

fn first_page(doc: &Document) -> ObjectId {
    *doc.get_pages().values().next().unwrap()
}

fn page_content(pdf: &[u8]) -> String {
    let doc = Document::load_mem(pdf).unwrap();
    let content = doc.get_page_content(first_page(&doc)).unwrap();
    String::from_utf8_lossy(&content).to_string()
}

// ============================================================================
// Clustering Properties
// ============================================================================

#[test]
fn test_scenario_both_tokens_in_one_label() {
    let tokens = vec![
        token("B0ABCDEFGH", 100.0, 700.0, 10.0),
        token("SomeText", 90.0, 690.0, 10.0),
    ];
    let labels = cluster_labels(&tokens, 800.0, &ClusterConfig::default());
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].items.len(), 2);
}

#[test]
fn test_one_label_per_anchor() {
    let tokens = vec![
        token("B0ABCDEFGH", 50.0, 100.0, 10.0),
        token("Weight 1kg", 60.0, 120.0, 8.0),
        token("X00ABCDEFG1", 300.0, 100.0, 10.0),
        token("A012345678", 320.0, 120.0, 10.0),
        token(" B0ZZZZZZZZ ", 50.0, 500.0, 10.0),
    ];
    let labels = cluster_labels(&tokens, 800.0, &ClusterConfig::default());
    let anchors: Vec<&Token> = tokens.iter().filter(|t| is_anchor(&t.text)).collect();
    assert_eq!(anchors.len(), 3);
    assert_eq!(labels.len(), anchors.len());
    for (label, anchor) in labels.iter().zip(anchors) {
        assert_eq!(&label.anchor, anchor);
        assert!(label.items.contains(anchor));
    }
}

#[test]
fn test_label_box_bounds_every_member() {
    let tokens = vec![
        token("B0ABCDEFGH", 100.0, 300.0, 12.0),
        token("Left", 0.0, 280.0, 6.0),
        token("Long description line", 150.0, 330.0, 9.0),
        token("Below", 80.0, 340.0, 14.0),
    ];
    let page_height = 800.0;
    let label = &cluster_labels(&tokens, page_height, &ClusterConfig::default())[0];
    assert_eq!(label.items.len(), 4);
    // Compare in top-left space
    let top = page_height - label.bbox.y - label.bbox.height;
    for item in &label.items {
        assert!(label.bbox.x <= item.x);
        assert!(label.bbox.x + label.bbox.width >= item.x + item.width);
        assert!(top <= item.y);
        assert!(top + label.bbox.height >= item.y + item.height);
    }
}

#[test]
fn test_identifier_pattern_rejects_other_prefixes() {
    assert!(!is_anchor("A012345678"));
    let tokens = vec![token("A012345678", 100.0, 100.0, 10.0)];
    assert!(cluster_labels(&tokens, 800.0, &ClusterConfig::default()).is_empty());
}

// ============================================================================
// Resolver Properties
// ============================================================================

#[test]
fn test_removal_scenario() {
    let tokens = vec![
        token("B0ABCDEFGH", 100.0, 700.0, 10.0),
        token("SomeText", 90.0, 690.0, 10.0),
    ];
    let label = &cluster_labels(&tokens, 800.0, &ClusterConfig::default())[0];
    let config = ResolveConfig::default();
    let area = removal_area(label, "SomeText", &config).unwrap();
    let some_text = &tokens[1];
    assert_eq!(area.x, some_text.x - 2.0);
    assert!((area.width - (some_text.width + 4.0)).abs() < 1e-4);
    assert_eq!(area.height, some_text.height + 4.0);
    assert_eq!(
        area.y,
        label.bbox.height + label.bbox.y - (some_text.y + some_text.height) - 2.0
    );
    assert_eq!(removal_area(label, "SomeText", &config), Some(area));
    assert!(removal_area(label, "", &config).is_none());
}

#[test]
fn test_insertion_scenario() {
    let target = Rect::new(0.0, 0.0, 200.0, 50.0);
    let placement = text_placement("Made in China", 8.0, &target, &ResolveConfig::default());
    let text_width = "Made in China".len() as f32 * 8.0 * 0.55;
    assert!((placement.x - (100.0 - text_width / 2.0)).abs() < 1e-4);
    assert_eq!(placement.y, 2.0);
}

// ============================================================================
// Document Pipeline
// ============================================================================

#[test]
fn test_extract_tokens_from_pdf() {
    let pdf = build_pdf(&[LABEL_PAGE]);
    let pages = extract_tokens_mem(&pdf, &ExtractOptions::default()).unwrap();
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].page_height, 800.0);
    let texts: Vec<&str> = pages[0].tokens.iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, vec!["B0ABCDEFGH", "SomeText", "Unrelated"]);
}

#[test]
fn test_scan_labels_mem() {
    let pdf = build_pdf(&[LABEL_PAGE, "BT 10 0 0 10 50 50 Tm (Nothing here) Tj ET"]);
    let pages = scan_labels_mem(&pdf, &ExtractOptions::default(), &ClusterConfig::default())
        .unwrap();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].labels.len(), 1);
    assert!(pages[1].labels.is_empty());

    let label = &pages[0].labels[0];
    assert_eq!(label.anchor.text, "B0ABCDEFGH");
    assert_eq!(label.items.len(), 2);
    assert_eq!(label.bbox, Rect::new(90.0, 90.0, label.bbox.width, 20.0));
}

#[test]
fn test_relabel_whites_out_and_stamps() {
    let pdf = build_pdf(&[LABEL_PAGE]);
    let opts = RelabelOptions {
        search_text: "SomeText".into(),
        ..Default::default()
    };
    let result = relabel_pdf_mem(&pdf, &opts).unwrap();
    assert_eq!(result.pages.len(), 1);
    assert_eq!(result.pages[0].labels, 1);
    assert_eq!(result.pages[0].areas_removed, 1);
    assert_eq!(result.pages[0].texts_added, 1);

    let content = page_content(&result.pdf);
    assert!(content.contains("B0ABCDEFGH"));
    assert!(content.contains(" re"));
    assert!(content.contains("Made in China"));
    assert!(content.contains("LPHelv"));

    let doc = Document::load_mem(&result.pdf).unwrap();
    let page = doc.get_dictionary(first_page(&doc)).unwrap();
    let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
    let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
    assert!(fonts.get(b"F1").is_ok());
    assert!(fonts.get(b"LPHelv").is_ok());

    // Inserted text is not positioned by Tm, so labels are unchanged
    let rescanned = scan_labels_mem(
        &result.pdf,
        &ExtractOptions::default(),
        &ClusterConfig::default(),
    )
    .unwrap();
    assert_eq!(rescanned[0].labels.len(), 1);
}

#[test]
fn test_relabel_without_match_only_stamps() {
    let pdf = build_pdf(&[LABEL_PAGE]);
    let opts = RelabelOptions {
        search_text: "Made in Vietnam".into(),
        ..Default::default()
    };
    let result = relabel_pdf_mem(&pdf, &opts).unwrap();
    assert_eq!(result.pages[0].areas_removed, 0);
    assert_eq!(result.pages[0].texts_added, 1);
}

#[test]
fn test_relabel_rejects_bad_font_size() {
    let pdf = build_pdf(&[LABEL_PAGE]);
    let opts = RelabelOptions {
        search_text: "SomeText".into(),
        font_size: 0.0,
        ..Default::default()
    };
    let err = relabel_pdf_mem(&pdf, &opts).unwrap_err();
    assert!(err.is_input_error());
}

#[test]
fn test_relabel_from_file() {
    let pdf = build_pdf(&[LABEL_PAGE]);
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&pdf).unwrap();

    let opts = RelabelOptions {
        search_text: "some text".into(),
        replacement_text: None,
        ..Default::default()
    };
    let result = relabel_pdf(file.path(), &opts).unwrap();
    assert_eq!(result.pages[0].areas_removed, 1);
    assert_eq!(result.pages[0].texts_added, 0);

    let pages = scan_labels(
        file.path(),
        &ExtractOptions::default(),
        &ClusterConfig::default(),
    )
    .unwrap();
    assert_eq!(pages[0].labels.len(), 1);
}

#[test]
fn test_relabel_missing_file_is_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing.pdf");

    let err = relabel_pdf(&path, &RelabelOptions::default()).unwrap_err();
    assert!(matches!(err, LabelPatchError::MissingFile(_)));
    assert!(err.is_input_error());

    let err = scan_labels(&path, &ExtractOptions::default(), &ClusterConfig::default())
        .unwrap_err();
    assert!(err.is_input_error());
}

#[test]
fn test_relabel_drops_replaced_content() {
    let pdf = build_pdf(&[LABEL_PAGE]);
    let opts = RelabelOptions {
        search_text: "SomeText".into(),
        ..Default::default()
    };
    let result = relabel_pdf_mem(&pdf, &opts).unwrap();

    let doc = Document::load_mem(&result.pdf).unwrap();
    let original_streams = doc
        .objects
        .values()
        .filter_map(|obj| obj.as_stream().ok())
        .filter(|stream| stream.content.starts_with(b"BT /F1"))
        .count();
    assert_eq!(original_streams, 0);
    assert!(page_content(&result.pdf).contains("SomeText"));
}

#[test]
fn test_relabel_keeps_existing_font_name() {
    let mut doc = Document::load_mem(&build_pdf(&[LABEL_PAGE])).unwrap();
    let pages_id = doc.catalog().unwrap().get(b"Pages").unwrap().as_reference().unwrap();
    let resources_id = doc
        .get_dictionary(pages_id)
        .unwrap()
        .get(b"Resources")
        .unwrap()
        .as_reference()
        .unwrap();
    let resources = doc.get_dictionary_mut(resources_id).unwrap();
    let fonts = resources.get_mut(b"Font").unwrap().as_dict_mut().unwrap();
    let existing = fonts.get(b"F1").unwrap().as_reference().unwrap();
    fonts.set("LPHelv", Object::Reference(existing));
    let mut pdf = Vec::new();
    doc.save_to(&mut pdf).unwrap();

    let opts = RelabelOptions {
        search_text: "SomeText".into(),
        ..Default::default()
    };
    let result = relabel_pdf_mem(&pdf, &opts).unwrap();

    let out = Document::load_mem(&result.pdf).unwrap();
    let page = out.get_dictionary(first_page(&out)).unwrap();
    let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
    let fonts = resources.get(b"Font").unwrap().as_dict().unwrap();
    let kept = fonts.get(b"LPHelv").unwrap().as_reference().unwrap();
    let added = fonts.get(b"LPHelv1").unwrap().as_reference().unwrap();
    assert_eq!(kept, fonts.get(b"F1").unwrap().as_reference().unwrap());
    assert_ne!(kept, added);
    assert!(page_content(&result.pdf).contains("/LPHelv1"));
}

// ============================================================================
// Instruction Application
// ============================================================================

#[test]
fn test_apply_instructions() {
    let pdf = build_pdf(&[LABEL_PAGE, LABEL_PAGE]);
    let payload = r#"{"pages":[
        {"removeAreas":[{"x":88,"y":98,"width":48,"height":14}],
         "addText":[{"text":"Made in China","x":100,"y":92,"fontSize":8}]}
    ]}"#;
    let output = apply_instructions_mem(&pdf, payload).unwrap();
    let content = page_content(&output);
    assert!(content.contains(" re"));
    assert!(content.contains("Made in China"));

    let doc = Document::load_mem(&output).unwrap();
    assert_eq!(doc.get_pages().len(), 2);
    let second = *doc.get_pages().get(&2).unwrap();
    let untouched = String::from_utf8_lossy(&doc.get_page_content(second).unwrap()).to_string();
    assert!(!untouched.contains("Made in China"));
}

#[test]
fn test_apply_too_many_pages_is_input_error() {
    let pdf = build_pdf(&[LABEL_PAGE]);
    let payload = r#"{"pages":[{},{}]}"#;
    let err = apply_instructions_mem(&pdf, payload).unwrap_err();
    assert!(matches!(err, LabelPatchError::Instructions(_)));
    assert!(err.is_input_error());
}

#[test]
fn test_apply_malformed_payload() {
    let pdf = build_pdf(&[LABEL_PAGE]);
    let err = apply_instructions_mem(&pdf, "{\"pages\": [").unwrap_err();
    assert!(matches!(err, LabelPatchError::Json(_)));

    let err = apply_instructions_mem(&pdf, "").unwrap_err();
    assert!(err.is_input_error());
}

#[test]
fn test_payload_checked_before_document() {
    // A bad payload wins over a corrupt document
    let err = apply_instructions_mem(b"not a pdf", "nope").unwrap_err();
    assert!(err.is_input_error());
}

#[test]
fn test_corrupt_document_is_processing_error() {
    let err = apply_instructions_mem(b"not a pdf", r#"{"pages":[]}"#).unwrap_err();
    assert!(!err.is_input_error());

    let err = relabel_pdf_mem(b"garbage", &RelabelOptions::default()).unwrap_err();
    assert!(matches!(err, LabelPatchError::Parse(_)));
}
