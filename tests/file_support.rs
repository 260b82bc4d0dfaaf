//! Extraction of the three accepted formats from files on disk.

mod common;

use common::{docx, pptx, zip_entries};
use ragdrop::extract::{DocumentExtractor, DocumentFormat, ExtractError, Extractor};
use std::fs;
use tempfile::TempDir;

#[test]
fn file_support_docx_paragraphs() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("policy.docx");
    fs::write(&path, docx(&["Line one", "Line two"])).unwrap();

    let text = DocumentExtractor.extract(&path).unwrap();
    assert_eq!(text, "Line one\nLine two\n");
}

#[test]
fn file_support_pptx_slides_with_separators() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("deck.pptx");
    fs::write(&path, pptx(&[&["Title", "Subtitle"], &["Agenda"]])).unwrap();

    let text = DocumentExtractor.extract(&path).unwrap();
    let sep = "-".repeat(40);
    assert_eq!(
        text,
        format!(
            "Slide 1:\nTitle\nSubtitle\n\n{sep}\nSlide 2:\nAgenda\n\n{sep}\n",
            sep = sep
        )
    );
}

#[test]
fn file_support_uppercase_extension_accepted() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("SHOUT.DOCX");
    fs::write(&path, docx(&["loud"])).unwrap();
    assert_eq!(DocumentExtractor.extract(&path).unwrap(), "loud\n");
    assert_eq!(DocumentFormat::from_path(&path), Some(DocumentFormat::Docx));
}

#[test]
fn file_support_docx_with_table() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("table.docx");
    let xml = "<?xml version=\"1.0\"?>\
        <w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>\
        <w:p><w:r><w:t>Prices</w:t></w:r></w:p>\
        <w:tbl>\
        <w:tr><w:tc><w:p><w:r><w:t>apple</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>3</w:t></w:r></w:p></w:tc></w:tr>\
        <w:tr><w:tc><w:p><w:r><w:t>pear</w:t></w:r></w:p></w:tc><w:tc><w:p><w:r><w:t>5</w:t></w:r></w:p></w:tc></w:tr>\
        </w:tbl></w:body></w:document>";
    fs::write(
        &path,
        zip_entries(&[("word/document.xml".to_string(), xml.to_string())]),
    )
    .unwrap();

    let text = DocumentExtractor.extract(&path).unwrap();
    assert_eq!(text, "Prices\napple 3 \npear 5 \n");
}

#[test]
fn file_support_corrupt_pdf_is_an_extraction_error() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("bad.pdf");
    fs::write(&path, b"not a valid pdf").unwrap();
    assert!(matches!(
        DocumentExtractor.extract(&path),
        Err(ExtractError::Pdf(_))
    ));
}

#[test]
fn file_support_missing_file_is_io_error() {
    let tmp = TempDir::new().unwrap();
    assert!(matches!(
        DocumentExtractor.extract(&tmp.path().join("gone.docx")),
        Err(ExtractError::Io { .. })
    ));
}

#[test]
fn file_support_other_formats_rejected() {
    let tmp = TempDir::new().unwrap();
    for name in ["readme.md", "sheet.xlsx", "noext"] {
        let path = tmp.path().join(name);
        fs::write(&path, b"data").unwrap();
        assert!(
            matches!(
                DocumentExtractor.extract(&path),
                Err(ExtractError::UnsupportedFormat(_))
            ),
            "{} should be rejected",
            name
        );
    }
}
