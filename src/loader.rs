//! Document text extraction.
//!
//! Plain text documents pass through verbatim (lossy UTF-8 decoding). PDFs
//! are extracted page by page and concatenated in page order; a page with no
//! extractable text contributes an empty string rather than failing the
//! whole document. Everything else is unsupported.

use std::fs;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("unsupported document type '{0}'")]
    UnsupportedType(String),
    #[error("failed to extract text: {0}")]
    ExtractionFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Pdf,
}

impl DocumentKind {
    /// Resolves the kind from the declared MIME type when one is given,
    /// falling back to the file extension.
    pub fn detect(filename: &str, content_type: Option<&str>) -> Result<Self, LoaderError> {
        if let Some(mime) = content_type {
            let mime = mime
                .split(';')
                .next()
                .unwrap_or("")
                .trim()
                .to_ascii_lowercase();
            if mime == "application/pdf" {
                return Ok(DocumentKind::Pdf);
            }
            if mime.starts_with("text/") {
                return Ok(DocumentKind::Text);
            }
        }

        let extension = Path::new(filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match extension.as_str() {
            "txt" | "md" | "markdown" | "text" => Ok(DocumentKind::Text),
            "pdf" => Ok(DocumentKind::Pdf),
            _ => Err(LoaderError::UnsupportedType(
                content_type
                    .map(str::to_string)
                    .unwrap_or_else(|| extension.clone()),
            )),
        }
    }
}

pub fn extract_text(
    filename: &str,
    content_type: Option<&str>,
    bytes: &[u8],
) -> Result<String, LoaderError> {
    match DocumentKind::detect(filename, content_type)? {
        DocumentKind::Text => Ok(String::from_utf8_lossy(bytes).into_owned()),
        DocumentKind::Pdf => extract_pdf_text(bytes),
    }
}

/// Extraction for files already on disk (upload re-ingestion during a
/// rebuild). The kind comes from the extension alone.
pub fn extract_file(path: &Path) -> Result<String, LoaderError> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let bytes = fs::read(path).map_err(|err| LoaderError::ExtractionFailed(err.to_string()))?;
    extract_text(filename, None, &bytes)
}

fn extract_pdf_text(bytes: &[u8]) -> Result<String, LoaderError> {
    let document = lopdf::Document::load_mem(bytes)
        .map_err(|err| LoaderError::ExtractionFailed(err.to_string()))?;

    let mut pages_text = Vec::new();
    for (&page_number, _) in document.get_pages().iter() {
        let text = document.extract_text(&[page_number]).unwrap_or_default();
        pages_text.push(text);
    }
    Ok(pages_text.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    fn pdf_with_pages(page_texts: &[Option<&str>]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in page_texts {
            let operations = match text {
                Some(text) => vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 24.into()]),
                    Operation::new("Td", vec![100.into(), 600.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
                None => vec![],
            };
            let content = Content { operations };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
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

    #[test]
    fn plain_text_passes_through_verbatim() {
        let text = extract_text("notes.txt", None, b"line one\n\nline two").unwrap();
        assert_eq!(text, "line one\n\nline two");
    }

    #[test]
    fn declared_mime_type_wins_over_extension() {
        let kind = DocumentKind::detect("payload.bin", Some("text/plain; charset=utf-8")).unwrap();
        assert_eq!(kind, DocumentKind::Text);
    }

    #[test]
    fn unknown_types_are_rejected() {
        let err = extract_text("brief.docx", None, b"zip bytes").unwrap_err();
        assert!(matches!(err, LoaderError::UnsupportedType(_)));
    }

    #[test]
    fn pdf_pages_are_extracted_in_order() {
        let bytes = pdf_with_pages(&[Some("First page words"), Some("Second page words")]);
        let text = extract_text("brief.pdf", Some("application/pdf"), &bytes).unwrap();

        assert!(text.contains("First page words"));
        assert!(text.contains("Second page words"));
        assert!(text.find("First").unwrap() < text.find("Second").unwrap());
    }

    #[test]
    fn empty_pdf_page_contributes_nothing_but_does_not_fail() {
        let bytes = pdf_with_pages(&[Some("Only real page"), None]);
        let text = extract_text("brief.pdf", None, &bytes).unwrap();
        assert!(text.contains("Only real page"));
    }

    #[test]
    fn garbage_pdf_reports_extraction_failed() {
        let err = extract_text("broken.pdf", None, b"%PDF-1.5 not really").unwrap_err();
        assert!(matches!(err, LoaderError::ExtractionFailed(_)));
    }

    #[test]
    fn extract_file_reads_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("upload.txt");
        fs::write(&path, "stored upload").unwrap();

        assert_eq!(extract_file(&path).unwrap(), "stored upload");
        assert!(extract_file(&tmp.path().join("missing.txt")).is_err());
    }
}
