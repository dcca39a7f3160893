//! Splits an upload into per-page byte blobs.
//!
//! PDFs are split into single-page PDF documents; PNG/JPEG uploads are a
//! single page as-is. Page numbering is 1-based and matches the source
//! document order.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PageError {
    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse PDF: {0}")]
    PdfParse(#[from] lopdf::Error),

    #[error("Failed to write page PDF: {0}")]
    PdfWrite(String),

    #[error("Document has no pages")]
    Empty,
}

/// One page of an upload, ready to store and classify.
#[derive(Debug, Clone)]
pub struct Page {
    /// 1-based page number within the upload.
    pub number: u32,
    pub bytes: Vec<u8>,
    /// File extension for the page blob (`pdf`, `png`, `jpg`).
    pub extension: &'static str,
}

/// Splits an upload into pages based on its MIME type (from the file name).
pub fn split_document(bytes: &[u8], file_name: &str) -> Result<Vec<Page>, PageError> {
    let mime = mime_guess::from_path(file_name).first_or_octet_stream();
    match (mime.type_().as_str(), mime.subtype().as_str()) {
        ("application", "pdf") => split_pdf(bytes),
        ("image", "png") => Ok(vec![single_page(bytes, "png")]),
        ("image", "jpeg") => Ok(vec![single_page(bytes, "jpg")]),
        _ => Err(PageError::UnsupportedFormat(mime.to_string())),
    }
}

fn single_page(bytes: &[u8], extension: &'static str) -> Page {
    Page {
        number: 1,
        bytes: bytes.to_vec(),
        extension,
    }
}

/// Splits a PDF into one single-page document per page.
///
/// Each page is produced by cloning the parsed document, deleting every
/// other page and pruning objects the remaining page no longer references.
fn split_pdf(bytes: &[u8]) -> Result<Vec<Page>, PageError> {
    let doc = lopdf::Document::load_mem(bytes)?;
    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    if page_numbers.is_empty() {
        return Err(PageError::Empty);
    }

    let mut pages = Vec::with_capacity(page_numbers.len());
    for &keep in &page_numbers {
        let mut single = doc.clone();
        let delete: Vec<u32> = page_numbers.iter().copied().filter(|&n| n != keep).collect();
        if !delete.is_empty() {
            single.delete_pages(&delete);
        }
        single.prune_objects();

        let mut out = Vec::new();
        single
            .save_to(&mut out)
            .map_err(|e| PageError::PdfWrite(e.to_string()))?;
        pages.push(Page {
            number: keep,
            bytes: out,
            extension: "pdf",
        });
    }

    Ok(pages)
}
