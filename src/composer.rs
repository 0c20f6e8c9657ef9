//! Renders field values onto the stored PDF and optionally stamps a
//! verification QR code. The stored blob is never modified.

use crate::canvas::{Drawn, PdfCanvas};
use crate::documents::authorize_access;
use crate::model::DocumentStatus;
use crate::users::Caller;
use crate::{Engine, Error, Result};
use serde::Serialize;

/// A composed PDF ready to be streamed to a client.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComposedPdf {
    pub file_name: String,
    pub content_type: &'static str,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for ComposedPdf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedPdf")
            .field("file_name", &self.file_name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

#[derive(Clone, Copy)]
pub struct PdfComposer<'a> {
    engine: &'a Engine,
}

impl<'a> PdfComposer<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self { engine }
    }

    /// Draw every filled field on the original bytes; with `with_qr` also stamp
    /// the verification QR on the last page.
    pub fn compose(&self, document_id: &str, with_qr: bool) -> Result<Vec<u8>> {
        let (blob_key, fields) = self.engine.store().read(|tables| {
            let document = tables.document(document_id)?;
            Ok::<_, Error>((
                document.blob_key.clone(),
                tables.fields_of_document(document_id),
            ))
        })?;
        let original = self.engine.hasher().read(&blob_key)?;
        let mut canvas = PdfCanvas::load(&original)?;

        let mut drawn = 0;
        for field in &fields {
            if canvas.draw_field(field)? != Drawn::Skipped {
                drawn += 1;
            }
        }
        if with_qr {
            let url = self.engine.config().verification_url(document_id);
            canvas.stamp_verification_qr(&url)?;
        }
        log::info!(
            "Composed document {}: {} of {} fields drawn{}",
            document_id,
            drawn,
            fields.len(),
            if with_qr { ", verification QR stamped" } else { "" }
        );
        canvas.finished()
    }

    /// Owner or signer download with signature images embedded.
    pub fn download(&self, caller: &Caller, document_id: &str) -> Result<ComposedPdf> {
        let title = self.engine.store().read(|tables| {
            let document = tables.document(document_id)?;
            authorize_access(tables, document, caller)?;
            Ok::<_, Error>(document.title.clone())
        })?;
        Ok(ComposedPdf {
            file_name: format!("{}_signed.pdf", safe_file_stem(&title)),
            content_type: "application/pdf",
            bytes: self.compose(document_id, false)?,
        })
    }

    /// Final artifact with the verification QR. Completed documents only.
    pub fn verification_artifact(&self, caller: &Caller, document_id: &str) -> Result<ComposedPdf> {
        let title = self.engine.store().read(|tables| {
            let document = tables.document(document_id)?;
            authorize_access(tables, document, caller)?;
            if document.status != DocumentStatus::Done {
                return Err(Error::invalid_state(
                    "Document must be completed before the verification copy can be created",
                ));
            }
            Ok(document.title.clone())
        })?;
        Ok(ComposedPdf {
            file_name: format!("{}_verified.pdf", safe_file_stem(&title)),
            content_type: "application/pdf",
            bytes: self.compose(document_id, true)?,
        })
    }
}

/// Title without path separators or control characters, usable as file name.
fn safe_file_stem(title: &str) -> String {
    let stem: String = title
        .trim()
        .trim_end_matches(".pdf")
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '"' | '*' | '?' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if stem.is_empty() {
        "document".to_owned()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem_is_sanitised() {
        assert_eq!(safe_file_stem("Contract"), "Contract");
        assert_eq!(safe_file_stem("a/b: c.pdf"), "a_b_ c");
        assert_eq!(safe_file_stem("  "), "document");
    }
}
