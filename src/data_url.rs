//! `data:{mime};base64,{payload}` values of image fields and templates.

use crate::{Error, Result};

pub(crate) const PNG: &str = "image/png";
pub(crate) const SVG: &str = "image/svg+xml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DataUrl<'a> {
    pub mime: &'a str,
    pub payload: &'a str,
}

impl<'a> DataUrl<'a> {
    /// Split a base64 data URL. `None` for anything else.
    pub fn parse(value: &'a str) -> Option<Self> {
        let rest = value.trim().strip_prefix("data:")?;
        let (header, payload) = rest.split_once(',')?;
        let mime = header.strip_suffix(";base64")?;
        if mime.is_empty() || payload.is_empty() {
            return None;
        }
        Some(Self { mime, payload })
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        Ok(base64::decode(self.payload)?)
    }
}

/// Check that `value` is a PNG or SVG data URL with a decodable payload.
pub(crate) fn validate_signature_image(value: &str) -> Result<()> {
    let url = DataUrl::parse(value).ok_or_else(|| {
        Error::validation("Signature value must be a base64 data:image URL")
    })?;
    if url.mime != PNG && url.mime != SVG {
        return Err(Error::validation(format!(
            "Unsupported signature image type `{}`, expected PNG or SVG",
            url.mime
        )));
    }
    let bytes = url.decode()?;
    if url.mime == PNG && !bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Err(Error::validation("Signature image is not a PNG"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_splits_mime_and_payload() {
        let url = DataUrl::parse("data:image/svg+xml;base64,PHN2Zy8+").unwrap();
        assert_eq!(url.mime, SVG);
        assert_eq!(url.decode().unwrap(), b"<svg/>".to_vec());
        assert!(url.is_image());
        assert!(DataUrl::parse("data:image/png,raw").is_none());
        assert!(DataUrl::parse("hello").is_none());
    }

    #[test]
    fn test_only_png_and_svg_signatures_are_accepted() {
        let png = format!("data:image/png;base64,{}", base64::encode(b"\x89PNG\r\n\x1a\nrest"));
        assert!(validate_signature_image(&png).is_ok());
        let gif = format!("data:image/gif;base64,{}", base64::encode(b"GIF89a"));
        assert!(matches!(validate_signature_image(&gif), Err(Error::Validation(_))));
        let fake = format!("data:image/png;base64,{}", base64::encode(b"hello"));
        assert!(validate_signature_image(&fake).is_err());
        assert!(validate_signature_image("data:image/png;base64,%%%").is_err());
    }
}
