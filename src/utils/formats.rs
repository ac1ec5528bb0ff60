use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use crate::utils::{BenchResult, ValidationError};

/// Number of leading bytes sniffed to recognize a format.
const SNIFF_LEN: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    JPEG,
    PNG,
    GIF,
    SVG,
    WebP,
    AVIF,
}

impl ImageFormat {
    /// Lowercase name used in reports and report file names
    pub fn name(&self) -> &'static str {
        match self {
            Self::JPEG => "jpeg",
            Self::PNG => "png",
            Self::GIF => "gif",
            Self::SVG => "svg",
            Self::WebP => "webp",
            Self::AVIF => "avif",
        }
    }

    /// Recognizes a format from the leading bytes of a file.
    pub fn sniff(head: &[u8]) -> Option<Self> {
        if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::JPEG);
        }
        if head.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some(Self::PNG);
        }
        if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
            return Some(Self::GIF);
        }
        if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }
        if head.len() >= 12 && &head[4..8] == b"ftyp" && matches!(&head[8..12], b"avif" | b"avis") {
            return Some(Self::AVIF);
        }

        // SVG is text: accept an XML prolog or a bare <svg root, optionally after a BOM.
        let text = String::from_utf8_lossy(head);
        let text = text.trim_start_matches('\u{feff}').trim_start();
        if text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg")) {
            return Some(Self::SVG);
        }
        None
    }

    /// Detects the format of a file on disk from its content.
    pub fn detect(path: &Path) -> BenchResult<Self> {
        let mut head = Vec::with_capacity(SNIFF_LEN);
        File::open(path)?
            .take(SNIFF_LEN as u64)
            .read_to_end(&mut head)?;
        Self::sniff(&head).ok_or_else(|| ValidationError::UnknownFormat(path.to_path_buf()).into())
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_binary_formats() {
        assert_eq!(ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::JPEG));
        assert_eq!(ImageFormat::sniff(b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR"), Some(ImageFormat::PNG));
        assert_eq!(ImageFormat::sniff(b"GIF89a\x01\0\x01\0"), Some(ImageFormat::GIF));
        assert_eq!(ImageFormat::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageFormat::WebP));
        assert_eq!(ImageFormat::sniff(b"\0\0\0\x1cftypavif"), Some(ImageFormat::AVIF));
    }

    #[test]
    fn sniffs_svg_with_prolog_and_bom() {
        let svg = "\u{feff}  <?xml version=\"1.0\"?>\n<svg xmlns=\"http://www.w3.org/2000/svg\"/>";
        assert_eq!(ImageFormat::sniff(svg.as_bytes()), Some(ImageFormat::SVG));
        assert_eq!(ImageFormat::sniff(b"<?xml version=\"1.0\"?><html/>"), None);
    }

    #[test]
    fn rejects_unknown_content() {
        assert_eq!(ImageFormat::sniff(b"hello world"), None);
        assert_eq!(ImageFormat::sniff(b""), None);
    }

    #[test]
    fn config_names_match_report_names() {
        let formats: Vec<ImageFormat> = serde_json::from_str(r#"["jpeg", "svg", "webp"]"#).unwrap();
        assert_eq!(formats, vec![ImageFormat::JPEG, ImageFormat::SVG, ImageFormat::WebP]);
        assert_eq!(serde_json::to_string(&ImageFormat::WebP).unwrap(), format!("\"{}\"", ImageFormat::WebP.name()));
        assert!(serde_json::from_str::<ImageFormat>(r#""tiff""#).is_err());
    }
}
