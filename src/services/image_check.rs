//! Content sanity checks run before anything is written to the processed tree.

use crate::errors::ProcessingError;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;

/// Extensions the reconciliation scan treats as images by default.
pub const DEFAULT_IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "gif", "tiff"];

/// Formats accepted as card images. Anything else is `InvalidContent`.
const ACCEPTED_FORMATS: [ImageFormat; 6] = [
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// Check that `content` is a non-empty image whose header decodes.
///
/// Only the header is decoded (enough to read dimensions), not the pixels.
pub fn validate_image(key: &str, content: &[u8]) -> Result<ImageFormat, ProcessingError> {
    let invalid = |reason: String| ProcessingError::InvalidContent {
        key: key.to_string(),
        reason,
    };

    if content.is_empty() {
        return Err(invalid("empty payload".into()));
    }

    let format = image::guess_format(content)
        .map_err(|_| invalid("unrecognized image signature".into()))?;
    if !ACCEPTED_FORMATS.contains(&format) {
        return Err(invalid(format!("unsupported image format {:?}", format)));
    }

    let (width, height) = ImageReader::with_format(Cursor::new(content), format)
        .into_dimensions()
        .map_err(|err| invalid(format!("corrupt {:?} header: {}", format, err)))?;
    if width == 0 || height == 0 {
        return Err(invalid("image has no pixels".into()));
    }

    Ok(format)
}

/// Case-insensitive allow-list of file extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionAllowList {
    extensions: Vec<String>,
}

impl ExtensionAllowList {
    /// Build from raw entries; leading dots and surrounding whitespace are
    /// ignored, empty entries dropped. Returns `None` if nothing is left.
    pub fn new<I, S>(entries: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut extensions: Vec<String> = entries
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        extensions.sort();
        extensions.dedup();
        (!extensions.is_empty()).then_some(Self { extensions })
    }

    /// Parse a comma-separated list such as `png, .JPG,jpeg`.
    pub fn parse(list: &str) -> Option<Self> {
        Self::new(list.split(','))
    }

    /// Whether the filename part of `key` has an allowed extension.
    pub fn allows(&self, key: &str) -> bool {
        let filename = key.rsplit('/').next().unwrap_or(key);
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                let ext = ext.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| *allowed == ext)
            }
            _ => false,
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.extensions
    }
}

impl Default for ExtensionAllowList {
    fn default() -> Self {
        let mut extensions: Vec<String> =
            DEFAULT_IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect();
        extensions.sort();
        Self { extensions }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    /// Encode a tiny solid image in `format`.
    pub(crate) fn sample_image(format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, image::Rgb([200, 40, 10])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn accepts_common_card_formats() {
        for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Bmp] {
            let bytes = sample_image(format);
            assert_eq!(validate_image("input/a", &bytes).unwrap(), format);
        }
    }

    #[test]
    fn rejects_empty_payload() {
        let err = validate_image("input/a.png", &[]).unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidContent { reason, .. } if reason == "empty payload"));
    }

    #[test]
    fn rejects_non_image_bytes() {
        let err = validate_image("input/a.png", b"definitely not an image").unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidContent { key, .. } if key == "input/a.png"));
    }

    #[test]
    fn rejects_truncated_header() {
        let png = sample_image(ImageFormat::Png);
        let err = validate_image("input/a.png", &png[..12]).unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidContent { .. }));
    }

    #[test]
    fn default_allow_list_matches_case_insensitively() {
        let list = ExtensionAllowList::default();
        assert!(list.allows("input/pikachu.PNG"));
        assert!(list.allows("input/deep/charizard.jpeg"));
        assert!(list.allows("scan.tiff"));
        assert!(!list.allows("input/notes.txt"));
        assert!(!list.allows("input/png"));
        assert!(!list.allows("input/.png"));
        assert!(!list.allows("input/"));
    }

    #[test]
    fn parse_normalizes_entries() {
        let list = ExtensionAllowList::parse(" .PNG, jpg ,,webp").unwrap();
        assert_eq!(list.as_slice(), ["jpg", "png", "webp"]);
        assert!(list.allows("a.webp"));
        assert!(ExtensionAllowList::parse(" , ").is_none());
    }
}
