use std::fs;
use std::path::Path;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("not an image file")]
    NotAnImage,
}

/// The file currently staged for a one-shot scan. Lives from selection
/// until it is scanned, replaced, or reset.
#[derive(Debug, Clone)]
pub struct UploadCandidate {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl UploadCandidate {
    /// Read and validate a local file. Anything `image::guess_format`
    /// cannot identify is rejected before any state changes.
    pub fn load(path: &Path) -> Result<Self, UploadError> {
        let bytes = fs::read(path).map_err(|source| UploadError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_bytes(file_name_of(path), bytes)
    }

    pub fn from_bytes(file_name: String, bytes: Vec<u8>) -> Result<Self, UploadError> {
        let format = image::guess_format(&bytes).map_err(|_| UploadError::NotAnImage)?;
        Ok(Self {
            file_name,
            mime: format.to_mime_type(),
            bytes,
        })
    }

    /// Local preview for the frontend; no server round-trip.
    pub fn preview_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64_STANDARD.encode(&self.bytes))
    }
}

/// Holds at most one candidate at a time.
#[derive(Debug, Default)]
pub struct UploadSlot {
    candidate: Option<UploadCandidate>,
}

impl UploadSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&mut self, candidate: UploadCandidate) {
        self.candidate = Some(candidate);
    }

    /// Consume the candidate for scanning.
    pub fn take(&mut self) -> Option<UploadCandidate> {
        self.candidate.take()
    }

    pub fn clear(&mut self) {
        self.candidate = None;
    }

    pub fn is_empty(&self) -> bool {
        self.candidate.is_none()
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(2, 2, image::Rgb([255, 0, 0]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn accepts_an_image_and_derives_its_mime_type() {
        let candidate = UploadCandidate::from_bytes("code.png".into(), png_bytes()).unwrap();
        assert_eq!(candidate.mime, "image/png");
        assert_eq!(candidate.file_name, "code.png");
    }

    #[test]
    fn rejects_non_image_bytes_without_touching_the_slot() {
        let mut slot = UploadSlot::new();
        slot.select(UploadCandidate::from_bytes("code.png".into(), png_bytes()).unwrap());

        let err = UploadCandidate::from_bytes("notes.txt".into(), b"just text".to_vec())
            .unwrap_err();
        assert!(matches!(err, UploadError::NotAnImage));

        // The previously staged candidate is unchanged.
        assert!(!slot.is_empty());
        assert_eq!(slot.take().unwrap().file_name, "code.png");
    }

    #[test]
    fn preview_is_a_data_url_for_the_detected_type() {
        let candidate = UploadCandidate::from_bytes("code.png".into(), png_bytes()).unwrap();
        assert!(candidate.preview_data_url().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn restaging_after_a_failed_scan_keeps_the_file_ready_for_retry() {
        let mut slot = UploadSlot::new();
        slot.select(UploadCandidate::from_bytes("code.png".into(), png_bytes()).unwrap());

        // The scan command takes the candidate, the request fails, and the
        // candidate goes back in so the next attempt finds it staged.
        let candidate = slot.take().unwrap();
        assert!(slot.is_empty());
        slot.select(candidate);

        assert!(!slot.is_empty());
        assert_eq!(slot.take().unwrap().file_name, "code.png");
    }

    #[test]
    fn take_consumes_the_candidate() {
        let mut slot = UploadSlot::new();
        assert!(slot.take().is_none());

        slot.select(UploadCandidate::from_bytes("code.png".into(), png_bytes()).unwrap());
        assert!(slot.take().is_some());
        assert!(slot.is_empty());
    }
}
