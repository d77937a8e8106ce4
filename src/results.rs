use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::decode::ScanResult;

/// A rendered detection. `timestamp` is taken when the entry is recorded,
/// not when the frame was captured. `is_url` drives the linkify and
/// open-link affordances in the frontend.
#[derive(Debug, Clone, Serialize)]
pub struct ResultEntry {
    #[serde(rename = "type")]
    pub symbol_type: String,
    pub data: String,
    pub timestamp: DateTime<Utc>,
    pub is_url: bool,
}

impl ResultEntry {
    fn from_scan(result: ScanResult) -> Self {
        let is_url = is_http_url(&result.data);
        Self {
            symbol_type: result.symbol_type,
            data: result.data,
            timestamp: Utc::now(),
            is_url,
        }
    }
}

/// Results panel state: entries in most-recent-first order plus the
/// last-seen marker used to suppress consecutive identical camera
/// detections. Uploaded scans never consult or mutate the marker.
#[derive(Debug, Default)]
pub struct ResultsLog {
    entries: Vec<ResultEntry>,
    last_seen: Option<String>,
}

impl ResultsLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a camera-sourced detection. Returns `None` when the payload
    /// matches the marker (suppressed duplicate), otherwise the new entry.
    pub fn record_camera(&mut self, result: ScanResult) -> Option<ResultEntry> {
        if self.last_seen.as_deref() == Some(result.data.as_str()) {
            return None;
        }
        self.last_seen = Some(result.data.clone());

        let entry = ResultEntry::from_scan(result);
        self.entries.insert(0, entry.clone());
        Some(entry)
    }

    /// Record every result of an uploaded-image scan. Uploads are
    /// independent user actions, so repeats are rendered unconditionally.
    pub fn record_upload(&mut self, results: Vec<ScanResult>) -> Vec<ResultEntry> {
        let mut recorded = Vec::with_capacity(results.len());
        for result in results {
            let entry = ResultEntry::from_scan(result);
            self.entries.insert(0, entry.clone());
            recorded.push(entry);
        }
        recorded
    }

    /// Drop all entries and reset the marker, so the next camera detection
    /// always renders.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_seen = None;
    }

    pub fn entries(&self) -> &[ResultEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// True only for payloads that parse as an absolute `http`/`https` URL.
pub fn is_http_url(data: &str) -> bool {
    match reqwest::Url::parse(data) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qr(data: &str) -> ScanResult {
        ScanResult {
            symbol_type: "QR_CODE".into(),
            data: data.into(),
        }
    }

    #[test]
    fn consecutive_identical_camera_results_render_once() {
        let mut log = ResultsLog::new();
        assert!(log.record_camera(qr("ABC")).is_some());
        assert!(log.record_camera(qr("ABC")).is_none());
        assert_eq!(log.entries().len(), 1);
    }

    #[test]
    fn camera_result_renders_iff_payload_differs_from_previous() {
        let mut log = ResultsLog::new();
        assert!(log.record_camera(qr("A")).is_some());
        assert!(log.record_camera(qr("B")).is_some());
        // "A" differs from the immediately preceding "B", so it renders
        // again even though it was seen before.
        assert!(log.record_camera(qr("A")).is_some());
        assert!(log.record_camera(qr("A")).is_none());
        assert_eq!(log.entries().len(), 3);
    }

    #[test]
    fn clear_resets_the_marker() {
        let mut log = ResultsLog::new();
        log.record_camera(qr("ABC"));
        log.clear();
        assert!(log.is_empty());
        assert!(log.record_camera(qr("ABC")).is_some());
    }

    #[test]
    fn uploads_render_all_results_and_ignore_the_marker() {
        let mut log = ResultsLog::new();
        log.record_camera(qr("ABC"));

        let recorded = log.record_upload(vec![qr("ABC"), qr("ABC")]);
        assert_eq!(recorded.len(), 2);
        assert_eq!(log.entries().len(), 3);

        // The marker still belongs to the camera path: "ABC" from the
        // camera is still considered a duplicate after the upload.
        assert!(log.record_camera(qr("ABC")).is_none());
    }

    #[test]
    fn entries_are_most_recent_first() {
        let mut log = ResultsLog::new();
        log.record_camera(qr("first"));
        log.record_camera(qr("second"));
        log.record_upload(vec![qr("third")]);
        let data: Vec<&str> = log.entries().iter().map(|e| e.data.as_str()).collect();
        assert_eq!(data, vec!["third", "second", "first"]);
    }

    #[test]
    fn url_detection_is_limited_to_http_schemes() {
        assert!(is_http_url("https://example.com"));
        assert!(is_http_url("http://example.com/path?q=1"));
        assert!(!is_http_url("hello"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("example.com"));
        assert!(!is_http_url("mailto:someone@example.com"));
    }

    #[test]
    fn entry_flags_url_payloads() {
        let mut log = ResultsLog::new();
        let link = log.record_camera(qr("https://example.com")).unwrap();
        assert!(link.is_url);
        let plain = log.record_camera(qr("hello")).unwrap();
        assert!(!plain.is_url);
    }
}
