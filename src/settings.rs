use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

/// User-tunable scanning parameters, persisted as JSON in the app data dir.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScannerSettings {
    /// Base URL of the remote decode service.
    pub decode_base_url: String,
    /// Milliseconds between sampling ticks while the camera is active.
    pub scan_interval_ms: u64,
    /// JPEG quality used when encoding sampled frames (1..=100).
    pub jpeg_quality: u8,
    /// Stop the camera after the first fresh detection.
    pub auto_stop_on_detect: bool,
    /// V4L2 device node to capture from.
    pub camera_device: String,
    /// Preferred capture resolution; the device may negotiate down.
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            decode_base_url: "http://127.0.0.1:5000".into(),
            scan_interval_ms: 1000,
            jpeg_quality: 80,
            auto_stop_on_detect: false,
            camera_device: "/dev/video0".into(),
            frame_width: 1280,
            frame_height: 720,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserSettings {
    scanner: ScannerSettings,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            scanner: ScannerSettings::default(),
        }
    }
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn scanner(&self) -> ScannerSettings {
        self.data.read().unwrap().scanner.clone()
    }

    pub fn update_scanner(&self, mut settings: ScannerSettings) -> Result<()> {
        // Clamp values the UI could hand us in a broken state rather than
        // letting the sampling loop spin or the encoder reject them.
        settings.scan_interval_ms = settings.scan_interval_ms.max(100);
        settings.jpeg_quality = settings.jpeg_quality.clamp(1, 100);

        let mut guard = self.data.write().unwrap();
        guard.scanner = settings;
        self.persist(&guard)?;
        Ok(())
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_settings_path() -> PathBuf {
        std::env::temp_dir().join(format!("qrscan-settings-{}.json", uuid::Uuid::new_v4()))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let store = SettingsStore::new(temp_settings_path()).unwrap();
        assert_eq!(store.scanner(), ScannerSettings::default());
    }

    #[test]
    fn update_persists_and_reloads() {
        let path = temp_settings_path();
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = ScannerSettings::default();
        settings.decode_base_url = "http://scanner.local:8080".into();
        settings.auto_stop_on_detect = true;
        store.update_scanner(settings.clone()).unwrap();

        let reloaded = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(reloaded.scanner(), settings);
        let _ = fs::remove_file(path);
    }

    #[test]
    fn update_clamps_out_of_range_values() {
        let path = temp_settings_path();
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut settings = ScannerSettings::default();
        settings.scan_interval_ms = 0;
        settings.jpeg_quality = 0;
        store.update_scanner(settings).unwrap();

        let current = store.scanner();
        assert_eq!(current.scan_interval_ms, 100);
        assert_eq!(current.jpeg_quality, 1);
        let _ = fs::remove_file(path);
    }
}
