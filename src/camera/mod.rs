#[cfg(target_os = "linux")]
mod v4l2;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("failed to open camera device {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("camera rejected every supported pixel format (device offered {offered})")]
    Format { offered: String },
    #[error("failed to start camera stream: {0}")]
    Stream(std::io::Error),
    #[error("failed to encode camera frame: {0}")]
    Encode(#[from] image::ImageError),
    #[error("camera capture is not supported on this platform")]
    Unsupported,
}

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub device_path: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Compressed JPEG straight off the device.
    Mjpeg,
    /// Packed 4:2:2 YUV; converted and encoded on demand.
    Yuyv,
}

/// Most recent frame delivered by the capture thread.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub data: Vec<u8>,
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

/// An open handle to a live camera stream. A dedicated thread pulls frames
/// continuously and keeps only the latest one; `grab_jpeg` samples it.
/// At most one session exists at a time (enforced by the controller).
pub struct CaptureSession {
    latest: Arc<Mutex<Option<RawFrame>>>,
    running: Arc<AtomicBool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl CaptureSession {
    /// Open the device and start the capture thread. Fails fast when the
    /// device is absent, inaccessible, or cannot negotiate a usable format.
    #[cfg(target_os = "linux")]
    pub fn open(config: &CameraConfig) -> Result<Self, CameraError> {
        let latest = Arc::new(Mutex::new(None));
        let running = Arc::new(AtomicBool::new(true));

        let worker = v4l2::start_capture(config, Arc::clone(&latest), Arc::clone(&running))?;

        Ok(Self {
            latest,
            running,
            worker: Mutex::new(Some(worker)),
        })
    }

    #[cfg(not(target_os = "linux"))]
    pub fn open(_config: &CameraConfig) -> Result<Self, CameraError> {
        Err(CameraError::Unsupported)
    }

    /// Encode the latest frame as JPEG. Returns `None` while no frame with
    /// valid dimensions has arrived yet, which callers treat as "skip this
    /// tick".
    pub fn grab_jpeg(&self, quality: u8) -> Result<Option<Vec<u8>>, CameraError> {
        let frame = match self.latest.lock().unwrap().clone() {
            Some(frame) if frame.width > 0 && frame.height > 0 => frame,
            _ => return Ok(None),
        };

        match frame.format {
            PixelFormat::Mjpeg => Ok(Some(frame.data)),
            PixelFormat::Yuyv => {
                let expected = (frame.width * frame.height * 2) as usize;
                if frame.data.len() < expected {
                    // Truncated buffer from the driver; treat like no frame.
                    return Ok(None);
                }
                let rgb = yuyv_to_rgb(&frame.data, frame.width, frame.height);
                let mut jpeg = Vec::new();
                let mut encoder =
                    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
                encoder.encode(&rgb, frame.width, frame.height, image::ExtendedColorType::Rgb8)?;
                Ok(Some(jpeg))
            }
        }
    }

    /// Stop the capture thread and release the device. Idempotent.
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.lock().unwrap().take() {
            if worker.join().is_err() {
                log::error!("camera capture thread panicked");
            }
        }
        self.latest.lock().unwrap().take();
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Convert packed YUYV 4:2:2 to tightly packed RGB8 (BT.601).
pub(crate) fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixels = (width * height) as usize;
    let mut rgb = Vec::with_capacity(pixels * 3);

    for chunk in data.chunks_exact(4).take(pixels / 2) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }

    rgb
}

fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = y as f32;
    let cb = cb as f32 - 128.0;
    let cr = cr as f32 - 128.0;

    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;

    [clamp_u8(r), clamp_u8(g), clamp_u8(b)]
}

fn clamp_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_black_and_white_convert_to_gray_levels() {
        // Two black pixels then two white pixels, neutral chroma.
        let yuyv = [0u8, 128, 0, 128, 255, 128, 255, 128];
        let rgb = yuyv_to_rgb(&yuyv, 4, 1);
        assert_eq!(rgb.len(), 12);
        assert_eq!(&rgb[..6], &[0, 0, 0, 0, 0, 0]);
        assert_eq!(&rgb[6..], &[255, 255, 255, 255, 255, 255]);
    }

    #[test]
    fn yuyv_red_chroma_produces_red_dominant_pixels() {
        // High Cr with mid luma should lean strongly red.
        let yuyv = [128u8, 128, 128, 255];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1);
        assert!(rgb[0] > 200, "red channel too low: {}", rgb[0]);
        assert!(rgb[2] < 140, "blue channel too high: {}", rgb[2]);
    }

    #[test]
    fn conversion_output_size_matches_dimensions() {
        let yuyv = vec![128u8; 1280 * 720 * 2];
        let rgb = yuyv_to_rgb(&yuyv, 1280, 720);
        assert_eq!(rgb.len(), 1280 * 720 * 3);
    }
}
