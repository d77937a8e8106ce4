use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::{info, warn};
use v4l::buffer::Type;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use super::{CameraConfig, CameraError, PixelFormat, RawFrame};

const MJPG: &[u8; 4] = b"MJPG";
const YUYV: &[u8; 4] = b"YUYV";
const BUFFER_COUNT: u32 = 4;

/// Open the device, negotiate a format, and spawn the capture thread.
pub(super) fn start_capture(
    config: &CameraConfig,
    latest: Arc<Mutex<Option<RawFrame>>>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, CameraError> {
    let dev = Device::with_path(&config.device_path).map_err(|source| CameraError::Open {
        path: config.device_path.clone(),
        source,
    })?;

    let (format, pixel_format) = negotiate_format(&dev, config)?;
    info!(
        "camera {} streaming {}x{} {:?}",
        config.device_path, format.width, format.height, format.fourcc
    );

    let thread = std::thread::Builder::new()
        .name("camera-capture".into())
        .spawn(move || capture_loop(dev, format, pixel_format, latest, running))
        .map_err(CameraError::Stream)?;

    Ok(thread)
}

/// Ask for the preferred resolution with MJPG, falling back to YUYV. The
/// driver is free to answer with a smaller resolution; whatever it settles
/// on is what we stream.
fn negotiate_format(
    dev: &Device,
    config: &CameraConfig,
) -> Result<(v4l::Format, PixelFormat), CameraError> {
    let mut wanted = dev.format().map_err(CameraError::Stream)?;
    wanted.width = config.width;
    wanted.height = config.height;

    for (fourcc, pixel_format) in [
        (FourCC::new(MJPG), PixelFormat::Mjpeg),
        (FourCC::new(YUYV), PixelFormat::Yuyv),
    ] {
        wanted.fourcc = fourcc;
        match dev.set_format(&wanted) {
            Ok(actual) if actual.fourcc == fourcc => return Ok((actual, pixel_format)),
            Ok(actual) => {
                warn!("camera substituted {} for requested {}", actual.fourcc, fourcc)
            }
            Err(err) => warn!("camera refused format {}: {}", fourcc, err),
        }
    }

    let offered = dev
        .format()
        .map(|f| f.fourcc.to_string())
        .unwrap_or_else(|_| "unknown".into());
    Err(CameraError::Format { offered })
}

fn capture_loop(
    mut dev: Device,
    format: v4l::Format,
    pixel_format: PixelFormat,
    latest: Arc<Mutex<Option<RawFrame>>>,
    running: Arc<AtomicBool>,
) {
    let mut stream = match MmapStream::with_buffers(&mut dev, Type::VideoCapture, BUFFER_COUNT) {
        Ok(stream) => stream,
        Err(err) => {
            warn!("failed to create camera buffer stream: {err}");
            running.store(false, Ordering::SeqCst);
            return;
        }
    };

    while running.load(Ordering::SeqCst) {
        match stream.next() {
            Ok((buf, meta)) => {
                let used = (meta.bytesused as usize).min(buf.len());
                if used == 0 {
                    continue;
                }
                let frame = RawFrame {
                    data: buf[..used].to_vec(),
                    format: pixel_format,
                    width: format.width,
                    height: format.height,
                };
                *latest.lock().unwrap() = Some(frame);
            }
            Err(err) => {
                warn!("camera stream ended: {err}");
                break;
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    info!("camera capture thread exiting");
}
