use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use tauri::{AppHandle, Emitter, Runtime};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::camera::CaptureSession;
use crate::decode::{DecodeClient, DecodeResponse};
use crate::notify::{Notifier, Severity};
use crate::results::{ResultEntry, ResultsLog};

use super::controller::emit_camera_state;

const SCAN_TIMEOUT_SECS: u64 = 10;

pub(super) struct SamplerDeps<R: Runtime> {
    pub app: AppHandle<R>,
    pub session_id: Uuid,
    pub camera: Arc<CaptureSession>,
    pub decode: DecodeClient,
    pub results: Arc<Mutex<ResultsLog>>,
    pub notifier: Notifier<R>,
    pub interval: Duration,
    pub jpeg_quality: u8,
    pub auto_stop: bool,
    pub cancel: CancellationToken,
    pub pause_rx: watch::Receiver<bool>,
}

/// Fixed-period sampling: grab the latest frame, send it to the decode
/// service, apply the response. Transport and decode failures are logged
/// and swallowed; the loop continues on the next tick.
pub(super) async fn sampling_loop<R: Runtime>(mut deps: SamplerDeps<R>) {
    let mut ticker = tokio::time::interval(deps.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *deps.pause_rx.borrow() {
            // Page hidden: no ticks, no requests, session kept alive.
            tokio::select! {
                _ = deps.cancel.cancelled() => break,
                changed = deps.pause_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    ticker.reset();
                    continue;
                }
            }
        }

        tokio::select! {
            _ = ticker.tick() => {
                let sampled = tokio::time::timeout(
                    Duration::from_secs(SCAN_TIMEOUT_SECS),
                    sample_once(&deps),
                )
                .await;

                match sampled {
                    Ok(Ok(Tick::Detected)) if deps.auto_stop => {
                        deps.cancel.cancel();
                        deps.camera.shutdown();
                        emit_camera_state(&deps.app, false);
                        log::info!("session {}: detection complete, auto-stopping", deps.session_id);
                        break;
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => {
                        log::warn!("session {}: frame scan failed: {err:#}", deps.session_id)
                    }
                    Err(_) => log::warn!(
                        "session {}: frame scan timed out (> {SCAN_TIMEOUT_SECS}s)",
                        deps.session_id
                    ),
                }
            }
            _ = deps.cancel.cancelled() => {
                log::info!("session {}: sampling loop shutting down", deps.session_id);
                break;
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Tick {
    /// No usable frame yet, or the session went away mid-request.
    Skipped,
    NoCode,
    Duplicate,
    Detected,
}

async fn sample_once<R: Runtime>(deps: &SamplerDeps<R>) -> Result<Tick> {
    let camera = Arc::clone(&deps.camera);
    let quality = deps.jpeg_quality;
    let jpeg = tokio::task::spawn_blocking(move || camera.grab_jpeg(quality))
        .await
        .context("frame grab worker join failed")??;

    let Some(jpeg) = jpeg else {
        return Ok(Tick::Skipped);
    };

    let response = deps.decode.scan_frame(&jpeg).await?;

    let (tick, entry) = apply_scan_response(response, deps.cancel.is_cancelled(), &deps.results);
    if let Some(entry) = entry {
        if let Err(err) = deps.app.emit("scan-result-added", &entry) {
            log::error!("failed to emit scan result: {err}");
        }
        deps.notifier.show("QR code detected!", Severity::Success);
    }
    Ok(tick)
}

/// Decide what a decode response means for the results log. The session may
/// have been stopped while the request was in flight; a stale response must
/// not touch the results or the dedup marker.
fn apply_scan_response(
    response: DecodeResponse,
    cancelled: bool,
    results: &Mutex<ResultsLog>,
) -> (Tick, Option<ResultEntry>) {
    if cancelled {
        return (Tick::Skipped, None);
    }
    if !response.success {
        return (Tick::NoCode, None);
    }
    let Some(first) = response.results.into_iter().next() else {
        return (Tick::NoCode, None);
    };

    match results.lock().unwrap().record_camera(first) {
        Some(entry) => (Tick::Detected, Some(entry)),
        None => (Tick::Duplicate, None),
    }
}
