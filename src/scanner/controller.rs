use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use log::info;
use serde::Serialize;
use tauri::{AppHandle, Emitter, Runtime, Wry};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::camera::{CameraConfig, CaptureSession};
use crate::decode::DecodeClient;
use crate::notify::Notifier;
use crate::results::ResultsLog;
use crate::settings::SettingsStore;

use super::loop_worker::{sampling_loop, SamplerDeps};

#[derive(Serialize, Clone)]
struct CameraStateEvent {
    active: bool,
}

pub(super) fn emit_camera_state<R: Runtime>(app: &AppHandle<R>, active: bool) {
    if let Err(err) = app.emit("camera-state-changed", CameraStateEvent { active }) {
        log::error!("failed to emit camera state: {err}");
    }
}

struct ActiveSession {
    id: Uuid,
    camera: Arc<CaptureSession>,
    cancel: CancellationToken,
    pause_tx: watch::Sender<bool>,
    worker: JoinHandle<()>,
}

/// Owns the single capture session and the sampling loop bound to it.
/// Media state and the `camera-state-changed` event are kept consistent:
/// the event fires only after the underlying transition completed.
pub struct ScanController<R: Runtime = Wry> {
    app: AppHandle<R>,
    http: reqwest::Client,
    results: Arc<StdMutex<ResultsLog>>,
    notifier: Notifier<R>,
    settings: Arc<SettingsStore>,
    session: Arc<Mutex<Option<ActiveSession>>>,
}

impl<R: Runtime> Clone for ScanController<R> {
    fn clone(&self) -> Self {
        Self {
            app: self.app.clone(),
            http: self.http.clone(),
            results: Arc::clone(&self.results),
            notifier: self.notifier.clone(),
            settings: Arc::clone(&self.settings),
            session: Arc::clone(&self.session),
        }
    }
}

impl<R: Runtime> ScanController<R> {
    pub fn new(
        app: AppHandle<R>,
        http: reqwest::Client,
        results: Arc<StdMutex<ResultsLog>>,
        notifier: Notifier<R>,
        settings: Arc<SettingsStore>,
    ) -> Self {
        Self {
            app,
            http,
            results,
            notifier,
            settings,
            session: Arc::new(Mutex::new(None)),
        }
    }

    /// Open the camera and start sampling. Fails when a session is already
    /// live or the device cannot be acquired; no retry is attempted.
    pub async fn start(&self) -> Result<()> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            if !session.cancel.is_cancelled() {
                bail!("camera already active");
            }
        }
        // Reap a session that stopped itself (auto-stop on detect).
        if let Some(old) = guard.take() {
            let _ = old.worker.await;
        }

        let cfg = self.settings.scanner();
        let camera_cfg = CameraConfig {
            device_path: cfg.camera_device.clone(),
            width: cfg.frame_width,
            height: cfg.frame_height,
        };

        let camera = tokio::task::spawn_blocking(move || CaptureSession::open(&camera_cfg))
            .await
            .context("camera open task failed")??;
        let camera = Arc::new(camera);

        let id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (pause_tx, pause_rx) = watch::channel(false);

        let worker = tokio::spawn(sampling_loop(SamplerDeps {
            app: self.app.clone(),
            session_id: id,
            camera: Arc::clone(&camera),
            decode: DecodeClient::new(self.http.clone(), &cfg.decode_base_url),
            results: Arc::clone(&self.results),
            notifier: self.notifier.clone(),
            interval: Duration::from_millis(cfg.scan_interval_ms),
            jpeg_quality: cfg.jpeg_quality,
            auto_stop: cfg.auto_stop_on_detect,
            cancel: cancel.clone(),
            pause_rx,
        }));

        *guard = Some(ActiveSession {
            id,
            camera,
            cancel,
            pause_tx,
            worker,
        });

        emit_camera_state(&self.app, true);
        info!("camera session {id} started");
        Ok(())
    }

    /// Stop sampling and release every media resource. Idempotent; returns
    /// whether a live session was actually released.
    pub async fn stop(&self) -> Result<bool> {
        let mut guard = self.session.lock().await;
        let Some(session) = guard.take() else {
            return Ok(false);
        };

        let was_live = !session.cancel.is_cancelled();
        session.cancel.cancel();
        session
            .worker
            .await
            .context("sampling loop task failed to join")?;
        session.camera.shutdown();

        emit_camera_state(&self.app, false);
        info!("camera session {} stopped", session.id);
        Ok(was_live)
    }

    /// Page-visibility glue: parks the sampling loop without touching the
    /// capture session.
    pub async fn set_paused(&self, paused: bool) {
        if let Some(session) = self.session.lock().await.as_ref() {
            let _ = session.pause_tx.send(paused);
        }
    }

    pub async fn is_active(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .map(|session| !session.cancel.is_cancelled())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use tauri::test::MockRuntime;

    use super::*;

    fn test_controller(app: &tauri::App<MockRuntime>) -> ScanController<MockRuntime> {
        let settings_path =
            std::env::temp_dir().join(format!("qrscan-controller-{}.json", Uuid::new_v4()));
        let settings = SettingsStore::new(settings_path).unwrap();
        ScanController::new(
            app.handle().clone(),
            reqwest::Client::new(),
            Arc::new(StdMutex::new(ResultsLog::new())),
            Notifier::new(app.handle().clone()),
            Arc::new(settings),
        )
    }

    #[tokio::test]
    async fn stop_without_a_session_is_a_silent_no_op_even_when_repeated() {
        let app = tauri::test::mock_app();
        let controller = test_controller(&app);

        assert!(!controller.stop().await.unwrap());
        assert!(!controller.stop().await.unwrap());
        assert!(!controller.is_active().await);
    }
}
