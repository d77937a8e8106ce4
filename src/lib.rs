mod camera;
mod decode;
mod notify;
mod results;
mod scanner;
mod settings;
mod upload;

use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tauri::{AppHandle, Emitter, Manager, State};
use tauri_plugin_clipboard_manager::ClipboardExt;

use decode::DecodeClient;
use notify::{Notifier, Severity};
use results::{ResultEntry, ResultsLog};
use scanner::ScanController;
use settings::{ScannerSettings, SettingsStore};
use upload::{UploadCandidate, UploadError, UploadSlot};

pub(crate) struct AppState {
    scanner: ScanController,
    results: Arc<Mutex<ResultsLog>>,
    upload: Mutex<UploadSlot>,
    notifier: Notifier,
    settings: Arc<SettingsStore>,
    http: reqwest::Client,
}

#[tauri::command]
async fn start_camera(state: State<'_, AppState>) -> Result<(), String> {
    match state.scanner.start().await {
        Ok(()) => {
            state
                .notifier
                .show("Camera started successfully", Severity::Success);
            Ok(())
        }
        Err(err) => {
            state
                .notifier
                .show(format!("Failed to start camera: {err:#}"), Severity::Error);
            Err(err.to_string())
        }
    }
}

#[tauri::command]
async fn stop_camera(state: State<'_, AppState>) -> Result<(), String> {
    match state.scanner.stop().await {
        Ok(true) => {
            state.notifier.show("Camera stopped", Severity::Warning);
            Ok(())
        }
        // Stopping with no active session is a no-op.
        Ok(false) => Ok(()),
        Err(err) => Err(err.to_string()),
    }
}

/// Page-visibility glue: the webview reports `visibilitychange` here so the
/// sampler pauses while the page is hidden and resumes when it returns.
#[tauri::command]
async fn set_page_visible(visible: bool, state: State<'_, AppState>) -> Result<(), String> {
    state.scanner.set_paused(!visible).await;
    Ok(())
}

#[derive(Serialize)]
struct UploadPreview {
    file_name: String,
    data_url: String,
}

#[tauri::command]
fn select_upload(path: String, state: State<'_, AppState>) -> Result<UploadPreview, String> {
    match UploadCandidate::load(Path::new(&path)) {
        Ok(candidate) => {
            let preview = UploadPreview {
                file_name: candidate.file_name.clone(),
                data_url: candidate.preview_data_url(),
            };
            state.upload.lock().unwrap().select(candidate);
            Ok(preview)
        }
        Err(UploadError::NotAnImage) => {
            state
                .notifier
                .show("Please select an image file", Severity::Warning);
            Err("not an image file".into())
        }
        Err(err) => {
            state
                .notifier
                .show(format!("Failed to read file: {err}"), Severity::Error);
            Err(err.to_string())
        }
    }
}

#[tauri::command]
async fn scan_upload(app: AppHandle, state: State<'_, AppState>) -> Result<usize, String> {
    let Some(candidate) = state.upload.lock().unwrap().take() else {
        state
            .notifier
            .show("Please select an image first", Severity::Warning);
        return Err("no image selected".into());
    };

    let cfg = state.settings.scanner();
    let client = DecodeClient::new(state.http.clone(), &cfg.decode_base_url);

    match client
        .upload(&candidate.file_name, candidate.mime, candidate.bytes.clone())
        .await
    {
        Ok(response) if response.success && !response.results.is_empty() => {
            let entries = state.results.lock().unwrap().record_upload(response.results);
            for entry in &entries {
                if let Err(err) = app.emit("scan-result-added", entry) {
                    log::error!("failed to emit scan result: {err}");
                }
            }
            state
                .notifier
                .show(format!("Found {} QR code(s)", entries.len()), Severity::Success);
            Ok(entries.len())
        }
        Ok(response) => {
            let message = response
                .message
                .unwrap_or_else(|| "No QR codes found".to_string());
            state.notifier.show(message, Severity::Warning);
            Ok(0)
        }
        Err(err) => {
            // The request never produced an answer; keep the file staged so
            // the user can hit "Scan Image" again without re-selecting it.
            state.upload.lock().unwrap().select(candidate);
            state
                .notifier
                .show(format!("Error scanning image: {err}"), Severity::Error);
            Err(err.to_string())
        }
    }
}

#[tauri::command]
fn get_results(state: State<'_, AppState>) -> Vec<ResultEntry> {
    state.results.lock().unwrap().entries().to_vec()
}

#[tauri::command]
fn clear_results(app: AppHandle, state: State<'_, AppState>) -> Result<(), String> {
    state.results.lock().unwrap().clear();
    if let Err(err) = app.emit("results-cleared", ()) {
        log::error!("failed to emit results-cleared: {err}");
    }
    state.notifier.show("Results cleared", Severity::Warning);
    Ok(())
}

/// Reset the upload panel, clear results, and keep live scanning going if
/// the camera is active.
#[tauri::command]
async fn scan_another(app: AppHandle, state: State<'_, AppState>) -> Result<(), String> {
    state.upload.lock().unwrap().clear();
    state.results.lock().unwrap().clear();
    if let Err(err) = app.emit("upload-reset", ()) {
        log::error!("failed to emit upload-reset: {err}");
    }
    if let Err(err) = app.emit("results-cleared", ()) {
        log::error!("failed to emit results-cleared: {err}");
    }
    state.notifier.show("Results cleared", Severity::Warning);
    if state.scanner.is_active().await {
        state.scanner.set_paused(false).await;
    }
    Ok(())
}

#[tauri::command]
fn copy_to_clipboard(
    text: String,
    app: AppHandle,
    state: State<'_, AppState>,
) -> Result<(), String> {
    match app.clipboard().write_text(text) {
        Ok(()) => {
            state
                .notifier
                .show("Copied to clipboard!", Severity::Success);
            Ok(())
        }
        Err(err) => {
            state
                .notifier
                .show("Failed to copy to clipboard", Severity::Error);
            Err(err.to_string())
        }
    }
}

#[tauri::command]
fn open_link(url: String, state: State<'_, AppState>) -> Result<(), String> {
    if !results::is_http_url(&url) {
        return Err("only http(s) links can be opened".into());
    }
    tauri_plugin_opener::open_url(url, None::<&str>).map_err(|err| {
        state.notifier.show("Failed to open link", Severity::Error);
        err.to_string()
    })
}

#[tauri::command]
fn dismiss_notification(state: State<'_, AppState>) {
    state.notifier.hide();
}

#[tauri::command]
fn get_scanner_settings(state: State<'_, AppState>) -> Result<ScannerSettings, String> {
    Ok(state.settings.scanner())
}

#[tauri::command]
fn set_scanner_settings(
    settings: ScannerSettings,
    app: AppHandle,
    state: State<'_, AppState>,
) -> Result<(), String> {
    state
        .settings
        .update_scanner(settings)
        .map_err(|err| err.to_string())?;
    app.emit("scanner-settings-updated", state.settings.scanner())
        .map_err(|err| err.to_string())?;
    Ok(())
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("qrscan starting up...");

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_clipboard_manager::init())
        .plugin(tauri_plugin_dialog::init())
        .setup(|app| {
            let result = (|| -> anyhow::Result<()> {
                let app_data_dir = app
                    .path()
                    .app_data_dir()
                    .map_err(|err| anyhow::anyhow!(err))?;
                std::fs::create_dir_all(&app_data_dir)?;

                let settings = Arc::new(SettingsStore::new(app_data_dir.join("settings.json"))?);
                let http = reqwest::Client::new();
                let results = Arc::new(Mutex::new(ResultsLog::new()));
                let notifier = Notifier::new(app.handle().clone());

                let scanner = ScanController::new(
                    app.handle().clone(),
                    http.clone(),
                    Arc::clone(&results),
                    notifier.clone(),
                    Arc::clone(&settings),
                );

                app.manage(AppState {
                    scanner,
                    results,
                    upload: Mutex::new(UploadSlot::new()),
                    notifier,
                    settings,
                    http,
                });

                Ok(())
            })();

            result.map_err(|err| err.into())
        })
        .on_window_event(|window, event| {
            // Page unload glue: the camera must never outlive the window.
            if let tauri::WindowEvent::Destroyed = event {
                let scanner = window.state::<AppState>().scanner.clone();
                tauri::async_runtime::block_on(async move {
                    if let Err(err) = scanner.stop().await {
                        log::error!("failed to stop camera on window close: {err:#}");
                    }
                });
            }
        })
        .invoke_handler(tauri::generate_handler![
            start_camera,
            stop_camera,
            set_page_visible,
            select_upload,
            scan_upload,
            get_results,
            clear_results,
            scan_another,
            copy_to_clipboard,
            open_link,
            dismiss_notification,
            get_scanner_settings,
            set_scanner_settings,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application")
}
