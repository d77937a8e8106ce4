use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tauri::{AppHandle, Emitter, Runtime, Wry};

/// How long a notification stays visible before auto-dismissing.
pub const AUTO_DISMISS_SECS: u64 = 5;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

#[derive(Serialize, Clone)]
struct NotificationEvent {
    message: String,
    severity: Severity,
}

/// Emits transient status banners to the webview. A new notification
/// preempts the previous one's remaining display time; there is no queue.
pub struct Notifier<R: Runtime = Wry> {
    app: AppHandle<R>,
    dismiss: Arc<Mutex<Option<tauri::async_runtime::JoinHandle<()>>>>,
    dismiss_after: Duration,
}

impl<R: Runtime> Clone for Notifier<R> {
    fn clone(&self) -> Self {
        Self {
            app: self.app.clone(),
            dismiss: Arc::clone(&self.dismiss),
            dismiss_after: self.dismiss_after,
        }
    }
}

impl<R: Runtime> Notifier<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self {
            app,
            dismiss: Arc::new(Mutex::new(None)),
            dismiss_after: Duration::from_secs(AUTO_DISMISS_SECS),
        }
    }

    #[cfg(test)]
    fn with_dismiss_after(app: AppHandle<R>, dismiss_after: Duration) -> Self {
        Self {
            dismiss_after,
            ..Self::new(app)
        }
    }

    pub fn show(&self, message: impl Into<String>, severity: Severity) {
        // The previous banner's timer must die before the new banner is
        // announced; once it fires it would dismiss whatever is on screen.
        if let Some(previous) = self.dismiss.lock().unwrap().take() {
            previous.abort();
        }

        let event = NotificationEvent {
            message: message.into(),
            severity,
        };
        if let Err(err) = self.app.emit("notification", &event) {
            log::error!("failed to emit notification: {err}");
            return;
        }

        let app = self.app.clone();
        let dismiss_after = self.dismiss_after;
        let handle = tauri::async_runtime::spawn(async move {
            tokio::time::sleep(dismiss_after).await;
            if let Err(err) = app.emit("notification-dismissed", ()) {
                log::error!("failed to emit notification dismissal: {err}");
            }
        });
        *self.dismiss.lock().unwrap() = Some(handle);
    }

    pub fn hide(&self) {
        if let Some(pending) = self.dismiss.lock().unwrap().take() {
            pending.abort();
        }
        if let Err(err) = self.app.emit("notification-dismissed", ()) {
            log::error!("failed to emit notification dismissal: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tauri::Listener;

    use super::*;

    #[test]
    fn severity_serializes_lowercase_for_the_frontend() {
        assert_eq!(serde_json::to_string(&Severity::Warning).unwrap(), "\"warning\"");
        assert_eq!(serde_json::to_string(&Severity::Error).unwrap(), "\"error\"");
    }

    #[tokio::test]
    async fn new_notification_outlives_the_previous_dismiss_timer() {
        let app = tauri::test::mock_app();
        let dismissed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&dismissed);
        app.listen("notification-dismissed", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let notifier =
            Notifier::with_dismiss_after(app.handle().clone(), Duration::from_millis(500));
        notifier.show("first", Severity::Info);
        tokio::time::sleep(Duration::from_millis(300)).await;
        // Shown while the first banner's timer still has 200ms to run.
        notifier.show("second", Severity::Success);

        // The first timer (due at 500ms) was aborted, and the second's own
        // timer (due at 800ms) has not fired yet.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(dismissed.load(Ordering::SeqCst), 0);

        // The second banner still auto-dismisses on its own schedule.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(dismissed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn hide_cancels_the_pending_timer_and_dismisses_once() {
        let app = tauri::test::mock_app();
        let dismissed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&dismissed);
        app.listen("notification-dismissed", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let notifier =
            Notifier::with_dismiss_after(app.handle().clone(), Duration::from_millis(200));
        notifier.show("copied", Severity::Success);
        notifier.hide();
        assert_eq!(dismissed.load(Ordering::SeqCst), 1);

        // No second dismissal from the aborted timer.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(dismissed.load(Ordering::SeqCst), 1);
    }
}
