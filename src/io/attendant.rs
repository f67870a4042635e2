//! Attendant notification - fire-and-forget hand-off signal
//!
//! Notices are queued on a bounded channel and delivered by a worker task.
//! Delivery failures are logged; nothing is retried and the kiosk loop never
//! waits for an acknowledgment.

use crate::domain::session::AttendantNotice;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[async_trait]
pub trait AttendantNotifier: Send + Sync {
    async fn notify(&self, notice: &AttendantNotice) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize)]
struct NoticePayload<'a> {
    #[serde(flatten)]
    notice: &'a AttendantNotice,
    ts: DateTime<Utc>,
}

/// Posts notices as JSON to the attendant console, or only logs them when no URL is set
pub struct HttpAttendantNotifier {
    url: String,
    client: Option<reqwest::Client>,
}

impl HttpAttendantNotifier {
    pub fn new(url: &str, timeout: Duration) -> Self {
        let client = if url.is_empty() {
            None
        } else {
            match reqwest::Client::builder().timeout(timeout).build() {
                Ok(client) => Some(client),
                Err(e) => {
                    // Notices are still logged, just never posted
                    warn!(url = %url, error = %e, "attendant_client_build_failed");
                    None
                }
            }
        };
        Self { url: url.to_string(), client }
    }
}

#[async_trait]
impl AttendantNotifier for HttpAttendantNotifier {
    async fn notify(&self, notice: &AttendantNotice) -> anyhow::Result<()> {
        let Some(ref client) = self.client else {
            info!(
                gate_id = %notice.gate_id,
                session = %notice.session,
                reason = %notice.reason.as_str(),
                "attendant_notice_logged"
            );
            return Ok(());
        };

        let payload = NoticePayload { notice, ts: Utc::now() };
        let response = client.post(&self.url).json(&payload).send().await?;
        response.error_for_status()?;
        Ok(())
    }
}

pub struct AttendantWorker {
    notifier: Arc<dyn AttendantNotifier>,
    rx: mpsc::Receiver<AttendantNotice>,
}

impl AttendantWorker {
    pub async fn run(mut self) {
        info!("attendant_worker_started");

        while let Some(notice) = self.rx.recv().await {
            match self.notifier.notify(&notice).await {
                Ok(()) => info!(
                    session = %notice.session,
                    reason = %notice.reason.as_str(),
                    "attendant_notified"
                ),
                Err(e) => error!(
                    session = %notice.session,
                    reason = %notice.reason.as_str(),
                    error = %e,
                    "attendant_notify_failed"
                ),
            }
        }

        info!("attendant_worker_stopped");
    }
}

/// Non-blocking handle used by the kiosk loop
#[derive(Clone)]
pub struct AttendantSender {
    tx: mpsc::Sender<AttendantNotice>,
}

impl AttendantSender {
    /// Queue a notice; returns false if it had to be dropped
    pub fn send(&self, notice: AttendantNotice) -> bool {
        match self.tx.try_send(notice) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "attendant_notice_dropped");
                false
            }
        }
    }
}

pub fn create_attendant_channel(
    notifier: Arc<dyn AttendantNotifier>,
    buffer_size: usize,
) -> (AttendantSender, AttendantWorker) {
    let (tx, rx) = mpsc::channel(buffer_size);
    (AttendantSender { tx }, AttendantWorker { notifier, rx })
}
