use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{ProcessingStatusService, StatusReport};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Polls the status service until a terminal report
pub struct StatusPoller {
    service: Arc<dyn ProcessingStatusService>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(service: Arc<dyn ProcessingStatusService>) -> Self {
        Self::with_interval(service, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_interval(service: Arc<dyn ProcessingStatusService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    /// Poll until Ready, Failed or Error; transport errors end polling as `Error`
    pub async fn poll_until_terminal(&self, id: Uuid) -> StatusReport {
        self.poll_with(id, |_| {}).await
    }

    /// Poll in the background, publishing every report
    pub fn spawn(self, id: Uuid) -> (watch::Receiver<StatusReport>, JoinHandle<StatusReport>) {
        let (tx, rx) = watch::channel(StatusReport::Processing);
        let handle = tokio::spawn(async move {
            self.poll_with(id, |report| {
                tx.send_replace(report.clone());
            })
            .await
        });
        (rx, handle)
    }

    async fn poll_with(&self, id: Uuid, mut on_report: impl FnMut(&StatusReport)) -> StatusReport {
        let mut ticker = time::interval(self.interval);
        let mut attempts = 0usize;

        loop {
            ticker.tick().await;
            attempts += 1;

            let report = match self.service.status(id).await {
                Ok(report) => report,
                Err(e) => {
                    warn!("Status request for {} failed: {:#}", id, e);
                    StatusReport::Error(e.to_string())
                }
            };
            on_report(&report);

            if report.is_terminal() {
                info!("Upload {} finished after {} polls: {:?}", id, attempts, report);
                return report;
            }
            debug!("Upload {} still processing", id);
        }
    }
}
