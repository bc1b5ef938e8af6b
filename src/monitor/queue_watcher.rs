//! Backend queue watcher
//!
//! Email redemptions are queued by the backend; this tracks a queue message until
//! it reaches `FINISH` or `FINISH_WITH_ERROR`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{spawn_poll, PollConfig, PollHandle, PollSource};
use crate::api::ClaimService;
use crate::error::ClaimError;
use crate::types::{QueueMessage, QueueStatus};

pub type QueueTracker = PollHandle<QueueMessage>;

struct QueueSource {
    service: Arc<dyn ClaimService>,
    uid: String,
}

#[async_trait]
impl PollSource for QueueSource {
    type Snapshot = QueueMessage;

    async fn fetch(&self) -> Result<QueueMessage, ClaimError> {
        let message = self.service.fetch_queue_message(&self.uid).await?;
        debug!("Queue message {} status: {}", self.uid, message.status);
        Ok(message)
    }

    fn is_terminal(&self, message: &QueueMessage) -> bool {
        message.status.is_terminal()
    }

    fn on_terminal(&self, message: &QueueMessage) {
        match message.status {
            QueueStatus::Finish => info!("Queue message {} finished", self.uid),
            _ => warn!("Queue message {} finished with error", self.uid),
        }
    }

    fn describe(&self) -> String {
        format!("queue message {}", self.uid)
    }
}

#[derive(Clone)]
pub struct QueueWatcher {
    service: Arc<dyn ClaimService>,
    config: PollConfig,
}

impl QueueWatcher {
    pub fn new(service: Arc<dyn ClaimService>, config: PollConfig) -> Self {
        Self { service, config }
    }

    pub fn track(&self, uid: &str) -> QueueTracker {
        spawn_poll(
            QueueSource {
                service: self.service.clone(),
                uid: uid.to_string(),
            },
            self.config.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockClaimService;
    use crate::types::QueueResult;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn message(status: QueueStatus) -> QueueMessage {
        QueueMessage {
            uid: "q-1".to_string(),
            operation: "redeem-email".to_string(),
            status,
            result: (status == QueueStatus::Finish).then(|| QueueResult {
                tx_hash: "0xabc".to_string(),
            }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_tracks_until_finish() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut service = MockClaimService::new();
        service.expect_fetch_queue_message().returning(move |_| {
            Ok(match counter.fetch_add(1, Ordering::SeqCst) {
                0 => message(QueueStatus::Pending),
                1 => message(QueueStatus::InProcess),
                _ => message(QueueStatus::Finish),
            })
        });

        let watcher = QueueWatcher::new(
            Arc::new(service),
            PollConfig {
                interval: Duration::from_secs(5),
                poll_immediately: true,
                max_consecutive_errors: None,
            },
        );
        let outcome = watcher.track("q-1").outcome().await;
        let message = outcome.completed().unwrap();
        assert_eq!(message.status, QueueStatus::Finish);
        assert_eq!(message.result.unwrap().tx_hash, "0xabc");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finish_with_error_is_terminal() {
        let mut service = MockClaimService::new();
        service
            .expect_fetch_queue_message()
            .times(1)
            .returning(|_| Ok(message(QueueStatus::FinishWithError)));

        let watcher = QueueWatcher::new(Arc::new(service), PollConfig::default());
        let message = watcher.track("q-1").outcome().await.completed().unwrap();
        assert!(!message.status.is_successful());
    }
}
