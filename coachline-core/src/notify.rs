use async_trait::async_trait;
use coachline_shared::models::notifications::Notification;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::BoxError;

/// Outbound passenger messaging (e-mail in production).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn dispatch(&self, notification: Notification) -> Result<(), BoxError>;
}

/// Writes notifications to the log instead of delivering them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn dispatch(&self, notification: Notification) -> Result<(), BoxError> {
        tracing::info!(
            kind = notification.kind(),
            reservation_id = %notification.ticket().reservation_id,
            recipient = ?notification.recipient(),
            "notification (log only)"
        );
        Ok(())
    }
}

/// Keeps every dispatched notification in memory. Can be switched to fail.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_deliveries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.lock().await.clone()
    }

    /// Waits (briefly) until at least `count` notifications were recorded.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        for _ in 0..200 {
            {
                let sent = self.sent.lock().await;
                if sent.len() >= count {
                    return sent.clone();
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        self.sent().await
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn dispatch(&self, notification: Notification) -> Result<(), BoxError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err("simulated mail relay outage".into());
        }
        self.sent.lock().await.push(notification);
        Ok(())
    }
}
