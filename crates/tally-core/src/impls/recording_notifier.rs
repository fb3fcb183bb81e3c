//! RecordingNotifier - 送った通知を覚えておくだけの通知チャネル

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use crate::domain::{SetNotification, TallyError};
use crate::ports::NotificationChannel;

#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    published: Arc<Mutex<Vec<(String, SetNotification)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<(String, SetNotification)> {
        self.published
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl NotificationChannel for RecordingNotifier {
    async fn publish(&self, topic: &str, notification: &SetNotification) -> Result<(), TallyError> {
        info!(topic, subject = %notification.subject(), "publishing set notification");
        self.published
            .lock()
            .map_err(|_| TallyError::Notification("notifier lock poisoned".to_string()))?
            .push((topic.to_string(), notification.clone()));
        Ok(())
    }
}
