//! NotificationChannel port - セット終端通知の送信先（SNS など）

use async_trait::async_trait;

use crate::domain::{SetNotification, TallyError};

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn publish(&self, topic: &str, notification: &SetNotification) -> Result<(), TallyError>;
}
