use crate::domain::ports::{Notification, NotificationSink};
use crate::domain::user::UserId;
use crate::error::Result;
use async_trait::async_trait;

/// Hands notifications to the log. Used when no delivery service is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotificationSink;

#[async_trait]
impl NotificationSink for TracingNotificationSink {
    async fn notify(&self, user: UserId, notification: Notification) -> Result<()> {
        tracing::info!(
            user_id = %user,
            kind = ?notification.kind,
            related_id = %notification.related_id,
            related_model = notification.related_model,
            title = %notification.title,
            "Notification"
        );
        Ok(())
    }
}
