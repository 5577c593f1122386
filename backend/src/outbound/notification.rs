//! Tracing-backed `AccountNotifier` adapter.
//!
//! Mail delivery is outside this crate; the adapter records each welcome
//! message as a structured `info` event carrying the recipient and the
//! configured support carbon-copy address.

use async_trait::async_trait;
use tracing::info;

use crate::domain::ports::{AccountCreatedNotification, AccountNotifier, NotificationError};

/// Notifier emitting one tracing event per welcome message.
#[derive(Debug, Clone)]
pub struct TracingAccountNotifier {
    support_cc: String,
}

impl TracingAccountNotifier {
    /// Create a notifier copying every message to `support_cc`.
    pub fn new(support_cc: impl Into<String>) -> Self {
        Self {
            support_cc: support_cc.into(),
        }
    }

    /// Carbon-copy address attached to each message.
    pub fn support_cc(&self) -> &str {
        self.support_cc.as_str()
    }
}

#[async_trait]
impl AccountNotifier for TracingAccountNotifier {
    async fn notify(
        &self,
        notification: &AccountCreatedNotification,
    ) -> Result<(), NotificationError> {
        if notification.email.trim().is_empty() {
            return Err(NotificationError::delivery("recipient address is empty"));
        }
        info!(
            account_id = %notification.account_id,
            to = %notification.email,
            cc = %self.support_cc,
            message = %notification.message,
            "account created notification"
        );
        Ok(())
    }
}
