//! Port for post-commit account notifications.
//!
//! Notifications sit outside the write transaction: they are only sent after
//! a batch has been committed, each one is attempted once, and failures are
//! logged rather than reported to the caller.

use async_trait::async_trait;

use crate::domain::{AccountId, UserAccount};

use super::define_port_error;

define_port_error! {
    /// Errors raised by notification adapters.
    pub enum NotificationError {
        /// The message could not be handed to the delivery channel.
        Delivery { message: String } => "account notification failed: {message}",
    }
}

/// Message announcing a newly created account to its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCreatedNotification {
    /// Account the message is about.
    pub account_id: AccountId,
    /// Recipient address.
    pub email: String,
    /// Login handle the recipient signs in with.
    pub login: String,
    /// Human-readable body.
    pub message: String,
}

impl AccountCreatedNotification {
    /// Build the standard welcome message for a stored account.
    ///
    /// # Examples
    /// ```
    /// use user_accounts::domain::ports::AccountCreatedNotification;
    /// # use user_accounts::domain::{AccountId, NewAccount, PasswordHash, UserAccount};
    /// # let now = chrono::Utc::now();
    /// # let account = UserAccount::from_parts(
    /// #     AccountId::new(1).unwrap(),
    /// #     NewAccount {
    /// #         name: "Alice Example".into(),
    /// #         login: "alice".into(),
    /// #         email: "alice@example.com".into(),
    /// #         password_hash: PasswordHash::new("x"),
    /// #     },
    /// #     now,
    /// #     now,
    /// # );
    /// let note = AccountCreatedNotification::for_account(&account);
    /// assert_eq!(note.message, "Account has been created. You can log in as alice");
    /// ```
    pub fn for_account(account: &UserAccount) -> Self {
        Self {
            account_id: account.id(),
            email: account.email().to_owned(),
            login: account.login().to_owned(),
            message: format!(
                "Account has been created. You can log in as {}",
                account.login()
            ),
        }
    }
}

/// Delivery channel for account notifications.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountNotifier: Send + Sync {
    /// Attempt delivery of a single notification.
    async fn notify(
        &self,
        notification: &AccountCreatedNotification,
    ) -> Result<(), NotificationError>;
}

/// Notifier that accepts and discards every message.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpAccountNotifier;

#[async_trait]
impl AccountNotifier for NoOpAccountNotifier {
    async fn notify(
        &self,
        _notification: &AccountCreatedNotification,
    ) -> Result<(), NotificationError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn noop_notifier_accepts_messages() {
        let notification = AccountCreatedNotification {
            account_id: AccountId::new(3).expect("valid id"),
            email: "bob@example.com".to_owned(),
            login: "bob".to_owned(),
            message: "hello".to_owned(),
        };

        NoOpAccountNotifier
            .notify(&notification)
            .await
            .expect("no-op notifier should accept");
    }

    #[rstest]
    fn delivery_error_preserves_message() {
        let error = NotificationError::delivery("mailbox full");
        assert_eq!(error.to_string(), "account notification failed: mailbox full");
    }
}
