//! Shared fakes for account batch integration tests.
//!
//! Integration tests compile as separate crates under `backend/tests/`, so
//! the automocked ports from the library are not available here. These small
//! adapters stand in for the hasher and notifier instead.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use user_accounts::domain::ports::{
    AccountCreatedNotification, AccountNotifier, NotificationError, PasswordHashError,
    PasswordHasher,
};
use user_accounts::domain::{Password, PasswordHash};

/// Hasher producing `hashed:<plaintext>` so tests can assert on the input.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefixHasher;

impl PasswordHasher for PrefixHasher {
    fn hash(&self, password: &Password) -> Result<PasswordHash, PasswordHashError> {
        Ok(PasswordHash::new(format!("hashed:{}", password.expose())))
    }
}

/// Notifier that records every delivered message.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<AccountCreatedNotification>>>,
}

impl RecordingNotifier {
    /// Logins of the accounts notified so far, in delivery order.
    pub fn logins(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("notifier lock")
            .iter()
            .map(|note| note.login.clone())
            .collect()
    }
}

#[async_trait]
impl AccountNotifier for RecordingNotifier {
    async fn notify(
        &self,
        notification: &AccountCreatedNotification,
    ) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .expect("notifier lock")
            .push(notification.clone());
        Ok(())
    }
}

/// A create record that passes every rule.
pub fn create_record(name: &str, login: &str) -> Value {
    json!({
        "name": name,
        "login": login,
        "email": format!("{login}@example.com"),
        "password": "longenough"
    })
}
