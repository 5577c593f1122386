//! Batch account management service.
//!
//! This module implements the two entry points of the account batch
//! pipeline, `store_users` and `update_users`. Each call derives rules from
//! the raw batch, validates the whole batch against them, and hands the
//! sanitised records to the transactional writer. After a successful create,
//! welcome notifications are dispatched on a background task when enabled.
//! Callers that own the runtime await [`AccountBatchService::settle_notifications`]
//! before shutting it down.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Value, json};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::ports::{
    AccountCreatedNotification, AccountNotifier, AccountStore, AccountStoreError, PasswordHasher,
};
use crate::domain::rules::build_rules;
use crate::domain::validation::{BatchValidationError, BatchValidator, ValidationFailure};
use crate::domain::writer::{TransactionalWriter, WriteFailure};
use crate::domain::{BatchMode, Error, RawBatch, UserAccount};

/// Failures surfaced by [`AccountBatchService`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountBatchError {
    /// The batch broke one or more rules; nothing was written.
    #[error("account batch rejected: {0}")]
    Validation(#[from] ValidationFailure),
    /// A validation lookup could not reach the store; nothing was written.
    #[error("account batch lookup failed: {0}")]
    Lookup(#[source] AccountStoreError),
    /// The write was aborted and rolled back.
    #[error("account batch write failed: {0}")]
    Write(#[from] WriteFailure),
}

impl From<BatchValidationError> for AccountBatchError {
    fn from(value: BatchValidationError) -> Self {
        match value {
            BatchValidationError::Invalid(failure) => Self::Validation(failure),
            BatchValidationError::Lookup(error) => Self::Lookup(error),
        }
    }
}

fn map_store_error(error: &AccountStoreError) -> Error {
    match error {
        AccountStoreError::Connection { message } => {
            Error::service_unavailable(format!("account store unavailable: {message}"))
        }
        AccountStoreError::UniqueViolation { column } => {
            Error::conflict(format!("account {column} is already taken"))
                .with_details(json!({ "column": column, "code": "unique_violation" }))
        }
        AccountStoreError::Query { message } => {
            Error::internal(format!("account store error: {message}"))
        }
        AccountStoreError::Missing { id } => {
            Error::not_found(format!("account {id} does not exist"))
        }
    }
}

fn with_index(error: Error, index: usize) -> Error {
    let mut details = error.details().cloned().unwrap_or_else(|| json!({}));
    if let Value::Object(map) = &mut details {
        map.insert("index".to_owned(), json!(index));
    }
    error.with_details(details)
}

impl From<AccountBatchError> for Error {
    fn from(value: AccountBatchError) -> Self {
        match value {
            AccountBatchError::Validation(failure) => {
                Error::invalid_request("account batch failed validation")
                    .with_details(failure.to_details())
            }
            AccountBatchError::Lookup(error) => map_store_error(&error),
            AccountBatchError::Write(failure) => match failure {
                WriteFailure::Begin(error) | WriteFailure::Commit(error) => map_store_error(&error),
                WriteFailure::Storage { index, source } => {
                    with_index(map_store_error(&source), index)
                }
                WriteFailure::Hashing { index, source } => {
                    with_index(Error::internal(source.to_string()), index)
                }
                WriteFailure::MissingAccount { index, id } => with_index(
                    Error::not_found(format!("account {id} does not exist"))
                        .with_details(json!({ "id": id })),
                    index,
                ),
            },
        }
    }
}

/// Account batch service over the store, hasher, and notifier ports.
#[derive(Clone)]
pub struct AccountBatchService<S, H, N> {
    store: Arc<S>,
    hasher: Arc<H>,
    notifier: Arc<N>,
    notify_on_create: bool,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<S, H, N> AccountBatchService<S, H, N> {
    /// Create a new service with notifications disabled.
    pub fn new(store: Arc<S>, hasher: Arc<H>, notifier: Arc<N>) -> Self {
        Self {
            store,
            hasher,
            notifier,
            notify_on_create: false,
            pending: Arc::default(),
        }
    }

    /// Enable or disable post-commit welcome notifications.
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notify_on_create = enabled;
        self
    }

    /// Wait for every notification task dispatched so far to finish.
    ///
    /// Notification failures were already logged by the task; a task that
    /// panicked or was cancelled is logged here.
    pub async fn settle_notifications(&self) {
        let handles = std::mem::take(
            &mut *self
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for handle in handles {
            if let Err(error) = handle.await {
                warn!(%error, "account notification task did not finish");
            }
        }
    }
}

impl<S, H, N> AccountBatchService<S, H, N>
where
    S: AccountStore,
    H: PasswordHasher,
    N: AccountNotifier + 'static,
{
    /// Create one account per record, all or nothing.
    ///
    /// # Errors
    ///
    /// Returns [`AccountBatchError::Validation`] when any record breaks a
    /// rule, [`AccountBatchError::Lookup`] when a uniqueness check cannot run,
    /// and [`AccountBatchError::Write`] when the write was rolled back.
    pub async fn store_users(
        &self,
        batch: RawBatch,
    ) -> Result<Vec<UserAccount>, AccountBatchError> {
        let accounts = self.process(&batch, BatchMode::Create).await?;
        if self.notify_on_create {
            self.dispatch_notifications(&accounts);
        }
        Ok(accounts)
    }

    /// Apply one partial update per record, all or nothing.
    ///
    /// # Errors
    ///
    /// Same as [`Self::store_users`].
    pub async fn update_users(
        &self,
        batch: RawBatch,
    ) -> Result<Vec<UserAccount>, AccountBatchError> {
        self.process(&batch, BatchMode::Update).await
    }

    async fn process(
        &self,
        batch: &[Value],
        mode: BatchMode,
    ) -> Result<Vec<UserAccount>, AccountBatchError> {
        if batch.is_empty() {
            debug!(mode = %mode, "empty account batch; nothing to write");
            return Ok(Vec::new());
        }

        let rules = build_rules(batch, mode);
        let validated = BatchValidator::new(self.store.as_ref())
            .validate(batch, mode, &rules)
            .await?;
        let accounts = TransactionalWriter::new(self.store.as_ref(), self.hasher.as_ref())
            .write(validated)
            .await?;
        Ok(accounts)
    }

    fn dispatch_notifications(&self, accounts: &[UserAccount]) {
        let mut seen = HashSet::new();
        let notifications: Vec<AccountCreatedNotification> = accounts
            .iter()
            .filter(|account| seen.insert(account.id()))
            .map(AccountCreatedNotification::for_account)
            .collect();
        if notifications.is_empty() {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                count = notifications.len(),
                "no async runtime; account notifications skipped"
            );
            return;
        };

        let notifier = Arc::clone(&self.notifier);
        let handle = runtime.spawn(async move {
            for notification in notifications {
                if let Err(error) = notifier.notify(&notification).await {
                    warn!(
                        account_id = %notification.account_id,
                        %error,
                        "account notification failed"
                    );
                }
            }
        });
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|task| !task.is_finished());
        pending.push(handle);
    }
}

#[cfg(test)]
#[path = "account_batch_service_tests.rs"]
mod tests;
