//! All-or-nothing persistence of validated batches.
//!
//! The writer hashes every password first, then opens one store transaction
//! per batch and applies records in input order. The first failing record
//! aborts the batch: the transaction is rolled back before the error is
//! returned, so no partial batch is ever visible to other readers.

use tracing::{debug, info, warn};

use super::account::{AccountChanges, AccountId, NewAccount, UserAccount};
use super::batch::{AccountDraft, AccountPatch, ValidatedBatch};
use super::ports::{
    AccountStore, AccountStoreError, AccountTransaction, PasswordHashError, PasswordHasher,
};

/// Errors that abort a batch write. None of them leave persisted state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WriteFailure {
    /// The store refused to open a transaction.
    #[error("could not open batch transaction: {0}")]
    Begin(#[source] AccountStoreError),
    /// The store rejected the record at `index`.
    #[error("record {index} could not be stored: {source}")]
    Storage {
        /// Position of the failing record.
        index: usize,
        /// Store error.
        source: AccountStoreError,
    },
    /// The password of the record at `index` could not be hashed.
    #[error("record {index} could not be prepared: {source}")]
    Hashing {
        /// Position of the failing record.
        index: usize,
        /// Hasher error.
        source: PasswordHashError,
    },
    /// The account targeted by the record at `index` vanished after
    /// validation.
    #[error("record {index} targets missing account {id}")]
    MissingAccount {
        /// Position of the failing record.
        index: usize,
        /// Identifier that no longer resolves.
        id: AccountId,
    },
    /// The store failed to make the batch durable.
    #[error("batch commit failed: {0}")]
    Commit(#[source] AccountStoreError),
}

/// Applies validated batches inside a single store transaction.
pub struct TransactionalWriter<'a, S: ?Sized, H: ?Sized> {
    store: &'a S,
    hasher: &'a H,
}

impl<'a, S, H> TransactionalWriter<'a, S, H>
where
    S: AccountStore + ?Sized,
    H: PasswordHasher + ?Sized,
{
    /// Create a writer over `store`, hashing passwords with `hasher`.
    pub fn new(store: &'a S, hasher: &'a H) -> Self {
        Self { store, hasher }
    }

    /// Persist every record of `batch` or none of them.
    ///
    /// Returns the stored accounts in input order.
    ///
    /// # Errors
    ///
    /// Returns a [`WriteFailure`] naming the first failing record. The
    /// transaction has been rolled back by the time the error is returned.
    pub async fn write(&self, batch: ValidatedBatch) -> Result<Vec<UserAccount>, WriteFailure> {
        let mode = batch.mode();
        let records = batch.len();
        // Hashing is CPU bound; keep it outside the transaction.
        let prepared = self.prepare(batch)?;
        let mut transaction = self.store.begin().await.map_err(WriteFailure::Begin)?;

        let applied = match prepared {
            PreparedBatch::Create(accounts) => insert_all(transaction.as_mut(), accounts).await,
            PreparedBatch::Update(changes) => update_all(transaction.as_mut(), changes).await,
        };

        match applied {
            Ok(accounts) => {
                transaction.commit().await.map_err(WriteFailure::Commit)?;
                info!(mode = %mode, records, "account batch committed");
                Ok(accounts)
            }
            Err(failure) => {
                if let Err(error) = transaction.rollback().await {
                    warn!(mode = %mode, %error, "account batch rollback failed");
                }
                warn!(mode = %mode, records, error = %failure, "account batch rolled back");
                Err(failure)
            }
        }
    }

    fn prepare(&self, batch: ValidatedBatch) -> Result<PreparedBatch, WriteFailure> {
        match batch {
            ValidatedBatch::Create(drafts) => drafts
                .into_iter()
                .enumerate()
                .map(|(index, draft)| {
                    let AccountDraft {
                        name,
                        login,
                        email,
                        password,
                    } = draft;
                    let password_hash = self
                        .hasher
                        .hash(&password)
                        .map_err(|source| WriteFailure::Hashing { index, source })?;
                    Ok(NewAccount {
                        name,
                        login,
                        email,
                        password_hash,
                    })
                })
                .collect::<Result<_, _>>()
                .map(PreparedBatch::Create),
            ValidatedBatch::Update(patches) => patches
                .into_iter()
                .enumerate()
                .map(|(index, patch)| {
                    let AccountPatch {
                        id,
                        name,
                        login,
                        email,
                        password,
                    } = patch;
                    let password_hash = password
                        .map(|plaintext| self.hasher.hash(&plaintext))
                        .transpose()
                        .map_err(|source| WriteFailure::Hashing { index, source })?;
                    Ok((
                        id,
                        AccountChanges {
                            name,
                            login,
                            email,
                            password_hash,
                        },
                    ))
                })
                .collect::<Result<_, _>>()
                .map(PreparedBatch::Update),
        }
    }
}

/// A validated batch with every password already hashed.
enum PreparedBatch {
    Create(Vec<NewAccount>),
    Update(Vec<(AccountId, AccountChanges)>),
}

async fn insert_all(
    transaction: &mut dyn AccountTransaction,
    accounts: Vec<NewAccount>,
) -> Result<Vec<UserAccount>, WriteFailure> {
    let mut stored = Vec::with_capacity(accounts.len());
    for (index, account) in accounts.into_iter().enumerate() {
        let account = transaction
            .insert(account)
            .await
            .map_err(|source| WriteFailure::Storage { index, source })?;
        debug!(index, id = %account.id(), "account inserted");
        stored.push(account);
    }
    Ok(stored)
}

async fn update_all(
    transaction: &mut dyn AccountTransaction,
    changes: Vec<(AccountId, AccountChanges)>,
) -> Result<Vec<UserAccount>, WriteFailure> {
    let mut stored = Vec::with_capacity(changes.len());
    for (index, (id, change)) in changes.into_iter().enumerate() {
        let current = transaction
            .load_by_id(id)
            .await
            .map_err(|source| WriteFailure::Storage { index, source })?
            .ok_or(WriteFailure::MissingAccount { index, id })?;
        let account = transaction
            .update(current.merged_with(change))
            .await
            .map_err(|source| WriteFailure::Storage { index, source })?;
        debug!(index, id = %account.id(), "account updated");
        stored.push(account);
    }
    Ok(stored)
}

#[cfg(test)]
mod tests;
