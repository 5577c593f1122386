//! Port for account persistence.
//!
//! The [`AccountStore`] read path serves uniqueness and existence lookups for
//! the batch validator. Writes only happen through an [`AccountTransaction`]
//! obtained from [`AccountStore::begin`], which owns its connection until it
//! is committed or rolled back. Dropping a transaction without committing must
//! never persist its writes.

use async_trait::async_trait;

use crate::domain::{AccountColumn, AccountId, NewAccount, UserAccount};

use super::define_port_error;

define_port_error! {
    /// Persistence errors raised by account store adapters.
    pub enum AccountStoreError {
        /// Store connection could not be established.
        Connection { message: String } => "account store connection failed: {message}",
        /// Query or mutation failed during execution.
        Query { message: String } => "account store query failed: {message}",
        /// A unique constraint rejected the write.
        UniqueViolation { column: String } => "account {column} is already taken",
        /// The targeted row does not exist.
        Missing { id: i64 } => "account {id} does not exist",
    }
}

/// Read path and transaction factory for stored accounts.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Whether an account with this identifier is stored.
    async fn exists(&self, id: AccountId) -> Result<bool, AccountStoreError>;

    /// Whether `value` is already stored in `column` on any account other
    /// than `except`.
    async fn is_taken(
        &self,
        column: AccountColumn,
        value: &str,
        except: Option<AccountId>,
    ) -> Result<bool, AccountStoreError>;

    /// Open a transaction for a batch of writes.
    async fn begin(&self) -> Result<Box<dyn AccountTransaction>, AccountStoreError>;
}

/// Unit of work spanning every write of one batch.
#[async_trait]
pub trait AccountTransaction: Send {
    /// Load a stored account, seeing this transaction's own writes.
    async fn load_by_id(
        &mut self,
        id: AccountId,
    ) -> Result<Option<UserAccount>, AccountStoreError>;

    /// Insert a new account and return it with its assigned identifier.
    async fn insert(&mut self, account: NewAccount) -> Result<UserAccount, AccountStoreError>;

    /// Persist every field of an existing account.
    async fn update(&mut self, account: UserAccount) -> Result<UserAccount, AccountStoreError>;

    /// Make every write of this transaction durable.
    async fn commit(self: Box<Self>) -> Result<(), AccountStoreError>;

    /// Discard every write of this transaction.
    async fn rollback(self: Box<Self>) -> Result<(), AccountStoreError>;
}
