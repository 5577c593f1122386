//! In-process `AccountStore` adapter.
//!
//! Rows live behind an async mutex. A transaction holds the mutex from
//! `begin` until it is committed, rolled back, or dropped, and works on a
//! staged copy of the rows, so transactions are serialised and an abandoned
//! transaction leaves the committed rows untouched. Login and email
//! uniqueness is enforced on every staged write, mirroring the database
//! constraints.
//!
//! The store backs the CLI's `--dry-run` mode and the behaviour tests. Write
//! failures can be injected to exercise rollback paths.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use mockable::{Clock, DefaultClock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::domain::ports::{AccountStore, AccountStoreError, AccountTransaction};
use crate::domain::{AccountColumn, AccountId, NewAccount, UserAccount};

#[derive(Debug, Clone, Default)]
struct Rows {
    accounts: BTreeMap<AccountId, UserAccount>,
    last_id: i64,
}

impl Rows {
    fn column_value(account: &UserAccount, column: AccountColumn) -> &str {
        match column {
            AccountColumn::Login => account.login(),
            AccountColumn::Email => account.email(),
        }
    }

    fn is_taken(&self, column: AccountColumn, value: &str, except: Option<AccountId>) -> bool {
        self.accounts.values().any(|account| {
            Some(account.id()) != except && Self::column_value(account, column) == value
        })
    }

    fn check_unique(
        &self,
        login: &str,
        email: &str,
        except: Option<AccountId>,
    ) -> Result<(), AccountStoreError> {
        for (column, value) in [(AccountColumn::Login, login), (AccountColumn::Email, email)] {
            if self.is_taken(column, value, except) {
                return Err(AccountStoreError::unique_violation(column.as_str()));
            }
        }
        Ok(())
    }

    fn next_id(&mut self) -> Result<AccountId, AccountStoreError> {
        let candidate = self
            .last_id
            .checked_add(1)
            .ok_or_else(|| AccountStoreError::query("account id sequence exhausted"))?;
        let id = AccountId::new(candidate)
            .map_err(|error| AccountStoreError::query(error.to_string()))?;
        self.last_id = candidate;
        Ok(id)
    }
}

/// Failure injected into the nth write of every transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WriteFault {
    at: usize,
    error: AccountStoreError,
}

/// Account store kept in process memory.
#[derive(Clone)]
pub struct InMemoryAccountStore {
    rows: Arc<Mutex<Rows>>,
    clock: Arc<dyn Clock>,
    write_fault: Option<WriteFault>,
    offline: bool,
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new(Arc::new(DefaultClock))
    }
}

impl InMemoryAccountStore {
    /// Create an empty store stamping rows with `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            rows: Arc::new(Mutex::new(Rows::default())),
            clock,
            write_fault: None,
            offline: false,
        }
    }

    /// Make the write at position `at` (zero based) of each transaction fail
    /// with `error`.
    pub fn with_failing_write(mut self, at: usize, error: AccountStoreError) -> Self {
        self.write_fault = Some(WriteFault { at, error });
        self
    }

    /// Make every read and `begin` fail with a connection error.
    pub fn offline(mut self) -> Self {
        self.offline = true;
        self
    }

    /// Insert an account outside any batch, e.g. to seed fixtures.
    ///
    /// # Errors
    ///
    /// Returns [`AccountStoreError::UniqueViolation`] when the login or email
    /// is already stored.
    pub async fn seed(&self, account: NewAccount) -> Result<UserAccount, AccountStoreError> {
        let mut rows = self.rows.lock().await;
        rows.check_unique(&account.login, &account.email, None)?;
        let id = rows.next_id()?;
        let now = self.clock.utc();
        let stored = UserAccount::from_parts(id, account, now, now);
        rows.accounts.insert(id, stored.clone());
        Ok(stored)
    }

    /// Snapshot of committed accounts ordered by id.
    pub async fn accounts(&self) -> Vec<UserAccount> {
        self.rows.lock().await.accounts.values().cloned().collect()
    }

    /// Committed account with this id, if any.
    pub async fn find(&self, id: AccountId) -> Option<UserAccount> {
        self.rows.lock().await.accounts.get(&id).cloned()
    }

    fn ensure_online(&self) -> Result<(), AccountStoreError> {
        if self.offline {
            return Err(AccountStoreError::connection("in-memory store is offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn exists(&self, id: AccountId) -> Result<bool, AccountStoreError> {
        self.ensure_online()?;
        Ok(self.rows.lock().await.accounts.contains_key(&id))
    }

    async fn is_taken(
        &self,
        column: AccountColumn,
        value: &str,
        except: Option<AccountId>,
    ) -> Result<bool, AccountStoreError> {
        self.ensure_online()?;
        Ok(self.rows.lock().await.is_taken(column, value, except))
    }

    async fn begin(&self) -> Result<Box<dyn AccountTransaction>, AccountStoreError> {
        self.ensure_online()?;
        let guard = Arc::clone(&self.rows).lock_owned().await;
        let staged = guard.clone();
        debug!(rows = staged.accounts.len(), "in-memory transaction opened");
        Ok(Box::new(InMemoryTransaction {
            guard,
            staged,
            clock: Arc::clone(&self.clock),
            write_fault: self.write_fault.clone(),
            writes: 0,
        }))
    }
}

/// Exclusive transaction over the in-memory rows.
struct InMemoryTransaction {
    guard: OwnedMutexGuard<Rows>,
    staged: Rows,
    clock: Arc<dyn Clock>,
    write_fault: Option<WriteFault>,
    writes: usize,
}

impl InMemoryTransaction {
    fn record_write(&mut self) -> Result<(), AccountStoreError> {
        let attempt = self.writes;
        self.writes += 1;
        match &self.write_fault {
            Some(fault) if fault.at == attempt => Err(fault.error.clone()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl AccountTransaction for InMemoryTransaction {
    async fn load_by_id(
        &mut self,
        id: AccountId,
    ) -> Result<Option<UserAccount>, AccountStoreError> {
        Ok(self.staged.accounts.get(&id).cloned())
    }

    async fn insert(&mut self, account: NewAccount) -> Result<UserAccount, AccountStoreError> {
        self.record_write()?;
        self.staged
            .check_unique(&account.login, &account.email, None)?;
        let id = self.staged.next_id()?;
        let now = self.clock.utc();
        let stored = UserAccount::from_parts(id, account, now, now);
        self.staged.accounts.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update(&mut self, account: UserAccount) -> Result<UserAccount, AccountStoreError> {
        self.record_write()?;
        let id = account.id();
        if !self.staged.accounts.contains_key(&id) {
            return Err(AccountStoreError::missing(id.get()));
        }
        self.staged
            .check_unique(account.login(), account.email(), Some(id))?;
        let stored = account.touched(self.clock.utc());
        self.staged.accounts.insert(id, stored.clone());
        Ok(stored)
    }

    async fn commit(self: Box<Self>) -> Result<(), AccountStoreError> {
        let Self {
            mut guard, staged, ..
        } = *self;
        *guard = staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), AccountStoreError> {
        debug!(writes = self.writes, "in-memory transaction discarded");
        Ok(())
    }
}
