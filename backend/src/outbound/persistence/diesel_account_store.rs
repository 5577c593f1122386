//! PostgreSQL-backed account store adapter.
//!
//! Lookups borrow a pooled connection per query. Batch transactions check
//! out an owned connection, issue `BEGIN` through Diesel's ANSI transaction
//! manager, and keep the connection until `commit` or `rollback`. Unique
//! constraint violations raised by concurrent writers surface as
//! [`AccountStoreError::UniqueViolation`].

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::PooledConnection;
use diesel_async::{AnsiTransactionManager, AsyncPgConnection, RunQueryDsl, TransactionManager};
use tracing::debug;

use crate::domain::ports::{AccountStore, AccountStoreError, AccountTransaction};
use crate::domain::{AccountColumn, AccountId, NewAccount, PasswordHash, UserAccount};

use super::models::{AccountChangeset, AccountRow, NewAccountRow};
use super::pool::{DbPool, PoolError};
use super::schema::user_accounts;

/// Diesel-backed implementation of the account store port.
#[derive(Clone)]
pub struct DieselAccountStore {
    pool: DbPool,
}

impl DieselAccountStore {
    /// Create a new store with the given connection pool.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use user_accounts::outbound::persistence::{DbPool, DieselAccountStore, PoolConfig};
    ///
    /// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
    /// let pool = DbPool::new(PoolConfig::new("postgres://localhost/accounts")).await?;
    /// let store = DieselAccountStore::new(pool);
    /// # let _ = store;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Map pool errors to account store errors.
fn map_pool_error(error: PoolError) -> AccountStoreError {
    match error {
        PoolError::Checkout { message } | PoolError::Build { message } => {
            AccountStoreError::connection(message)
        }
    }
}

/// Name the account column behind a unique-constraint violation.
fn violated_column(constraint: Option<&str>, message: &str) -> String {
    let source = constraint.unwrap_or(message).to_lowercase();
    for column in [AccountColumn::Login, AccountColumn::Email] {
        if source.contains(column.as_str()) {
            return column.as_str().to_owned();
        }
    }
    constraint.unwrap_or("unknown").to_owned()
}

/// Map Diesel errors to account store errors.
fn map_diesel_error(error: diesel::result::Error) -> AccountStoreError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    let error_message = error.to_string();
    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(
                ?kind,
                message = info.message(),
                constraint = ?info.constraint_name(),
                "diesel operation failed"
            );
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            error = %error_message,
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::NotFound => AccountStoreError::query("record not found"),
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            AccountStoreError::unique_violation(violated_column(
                info.constraint_name(),
                info.message(),
            ))
        }
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
            AccountStoreError::connection(info.message().to_owned())
        }
        DieselError::DatabaseError(_, info) => AccountStoreError::query(info.message().to_owned()),
        _ => AccountStoreError::query(error_message),
    }
}

/// Convert a database row to a domain account.
fn row_to_account(row: AccountRow) -> Result<UserAccount, AccountStoreError> {
    let AccountRow {
        id,
        name,
        login,
        email,
        password_hash,
        created_at,
        updated_at,
    } = row;
    let id = AccountId::new(id).map_err(|err| {
        AccountStoreError::query(format!("invalid account id {id} in database: {err}"))
    })?;
    Ok(UserAccount::from_parts(
        id,
        NewAccount {
            name,
            login,
            email,
            password_hash: PasswordHash::new(password_hash),
        },
        created_at,
        updated_at,
    ))
}

#[async_trait]
impl AccountStore for DieselAccountStore {
    async fn exists(&self, id: AccountId) -> Result<bool, AccountStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::select(diesel::dsl::exists(user_accounts::table.find(id.get())))
            .get_result::<bool>(&mut conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn is_taken(
        &self,
        column: AccountColumn,
        value: &str,
        except: Option<AccountId>,
    ) -> Result<bool, AccountStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut query = user_accounts::table
            .select(user_accounts::id)
            .into_boxed();
        query = match column {
            AccountColumn::Login => query.filter(user_accounts::login.eq(value)),
            AccountColumn::Email => query.filter(user_accounts::email.eq(value)),
        };
        if let Some(id) = except {
            query = query.filter(user_accounts::id.ne(id.get()));
        }
        let found = query
            .limit(1)
            .first::<i64>(&mut conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        Ok(found.is_some())
    }

    async fn begin(&self) -> Result<Box<dyn AccountTransaction>, AccountStoreError> {
        let mut conn = self.pool.get_owned().await.map_err(map_pool_error)?;
        AnsiTransactionManager::begin_transaction(&mut *conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(Box::new(DieselAccountTransaction { conn }))
    }
}

/// Open PostgreSQL transaction owning its pooled connection.
struct DieselAccountTransaction {
    conn: PooledConnection<'static, AsyncPgConnection>,
}

#[async_trait]
impl AccountTransaction for DieselAccountTransaction {
    async fn load_by_id(
        &mut self,
        id: AccountId,
    ) -> Result<Option<UserAccount>, AccountStoreError> {
        let row = user_accounts::table
            .find(id.get())
            .select(AccountRow::as_select())
            .first(&mut *self.conn)
            .await
            .optional()
            .map_err(map_diesel_error)?;
        row.map(row_to_account).transpose()
    }

    async fn insert(&mut self, account: NewAccount) -> Result<UserAccount, AccountStoreError> {
        let new_row = NewAccountRow {
            name: account.name.as_str(),
            login: account.login.as_str(),
            email: account.email.as_str(),
            password_hash: account.password_hash.as_str(),
        };
        let row = diesel::insert_into(user_accounts::table)
            .values(&new_row)
            .returning(AccountRow::as_returning())
            .get_result(&mut *self.conn)
            .await
            .map_err(map_diesel_error)?;
        row_to_account(row)
    }

    async fn update(&mut self, account: UserAccount) -> Result<UserAccount, AccountStoreError> {
        let changes = AccountChangeset {
            name: account.name(),
            login: account.login(),
            email: account.email(),
            password_hash: account.password_hash().as_str(),
        };
        let row = diesel::update(user_accounts::table.find(account.id().get()))
            .set((&changes, user_accounts::updated_at.eq(diesel::dsl::now)))
            .returning(AccountRow::as_returning())
            .get_result(&mut *self.conn)
            .await
            .optional()
            .map_err(map_diesel_error)?
            .ok_or_else(|| AccountStoreError::missing(account.id().get()))?;
        row_to_account(row)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), AccountStoreError> {
        AnsiTransactionManager::commit_transaction(&mut *self.conn)
            .await
            .map_err(map_diesel_error)
    }

    async fn rollback(mut self: Box<Self>) -> Result<(), AccountStoreError> {
        AnsiTransactionManager::rollback_transaction(&mut *self.conn)
            .await
            .map_err(map_diesel_error)
    }
}
