//! PostgreSQL persistence adapters using Diesel ORM.
//!
//! The account store is backed by PostgreSQL via Diesel with async support
//! through `diesel-async` and `bb8` connection pooling.
//!
//! # Architecture
//!
//! - **Thin adapters**: the store only translates between Diesel rows and
//!   domain accounts. Validation and batching live in the domain.
//! - **Internal models**: Diesel row structs (`models.rs`) and schema
//!   definitions (`schema.rs`) never leave this module.
//! - **Strongly typed errors**: database errors are mapped to
//!   `AccountStoreError`; unique violations keep the offending column.
//!
//! # Example
//!
//! ```ignore
//! use user_accounts::outbound::persistence::{DbPool, DieselAccountStore, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/accounts")).await?;
//! let store = DieselAccountStore::new(pool);
//! ```

mod diesel_account_store;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_account_store::DieselAccountStore;
pub use migrations::{MigrationError, apply_migrations};
pub use pool::{DbPool, PoolConfig, PoolError};
