//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL account store using Diesel ORM
//! - **memory**: in-process account store for dry runs and tests
//! - **hashing**: Argon2 password hashing
//! - **notification**: tracing-backed welcome notifications
//!
//! Adapters are thin translators between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod hashing;
pub mod memory;
pub mod notification;
pub mod persistence;
