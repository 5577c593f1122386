//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. Regenerate with
//! `diesel print-schema` after changing a migration.

diesel::table! {
    /// Stored user accounts.
    ///
    /// `login` and `email` each carry a unique constraint
    /// (`user_accounts_login_key`, `user_accounts_email_key`).
    user_accounts (id) {
        /// Primary key assigned from a sequence.
        id -> Int8,
        /// Display name (max 100 characters).
        name -> Varchar,
        /// Login handle (max 100 characters).
        login -> Varchar,
        /// Email address.
        email -> Varchar,
        /// PHC-encoded credential.
        password_hash -> Text,
        /// Record creation timestamp.
        created_at -> Timestamptz,
        /// Last modification timestamp.
        updated_at -> Timestamptz,
    }
}
