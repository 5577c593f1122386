//! Internal Diesel row structs for database operations.
//!
//! These types are implementation details of the persistence layer and must
//! never be exposed to the domain.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::schema::user_accounts;

/// Row struct for reading from the user_accounts table.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = user_accounts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub(crate) struct AccountRow {
    pub id: i64,
    pub name: String,
    pub login: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insertable struct for creating account records.
///
/// Identifiers and timestamps come from column defaults.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user_accounts)]
pub(crate) struct NewAccountRow<'a> {
    pub name: &'a str,
    pub login: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}

/// Changeset writing every mutable column of an existing account.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = user_accounts)]
pub(crate) struct AccountChangeset<'a> {
    pub name: &'a str,
    pub login: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
}
