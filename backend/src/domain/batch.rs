//! Batch inputs and their sanitised forms.
//!
//! A raw batch is the caller's semi-structured payload: one JSON value per
//! candidate record, addressed by its position. Validation turns it into a
//! [`ValidatedBatch`] whose records keep the original order.

use std::fmt;

use serde_json::Value;

use super::account::{AccountId, Password};

/// Unvalidated records as submitted by the caller.
pub type RawBatch = Vec<Value>;

/// Write mode selected by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchMode {
    /// Every record creates a new account.
    Create,
    /// Every record updates the account named by its `id`.
    Update,
}

impl BatchMode {
    /// Lowercase label used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

impl fmt::Display for BatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record attributes the batch pipeline understands.
///
/// Ordering follows declaration order and drives the order of reported
/// violations within a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AccountField {
    /// Identifier of the account to update.
    Id,
    /// Display name.
    Name,
    /// Login handle.
    Login,
    /// Email address.
    Email,
    /// Plaintext password.
    Password,
}

impl AccountField {
    /// Every known field, in reporting order.
    pub const ALL: [Self; 5] = [
        Self::Id,
        Self::Name,
        Self::Login,
        Self::Email,
        Self::Password,
    ];

    /// JSON key for this field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::Login => "login",
            Self::Email => "email",
            Self::Password => "password",
        }
    }

    /// Whether surrounding whitespace is stripped before validation.
    pub fn is_trimmed(self) -> bool {
        !matches!(self, Self::Password)
    }
}

impl fmt::Display for AccountField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sanitised values for one `create` record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountDraft {
    /// Display name.
    pub name: String,
    /// Login handle.
    pub login: String,
    /// Email address.
    pub email: String,
    /// Plaintext password awaiting hashing.
    pub password: Password,
}

/// Sanitised values for one `update` record; `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountPatch {
    /// Account to modify.
    pub id: AccountId,
    /// Replacement display name.
    pub name: Option<String>,
    /// Replacement login handle.
    pub login: Option<String>,
    /// Replacement email address.
    pub email: Option<String>,
    /// Replacement plaintext password.
    pub password: Option<Password>,
}

/// Result of a successful validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedBatch {
    /// Records ready for insertion.
    Create(Vec<AccountDraft>),
    /// Records ready for partial update.
    Update(Vec<AccountPatch>),
}

impl ValidatedBatch {
    /// Mode the batch was validated for.
    pub fn mode(&self) -> BatchMode {
        match self {
            Self::Create(_) => BatchMode::Create,
            Self::Update(_) => BatchMode::Update,
        }
    }

    /// Number of records in the batch.
    pub fn len(&self) -> usize {
        match self {
            Self::Create(drafts) => drafts.len(),
            Self::Update(patches) => patches.len(),
        }
    }

    /// Whether the batch has no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
