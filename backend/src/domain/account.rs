//! User account data model.
//!
//! Purpose: describe persisted accounts and the credential wrappers that move
//! through the batch pipeline. Plaintext passwords only ever live inside
//! [`Password`], which is redacted in debug output and zeroised on drop. Stored
//! accounts carry a [`PasswordHash`] that is never serialised.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Validation errors returned by [`AccountId::new`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountIdError {
    /// Identifiers must be strictly positive.
    NotPositive,
}

impl fmt::Display for AccountIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotPositive => write!(f, "account id must be a positive integer"),
        }
    }
}

impl std::error::Error for AccountIdError {}

/// Server-assigned account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct AccountId(i64);

impl AccountId {
    /// Validate and construct an [`AccountId`].
    ///
    /// # Examples
    /// ```
    /// use user_accounts::domain::AccountId;
    ///
    /// assert_eq!(AccountId::new(7).map(|id| id.get()), Ok(7));
    /// assert!(AccountId::new(0).is_err());
    /// ```
    pub fn new(value: i64) -> Result<Self, AccountIdError> {
        if value <= 0 {
            return Err(AccountIdError::NotPositive);
        }
        Ok(Self(value))
    }

    /// Raw integer value.
    pub fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<AccountId> for i64 {
    fn from(value: AccountId) -> Self {
        value.0
    }
}

impl TryFrom<i64> for AccountId {
    type Error = AccountIdError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Plaintext password supplied by a caller.
///
/// The buffer is zeroised when dropped and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(Zeroizing<String>);

impl Password {
    /// Wrap a plaintext password without altering whitespace.
    pub fn new(plaintext: impl Into<String>) -> Self {
        Self(Zeroizing::new(plaintext.into()))
    }

    /// Expose the plaintext to a hashing primitive.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Opaque one-way credential produced by a password hasher.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Wrap an encoded credential string.
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// Encoded credential, e.g. a PHC string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash(<redacted>)")
    }
}

/// Account columns that carry a storage-level uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccountColumn {
    /// Login handle.
    Login,
    /// Email address.
    Email,
}

impl AccountColumn {
    /// Column name as stored.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Email => "email",
        }
    }
}

impl fmt::Display for AccountColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field values for a row that does not exist yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    /// Display name.
    pub name: String,
    /// Login handle.
    pub login: String,
    /// Email address.
    pub email: String,
    /// Hashed credential.
    pub password_hash: PasswordHash,
}

/// Persisted user account.
///
/// ## Invariants
/// - `password_hash` is never serialised; JSON output only exposes identity
///   and profile fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    id: AccountId,
    name: String,
    login: String,
    email: String,
    #[serde(skip)]
    password_hash: PasswordHash,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl UserAccount {
    /// Rehydrate an account from stored values.
    pub fn from_parts(
        id: AccountId,
        account: NewAccount,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        let NewAccount {
            name,
            login,
            email,
            password_hash,
        } = account;
        Self {
            id,
            name,
            login,
            email,
            password_hash,
            created_at,
            updated_at,
        }
    }

    /// Stable identifier.
    pub fn id(&self) -> AccountId {
        self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Login handle.
    pub fn login(&self) -> &str {
        self.login.as_str()
    }

    /// Email address.
    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    /// Stored credential.
    pub fn password_hash(&self) -> &PasswordHash {
        &self.password_hash
    }

    /// Creation timestamp.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last modification timestamp.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Apply a partial change set; absent fields keep their stored value.
    ///
    /// Timestamps are left untouched; stores stamp `updated_at` on write.
    pub fn merged_with(mut self, changes: AccountChanges) -> Self {
        let AccountChanges {
            name,
            login,
            email,
            password_hash,
        } = changes;
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(login) = login {
            self.login = login;
        }
        if let Some(email) = email {
            self.email = email;
        }
        if let Some(password_hash) = password_hash {
            self.password_hash = password_hash;
        }
        self
    }

    /// Return a copy carrying a new modification timestamp.
    pub fn touched(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = at;
        self
    }
}

/// Partial update applied to an existing account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountChanges {
    /// Replacement display name.
    pub name: Option<String>,
    /// Replacement login handle.
    pub login: Option<String>,
    /// Replacement email address.
    pub email: Option<String>,
    /// Replacement credential.
    pub password_hash: Option<PasswordHash>,
}
