//! Domain primitives, rules, and batch services.
//!
//! Purpose: model user accounts and the pipeline that validates and persists
//! batches of them. Types here are transport and storage agnostic; adapters
//! reach infrastructure through the traits in [`ports`].
//!
//! Public surface:
//! - Error (alias to `error::Error`): transport-agnostic error payload.
//! - UserAccount, AccountId, Password, PasswordHash: the account model.
//! - RuleSet and `build_rules`: per-field constraints derived from a batch.
//! - BatchValidator and ValidationFailure: whole-batch validation.
//! - TransactionalWriter and WriteFailure: all-or-nothing persistence.
//! - AccountBatchService: the `store_users` / `update_users` entry points.

pub mod account;
pub mod account_batch_service;
pub mod batch;
pub mod error;
pub mod ports;
pub mod rules;
pub mod validation;
pub mod writer;

pub use self::account::{
    AccountChanges, AccountColumn, AccountId, AccountIdError, NewAccount, Password, PasswordHash,
    UserAccount,
};
pub use self::account_batch_service::{AccountBatchError, AccountBatchService};
pub use self::batch::{
    AccountDraft, AccountField, AccountPatch, BatchMode, RawBatch, ValidatedBatch,
};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::rules::{FieldPath, Pattern, RecordSelector, Rule, RuleSet, build_rules};
pub use self::validation::{
    BatchValidationError, BatchValidator, ValidationFailure, Violation, ViolationKey,
};
pub use self::writer::{TransactionalWriter, WriteFailure};
