//! Domain ports and supporting types for the hexagonal boundary.

mod macros;
pub(crate) use macros::define_port_error;

mod account_notifier;
mod account_store;
mod password_hasher;

#[cfg(test)]
pub use account_notifier::MockAccountNotifier;
pub use account_notifier::{
    AccountCreatedNotification, AccountNotifier, NoOpAccountNotifier, NotificationError,
};
pub use account_store::{AccountStore, AccountStoreError, AccountTransaction};
#[cfg(test)]
pub use password_hasher::MockPasswordHasher;
pub use password_hasher::{PasswordHashError, PasswordHasher};
