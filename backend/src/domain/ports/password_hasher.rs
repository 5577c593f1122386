//! Port for the one-way password hashing primitive.

use crate::domain::{Password, PasswordHash};

use super::define_port_error;

define_port_error! {
    /// Errors raised by password hashing adapters.
    pub enum PasswordHashError {
        /// The primitive could not produce a credential.
        Hashing { message: String } => "password hashing failed: {message}",
    }
}

/// Turn plaintext passwords into stored credentials.
///
/// Implementations must be one-way; nothing in the batch pipeline reverses
/// or compares credentials.
#[cfg_attr(test, mockall::automock)]
pub trait PasswordHasher: Send + Sync {
    /// Hash a plaintext password.
    fn hash(&self, password: &Password) -> Result<PasswordHash, PasswordHashError>;
}
