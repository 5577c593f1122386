//! Batch user-account management.
//!
//! The domain validates whole batches of account records and writes them in
//! a single transaction; outbound adapters provide PostgreSQL, in-memory,
//! hashing, and notification implementations of the domain ports.

pub mod config;
pub mod domain;
pub mod outbound;
