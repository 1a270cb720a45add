//! Principal Aggregate
//!
//! Identity records and the credential store that owns them.

pub mod entity;
pub mod postgres;
pub mod repository;
pub mod sqlite;

pub use entity::{Identifier, Principal};
pub use postgres::PostgresCredentialStore;
pub use repository::CredentialStore;
pub use sqlite::SqliteCredentialStore;
