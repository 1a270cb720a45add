//! Session Aggregate

pub mod entity;
pub mod manager;
pub mod postgres;
pub mod repository;
pub mod sqlite;

pub use entity::{Session, SessionState};
pub use manager::SessionManager;
pub use postgres::PostgresSessionRepository;
pub use repository::SessionRepository;
pub use sqlite::SqliteSessionRepository;
