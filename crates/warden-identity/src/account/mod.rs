//! Account workflows that change identity attributes

pub mod service;

pub use service::{AccountService, Registration};
