//! Signed tokens and role augmentation

pub mod role_lookup;
pub mod token_service;

pub use role_lookup::{HttpRoleLookup, NoRoleLookup, RoleLookup};
pub use token_service::{Claims, SignedToken, TokenConfig, TokenKeyMaterial, TokenService};
