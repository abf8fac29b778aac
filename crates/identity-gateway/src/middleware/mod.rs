//! HTTP middleware.

pub mod auth;

pub use auth::{authenticate, AuthContext, CurrentUser};
