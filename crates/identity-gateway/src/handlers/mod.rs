//! HTTP request handlers for the Identity Gateway.

pub mod health;
pub mod me;

pub use health::health_check;
pub use me::get_me;
