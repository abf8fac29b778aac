//! Identity Gateway Service Library
//!
//! This library provides the core functionality for the Lectern
//! Identity Gateway - the HTTP service responsible for:
//!
//! - Bearer token verification for the configured identity providers
//!   (asymmetric via cached JWKS, legacy shared-secret)
//! - Claims policy validation shared by both verification paths
//! - Reconciling verified subjects to local principal rows
//!
//! # Architecture
//!
//! The gateway follows the Middleware -> Service -> Repository pattern:
//!
//! ```text
//! routes/mod.rs -> middleware/auth.rs -> auth/*.rs -> services/*.rs -> repositories/*.rs
//! ```
//!
//! # Modules
//!
//! - `auth` - Token verification: key cache, verifiers, claims policy
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - Bearer extraction and request authentication
//! - `models` - Data models
//! - `repositories` - Principal persistence
//! - `routes` - Axum router setup
//! - `services` - Identity reconciliation

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
