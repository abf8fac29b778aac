//! Common utilities and types shared across Lectern components.

#![warn(clippy::pedantic)]

/// Module for bearer-token envelope utilities (inspection, constants)
pub mod jwt;

/// Module for secret types that prevent accidental logging
pub mod secret;
