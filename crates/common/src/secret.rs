//! Secret types for protecting sensitive values from accidental logging.
//!
//! Re-exports types from the [`secrecy`] crate. Use these for every
//! sensitive value the gateway handles: legacy signing secrets, database
//! credentials, bearer tokens.
//!
//! `SecretString` implements `Debug` with redaction, so any struct that
//! derives `Debug` and holds a secret gets safe logging behavior for free.
//! Access to the actual value requires an explicit `expose_secret()` call,
//! and the memory is zeroized on drop.
//!
//! # Example
//!
//! ```rust
//! use common::secret::SecretString;
//! use secrecy::ExposeSecret;
//!
//! #[derive(Debug)]
//! struct IssuerCredentials {
//!     issuer: String,
//!     legacy_secret: SecretString,
//! }
//!
//! let creds = IssuerCredentials {
//!     issuer: "https://accounts.example.com/auth/v1".to_string(),
//!     legacy_secret: SecretString::from("hunter2"),
//! };
//!
//! // Safe: the secret is redacted in Debug output
//! let debug = format!("{:?}", creds);
//! assert!(!debug.contains("hunter2"));
//!
//! // Explicit access only
//! let secret: &str = creds.legacy_secret.expose_secret();
//! ```

// Re-export the main types from secrecy
pub use secrecy::{ExposeSecret, SecretBox, SecretString};
