//! Bearer-token envelope utilities shared across Lectern services.
//!
//! This module provides the untrusted "outside" of a JWT:
//! - Size limits for DoS prevention
//! - Clock skew constants for expiry validation
//! - Envelope inspection (algorithm, key id, issuer hint) without any
//!   signature verification
//!
//! # Security
//!
//! - Tokens are size-checked BEFORE parsing (DoS prevention)
//! - Nothing returned by [`inspect_envelope`] is trusted: it exists only to
//!   route the token to the correct verifier, which then establishes trust
//!   cryptographically
//! - Generic error messages prevent information leakage

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Maximum allowed JWT size in bytes (8KB).
///
/// Typical tokens are a few hundred bytes. Oversized tokens are rejected
/// BEFORE any base64 decoding or cryptographic work so an attacker cannot
/// burn CPU or memory with a multi-megabyte credential.
pub const MAX_JWT_SIZE_BYTES: usize = 8192; // 8KB

/// Default clock skew tolerance for expiry / not-before checks (5 minutes).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(300);

/// Maximum allowed clock skew tolerance (10 minutes).
///
/// Prevents misconfiguration that would silently extend token lifetimes.
pub const MAX_CLOCK_SKEW: Duration = Duration::from_secs(600);

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while inspecting a token envelope.
///
/// Note: Display messages are intentionally generic to prevent information
/// leakage. Specific causes are logged at debug level.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// Token size exceeds maximum allowed.
    #[error("The access token is invalid or expired")]
    TokenTooLarge,

    /// Token is not structured as header.payload.signature, or the header
    /// cannot be decoded.
    #[error("The access token is invalid or expired")]
    MalformedEnvelope,

    /// Token header carries no `alg` field.
    #[error("The access token is invalid or expired")]
    MissingAlgorithm,
}

// =============================================================================
// Envelope Types
// =============================================================================

/// The unverified outside of a bearer token.
///
/// Everything here is attacker-controlled until a verifier has checked the
/// signature. The envelope is used purely to decide which verifier and which
/// issuer configuration to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEnvelope {
    /// Declared signing algorithm from the header (`alg`).
    pub algorithm: String,

    /// Declared key identifier from the header (`kid`), if present.
    pub key_id: Option<String>,

    /// Issuer string read from the (still unverified) payload, if the
    /// payload decodes. Used to select the provider configuration whose
    /// expected issuer it matches; the claims validator re-checks the value
    /// after signature verification.
    pub issuer_hint: Option<String>,
}

#[derive(Deserialize)]
struct RawHeader {
    alg: Option<String>,
    #[serde(default)]
    kid: Option<String>,
}

#[derive(Deserialize)]
struct RawIssuer {
    #[serde(default)]
    iss: Option<String>,
}

// =============================================================================
// Functions
// =============================================================================

/// Inspect a token's envelope without verifying anything.
///
/// Decodes the JWT header to expose the declared algorithm and key id, and
/// peeks at the payload for an issuer hint. Side-effect-free.
///
/// # Security
///
/// - Token size is checked BEFORE any parsing
/// - The result must never be used to authorize anything; it only routes
///   the token to a verifier
///
/// # Errors
///
/// - `TokenTooLarge` - token exceeds [`MAX_JWT_SIZE_BYTES`]
/// - `MalformedEnvelope` - wrong structure, bad base64, or invalid JSON header
/// - `MissingAlgorithm` - header decodes but has no usable `alg` field
pub fn inspect_envelope(token: &str) -> Result<TokenEnvelope, EnvelopeError> {
    if token.len() > MAX_JWT_SIZE_BYTES {
        tracing::debug!(
            target: "common.jwt",
            token_size = token.len(),
            max_size = MAX_JWT_SIZE_BYTES,
            "Token rejected: size exceeds maximum allowed"
        );
        return Err(EnvelopeError::TokenTooLarge);
    }

    // JWT format: header.payload.signature
    let mut parts = token.split('.');
    let (header_part, payload_part) = match (parts.next(), parts.next(), parts.next(), parts.next())
    {
        (Some(header), Some(payload), Some(_signature), None) => (header, payload),
        _ => {
            tracing::debug!(target: "common.jwt", "Token rejected: invalid JWT format");
            return Err(EnvelopeError::MalformedEnvelope);
        }
    };

    let header_bytes = URL_SAFE_NO_PAD.decode(header_part).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to decode JWT header base64");
        EnvelopeError::MalformedEnvelope
    })?;

    let header: RawHeader = serde_json::from_slice(&header_bytes).map_err(|e| {
        tracing::debug!(target: "common.jwt", error = %e, "Failed to parse JWT header JSON");
        EnvelopeError::MalformedEnvelope
    })?;

    let algorithm = header
        .alg
        .filter(|a| !a.is_empty())
        .ok_or(EnvelopeError::MissingAlgorithm)?;

    // Empty kid is treated as absent.
    let key_id = header.kid.filter(|k| !k.is_empty());

    // Best-effort issuer peek. A payload that does not decode here will fail
    // properly during signature verification, so this is not an error.
    let issuer_hint = URL_SAFE_NO_PAD
        .decode(payload_part)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<RawIssuer>(&bytes).ok())
        .and_then(|p| p.iss)
        .filter(|i| !i.is_empty());

    Ok(TokenEnvelope {
        algorithm,
        key_id,
        issuer_hint,
    })
}

// =============================================================================
// Tests
// =============================================================================
