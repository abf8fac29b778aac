//! Token verification for the Identity Gateway.
//!
//! Authenticates bearer tokens from the configured identity providers:
//! a routing decision on the declared algorithm selects either the
//! shared-secret path (legacy issuer) or the asymmetric path backed by a
//! cached JWKS, and both paths feed the same claims validator.

pub mod claims;
pub mod jwks;
pub mod verifier;

pub use claims::{ClaimsCheck, VerifiedClaims};
pub use jwks::JwksCache;
pub use verifier::{ProviderVerifier, TokenAuthenticator};

use thiserror::Error;

/// Rejection taxonomy for a single verification attempt.
///
/// Every variant surfaces to clients as a single generic "authentication
/// failed" outcome (see `IgError`); the specific kind exists for logging
/// and for the one distinction callers care about: `KeySourceUnavailable`
/// is transient and retryable, everything else is a bad credential.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token envelope cannot be decoded or lacks an algorithm.
    #[error("malformed token")]
    MalformedToken,

    /// The declared algorithm is not configured for the token's issuer.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Cryptographic signature mismatch, including key-material that does
    /// not fit the declared algorithm family.
    #[error("signature verification failed")]
    SignatureInvalid,

    /// The declared key id is absent from the issuer's key set even after
    /// a refresh.
    #[error("unknown signing key: {0}")]
    UnknownSigningKey(String),

    /// The issuer's key endpoint could not be fetched or parsed.
    #[error("key source unavailable: {0}")]
    KeySourceUnavailable(String),

    /// A policy check on a cryptographically verified payload failed.
    #[error("claims invalid: {0}")]
    ClaimsInvalid(ClaimsCheck),

    /// Reconciliation race that persisted past the internal retry.
    #[error("identity reconciliation conflict")]
    IdentityConflict,
}

impl AuthError {
    /// Short stable name for structured logging.
    pub fn kind(&self) -> &'static str {
        match self {
            AuthError::MalformedToken => "malformed_token",
            AuthError::UnsupportedAlgorithm(_) => "unsupported_algorithm",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::UnknownSigningKey(_) => "unknown_signing_key",
            AuthError::KeySourceUnavailable(_) => "key_source_unavailable",
            AuthError::ClaimsInvalid(_) => "claims_invalid",
            AuthError::IdentityConflict => "identity_conflict",
        }
    }
}

/// Signing algorithms the gateway understands.
///
/// Anything else in a token header is rejected with
/// [`AuthError::UnsupportedAlgorithm`] before any cryptography runs, and a
/// token is only ever verified under the family it declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenAlgorithm {
    /// HMAC-SHA256 with a static shared secret (legacy issuer tokens).
    Hs256,
    /// RSA-SHA256 against an RSA JWK.
    Rs256,
    /// Ed25519 against an OKP JWK.
    EdDsa,
}

impl TokenAlgorithm {
    /// Parse the `alg` header value. Returns `None` for anything the
    /// gateway does not support (including `none`).
    pub fn parse(alg: &str) -> Option<Self> {
        match alg {
            "HS256" => Some(TokenAlgorithm::Hs256),
            "RS256" => Some(TokenAlgorithm::Rs256),
            "EdDSA" => Some(TokenAlgorithm::EdDsa),
            _ => None,
        }
    }

    /// Canonical header spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            TokenAlgorithm::Hs256 => "HS256",
            TokenAlgorithm::Rs256 => "RS256",
            TokenAlgorithm::EdDsa => "EdDSA",
        }
    }

    /// Whether the algorithm uses a shared secret rather than a key pair.
    pub fn is_symmetric(self) -> bool {
        matches!(self, TokenAlgorithm::Hs256)
    }

    pub(crate) fn to_jsonwebtoken(self) -> jsonwebtoken::Algorithm {
        match self {
            TokenAlgorithm::Hs256 => jsonwebtoken::Algorithm::HS256,
            TokenAlgorithm::Rs256 => jsonwebtoken::Algorithm::RS256,
            TokenAlgorithm::EdDsa => jsonwebtoken::Algorithm::EdDSA,
        }
    }
}
