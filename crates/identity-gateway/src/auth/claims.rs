//! Claim types and the shared claims validator.
//!
//! Both verification paths (shared-secret and asymmetric) hand their
//! cryptographically verified payload to [`validate_claims`] so that policy
//! checks live in exactly one place. The `subject` and `email` fields are
//! redacted in Debug output to keep identifiers out of logs.

use crate::auth::{AuthError, TokenAlgorithm};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// The `aud` claim, which RFC 7519 allows as a string or array of strings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    /// Whether the expected audience value is asserted by this claim.
    pub fn contains(&self, expected: &str) -> bool {
        match self {
            Audience::One(aud) => aud == expected,
            Audience::Many(auds) => auds.iter().any(|a| a == expected),
        }
    }
}

/// Payload fields as deserialized straight out of a verified token.
///
/// Every field is optional here; presence requirements are enforced by the
/// validator, not by deserialization, so a missing claim produces a precise
/// `ClaimsInvalid` kind instead of an opaque decode error.
#[derive(Clone, Deserialize)]
pub struct RawClaims {
    #[serde(default)]
    pub iss: Option<String>,

    #[serde(default)]
    pub sub: Option<String>,

    #[serde(default)]
    pub aud: Option<Audience>,

    /// Expiration timestamp (Unix epoch seconds).
    #[serde(default)]
    pub exp: Option<i64>,

    /// Not-before timestamp (Unix epoch seconds).
    #[serde(default)]
    pub nbf: Option<i64>,

    #[serde(default)]
    pub email: Option<String>,
}

/// The first policy check that failed on a verified payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimsCheck {
    WrongIssuer,
    WrongAudience,
    MissingExpiry,
    Expired,
    NotYetValid,
    MissingSubject,
}

impl fmt::Display for ClaimsCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClaimsCheck::WrongIssuer => "wrong issuer",
            ClaimsCheck::WrongAudience => "wrong audience",
            ClaimsCheck::MissingExpiry => "missing expiry",
            ClaimsCheck::Expired => "expired",
            ClaimsCheck::NotYetValid => "not yet valid",
            ClaimsCheck::MissingSubject => "missing subject",
        };
        f.write_str(name)
    }
}

/// Claims that survived signature verification and policy validation.
///
/// Ephemeral: produced per request, consumed once by the identity
/// reconciler, never persisted.
#[derive(Clone)]
pub struct VerifiedClaims {
    /// Name of the provider configuration that authenticated the token.
    pub provider: String,

    /// Issuer-scoped subject identifier - redacted in Debug output.
    pub subject: String,

    /// Email claim, when the token carries one - redacted in Debug output.
    pub email: Option<String>,

    /// Verified issuer string.
    pub issuer: String,

    /// Audience value the token was accepted for.
    pub audience: String,

    /// Algorithm the signature was verified under.
    pub algorithm: TokenAlgorithm,

    /// Expiration timestamp (Unix epoch seconds).
    pub expires_at: i64,
}

impl fmt::Debug for VerifiedClaims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedClaims")
            .field("provider", &self.provider)
            .field("subject", &"[REDACTED]")
            .field("email", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("algorithm", &self.algorithm)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Validate a verified payload against the provider's expectations.
///
/// Checks run in a fixed order and the first failure names its check:
/// issuer, audience, expiry (and not-before when present), subject
/// presence. Algorithm-independent; shared by both verifiers.
///
/// # Errors
///
/// Returns `AuthError::ClaimsInvalid` naming the first failing check.
pub fn validate_claims(
    raw: RawClaims,
    provider: &str,
    expected_issuer: &str,
    expected_audience: &str,
    algorithm: TokenAlgorithm,
    leeway: Duration,
) -> Result<VerifiedClaims, AuthError> {
    let now = chrono::Utc::now().timestamp();
    validate_claims_at(
        raw,
        provider,
        expected_issuer,
        expected_audience,
        algorithm,
        leeway,
        now,
    )
}

/// Deterministic claims validation against an explicit `now` timestamp.
///
/// Prefer [`validate_claims`] in production code. This variant exists so
/// boundary conditions can be unit-tested without wall-clock dependence.
#[allow(clippy::too_many_arguments)]
pub(crate) fn validate_claims_at(
    raw: RawClaims,
    provider: &str,
    expected_issuer: &str,
    expected_audience: &str,
    algorithm: TokenAlgorithm,
    leeway: Duration,
    now: i64,
) -> Result<VerifiedClaims, AuthError> {
    // Safe cast: leeway is bounded to MAX_CLOCK_SKEW (600 seconds)
    #[allow(clippy::cast_possible_wrap)]
    let leeway_secs = leeway.as_secs() as i64;

    let issuer = match raw.iss {
        Some(iss) if iss == expected_issuer => iss,
        _ => return Err(AuthError::ClaimsInvalid(ClaimsCheck::WrongIssuer)),
    };

    match &raw.aud {
        Some(aud) if aud.contains(expected_audience) => {}
        _ => return Err(AuthError::ClaimsInvalid(ClaimsCheck::WrongAudience)),
    }

    let expires_at = raw
        .exp
        .ok_or(AuthError::ClaimsInvalid(ClaimsCheck::MissingExpiry))?;
    if now >= expires_at + leeway_secs {
        return Err(AuthError::ClaimsInvalid(ClaimsCheck::Expired));
    }

    if let Some(nbf) = raw.nbf {
        if now < nbf - leeway_secs {
            return Err(AuthError::ClaimsInvalid(ClaimsCheck::NotYetValid));
        }
    }

    let subject = match raw.sub {
        Some(sub) if !sub.is_empty() => sub,
        _ => return Err(AuthError::ClaimsInvalid(ClaimsCheck::MissingSubject)),
    };

    Ok(VerifiedClaims {
        provider: provider.to_string(),
        subject,
        email: raw.email.filter(|e| !e.is_empty()),
        issuer,
        audience: expected_audience.to_string(),
        algorithm,
        expires_at,
    })
}
