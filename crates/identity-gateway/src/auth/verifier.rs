//! Token verification strategies and the top-level authenticator.
//!
//! The authenticator inspects the (untrusted) envelope, routes to the
//! provider configuration whose issuer the token names, selects a
//! verification strategy from the declared algorithm, verifies the
//! signature, and runs the shared claims validator. Trust is established
//! only by the last two steps; everything before them is routing.
//!
//! # Security
//!
//! - Only the algorithm family declared in the header is ever attempted -
//!   a token claiming one family is never verified against a key or secret
//!   intended for another
//! - Signature verification is signature-only; all policy checks live in
//!   the claims validator so both strategies share one taxonomy

use crate::auth::claims::{validate_claims, ClaimsCheck, RawClaims, VerifiedClaims};
use crate::auth::jwks::{Jwk, JwksCache};
use crate::auth::{AuthError, TokenAlgorithm};
use crate::config::{Config, IssuerSettings};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use common::jwt::inspect_envelope;
use common::secret::{ExposeSecret, SecretString};
use jsonwebtoken::{decode, DecodingKey, Validation};
use std::collections::HashSet;
use std::time::Duration;
use tracing::instrument;

/// Verification strategy for one token, selected by declared algorithm.
enum Strategy<'p> {
    /// Static symmetric secret (legacy issuer tokens).
    SharedSecret(&'p SecretString),

    /// Rotating asymmetric keys resolved through the issuer's key cache.
    Asymmetric(&'p JwksCache),
}

/// Verifier for one configured identity provider.
///
/// Holds the provider's expected issuer/audience and whichever key sources
/// it supports: a JWKS cache, a legacy shared secret, or both for a
/// provider mid-migration.
pub struct ProviderVerifier {
    /// Short provider name; becomes the principal's id-space key.
    name: String,

    /// Expected `iss` claim value.
    issuer: String,

    /// Expected `aud` claim value.
    audience: String,

    /// Static secret for HS256 tokens, when the provider still issues them.
    shared_secret: Option<SecretString>,

    /// Key cache for asymmetric tokens, when the provider publishes JWKS.
    jwks: Option<JwksCache>,
}

impl ProviderVerifier {
    pub fn new(
        name: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
        shared_secret: Option<SecretString>,
        jwks: Option<JwksCache>,
    ) -> Self {
        Self {
            name: name.into(),
            issuer: issuer.into(),
            audience: audience.into(),
            shared_secret,
            jwks,
        }
    }

    fn from_settings(settings: &IssuerSettings, cache_ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            name: settings.name.clone(),
            issuer: settings.issuer.clone(),
            audience: settings.audience.clone(),
            shared_secret: settings.legacy_secret.clone(),
            jwks: settings
                .jwks_url
                .clone()
                .map(|url| JwksCache::with_ttl(url, cache_ttl, fetch_timeout)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Pick the strategy for a declared algorithm.
    ///
    /// Fails with `UnsupportedAlgorithm` when this provider has no key
    /// source for the family - there is no fallback to another algorithm.
    fn strategy_for(&self, algorithm: TokenAlgorithm) -> Result<Strategy<'_>, AuthError> {
        let strategy = if algorithm.is_symmetric() {
            self.shared_secret.as_ref().map(Strategy::SharedSecret)
        } else {
            self.jwks.as_ref().map(Strategy::Asymmetric)
        };

        strategy.ok_or_else(|| {
            tracing::debug!(
                target: "idg.auth.verifier",
                provider = %self.name,
                algorithm = algorithm.as_str(),
                "Algorithm not configured for provider"
            );
            AuthError::UnsupportedAlgorithm(algorithm.as_str().to_string())
        })
    }

    /// Verify the token's signature and return the raw payload.
    async fn verify_signature(
        &self,
        token: &str,
        algorithm: TokenAlgorithm,
        key_id: Option<&str>,
    ) -> Result<RawClaims, AuthError> {
        match self.strategy_for(algorithm)? {
            Strategy::SharedSecret(secret) => {
                let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
                decode_signature_only(token, &key, algorithm)
            }
            Strategy::Asymmetric(jwks) => {
                // Asymmetric issuers always set kid; a token without one
                // cannot be routed to a key and is malformed for this path.
                let kid = key_id.ok_or(AuthError::MalformedToken)?;
                let jwk = jwks.resolve(kid).await?;
                let key = decoding_key_for(&jwk, algorithm)?;
                decode_signature_only(token, &key, algorithm)
            }
        }
    }
}

/// Build a decoding key from a JWK, pinned to the declared algorithm family.
fn decoding_key_for(jwk: &Jwk, algorithm: TokenAlgorithm) -> Result<DecodingKey, AuthError> {
    // A key published for a different algorithm can never validate this
    // signature; reject before any cryptography.
    if let Some(alg) = &jwk.alg {
        if alg != algorithm.as_str() {
            tracing::warn!(
                target: "idg.auth.verifier",
                kid = %jwk.kid,
                jwk_alg = %alg,
                declared = algorithm.as_str(),
                "JWK algorithm does not match declared token algorithm"
            );
            return Err(AuthError::SignatureInvalid);
        }
    }

    match algorithm {
        TokenAlgorithm::Rs256 => {
            if jwk.kty != "RSA" {
                tracing::warn!(target: "idg.auth.verifier", kid = %jwk.kid, kty = %jwk.kty, "Unexpected JWK key type for RS256");
                return Err(AuthError::SignatureInvalid);
            }
            let (n, e) = match (&jwk.n, &jwk.e) {
                (Some(n), Some(e)) => (n, e),
                _ => {
                    tracing::error!(target: "idg.auth.verifier", kid = %jwk.kid, "RSA JWK missing n/e components");
                    return Err(AuthError::SignatureInvalid);
                }
            };
            DecodingKey::from_rsa_components(n, e).map_err(|e| {
                tracing::error!(target: "idg.auth.verifier", kid = %jwk.kid, error = %e, "Invalid RSA key components");
                AuthError::SignatureInvalid
            })
        }
        TokenAlgorithm::EdDsa => {
            if jwk.kty != "OKP" {
                tracing::warn!(target: "idg.auth.verifier", kid = %jwk.kid, kty = %jwk.kty, "Unexpected JWK key type for EdDSA");
                return Err(AuthError::SignatureInvalid);
            }
            let x = jwk.x.as_ref().ok_or_else(|| {
                tracing::error!(target: "idg.auth.verifier", kid = %jwk.kid, "OKP JWK missing x field");
                AuthError::SignatureInvalid
            })?;
            let public_key_bytes = URL_SAFE_NO_PAD.decode(x).map_err(|e| {
                tracing::error!(target: "idg.auth.verifier", kid = %jwk.kid, error = %e, "Invalid public key encoding");
                AuthError::SignatureInvalid
            })?;
            Ok(DecodingKey::from_ed_der(&public_key_bytes))
        }
        // Symmetric keys never come from a JWKS.
        TokenAlgorithm::Hs256 => Err(AuthError::SignatureInvalid),
    }
}

/// Verify the signature and deserialize the payload, with every claim
/// check disabled. Policy belongs to the claims validator.
fn decode_signature_only(
    token: &str,
    key: &DecodingKey,
    algorithm: TokenAlgorithm,
) -> Result<RawClaims, AuthError> {
    let mut validation = Validation::new(algorithm.to_jsonwebtoken());
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = false;
    validation.validate_aud = false;

    let data = decode::<RawClaims>(token, key, &validation).map_err(|e| {
        tracing::debug!(target: "idg.auth.verifier", error = %e, "Token verification failed");
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidToken
            | jsonwebtoken::errors::ErrorKind::Base64(_)
            | jsonwebtoken::errors::ErrorKind::Json(_)
            | jsonwebtoken::errors::ErrorKind::Utf8(_) => AuthError::MalformedToken,
            jsonwebtoken::errors::ErrorKind::InvalidAlgorithm
            | jsonwebtoken::errors::ErrorKind::InvalidAlgorithmName => {
                AuthError::UnsupportedAlgorithm(algorithm.as_str().to_string())
            }
            _ => AuthError::SignatureInvalid,
        }
    })?;

    Ok(data.claims)
}

/// Top-level token authenticator.
///
/// Explicitly constructed at process start with one verifier per
/// configured provider and injected into the auth middleware; there is no
/// ambient global state.
pub struct TokenAuthenticator {
    providers: Vec<ProviderVerifier>,

    /// Clock skew tolerance applied to expiry / not-before checks.
    leeway: Duration,
}

impl TokenAuthenticator {
    pub fn new(providers: Vec<ProviderVerifier>, leeway: Duration) -> Self {
        Self { providers, leeway }
    }

    /// Build the authenticator from service configuration, constructing a
    /// key cache for every issuer that publishes JWKS.
    pub fn from_config(config: &Config) -> Self {
        let providers = [&config.portal, &config.accounts]
            .into_iter()
            .map(|settings| {
                ProviderVerifier::from_settings(
                    settings,
                    config.jwks_cache_ttl,
                    config.jwks_fetch_timeout,
                )
            })
            .collect();

        Self::new(providers, config.jwt_clock_skew)
    }

    /// Authenticate a bearer token end to end.
    ///
    /// Envelope inspection, provider routing, signature verification, and
    /// claims validation; the result is safe to hand to the identity
    /// reconciler.
    ///
    /// # Errors
    ///
    /// Any [`AuthError`]; the state machine is terminal on first failure,
    /// with the single refresh-and-retry inside the key cache as the only
    /// internal retry.
    #[instrument(skip_all)]
    pub async fn authenticate(&self, token: &str) -> Result<VerifiedClaims, AuthError> {
        let envelope = inspect_envelope(token).map_err(|e| {
            tracing::debug!(target: "idg.auth.verifier", error = ?e, "Envelope inspection failed");
            AuthError::MalformedToken
        })?;

        let algorithm = TokenAlgorithm::parse(&envelope.algorithm).ok_or_else(|| {
            tracing::debug!(
                target: "idg.auth.verifier",
                algorithm = %envelope.algorithm,
                "Declared algorithm is not supported"
            );
            AuthError::UnsupportedAlgorithm(envelope.algorithm.clone())
        })?;

        // Route on the unverified issuer hint. The hint only selects which
        // expectations apply; the claims validator re-checks `iss` after
        // the signature is established.
        let provider = self
            .providers
            .iter()
            .find(|p| envelope.issuer_hint.as_deref() == Some(p.issuer()))
            .ok_or(AuthError::ClaimsInvalid(ClaimsCheck::WrongIssuer))?;

        let raw = provider
            .verify_signature(token, algorithm, envelope.key_id.as_deref())
            .await?;

        validate_claims(
            raw,
            &provider.name,
            &provider.issuer,
            &provider.audience,
            algorithm,
            self.leeway,
        )
    }
}
