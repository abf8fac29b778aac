//! Per-issuer cache of public signing keys fetched over JWKS.
//!
//! Each asymmetric issuer gets one [`JwksCache`], created at process start
//! and injected into its verifier. The cache serves fresh entries without
//! I/O, refreshes on demand when an entry is expired or a key id is not
//! found (key rotation responsiveness independent of TTL), and collapses
//! concurrent refreshes for the same issuer into a single outbound fetch so
//! a cold cache under load cannot stampede the identity provider.
//!
//! # Security
//!
//! - Entries past their TTL are never served
//! - A failed fetch leaves the previous (possibly stale) entry untouched:
//!   a transient provider outage must not invalidate a key set that was
//!   previously good, and it must not extend trust for lookups that needed
//!   a refresh either - those fail with `KeySourceUnavailable`

use crate::auth::AuthError;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default cache TTL in seconds (1 hour). Signing keys rotate rarely;
/// refresh-on-unknown-key covers rotation inside the window.
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 3600;

/// Default timeout for a single JWKS fetch. A stalled identity provider
/// must not stall the authenticating request indefinitely.
pub const DEFAULT_FETCH_TIMEOUT_SECONDS: u64 = 5;

/// JSON Web Key from a JWKS endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("RSA" for RS256 keys, "OKP" for Ed25519).
    pub kty: String,

    /// Key ID - used to select the correct key for verification.
    pub kid: String,

    /// Curve name (OKP keys).
    #[serde(default)]
    pub crv: Option<String>,

    /// Public key value, base64url encoded (OKP keys).
    #[serde(default)]
    pub x: Option<String>,

    /// RSA modulus, base64url encoded (RSA keys).
    #[serde(default)]
    pub n: Option<String>,

    /// RSA public exponent, base64url encoded (RSA keys).
    #[serde(default)]
    pub e: Option<String>,

    /// Algorithm the key is meant for.
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use (should be "sig" for signing).
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// JWKS document shape.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    /// List of JSON Web Keys.
    pub keys: Vec<Jwk>,
}

/// One cached key set. Replaced wholesale on refresh, never mutated.
struct CachedKeySet {
    /// Map of key ID to JWK.
    keys: HashMap<String, Jwk>,

    /// When this entry stops being served.
    expires_at: Instant,

    /// Monotonic fetch counter. A caller that queued behind the fetch lock
    /// compares this against the generation it observed before waiting: if
    /// it moved, the refresh it wanted already happened on its behalf.
    generation: u64,
}

/// Process-wide cache of one issuer's public signing keys.
///
/// Thread-safe: concurrent reads through an async `RwLock`, one collapsed
/// writer per refresh through the fetch lock.
pub struct JwksCache {
    /// URL to the issuer's JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,

    /// Cached key set.
    cache: RwLock<Option<CachedKeySet>>,

    /// Serializes refreshes; waiting here is how concurrent refreshes for
    /// the same issuer share a single in-flight fetch.
    fetch_lock: Mutex<()>,

    /// Cache TTL duration.
    cache_ttl: Duration,

    /// Applied per request, so every fetch is bounded even if the client
    /// itself was built without one.
    fetch_timeout: Duration,
}

impl JwksCache {
    /// Create a cache with default TTL and fetch timeout.
    pub fn new(jwks_url: String) -> Self {
        Self::with_ttl(
            jwks_url,
            Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECONDS),
        )
    }

    /// Create a cache with custom TTL and fetch timeout.
    pub fn with_ttl(jwks_url: String, cache_ttl: Duration, fetch_timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "idg.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            cache: RwLock::new(None),
            fetch_lock: Mutex::new(()),
            cache_ttl,
            fetch_timeout,
        }
    }

    /// Resolve a key id to its public key material.
    ///
    /// Fast path: a fresh cached entry containing `kid` is returned with no
    /// I/O. Otherwise exactly one refresh attempt is made (shared with any
    /// concurrent caller that needs one), and the refreshed entry decides
    /// the outcome.
    ///
    /// # Errors
    ///
    /// - `UnknownSigningKey` - `kid` is absent even from a freshly fetched
    ///   set (token-supplied identifier mismatch, not retried further)
    /// - `KeySourceUnavailable` - the fetch failed or timed out; any
    ///   existing entry is left untouched
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn resolve(&self, kid: &str) -> Result<Jwk, AuthError> {
        // Fast path plus the generation we would be refreshing from.
        let seen_generation = {
            let cache = self.cache.read().await;
            match cache.as_ref() {
                Some(cached) => {
                    if cached.expires_at > Instant::now() {
                        if let Some(key) = cached.keys.get(kid) {
                            tracing::debug!(target: "idg.auth.jwks", kid = %kid, "JWKS cache hit");
                            return Ok(key.clone());
                        }
                        tracing::debug!(
                            target: "idg.auth.jwks",
                            kid = %kid,
                            "Key not in fresh JWKS entry, refreshing for rotation"
                        );
                    }
                    cached.generation
                }
                None => 0,
            }
        };

        let _guard = self.fetch_lock.lock().await;

        // A caller holding the lock before us may have refreshed already;
        // that fetch counts as ours.
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.generation > seen_generation && cached.expires_at > Instant::now() {
                    return match cached.keys.get(kid) {
                        Some(key) => Ok(key.clone()),
                        None => {
                            tracing::warn!(target: "idg.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
                            Err(AuthError::UnknownSigningKey(kid.to_string()))
                        }
                    };
                }
            }
        }

        self.refresh_cache().await?;

        let cache = self.cache.read().await;
        match cache.as_ref().and_then(|cached| cached.keys.get(kid)) {
            Some(key) => Ok(key.clone()),
            None => {
                tracing::warn!(target: "idg.auth.jwks", kid = %kid, "Key not found in JWKS after refresh");
                Err(AuthError::UnknownSigningKey(kid.to_string()))
            }
        }
    }

    /// Refresh the cache by fetching from the issuer's JWKS endpoint.
    ///
    /// On success the cached entry is replaced atomically with a new
    /// `expires_at` and bumped generation. On failure the cache is not
    /// touched.
    #[instrument(skip(self))]
    async fn refresh_cache(&self) -> Result<(), AuthError> {
        tracing::debug!(target: "idg.auth.jwks", url = %self.jwks_url, "Fetching JWKS");

        let response = self
            .http_client
            .get(&self.jwks_url)
            .timeout(self.fetch_timeout)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "idg.auth.jwks", error = %e, "Failed to fetch JWKS");
                AuthError::KeySourceUnavailable(e.to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "idg.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(AuthError::KeySourceUnavailable(format!(
                "JWKS endpoint returned {}",
                response.status()
            )));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "idg.auth.jwks", error = %e, "Failed to parse JWKS response");
            AuthError::KeySourceUnavailable(e.to_string())
        })?;

        // Build key map
        let keys: HashMap<String, Jwk> = jwks
            .keys
            .into_iter()
            .map(|key| (key.kid.clone(), key))
            .collect();

        tracing::info!(
            target: "idg.auth.jwks",
            key_count = keys.len(),
            "JWKS cache refreshed"
        );

        let mut cache = self.cache.write().await;
        let generation = cache.as_ref().map_or(0, |c| c.generation) + 1;
        *cache = Some(CachedKeySet {
            keys,
            expires_at: Instant::now() + self.cache_ttl,
            generation,
        });

        Ok(())
    }

    /// The endpoint this cache fetches from.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }
}
