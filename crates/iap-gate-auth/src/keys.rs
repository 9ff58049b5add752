//! Signing key fetching and caching.
//!
//! The IAP key endpoint serves a JSON object mapping key ids to PEM-encoded
//! EC public keys. [`KeyStore`] caches the whole set and refetches it once
//! when a token names a key id the cache does not hold, which is how key
//! rotation on the proxy side is picked up.
//!
//! # State
//!
//! ```text
//!   Empty ──fetch──▶ Populated ──miss──▶ Empty ──fetch──▶ Populated
//! ```
//!
//! A failed fetch leaves the cache `Empty`. Fetches are serialized; a caller
//! that waited behind another caller's fetch reuses its result instead of
//! fetching again, so concurrent misses cost a single request.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::instrument;

use crate::config::VerifierConfig;
use crate::error::{AuthError, Result};

/// Key id to PEM public key, as served by the key endpoint.
pub type SigningKeySet = HashMap<String, String>;

/// Maximum number of response body bytes carried into a fetch error.
const ERROR_BODY_LIMIT: usize = 512;

#[derive(Default)]
enum CacheState {
    #[default]
    Empty,
    Populated(Arc<SigningKeySet>),
}

/// Cached key set plus a counter bumped on every state transition.
#[derive(Default)]
struct Cache {
    state: CacheState,
    generation: u64,
}

/// Fetches and caches the proxy's signing keys.
pub struct KeyStore {
    endpoint: String,
    client: reqwest::Client,
    cache: RwLock<Cache>,
    fetch_lock: tokio::sync::Mutex<()>,
}

impl KeyStore {
    /// Create a key store for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
            cache: RwLock::new(Cache::default()),
            fetch_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Create a key store from the verifier configuration.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Config` if the HTTP client cannot be built.
    pub fn from_config(config: &VerifierConfig) -> Result<Self> {
        Self::new(config.public_key_endpoint.clone(), config.timeout())
    }

    /// The key endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns `true` if a key set is currently cached.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        matches!(self.cache.read().state, CacheState::Populated(_))
    }

    /// Get the PEM public key for `kid`.
    ///
    /// Populates the cache on first use. On a miss, the cache is invalidated
    /// and refetched once; there is no further retry.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::FetchError` if a needed fetch fails, or
    /// `AuthError::UnknownSigningKey` if the key is absent after the refetch.
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get(&self, kid: &str) -> Result<String> {
        let (keys, generation) = match self.snapshot() {
            (Some(keys), generation) => (keys, generation),
            (None, generation) => self.repopulate(generation).await?,
        };

        if let Some(pem) = keys.get(kid) {
            return Ok(pem.clone());
        }

        tracing::debug!(kid = %kid, "Signing key not cached, refetching");
        let (keys, _) = self.repopulate(generation).await?;

        keys.get(kid).cloned().ok_or_else(|| {
            tracing::warn!(kid = %kid, "Signing key not found after refetch");
            AuthError::UnknownSigningKey(kid.to_string())
        })
    }

    /// Drop the cached key set. The next lookup fetches a fresh one.
    pub fn invalidate(&self) {
        let mut cache = self.cache.write();
        cache.state = CacheState::Empty;
        cache.generation += 1;
    }

    fn snapshot(&self) -> (Option<Arc<SigningKeySet>>, u64) {
        let cache = self.cache.read();
        let keys = match &cache.state {
            CacheState::Populated(keys) => Some(Arc::clone(keys)),
            CacheState::Empty => None,
        };
        (keys, cache.generation)
    }

    /// Replace the key set observed at `seen_generation` with a fresh one.
    ///
    /// If another caller installed a newer set while this one waited for the
    /// fetch lock, that set is returned without a network call.
    async fn repopulate(&self, seen_generation: u64) -> Result<(Arc<SigningKeySet>, u64)> {
        let _guard = self.fetch_lock.lock().await;

        {
            let cache = self.cache.read();
            if cache.generation != seen_generation {
                if let CacheState::Populated(keys) = &cache.state {
                    tracing::debug!("Reusing key set fetched by a concurrent request");
                    return Ok((Arc::clone(keys), cache.generation));
                }
            }
        }

        self.invalidate();
        let keys = Arc::new(self.fetch().await?);

        let mut cache = self.cache.write();
        cache.state = CacheState::Populated(Arc::clone(&keys));
        cache.generation += 1;
        Ok((keys, cache.generation))
    }

    async fn fetch(&self) -> Result<SigningKeySet> {
        tracing::debug!(url = %self.endpoint, "Fetching IAP signing keys");

        let response = self.client.get(&self.endpoint).send().await.map_err(|e| {
            tracing::error!(url = %self.endpoint, error = %e, "Failed to fetch signing keys");
            AuthError::FetchError(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(ERROR_BODY_LIMIT).collect();
            tracing::error!(
                url = %self.endpoint,
                status = %status,
                body = %body,
                "Key endpoint returned error"
            );
            return Err(AuthError::FetchError(format!(
                "HTTP {status} from key endpoint: {body}"
            )));
        }

        let keys: SigningKeySet = response.json().await.map_err(|e| {
            tracing::error!(url = %self.endpoint, error = %e, "Failed to parse key endpoint response");
            AuthError::FetchError(e.to_string())
        })?;

        if keys.is_empty() {
            tracing::error!(url = %self.endpoint, "Key endpoint returned no keys");
            return Err(AuthError::FetchError(
                "key endpoint returned an empty key set".to_string(),
            ));
        }

        tracing::info!(key_count = keys.len(), "Signing key cache refreshed");
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY_PATH: &str = "/iap/verify/public_key";

    async fn key_server(keys: serde_json::Value, expected_fetches: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(KEY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(keys))
            .expect(expected_fetches)
            .mount(&server)
            .await;
        server
    }

    fn store_for(server: &MockServer) -> KeyStore {
        KeyStore::new(format!("{}{KEY_PATH}", server.uri()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn first_lookup_populates_cache_once() {
        let keys = testutil::key_set(&[(testutil::PRIMARY_KID, testutil::PRIMARY_PUBLIC_PEM)]);
        let server = key_server(keys, 1).await;
        let store = store_for(&server);
        assert!(!store.is_populated());

        for _ in 0..3 {
            let pem = store.get(testutil::PRIMARY_KID).await.unwrap();
            assert_eq!(pem, testutil::PRIMARY_PUBLIC_PEM);
        }
        assert!(store.is_populated());
    }

    #[tokio::test]
    async fn unknown_key_refetches_exactly_once() {
        let keys = testutil::key_set(&[(testutil::PRIMARY_KID, testutil::PRIMARY_PUBLIC_PEM)]);
        let server = key_server(keys, 2).await;
        let store = store_for(&server);

        let result = store.get("nope").await;
        assert!(matches!(result, Err(AuthError::UnknownSigningKey(kid)) if kid == "nope"));
    }

    #[tokio::test]
    async fn rotated_key_found_after_refetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(KEY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(testutil::key_set(&[(
                testutil::PRIMARY_KID,
                testutil::PRIMARY_PUBLIC_PEM,
            )])))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(KEY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(testutil::key_set(&[
                (testutil::PRIMARY_KID, testutil::PRIMARY_PUBLIC_PEM),
                (testutil::ROTATED_KID, testutil::ROTATED_PUBLIC_PEM),
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server);
        store.get(testutil::PRIMARY_KID).await.unwrap();

        let pem = store.get(testutil::ROTATED_KID).await.unwrap();
        assert_eq!(pem, testutil::ROTATED_PUBLIC_PEM);

        // Both keys now served from cache.
        store.get(testutil::PRIMARY_KID).await.unwrap();
        store.get(testutil::ROTATED_KID).await.unwrap();
    }

    #[tokio::test]
    async fn non_success_status_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(KEY_PATH))
            .respond_with(ResponseTemplate::new(503).set_body_string("backend down"))
            .expect(1)
            .mount(&server)
            .await;
        let store = store_for(&server);

        let err = store.get(testutil::PRIMARY_KID).await.unwrap_err();
        match err {
            AuthError::FetchError(msg) => {
                assert!(msg.contains("503"));
                assert!(msg.contains("backend down"));
            }
            other => panic!("expected FetchError, got {other:?}"),
        }
        assert!(!store.is_populated());
    }

    #[tokio::test]
    async fn failed_fetch_is_retried_on_next_lookup() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(KEY_PATH))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path(KEY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(testutil::key_set(&[(
                testutil::PRIMARY_KID,
                testutil::PRIMARY_PUBLIC_PEM,
            )])))
            .expect(1)
            .mount(&server)
            .await;
        let store = store_for(&server);

        assert!(store.get(testutil::PRIMARY_KID).await.is_err());
        assert!(store.get(testutil::PRIMARY_KID).await.is_ok());
    }

    #[tokio::test]
    async fn empty_key_set_is_fetch_error() {
        let server = key_server(serde_json::json!({}), 1).await;
        let store = store_for(&server);

        let result = store.get(testutil::PRIMARY_KID).await;
        assert!(matches!(result, Err(AuthError::FetchError(_))));
    }

    #[tokio::test]
    async fn malformed_body_is_fetch_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(KEY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;
        let store = store_for(&server);

        let result = store.get(testutil::PRIMARY_KID).await;
        assert!(matches!(result, Err(AuthError::FetchError(_))));
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(KEY_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(testutil::key_set(&[(
                        testutil::PRIMARY_KID,
                        testutil::PRIMARY_PUBLIC_PEM,
                    )]))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;
        let store = KeyStore::new(
            format!("{}{KEY_PATH}", server.uri()),
            Duration::from_millis(200),
        )
        .unwrap();

        let result = store.get(testutil::PRIMARY_KID).await;
        assert!(matches!(result, Err(AuthError::FetchError(_))));
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let keys = testutil::key_set(&[(testutil::PRIMARY_KID, testutil::PRIMARY_PUBLIC_PEM)]);
        let server = key_server(keys, 2).await;
        let store = store_for(&server);

        store.get(testutil::PRIMARY_KID).await.unwrap();
        store.invalidate();
        assert!(!store.is_populated());
        store.get(testutil::PRIMARY_KID).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_misses_coalesce() {
        let keys = testutil::key_set(&[(testutil::PRIMARY_KID, testutil::PRIMARY_PUBLIC_PEM)]);
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(KEY_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(keys)
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(2)
            .mount(&server)
            .await;
        let store = Arc::new(store_for(&server));

        let lookups = (0..16).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.get("rotated-away").await })
        });
        let results = futures::future::join_all(lookups).await;

        for result in results {
            assert!(matches!(
                result.unwrap(),
                Err(AuthError::UnknownSigningKey(_))
            ));
        }
    }
}
