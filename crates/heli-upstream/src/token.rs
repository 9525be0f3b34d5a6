//! OAuth2 client-credentials token store.
//!
//! One store is created at startup and shared by every request. Tokens are
//! fetched lazily and refreshed once they come within [`TOKEN_REFRESH_LEEWAY`]
//! of expiry. Refreshes are serialized: callers that find the token stale at
//! the same time wait for a single round trip to the token endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};

use crate::error::UpstreamError;

pub const TOKEN_REFRESH_LEEWAY: Duration = Duration::from_secs(60);
const DEFAULT_TOKEN_TTL_SECS: u64 = 1800;

/// A token as issued by the authorization server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub access_token: String,
    pub expires_in: Duration,
}

/// Where fresh tokens come from.
pub trait TokenSource: Send + Sync {
    fn issue(&self) -> BoxFuture<'_, Result<IssuedToken, UpstreamError>>;
}

#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scope: Option<String>,
}

#[derive(Debug, Serialize)]
struct OAuthTokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    scope: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Client-credentials grant against a token endpoint.
pub struct ClientCredentialsSource {
    credentials: ClientCredentials,
    client: Client,
}

impl ClientCredentialsSource {
    pub fn new(credentials: ClientCredentials, client: Client) -> Self {
        Self {
            credentials,
            client,
        }
    }

    async fn request_token(&self) -> Result<IssuedToken, UpstreamError> {
        let oauth = &self.credentials;
        let request = OAuthTokenRequest {
            grant_type: "client_credentials",
            client_id: oauth.client_id.as_str(),
            client_secret: oauth.client_secret.as_str(),
            scope: oauth.scope.as_deref(),
        };

        let response = self
            .client
            .post(oauth.token_url.as_str())
            .form(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // A 400 from the token endpoint means bad client credentials.
            return Err(match UpstreamError::from_status(status, &body) {
                UpstreamError::Rejected { status, detail } => UpstreamError::Auth {
                    status: Some(status),
                    detail,
                },
                other => other,
            });
        }

        let payload: OAuthTokenResponse = response.json().await?;
        Ok(IssuedToken {
            access_token: payload.access_token,
            expires_in: Duration::from_secs(payload.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS)),
        })
    }
}

impl TokenSource for ClientCredentialsSource {
    fn issue(&self) -> BoxFuture<'_, Result<IssuedToken, UpstreamError>> {
        Box::pin(self.request_token())
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() + TOKEN_REFRESH_LEEWAY < self.expires_at
    }
}

pub struct TokenStore {
    source: Arc<dyn TokenSource>,
    cached: RwLock<Option<CachedToken>>,
    refresh: Mutex<()>,
    refreshes: AtomicU64,
}

impl TokenStore {
    pub fn new(source: Arc<dyn TokenSource>) -> Self {
        Self {
            source,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
            refreshes: AtomicU64::new(0),
        }
    }

    pub fn client_credentials(credentials: ClientCredentials, client: Client) -> Self {
        Self::new(Arc::new(ClientCredentialsSource::new(credentials, client)))
    }

    /// Number of successful round trips to the token source.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }

    /// Current bearer token, fetching one if none is cached or it is near expiry.
    pub async fn token(&self) -> Result<String, UpstreamError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }
        self.refresh_locked().await
    }

    /// Replace `rejected` after the provider refused it. If a concurrent
    /// caller already swapped in a different token, that one is returned.
    pub async fn force_refresh(&self, rejected: &str) -> Result<String, UpstreamError> {
        let _guard = self.refresh.lock().await;
        if let Some(token) = self.cached_token().await {
            if token != rejected {
                return Ok(token);
            }
        }
        self.refresh_locked().await
    }

    async fn cached_token(&self) -> Option<String> {
        let guard = self.cached.read().await;
        guard
            .as_ref()
            .filter(|cached| cached.is_fresh())
            .map(|cached| cached.access_token.clone())
    }

    async fn refresh_locked(&self) -> Result<String, UpstreamError> {
        let issued = match self.source.issue().await {
            Ok(issued) => issued,
            Err(err) => {
                tracing::warn!("OAuth token refresh failed: {}", err);
                return Err(err);
            }
        };
        self.refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("OAuth token refreshed, expires in {:?}", issued.expires_in);

        let token = issued.access_token.clone();
        let mut guard = self.cached.write().await;
        *guard = Some(CachedToken {
            access_token: issued.access_token,
            expires_at: Instant::now() + issued.expires_in,
        });
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingSource {
        issued: AtomicU32,
        ttl: Duration,
    }

    impl CountingSource {
        fn new(ttl: Duration) -> Arc<Self> {
            Arc::new(Self {
                issued: AtomicU32::new(0),
                ttl,
            })
        }
    }

    impl TokenSource for CountingSource {
        fn issue(&self) -> BoxFuture<'_, Result<IssuedToken, UpstreamError>> {
            Box::pin(async move {
                let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(IssuedToken {
                    access_token: format!("token-{n}"),
                    expires_in: self.ttl,
                })
            })
        }
    }

    #[tokio::test]
    async fn token_is_cached() {
        let source = CountingSource::new(Duration::from_secs(1800));
        let store = TokenStore::new(source.clone());

        assert_eq!(store.token().await.unwrap(), "token-1");
        assert_eq!(store.token().await.unwrap(), "token-1");
        assert_eq!(source.issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let source = CountingSource::new(Duration::from_secs(1800));
        let store = Arc::new(TokenStore::new(source.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.token().await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), "token-1");
        }
        assert_eq!(source.issued.load(Ordering::SeqCst), 1);
        assert_eq!(store.refresh_count(), 1);
    }

    #[tokio::test]
    async fn token_inside_leeway_is_refreshed() {
        // Expires within the safety margin, so it is never served from cache.
        let source = CountingSource::new(Duration::from_secs(30));
        let store = TokenStore::new(source.clone());

        assert_eq!(store.token().await.unwrap(), "token-1");
        assert_eq!(store.token().await.unwrap(), "token-2");
    }

    #[tokio::test]
    async fn force_refresh_only_replaces_rejected_token() {
        let source = CountingSource::new(Duration::from_secs(1800));
        let store = Arc::new(TokenStore::new(source.clone()));
        let first = store.token().await.unwrap();

        let (a, b) = tokio::join!(store.force_refresh(&first), store.force_refresh(&first));
        assert_eq!(a.unwrap(), "token-2");
        assert_eq!(b.unwrap(), "token-2");
        assert_eq!(source.issued.load(Ordering::SeqCst), 2);
    }

    struct FailingSource;

    impl TokenSource for FailingSource {
        fn issue(&self) -> BoxFuture<'_, Result<IssuedToken, UpstreamError>> {
            Box::pin(async {
                Err(UpstreamError::Auth {
                    status: Some(401),
                    detail: "invalid_client".to_string(),
                })
            })
        }
    }

    #[tokio::test]
    async fn source_failure_surfaces() {
        let store = TokenStore::new(Arc::new(FailingSource));
        let err = store.token().await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(store.refresh_count(), 0);
    }
}
