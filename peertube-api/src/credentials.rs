//! Shared OAuth credential lifecycle
//!
//! Every worker asks the store for a valid token before talking to the API.
//! Refreshes are serialized behind one async mutex and the expiry check runs
//! after the lock is held, so a burst of callers on an expired token results
//! in a single round-trip to the identity endpoint.

use crate::api::OAuthApi;
use crate::client::Client;
use crate::error::{ApiError, ApiResult};
use crate::models::oauth::{OAuthClient, TokenRequest, TokenResponse};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Account used for the password grant
#[derive(Clone)]
pub struct LoginCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for LoginCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Token pair with expiration tracking
#[derive(Debug, Clone)]
struct Credential {
    access_token: String,
    refresh_token: Option<String>,
    token_type: String,
    expires_at: DateTime<Utc>,
    refresh_expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    fn from_response(token: TokenResponse, now: DateTime<Utc>) -> ApiResult<Self> {
        let refresh_token = Some(token.refresh_token).filter(|t| !t.is_empty());
        let refresh_expires_at = if refresh_token.is_some() && token.refresh_token_expires_in > 0 {
            Some(expiry_after(now, token.refresh_token_expires_in, "refresh_token_expires_in")?)
        } else {
            None
        };

        Ok(Self {
            access_token: token.access_token,
            refresh_token,
            token_type: token.token_type,
            expires_at: expiry_after(now, token.expires_in, "expires_in")?,
            refresh_expires_at,
        })
    }

    fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Refresh token usable at `now`, if any
    fn usable_refresh_token(&self, now: DateTime<Utc>) -> Option<&str> {
        let token = self.refresh_token.as_deref()?;
        match self.refresh_expires_at {
            Some(exp) if now >= exp => None,
            _ => Some(token),
        }
    }
}

/// `now + seconds`, rejecting lifetimes chrono cannot represent
fn expiry_after(now: DateTime<Utc>, seconds: i64, field: &str) -> ApiResult<DateTime<Utc>> {
    Duration::try_seconds(seconds)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| ApiError::InvalidToken(format!("{} out of range: {}", field, seconds)))
}

#[derive(Default)]
struct CredentialState {
    oauth_client: Option<OAuthClient>,
    credential: Option<Credential>,
}

/// Process-wide credential holder
pub struct CredentialStore {
    client: Arc<Client>,
    login: LoginCredentials,
    state: Mutex<CredentialState>,
}

impl CredentialStore {
    pub fn new(client: Arc<Client>, login: LoginCredentials) -> Self {
        Self {
            client,
            login,
            state: Mutex::new(CredentialState::default()),
        }
    }

    /// Make sure a token valid at `now` is held, logging in or refreshing if needed.
    pub async fn ensure_valid(&self, now: DateTime<Utc>) -> ApiResult<()> {
        let mut state = self.state.lock().await;

        if let Some(credential) = state.credential.as_ref() {
            if credential.is_valid_at(now) {
                return Ok(());
            }
        }

        let oauth_client = match state.oauth_client.clone() {
            Some(client) => client,
            None => {
                let client = self.client.get_local_client().await?;
                debug!(target: "auth", "Discovered local OAuth client");
                state.oauth_client = Some(client.clone());
                client
            }
        };

        let refresh_token = state
            .credential
            .as_ref()
            .and_then(|c| c.usable_refresh_token(now))
            .map(str::to_string);

        let token = match refresh_token {
            Some(refresh_token) => {
                let request = TokenRequest::refresh(&oauth_client, &refresh_token);
                match self.client.request_token(&request).await {
                    Ok(token) => {
                        info!(target: "auth", "Access token refreshed");
                        token
                    }
                    Err(ApiError::Auth { status, message }) => {
                        warn!(
                            target: "auth",
                            status,
                            message = %message,
                            "Refresh token rejected, logging in again"
                        );
                        self.password_login(&oauth_client).await?
                    }
                    Err(e) => return Err(e),
                }
            }
            None => self.password_login(&oauth_client).await?,
        };

        let credential = Credential::from_response(token, now)?;
        debug!(
            target: "auth",
            token_type = %credential.token_type,
            expires_at = %credential.expires_at,
            "Credential updated"
        );
        state.credential = Some(credential);
        Ok(())
    }

    /// Current access token; never touches the network
    pub async fn current_access_token(&self) -> ApiResult<String> {
        let state = self.state.lock().await;
        state
            .credential
            .as_ref()
            .map(|c| c.access_token.clone())
            .ok_or(ApiError::NoTokensAvailable)
    }

    async fn password_login(&self, oauth_client: &OAuthClient) -> ApiResult<TokenResponse> {
        let request =
            TokenRequest::password(oauth_client, &self.login.username, &self.login.password);
        let token = self.client.request_token(&request).await?;
        info!(target: "auth", username = %self.login.username, "Logged in");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use axum::extract::{Form, State};
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

    #[derive(Default)]
    struct IdentityState {
        discovery_calls: AtomicUsize,
        password_grants: AtomicUsize,
        refresh_grants: AtomicUsize,
        issued: AtomicUsize,
        expires_in: AtomicI64,
        reject_refresh: std::sync::atomic::AtomicBool,
    }

    async fn local_client(State(state): State<Arc<IdentityState>>) -> impl IntoResponse {
        state.discovery_calls.fetch_add(1, Ordering::SeqCst);
        Json(serde_json::json!({"client_id": "cid", "client_secret": "secret"}))
    }

    async fn token(
        State(state): State<Arc<IdentityState>>,
        Form(form): Form<HashMap<String, String>>,
    ) -> axum::response::Response {
        // Slow enough that concurrent callers pile up on the store lock
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        match form.get("grant_type").map(String::as_str) {
            Some("password") => {
                if form.get("password").map(String::as_str) != Some("pw") {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(serde_json::json!({"detail": "Invalid grant"})),
                    )
                        .into_response();
                }
                state.password_grants.fetch_add(1, Ordering::SeqCst);
            }
            Some("refresh_token") => {
                if state.reject_refresh.load(Ordering::SeqCst) {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(serde_json::json!({"detail": "Invalid refresh token"})),
                    )
                        .into_response();
                }
                state.refresh_grants.fetch_add(1, Ordering::SeqCst);
            }
            _ => return StatusCode::BAD_REQUEST.into_response(),
        }

        let n = state.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Json(serde_json::json!({
            "token_type": "Bearer",
            "access_token": format!("access-{}", n),
            "refresh_token": format!("refresh-{}", n),
            "expires_in": state.expires_in.load(Ordering::SeqCst),
            "refresh_token_expires_in": 1209600
        }))
        .into_response()
    }

    async fn spawn_identity(state: Arc<IdentityState>) -> String {
        let app = Router::new()
            .route("/api/v1/oauth-clients/local", get(local_client))
            .route("/api/v1/users/token", post(token))
            .with_state(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    async fn store_with(state: Arc<IdentityState>, password: &str) -> Arc<CredentialStore> {
        let base_url = spawn_identity(state).await;
        let client = Arc::new(Client::new(ClientConfig::new(base_url)).unwrap());
        Arc::new(CredentialStore::new(
            client,
            LoginCredentials {
                username: "root".to_string(),
                password: password.to_string(),
            },
        ))
    }

    #[tokio::test]
    async fn test_concurrent_callers_trigger_single_login() {
        let state = Arc::new(IdentityState::default());
        state.expires_in.store(3600, Ordering::SeqCst);
        let store = store_with(state.clone(), "pw").await;
        let now = Utc::now();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.ensure_valid(now).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(state.password_grants.load(Ordering::SeqCst), 1);
        assert_eq!(state.refresh_grants.load(Ordering::SeqCst), 0);
        assert_eq!(state.discovery_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.current_access_token().await.unwrap(), "access-1");
    }

    #[tokio::test]
    async fn test_concurrent_refresh_after_expiry() {
        let state = Arc::new(IdentityState::default());
        state.expires_in.store(60, Ordering::SeqCst);
        let store = store_with(state.clone(), "pw").await;
        let now = Utc::now();
        store.ensure_valid(now).await.unwrap();

        let later = now + Duration::seconds(120);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.ensure_valid(later).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(state.password_grants.load(Ordering::SeqCst), 1);
        assert_eq!(state.refresh_grants.load(Ordering::SeqCst), 1);
        assert_eq!(store.current_access_token().await.unwrap(), "access-2");
    }

    #[tokio::test]
    async fn test_valid_token_is_reused() {
        let state = Arc::new(IdentityState::default());
        state.expires_in.store(3600, Ordering::SeqCst);
        let store = store_with(state.clone(), "pw").await;
        let now = Utc::now();

        store.ensure_valid(now).await.unwrap();
        store.ensure_valid(now + Duration::seconds(10)).await.unwrap();
        store.ensure_valid(now + Duration::seconds(3599)).await.unwrap();

        assert_eq!(state.issued.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejected_login_is_auth_error() {
        let state = Arc::new(IdentityState::default());
        let store = store_with(state.clone(), "wrong").await;

        let err = store.ensure_valid(Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::Auth { status: 400, .. }));
        assert!(matches!(
            store.current_access_token().await,
            Err(ApiError::NoTokensAvailable)
        ));
    }

    #[tokio::test]
    async fn test_rejected_refresh_falls_back_to_login() {
        let state = Arc::new(IdentityState::default());
        state.expires_in.store(60, Ordering::SeqCst);
        let store = store_with(state.clone(), "pw").await;
        let now = Utc::now();
        store.ensure_valid(now).await.unwrap();

        state.reject_refresh.store(true, Ordering::SeqCst);
        store.ensure_valid(now + Duration::seconds(61)).await.unwrap();

        assert_eq!(state.password_grants.load(Ordering::SeqCst), 2);
        assert_eq!(state.refresh_grants.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_expired_refresh_token_is_not_used() {
        let now = Utc::now();
        let credential = Credential::from_response(
            TokenResponse {
                token_type: "Bearer".to_string(),
                access_token: "a".to_string(),
                refresh_token: "r".to_string(),
                expires_in: 60,
                refresh_token_expires_in: 120,
            },
            now,
        )
        .unwrap();
        assert_eq!(credential.usable_refresh_token(now), Some("r"));
        assert_eq!(
            credential.usable_refresh_token(now + Duration::seconds(121)),
            None
        );
        assert!(!credential.is_valid_at(now + Duration::seconds(60)));
    }

    #[test]
    fn test_out_of_range_lifetime_is_rejected() {
        let now = Utc::now();
        let token = |expires_in: i64, refresh_token_expires_in: i64| TokenResponse {
            token_type: "Bearer".to_string(),
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_in,
            refresh_token_expires_in,
        };

        for (expires_in, refresh_expires_in) in [
            (i64::MAX / 10, 120),
            (i64::MAX, 120),
            (60, i64::MAX / 10),
            (i64::MIN, 120),
        ] {
            let result = Credential::from_response(token(expires_in, refresh_expires_in), now);
            assert!(
                matches!(result, Err(ApiError::InvalidToken(_))),
                "expires_in={expires_in} refresh={refresh_expires_in}"
            );
        }
        assert!(Credential::from_response(token(-5, 0), now).is_ok());
    }

    #[tokio::test]
    async fn test_huge_expires_in_is_an_error_not_a_panic() {
        let state = Arc::new(IdentityState::default());
        state.expires_in.store(i64::MAX, Ordering::SeqCst);
        let store = store_with(state.clone(), "pw").await;

        let err = store.ensure_valid(Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidToken(_)));
        assert!(matches!(
            store.current_access_token().await,
            Err(ApiError::NoTokensAvailable)
        ));

        // The store stays usable once the server behaves again
        state.expires_in.store(3600, Ordering::SeqCst);
        store.ensure_valid(Utc::now()).await.unwrap();
        assert_eq!(store.current_access_token().await.unwrap(), "access-2");
    }
}
