//! In-process fake of the platform endpoints used by the tests

use axum::body::Bytes;
use axum::extract::{Form, Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use peertube_api::{Client, ClientConfig, CredentialStore, LoginCredentials};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How the init response spells the `Location` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationMode {
    Absolute,
    SchemeRelative,
    Relative,
}

#[derive(Debug)]
pub struct UploadRecord {
    pub filename: String,
    pub declared_length: u64,
    pub received: Vec<u8>,
    pub ranges: Vec<String>,
    pub completed: bool,
}

pub struct FakeState {
    addr: String,
    pub location_mode: LocationMode,
    pub expires_in: AtomicI64,
    /// Lifetime of password-grant tokens when it differs from `expires_in`
    pub password_expires_in: Option<i64>,
    /// Respond 500 to this many upcoming chunk PUTs
    pub fail_next_chunks: AtomicU32,
    /// Status for init calls when set
    pub init_status: Mutex<Option<StatusCode>>,
    pub chunk_delay: Duration,

    pub discovery_calls: AtomicUsize,
    pub password_grants: AtomicUsize,
    pub refresh_grants: AtomicUsize,
    pub init_calls: AtomicUsize,
    pub chunk_puts: AtomicUsize,
    pub failed_puts: AtomicUsize,
    active_uploads: AtomicUsize,
    pub max_active_uploads: AtomicUsize,
    tokens_issued: AtomicUsize,
    next_video_id: AtomicI64,
    pub uploads: Mutex<HashMap<String, UploadRecord>>,
    /// Bearer tokens seen on upload requests, in arrival order
    pub seen_tokens: Mutex<Vec<String>>,
    /// Chunk PUTs carrying one of these tokens get 401
    pub rejected_tokens: Mutex<Vec<String>>,
}

impl FakeState {
    pub fn completed_uploads(&self) -> usize {
        self.uploads
            .lock()
            .unwrap()
            .values()
            .filter(|u| u.completed)
            .count()
    }
}

pub struct FakeOptions {
    pub location_mode: LocationMode,
    pub expires_in: i64,
    pub password_expires_in: Option<i64>,
    pub chunk_delay: Duration,
}

impl Default for FakeOptions {
    fn default() -> Self {
        Self {
            location_mode: LocationMode::Absolute,
            expires_in: 3600,
            password_expires_in: None,
            chunk_delay: Duration::ZERO,
        }
    }
}

pub struct FakePlatform {
    pub base_url: String,
    pub state: Arc<FakeState>,
}

impl FakePlatform {
    pub async fn start() -> Self {
        Self::start_with(FakeOptions::default()).await
    }

    pub async fn start_with(options: FakeOptions) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let state = Arc::new(FakeState {
            addr: addr.clone(),
            location_mode: options.location_mode,
            expires_in: AtomicI64::new(options.expires_in),
            password_expires_in: options.password_expires_in,
            fail_next_chunks: AtomicU32::new(0),
            init_status: Mutex::new(None),
            chunk_delay: options.chunk_delay,
            discovery_calls: AtomicUsize::new(0),
            password_grants: AtomicUsize::new(0),
            refresh_grants: AtomicUsize::new(0),
            init_calls: AtomicUsize::new(0),
            chunk_puts: AtomicUsize::new(0),
            failed_puts: AtomicUsize::new(0),
            active_uploads: AtomicUsize::new(0),
            max_active_uploads: AtomicUsize::new(0),
            tokens_issued: AtomicUsize::new(0),
            next_video_id: AtomicI64::new(1),
            uploads: Mutex::new(HashMap::new()),
            seen_tokens: Mutex::new(Vec::new()),
            rejected_tokens: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/api/v1/oauth-clients/local", get(local_client))
            .route("/api/v1/users/token", post(token))
            .route("/api/v1/videos/upload-resumable", post(init_upload))
            .route("/upload/:id", put(upload_chunk))
            .with_state(state.clone());

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn client(&self) -> Arc<Client> {
        Arc::new(Client::new(ClientConfig::new(self.base_url.clone())).unwrap())
    }

    pub fn credentials(&self, client: Arc<Client>) -> Arc<CredentialStore> {
        Arc::new(CredentialStore::new(
            client,
            LoginCredentials {
                username: "root".to_string(),
                password: "secret".to_string(),
            },
        ))
    }
}

async fn local_client(State(state): State<Arc<FakeState>>) -> impl IntoResponse {
    state.discovery_calls.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({"client_id": "fake-id", "client_secret": "fake-secret"}))
}

async fn token(
    State(state): State<Arc<FakeState>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut expires_in = state.expires_in.load(Ordering::SeqCst);
    match form.get("grant_type").map(String::as_str) {
        Some("password") if form.get("password").map(String::as_str) == Some("secret") => {
            state.password_grants.fetch_add(1, Ordering::SeqCst);
            expires_in = state.password_expires_in.unwrap_or(expires_in);
        }
        Some("refresh_token") => {
            state.refresh_grants.fetch_add(1, Ordering::SeqCst);
        }
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({"detail": "Invalid grant"})),
            )
                .into_response();
        }
    }

    let n = state.tokens_issued.fetch_add(1, Ordering::SeqCst) + 1;
    Json(serde_json::json!({
        "token_type": "Bearer",
        "access_token": format!("access-{}", n),
        "refresh_token": format!("refresh-{}", n),
        "expires_in": expires_in,
        "refresh_token_expires_in": 1209600
    }))
    .into_response()
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

async fn init_upload(
    State(state): State<Arc<FakeState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    state.init_calls.fetch_add(1, Ordering::SeqCst);

    let Some(token) = bearer(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    state.seen_tokens.lock().unwrap().push(token);

    if let Some(status) = *state.init_status.lock().unwrap() {
        return (status, Json(serde_json::json!({"detail": "init refused"}))).into_response();
    }

    let declared_length = headers
        .get("x-upload-content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);

    let id = uuid::Uuid::new_v4().simple().to_string();
    state.uploads.lock().unwrap().insert(
        id.clone(),
        UploadRecord {
            filename: body["filename"].as_str().unwrap_or_default().to_string(),
            declared_length,
            received: Vec::new(),
            ranges: Vec::new(),
            completed: false,
        },
    );

    let active = state.active_uploads.fetch_add(1, Ordering::SeqCst) + 1;
    state.max_active_uploads.fetch_max(active, Ordering::SeqCst);

    let location = match state.location_mode {
        LocationMode::Absolute => format!("http://{}/upload/{}", state.addr, id),
        LocationMode::SchemeRelative => format!("//{}/upload/{}", state.addr, id),
        LocationMode::Relative => format!("/upload/{}", id),
    };

    (StatusCode::CREATED, [(header::LOCATION, location)]).into_response()
}

fn parse_content_range(value: &str) -> Option<(u64, u64, u64)> {
    let rest = value.strip_prefix("bytes ")?;
    let (span, total) = rest.split_once('/')?;
    let (start, end) = span.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?, total.parse().ok()?))
}

async fn upload_chunk(
    State(state): State<Arc<FakeState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.chunk_puts.fetch_add(1, Ordering::SeqCst);
    if !state.chunk_delay.is_zero() {
        tokio::time::sleep(state.chunk_delay).await;
    }

    if let Some(token) = bearer(&headers) {
        let rejected = state.rejected_tokens.lock().unwrap().contains(&token);
        state.seen_tokens.lock().unwrap().push(token);
        if rejected {
            state.failed_puts.fetch_add(1, Ordering::SeqCst);
            return StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let scripted_failure = state
        .fail_next_chunks
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok();
    if scripted_failure {
        state.failed_puts.fetch_add(1, Ordering::SeqCst);
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    let Some((start, end, total)) = headers
        .get(header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
    else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let mut uploads = state.uploads.lock().unwrap();
    let Some(upload) = uploads.get_mut(&id) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    if start != upload.received.len() as u64
        || end + 1 - start != body.len() as u64
        || total != upload.declared_length
    {
        return StatusCode::BAD_REQUEST.into_response();
    }

    upload.ranges.push(format!("bytes {}-{}/{}", start, end, total));
    upload.received.extend_from_slice(&body);

    if end + 1 < total {
        return StatusCode::PERMANENT_REDIRECT.into_response();
    }

    upload.completed = true;
    drop(uploads);
    state.active_uploads.fetch_sub(1, Ordering::SeqCst);

    let video_id = state.next_video_id.fetch_add(1, Ordering::SeqCst);
    Json(serde_json::json!({
        "video": {
            "id": video_id,
            "uuid": format!("00000000-0000-4000-8000-{:012}", video_id),
            "shortUUID": format!("short{}", video_id)
        }
    }))
    .into_response()
}
