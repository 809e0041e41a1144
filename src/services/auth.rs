use crate::config::JwtConfig;
use crate::error::GatewayError;
use crate::response::{error_json, json, BoxBody};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use dashmap::{DashMap, DashSet};
use http::header::AUTHORIZATION;
use http::Method;
use hyper::body::Incoming;
use hyper::{Request, Response};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_id: u64,
    pub exp: u64,
    /// "refresh" on refresh tokens, absent on access tokens.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct RefreshRequest {
    refresh_token: String,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    token_type: &'static str,
    expires_in: u64,
}

/// HS256 token issue/verify around the shared JWT settings.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl_secs: u64,
    refresh_ttl_secs: u64,
}

impl TokenIssuer {
    pub fn new(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            access_ttl_secs: cfg.access_token_expire_minutes * 60,
            refresh_ttl_secs: cfg.refresh_token_expire_days * 24 * 3600,
        }
    }

    pub fn access_ttl_secs(&self) -> u64 {
        self.access_ttl_secs
    }

    pub fn issue_access(&self, username: &str, user_id: u64) -> Result<String, GatewayError> {
        self.encode(Claims {
            sub: username.to_string(),
            user_id,
            exp: super::unix_now() + self.access_ttl_secs,
            token_type: None,
        })
    }

    pub fn issue_refresh(&self, username: &str, user_id: u64) -> Result<String, GatewayError> {
        self.encode(Claims {
            sub: username.to_string(),
            user_id,
            exp: super::unix_now() + self.refresh_ttl_secs,
            token_type: Some("refresh".to_string()),
        })
    }

    /// Decode and validate a token (signature + expiry).
    pub fn decode(&self, token: &str) -> Option<Claims> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .ok()
    }

    fn encode(&self, claims: Claims) -> Result<String, GatewayError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| GatewayError::Internal(format!("token encoding failed: {}", e)))
    }
}

struct StoredCredential {
    password_hash: String,
    user_id: u64,
}

/// Argon2-hashed in-memory credentials, seeded with the demo accounts.
pub struct CredentialStore {
    users: DashMap<String, StoredCredential>,
    next_user_id: AtomicU64,
}

impl CredentialStore {
    pub fn with_demo_users() -> Self {
        let store = Self {
            users: DashMap::new(),
            next_user_id: AtomicU64::new(3),
        };
        store.insert("admin", "admin123", 1);
        store.insert("user1", "password123", 2);
        store
    }

    fn insert(&self, username: &str, password: &str, user_id: u64) {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .expect("argon2 hashing failed")
            .to_string();
        self.users.insert(
            username.to_string(),
            StoredCredential {
                password_hash: hash,
                user_id,
            },
        );
    }

    /// Verify a username/password pair; returns the user id on success.
    pub fn verify(&self, username: &str, password: &str) -> Option<u64> {
        let cred = self.users.get(username)?;
        let parsed = PasswordHash::new(&cred.password_hash).ok()?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .ok()
            .map(|_| cred.user_id)
    }

    /// Register new credentials; fails when the username is taken.
    pub fn register(&self, username: &str, password: &str) -> Result<u64, GatewayError> {
        if self.users.contains_key(username) {
            return Err(GatewayError::BadRequest(
                "Username already exists".to_string(),
            ));
        }
        let user_id = self.next_user_id.fetch_add(1, Ordering::Relaxed);
        self.insert(username, password, user_id);
        Ok(user_id)
    }
}

#[derive(Clone)]
pub struct AuthServiceState {
    pub credentials: Arc<CredentialStore>,
    pub tokens: Arc<TokenIssuer>,
    /// Currently valid refresh tokens; refresh rotates, logout leaves access
    /// tokens to expire on their own.
    pub refresh_tokens: Arc<DashSet<String>>,
    pub user_service_url: String,
    pub http: reqwest::Client,
}

/// Bound on the best-effort user-service lookup during login. A hung user
/// service must never stall authentication.
const USER_LOOKUP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

impl AuthServiceState {
    pub fn new(jwt: &JwtConfig, user_service_url: String) -> Self {
        Self {
            credentials: Arc::new(CredentialStore::with_demo_users()),
            tokens: Arc::new(TokenIssuer::new(jwt)),
            refresh_tokens: Arc::new(DashSet::new()),
            user_service_url,
            http: reqwest::Client::builder()
                .no_proxy()
                .timeout(USER_LOOKUP_TIMEOUT)
                .build()
                .expect("failed to build auth http client"),
        }
    }
}

pub async fn handle(
    req: Request<Incoming>,
    state: AuthServiceState,
    _peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let resp = match route(req, &state, &method, &path).await {
        Ok(r) => r,
        Err(e) => error_json(e.status_code(), &e.to_string()),
    };
    Ok(resp)
}

async fn route(
    req: Request<Incoming>,
    state: &AuthServiceState,
    method: &Method,
    path: &str,
) -> Result<Response<BoxBody>, GatewayError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method.as_str(), segments.as_slice()) {
        ("GET", []) => Ok(json(&serde_json::json!({
            "message": "DQA Auth Service",
            "version": env!("CARGO_PKG_VERSION"),
        }))),

        ("GET", ["health"]) => Ok(json(&serde_json::json!({
            "status": "healthy",
            "service": "auth-service",
        }))),

        ("POST", ["login"]) => {
            let body: LoginRequest = super::read_json(req).await?;
            login(state, body).await
        }

        ("POST", ["logout"]) => {
            let claims = current_user(&req, state)?;
            info!("auth: logout, username={}", claims.sub);
            Ok(json(&serde_json::json!({
                "message": "Logged out successfully",
            })))
        }

        ("POST", ["refresh"]) => {
            let body: RefreshRequest = super::read_json(req).await?;
            refresh(state, body.refresh_token)
        }

        ("GET", ["verify-token"]) => {
            let claims = current_user(&req, state)?;
            Ok(json(&serde_json::json!({
                "valid": true,
                "username": claims.sub,
                "user_id": claims.user_id,
            })))
        }

        ("POST", ["register-credentials"]) => {
            let body: LoginRequest = super::read_json(req).await?;
            state.credentials.register(&body.username, &body.password)?;
            info!("auth: credentials registered, username={}", body.username);
            Ok(json(&serde_json::json!({
                "message": "Credentials registered successfully",
            })))
        }

        ("GET", ["protected"]) => {
            let claims = current_user(&req, state)?;
            Ok(json(&serde_json::json!({
                "message": format!("Hello {}!", claims.sub),
                "user_id": claims.user_id,
                "protected": true,
            })))
        }

        (_, segments) if auth_path_is_known(segments) => {
            Err(GatewayError::MethodNotAllowed(method.to_string()))
        }
        _ => Err(GatewayError::RouteNotFound),
    }
}

fn auth_path_is_known(segments: &[&str]) -> bool {
    matches!(
        segments,
        [] | ["health"]
            | ["login"]
            | ["logout"]
            | ["refresh"]
            | ["verify-token"]
            | ["register-credentials"]
            | ["protected"]
    )
}

async fn login(
    state: &AuthServiceState,
    body: LoginRequest,
) -> Result<Response<BoxBody>, GatewayError> {
    let user_id = state
        .credentials
        .verify(&body.username, &body.password)
        .ok_or_else(|| {
            GatewayError::Unauthorized("Incorrect username or password".to_string())
        })?;

    // Best-effort existence check against the user service; a missing or
    // unreachable user service never blocks login.
    let lookup_url = format!(
        "{}/users/by-username/{}",
        state.user_service_url.trim_end_matches('/'),
        body.username
    );
    match state.http.get(&lookup_url).send().await {
        Ok(resp) if resp.status().is_success() => {}
        Ok(_) => warn!(
            "auth: user not found in user service, username={}",
            body.username
        ),
        Err(e) => warn!("auth: user service lookup failed, error={}", e),
    }

    let access_token = state.tokens.issue_access(&body.username, user_id)?;
    let refresh_token = state.tokens.issue_refresh(&body.username, user_id)?;
    state.refresh_tokens.insert(refresh_token.clone());

    info!("auth: login succeeded, username={}", body.username);

    Ok(json(&TokenResponse {
        access_token,
        refresh_token,
        token_type: "bearer",
        expires_in: state.tokens.access_ttl_secs(),
    }))
}

fn refresh(state: &AuthServiceState, token: String) -> Result<Response<BoxBody>, GatewayError> {
    let claims = match state.tokens.decode(&token) {
        Some(c) if c.token_type.as_deref() == Some("refresh") => c,
        _ => {
            return Err(GatewayError::Unauthorized(
                "Invalid refresh token".to_string(),
            ))
        }
    };

    // Removing doubles as the revocation check; rotation invalidates the
    // old token even when the same refresh is replayed concurrently.
    if state.refresh_tokens.remove(&token).is_none() {
        return Err(GatewayError::Unauthorized(
            "Refresh token revoked".to_string(),
        ));
    }

    let access_token = state.tokens.issue_access(&claims.sub, claims.user_id)?;
    let refresh_token = state.tokens.issue_refresh(&claims.sub, claims.user_id)?;
    state.refresh_tokens.insert(refresh_token.clone());

    Ok(json(&TokenResponse {
        access_token,
        refresh_token,
        token_type: "bearer",
        expires_in: state.tokens.access_ttl_secs(),
    }))
}

/// Extract and validate the bearer token carried by the request.
fn current_user(req: &Request<Incoming>, state: &AuthServiceState) -> Result<Claims, GatewayError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match token.and_then(|t| state.tokens.decode(t)) {
        // Refresh tokens are not valid as access credentials.
        Some(claims) if claims.token_type.is_none() => Ok(claims),
        _ => Err(GatewayError::Unauthorized(
            "Could not validate credentials".to_string(),
        )),
    }
}
