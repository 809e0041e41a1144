use crate::error::GatewayError;
use crate::response::{error_json, json, BoxBody};
use dashmap::DashMap;
use http::Method;
use hyper::body::Incoming;
use hyper::{Request, Response};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub email: String,
    pub full_name: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateUser {
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub is_active: Option<bool>,
}

/// Username or email collides with an existing user.
#[derive(Debug)]
pub struct DuplicateUser;

/// Storage capability behind the user service. The HTTP layer only talks to
/// this trait, so a database-backed implementation can slot in without
/// touching the handlers.
pub trait UserStore: Send + Sync {
    fn create(&self, req: CreateUser) -> Result<User, DuplicateUser>;
    fn get(&self, id: u64) -> Option<User>;
    fn get_by_username(&self, username: &str) -> Option<User>;
    fn list(&self, skip: usize, limit: usize) -> Vec<User>;
    fn update(&self, id: u64, req: UpdateUser) -> Option<User>;
    fn delete(&self, id: u64) -> bool;
    fn search(&self, query: &str) -> Vec<User>;
}

/// In-memory store with monotonic id assignment.
pub struct InMemoryUserStore {
    users: DashMap<u64, User>,
    next_id: AtomicU64,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Default for InMemoryUserStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UserStore for InMemoryUserStore {
    fn create(&self, req: CreateUser) -> Result<User, DuplicateUser> {
        let taken = self
            .users
            .iter()
            .any(|u| u.username == req.username || u.email == req.email);
        if taken {
            return Err(DuplicateUser);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = super::now_rfc3339();
        let user = User {
            id,
            username: req.username,
            email: req.email,
            full_name: req.full_name,
            is_active: req.is_active,
            created_at: now.clone(),
            updated_at: now,
        };
        self.users.insert(id, user.clone());
        Ok(user)
    }

    fn get(&self, id: u64) -> Option<User> {
        self.users.get(&id).map(|u| u.clone())
    }

    fn get_by_username(&self, username: &str) -> Option<User> {
        self.users
            .iter()
            .find(|u| u.username == username)
            .map(|u| u.clone())
    }

    fn list(&self, skip: usize, limit: usize) -> Vec<User> {
        let mut all: Vec<User> = self.users.iter().map(|u| u.clone()).collect();
        all.sort_by_key(|u| u.id);
        all.into_iter().skip(skip).take(limit).collect()
    }

    fn update(&self, id: u64, req: UpdateUser) -> Option<User> {
        let mut entry = self.users.get_mut(&id)?;
        if let Some(username) = req.username {
            entry.username = username;
        }
        if let Some(email) = req.email {
            entry.email = email;
        }
        if let Some(full_name) = req.full_name {
            entry.full_name = full_name;
        }
        if let Some(is_active) = req.is_active {
            entry.is_active = is_active;
        }
        entry.updated_at = super::now_rfc3339();
        Some(entry.clone())
    }

    fn delete(&self, id: u64) -> bool {
        self.users.remove(&id).is_some()
    }

    fn search(&self, query: &str) -> Vec<User> {
        let mut hits: Vec<User> = self
            .users
            .iter()
            .filter(|u| {
                u.username.contains(query)
                    || u.email.contains(query)
                    || u.full_name.contains(query)
            })
            .map(|u| u.clone())
            .collect();
        hits.sort_by_key(|u| u.id);
        hits
    }
}

#[derive(Clone)]
pub struct UserServiceState {
    pub store: Arc<dyn UserStore>,
}

impl UserServiceState {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryUserStore::new()),
        }
    }
}

impl Default for UserServiceState {
    fn default() -> Self {
        Self::new()
    }
}

pub async fn handle(
    req: Request<Incoming>,
    state: UserServiceState,
    _peer_addr: SocketAddr,
) -> Result<Response<BoxBody>, hyper::Error> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let resp = match route(req, &state, &method, &path, query.as_deref()).await {
        Ok(r) => r,
        Err(e) => error_json(e.status_code(), &e.to_string()),
    };
    Ok(resp)
}

async fn route(
    req: Request<Incoming>,
    state: &UserServiceState,
    method: &Method,
    path: &str,
    query: Option<&str>,
) -> Result<Response<BoxBody>, GatewayError> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match (method.as_str(), segments.as_slice()) {
        ("GET", []) => Ok(json(&serde_json::json!({
            "message": "DQA User Service",
            "version": env!("CARGO_PKG_VERSION"),
        }))),

        ("GET", ["health"]) => Ok(json(&serde_json::json!({
            "status": "healthy",
            "service": "user-service",
        }))),

        ("POST", ["users"]) => {
            let body: CreateUser = super::read_json(req).await?;
            let user = state.store.create(body).map_err(|DuplicateUser| {
                GatewayError::BadRequest("Username or email already registered".to_string())
            })?;
            info!("user: created, username={}", user.username);
            Ok(json(&user))
        }

        ("GET", ["users"]) => {
            let skip = super::query_param(query, "skip")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            let limit = super::query_param(query, "limit")
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(100);
            Ok(json(&state.store.list(skip, limit)))
        }

        ("GET", ["users", "by-username", username]) => {
            match state.store.get_by_username(username) {
                Some(user) => Ok(json(&user)),
                None => Ok(user_not_found()),
            }
        }

        ("GET", ["users", "search", q]) => Ok(json(&state.store.search(q))),

        ("GET", ["users", id]) => {
            let id = parse_id(id)?;
            match state.store.get(id) {
                Some(user) => Ok(json(&user)),
                None => Ok(user_not_found()),
            }
        }

        ("PUT", ["users", id]) => {
            let id = parse_id(id)?;
            let body: UpdateUser = super::read_json(req).await?;
            match state.store.update(id, body) {
                Some(user) => {
                    info!("user: updated, username={}", user.username);
                    Ok(json(&user))
                }
                None => Ok(user_not_found()),
            }
        }

        ("DELETE", ["users", id]) => {
            let id = parse_id(id)?;
            if state.store.delete(id) {
                info!("user: deleted, id={}", id);
                Ok(json(&serde_json::json!({
                    "message": "User deleted successfully",
                })))
            } else {
                Ok(user_not_found())
            }
        }

        (_, segments) if user_path_is_known(segments) => {
            Err(GatewayError::MethodNotAllowed(method.to_string()))
        }
        _ => Err(GatewayError::RouteNotFound),
    }
}

fn user_path_is_known(segments: &[&str]) -> bool {
    matches!(
        segments,
        [] | ["health"]
            | ["users"]
            | ["users", _]
            | ["users", "by-username", _]
            | ["users", "search", _]
    )
}

fn parse_id(raw: &str) -> Result<u64, GatewayError> {
    raw.parse::<u64>()
        .map_err(|_| GatewayError::BadRequest(format!("invalid user id '{}'", raw)))
}

fn user_not_found() -> Response<BoxBody> {
    error_json(http::StatusCode::NOT_FOUND, "User not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_req(username: &str, email: &str) -> CreateUser {
        CreateUser {
            username: username.to_string(),
            email: email.to_string(),
            full_name: format!("{} surname", username),
            is_active: true,
        }
    }

    #[test]
    fn create_assigns_monotonic_ids() {
        let store = InMemoryUserStore::new();
        let a = store.create(create_req("alice", "alice@example.com")).unwrap();
        let b = store.create(create_req("bob", "bob@example.com")).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
    }

    #[test]
    fn create_rejects_duplicate_username_or_email() {
        let store = InMemoryUserStore::new();
        store.create(create_req("alice", "alice@example.com")).unwrap();

        assert!(store
            .create(create_req("alice", "other@example.com"))
            .is_err());
        assert!(store
            .create(create_req("other", "alice@example.com"))
            .is_err());
    }

    #[test]
    fn get_and_get_by_username() {
        let store = InMemoryUserStore::new();
        let created = store.create(create_req("alice", "alice@example.com")).unwrap();

        assert_eq!(store.get(created.id).unwrap().username, "alice");
        assert_eq!(store.get_by_username("alice").unwrap().id, created.id);
        assert!(store.get(999).is_none());
        assert!(store.get_by_username("nobody").is_none());
    }

    #[test]
    fn list_paginates_in_id_order() {
        let store = InMemoryUserStore::new();
        for i in 0..5 {
            store
                .create(create_req(&format!("u{}", i), &format!("u{}@x.com", i)))
                .unwrap();
        }

        let page = store.list(1, 2);
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].id, 2);
        assert_eq!(page[1].id, 3);
    }

    #[test]
    fn partial_update_changes_only_given_fields() {
        let store = InMemoryUserStore::new();
        let created = store.create(create_req("alice", "alice@example.com")).unwrap();

        let updated = store
            .update(
                created.id,
                UpdateUser {
                    full_name: Some("Alice B".to_string()),
                    is_active: Some(false),
                    ..UpdateUser::default()
                },
            )
            .unwrap();

        assert_eq!(updated.username, "alice");
        assert_eq!(updated.full_name, "Alice B");
        assert!(!updated.is_active);

        assert!(store.update(999, UpdateUser::default()).is_none());
    }

    #[test]
    fn delete_removes_user() {
        let store = InMemoryUserStore::new();
        let created = store.create(create_req("alice", "alice@example.com")).unwrap();

        assert!(store.delete(created.id));
        assert!(!store.delete(created.id));
        assert!(store.get(created.id).is_none());
    }

    #[test]
    fn search_matches_any_field_substring() {
        let store = InMemoryUserStore::new();
        store.create(create_req("alice", "alice@corp.com")).unwrap();
        store.create(create_req("bob", "bob@example.com")).unwrap();

        assert_eq!(store.search("corp").len(), 1);
        assert_eq!(store.search("surname").len(), 2);
        assert!(store.search("nothing").is_empty());
    }
}
