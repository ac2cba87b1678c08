//! Shared fixtures: an in-memory database and a full router backed by a
//! temporary media directory.

use std::str::FromStr;
use std::sync::Arc;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::{
    app::build_app,
    config::{AppConfig, JwtConfig, StorageConfig},
    db,
    state::AppState,
    storage::LocalStorage,
    users::{jwt::JwtKeys, repo_types::User, services},
};

pub const TEST_PASSWORD: &str = "test123";
const BOUNDARY: &str = "recipe-api-test-boundary";

/// One connection that lives as long as the pool, so the in-memory
/// database survives between queries.
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let db = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    db::migrate(&db).await.unwrap();
    db
}

pub async fn seed_user(db: &SqlitePool, email: &str) -> User {
    services::create_user(db, email, TEST_PASSWORD, "Test name")
        .await
        .unwrap()
}

pub fn test_config(media_root: &std::path::Path) -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        jwt: JwtConfig {
            secret: "test-secret".into(),
            issuer: "recipe-api".into(),
            audience: "recipe-api-users".into(),
            ttl_minutes: 60,
        },
        storage: StorageConfig::Local {
            root: media_root.to_path_buf(),
            url_prefix: "/media".into(),
        },
        max_upload_bytes: 1024 * 1024,
    }
}

pub struct TestApp {
    pub router: Router,
    pub db: SqlitePool,
    pub storage: LocalStorage,
    pub config: Arc<AppConfig>,
    _media: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        let media = tempfile::tempdir().unwrap();
        let db = test_pool().await;
        let config = Arc::new(test_config(media.path()));
        let storage = LocalStorage::new(media.path().to_path_buf(), "/media".into());
        let state = AppState::from_parts(db.clone(), config.clone(), Arc::new(storage.clone()));

        Self {
            router: build_app(state),
            db,
            storage,
            config,
            _media: media,
        }
    }

    pub fn token_for(&self, user: &User) -> String {
        JwtKeys::from(&self.config.jwt).sign(user.id).unwrap()
    }

    /// Seeds a user and returns it with a valid bearer token.
    pub async fn user(&self, email: &str) -> (User, String) {
        let user = seed_user(&self.db, email).await;
        let token = self.token_for(&user);
        (user, token)
    }

    pub async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, body)
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap())),
            None => req.body(Body::empty()),
        }
        .unwrap();
        self.send(req).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.json(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.json(Method::POST, uri, token, Some(body)).await
    }

    /// Posts one multipart file field.
    pub async fn upload(
        &self,
        uri: &str,
        token: &str,
        field: &str,
        file_name: &str,
        bytes: &[u8],
    ) -> (StatusCode, Value) {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        let req = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(req).await
    }
}
