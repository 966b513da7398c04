#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use fabula::config::Config;
use fabula::db;
use fabula::models::{ApiKey, ModelError, StoryModel};
use fabula::routes;
use fabula::state::AppState;

pub const VALID_KEY: &str = "sk-valid";

/// Scripted stand-in for the provider. Captions echo the image bytes,
/// stories are numbered so every generation differs, speech returns the text.
#[derive(Default)]
pub struct FakeModel {
    pub failure: Mutex<Option<ModelError>>,
    pub captions: AtomicUsize,
    pub stories: AtomicUsize,
    pub speeches: AtomicUsize,
}

impl FakeModel {
    pub fn fail_with(&self, error: ModelError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    fn check(&self) -> Result<(), ModelError> {
        match self.failure.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn speech_count(&self) -> usize {
        self.speeches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoryModel for FakeModel {
    fn provider_name(&self) -> &'static str {
        "fake"
    }

    async fn caption(&self, _key: &ApiKey, image: &[u8], _mime: &str) -> Result<String, ModelError> {
        self.captions.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        Ok(format!("caption of {}", String::from_utf8_lossy(image)))
    }

    async fn narrate(&self, _key: &ApiKey, captions: &[String]) -> Result<String, ModelError> {
        self.check()?;
        let n = self.stories.fetch_add(1, Ordering::SeqCst);
        Ok(format!("Story #{}: {}", n, captions.join(", ")))
    }

    async fn improve(
        &self,
        _key: &ApiKey,
        current: &str,
        _captions: &[String],
        instruction: &str,
    ) -> Result<String, ModelError> {
        self.check()?;
        Ok(format!("{} [{}]", current, instruction))
    }

    async fn speak(&self, _key: &ApiKey, text: &str) -> Result<Bytes, ModelError> {
        self.check()?;
        self.speeches.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from(format!("ID3 {}", text)))
    }

    async fn verify_key(&self, key: &ApiKey) -> Result<(), ModelError> {
        if key.expose() == VALID_KEY {
            Ok(())
        } else {
            Err(ModelError::CredentialInvalid)
        }
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub model: Arc<FakeModel>,
    _tmp: TempDir,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
    pub raw: Bytes,
}

impl TestResponse {
    /// The `name=value` part of the session cookie, if one was set.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with("fabula_session="))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }
}

/// Build the app against a fresh temporary database and uploads directory.
pub fn build_test_app() -> TestApp {
    build_test_app_with(|_| {})
}

/// Like [`build_test_app`], with a hook to adjust the config first.
pub fn build_test_app_with(configure: impl FnOnce(&mut Config)) -> TestApp {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.auth.bcrypt_cost = 4;
    config.uploads.max_images = 3;
    configure(&mut config);
    config.resolve_paths(tmp.path());

    let pool = db::create_pool(&config.db_path()).expect("Failed to create test database");
    db::run_migrations(&pool).expect("Failed to run migrations");

    let model = Arc::new(FakeModel::default());
    let state = AppState::new(pool, config, model.clone());
    let router = routes::app(state.clone());

    TestApp {
        router,
        state,
        model,
        _tmp: tmp,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let raw = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&raw).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            body,
            raw,
        }
    }

    pub async fn json(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        cookie: Option<&str>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> TestResponse {
        self.json(Method::GET, uri, None, cookie).await
    }

    pub async fn post(&self, uri: &str, body: Value, cookie: Option<&str>) -> TestResponse {
        self.json(Method::POST, uri, Some(body), cookie).await
    }

    /// Register and log in; returns the session cookie.
    pub async fn login_as(&self, email: &str) -> String {
        let registered = self
            .post(
                "/api/auth/register",
                serde_json::json!({ "email": email, "password": "secret-pw", "name": "Tester" }),
                None,
            )
            .await;
        assert_eq!(registered.status, StatusCode::CREATED, "{:?}", registered.body);

        let login = self
            .post(
                "/api/auth/login",
                serde_json::json!({ "email": email, "password": "secret-pw" }),
                None,
            )
            .await;
        assert_eq!(login.status, StatusCode::OK, "{:?}", login.body);
        login.session_cookie().expect("login sets a session cookie")
    }

    /// Log in and store a provider key.
    pub async fn login_with_key(&self, email: &str) -> String {
        let cookie = self.login_as(email).await;
        let stored = self
            .post(
                "/api/dalle-api-key",
                serde_json::json!({ "dalleApiKey": VALID_KEY }),
                Some(&cookie),
            )
            .await;
        assert_eq!(stored.status, StatusCode::OK);
        cookie
    }

    pub async fn upload(
        &self,
        title: &str,
        images: &[(&str, &[u8])],
        cookie: Option<&str>,
    ) -> TestResponse {
        let (content_type, body) = multipart_body(title, images);
        let mut builder = Request::builder()
            .method(Method::POST)
            .uri("/api/stories")
            .header(header::CONTENT_TYPE, content_type);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    pub fn story_count(&self) -> i64 {
        self.state
            .db
            .get()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM stories", [], |row| row.get(0))
            .unwrap()
    }
}

/// Encode a `multipart/form-data` body with a title and image files.
pub fn multipart_body(title: &str, images: &[(&str, &[u8])]) -> (String, Vec<u8>) {
    let boundary = "fabula-test-boundary";
    let mut body = Vec::new();

    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"title\"\r\n\r\n{}\r\n",
            boundary, title
        )
        .as_bytes(),
    );
    for (name, bytes) in images {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"images\"; filename=\"{}\"\r\nContent-Type: image/png\r\n\r\n",
                boundary, name
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    (format!("multipart/form-data; boundary={}", boundary), body)
}
