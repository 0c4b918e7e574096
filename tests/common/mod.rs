#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    Extension,
    extract::ConnectInfo,
    http::{Request, Response, header},
};
use oakshelf::{
    ServerConfig,
    accounts::LoginIdentifier,
    auth::ClientIpHeader,
    contact::{ContactMessage, ContactRelay, RelayError},
    create_app,
    db::Database,
    jwt::JwtConfig,
    rate_limit::RateLimitConfig,
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use url::Url;

pub const ACCESS_SECRET: &[u8] = b"test-access-secret-0123456789abcdef";
pub const REFRESH_SECRET: &[u8] = b"test-refresh-secret-0123456789abcdef";
pub const PASSWORD: &str = "correct horse battery";

/// Contact relay that keeps messages in memory and can be told to fail.
#[derive(Default)]
pub struct RecordingRelay {
    pub messages: Mutex<Vec<ContactMessage>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl ContactRelay for RecordingRelay {
    async fn send(&self, message: &ContactMessage) -> Result<(), RelayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RelayError {
                message: "smtp unavailable".to_string(),
            });
        }
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub struct TestApp {
    pub app: Router,
    pub db: Database,
    pub jwt: JwtConfig,
    pub relay: Arc<RecordingRelay>,
}

pub struct TestOptions {
    pub login_identifier: LoginIdentifier,
    pub rate_limits: RateLimitConfig,
    pub cors_origin: Option<Url>,
    pub ip_header: Option<ClientIpHeader>,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            login_identifier: LoginIdentifier::Email,
            rate_limits: RateLimitConfig::relaxed(),
            cors_origin: None,
            ip_header: None,
        }
    }
}

pub async fn create_test_app() -> TestApp {
    create_test_app_with(TestOptions::default()).await
}

pub async fn create_test_app_with(options: TestOptions) -> TestApp {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let relay = Arc::new(RecordingRelay::default());

    let config = ServerConfig {
        db: db.clone(),
        access_secret: ACCESS_SECRET.to_vec(),
        refresh_secret: REFRESH_SECRET.to_vec(),
        secure_cookies: false,
        login_identifier: options.login_identifier,
        password_cost: 4,
        cors_origin: options.cors_origin,
        ip_header: options.ip_header,
        rate_limits: options.rate_limits,
        contact_relay: relay.clone(),
    };

    let app = create_app(&config).layer(Extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000)))));

    TestApp {
        app,
        db,
        jwt: JwtConfig::new(ACCESS_SECRET, REFRESH_SECRET),
        relay,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.app.clone().oneshot(request).await.unwrap()
    }

    pub async fn register(&self, user_name: &str, email: &str) -> Response<Body> {
        self.send(json_request(
            "POST",
            "/api/auth/register",
            json!({ "userName": user_name, "email": email, "password": PASSWORD }),
        ))
        .await
    }

    /// Log in and return the session. Panics if login fails.
    pub async fn login(&self, identifier: &str) -> Session {
        let response = self
            .send(json_request(
                "POST",
                "/api/auth/login",
                json!({ "identifier": identifier, "password": PASSWORD }),
            ))
            .await;
        assert_eq!(response.status(), 200, "login failed for {}", identifier);

        let refresh_token = refresh_cookie(&response).expect("login sets refresh cookie");
        let body = body_json(response).await;
        Session {
            access_token: body["accessToken"].as_str().unwrap().to_string(),
            refresh_token,
            user: body["user"].clone(),
        }
    }

    /// Register and log in a user named `user_name`.
    pub async fn signup(&self, user_name: &str) -> Session {
        let email = format!("{}@example.com", user_name);
        let response = self.register(user_name, &email).await;
        assert_eq!(response.status(), 201);
        self.login(&email).await
    }

    /// Stored refresh token of a user, by public id.
    pub async fn stored_refresh_token(&self, user_id: &str) -> Option<String> {
        self.db
            .users()
            .get_by_uuid(user_id)
            .await
            .unwrap()
            .unwrap()
            .refresh_token
    }
}

pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: Value,
}

impl Session {
    pub fn user_id(&self) -> &str {
        self.user["id"].as_str().unwrap()
    }
}

pub fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Request builder with optional bearer token and refresh cookie.
pub fn authed(
    method: &str,
    uri: &str,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
) -> axum::http::request::Builder {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = access_token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    if let Some(token) = refresh_token {
        builder = builder.header(header::COOKIE, format!("refreshToken={}", token));
    }
    builder
}

pub fn authed_json(
    method: &str,
    uri: &str,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
    body: Value,
) -> Request<Body> {
    authed(method, uri, access_token, refresh_token)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn authed_empty(
    method: &str,
    uri: &str,
    access_token: Option<&str>,
    refresh_token: Option<&str>,
) -> Request<Body> {
    authed(method, uri, access_token, refresh_token)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let body = body_bytes(response).await;
    serde_json::from_slice(&body).unwrap()
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Value of the refreshToken cookie set by a response, if any (empty when cleared).
pub fn refresh_cookie(response: &Response<Body>) -> Option<String> {
    set_cookies(response).into_iter().find_map(|cookie| {
        let value = cookie.strip_prefix("refreshToken=")?;
        Some(value.split(';').next().unwrap_or_default().to_string())
    })
}

pub fn new_access_token(response: &Response<Body>) -> Option<String> {
    response
        .headers()
        .get("x-new-access-token")
        .map(|v| v.to_str().unwrap().to_string())
}

/// Build a single-field multipart body. Returns the content type and the body.
pub fn multipart_body(
    field: &str,
    file_name: &str,
    content_type: &str,
    data: &[u8],
) -> (String, Vec<u8>) {
    let boundary = "oakshelf-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, file_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    (format!("multipart/form-data; boundary={}", boundary), body)
}

pub fn sample_product() -> Value {
    json!({
        "title": "Walnut dining table",
        "price": "1299.90",
        "description": "Seats six",
        "category": "dining table"
    })
}
