pub mod accounts;
pub mod api;
pub mod auth;
pub mod cleanup;
pub mod cli;
pub mod contact;
pub mod db;
pub mod jwt;
pub mod rate_limit;

use accounts::LoginIdentifier;
use api::{ApiContext, create_api_router};
use auth::{ClientIpHeader, CookiePolicy, NEW_ACCESS_TOKEN_HEADER};
use axum::{
    Router,
    http::{self, HeaderName, HeaderValue, header},
};
use contact::ContactRelay;
use db::Database;
use jwt::JwtConfig;
use rate_limit::RateLimitConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use url::Url;

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub access_secret: Vec<u8>,
    /// Secret for signing refresh tokens, distinct from the access secret
    pub refresh_secret: Vec<u8>,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// What a login identifier is matched against
    pub login_identifier: LoginIdentifier,
    /// bcrypt cost for new password hashes
    pub password_cost: u32,
    /// Origin allowed to make credentialed cross-origin requests
    pub cors_origin: Option<Url>,
    /// IP extraction strategy (requires running behind a proxy)
    pub ip_header: Option<ClientIpHeader>,
    /// Per-IP limits for login, registration and the contact form
    pub rate_limits: RateLimitConfig,
    /// Where contact form messages go
    pub contact_relay: Arc<dyn ContactRelay>,
}

fn cors_layer(origin: &Url) -> Option<CorsLayer> {
    // Url renders a trailing slash that browsers never send in Origin
    let origin = origin.origin().ascii_serialization();
    let origin = HeaderValue::from_str(&origin).ok()?;

    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods([
                http::Method::GET,
                http::Method::POST,
                http::Method::PUT,
                http::Method::DELETE,
                http::Method::OPTIONS,
            ])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .expose_headers([HeaderName::from_static(NEW_ACCESS_TOKEN_HEADER)])
            .allow_credentials(true),
    )
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::new(&config.access_secret, &config.refresh_secret));

    let api_router = create_api_router(ApiContext {
        db: config.db.clone(),
        jwt,
        cookies: CookiePolicy::new(config.secure_cookies),
        login_identifier: config.login_identifier,
        password_cost: config.password_cost,
        rate_limits: config.rate_limits.clone(),
        ip_header: config.ip_header,
        contact_relay: config.contact_relay.clone(),
    });

    let router = Router::new()
        .nest("/api", api_router)
        .layer(SetResponseHeaderLayer::if_not_present(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ));

    let router = match config.cors_origin.as_ref().and_then(cors_layer) {
        Some(cors) => router.layer(cors),
        None => router,
    };

    router.layer(
        TraceLayer::new_for_http().make_span_with(|request: &http::Request<_>| {
            tracing::info_span!(
                "http-request",
                method = %request.method(),
                uri = %request.uri().path(),
                request_id = %uuid::Uuid::new_v4(),
            )
        }),
    )
}

/// Run cleanup tasks and spawn background scheduler.
/// Call this before starting the server.
pub async fn init_cleanup(config: &ServerConfig) {
    cleanup::run_cleanup(&config.db, &config.rate_limits).await;
    cleanup::spawn_cleanup_scheduler(config.db.clone(), config.rate_limits.clone());
}

/// Run the server on the given listener. This function blocks until the server exits.
/// Call `init_cleanup` before this to run cleanup on startup.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, make_service).await
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    // Run cleanup tasks on startup
    init_cleanup(&config).await;

    let addr = format!("127.0.0.1:{}", port);
    let listener = TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = run_server(config, listener).await {
            tracing::error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}
