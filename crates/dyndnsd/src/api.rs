//! Control API
//!
//! Small HTTP surface for operators:
//!
//! - `POST /api/config`: replace the settings from a form submission
//! - `GET /api/config`: current settings
//! - `GET /api/jobs` / `POST /api/jobs`: list and provision sync jobs
//! - `GET /healthz`: liveness
//!
//! Mutating endpoints are admitted through the [`RateGuard`] before the
//! request body is looked at. Proxy headers only identify the caller when
//! the connection comes from a trusted proxy.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::rejection::{FormRejection, JsonRejection};
use axum::extract::{ConnectInfo, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use dyndns_core::config::Settings;
use dyndns_core::traits::{NewSyncJob, SettingsStore, SyncStore};
use dyndns_core::{Error, ProviderRegistry, RateGuard};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared handles for the request handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<dyn SettingsStore>,
    pub store: Arc<dyn SyncStore>,
    pub providers: Arc<ProviderRegistry>,
    pub guard: Arc<RateGuard>,
    /// Peers whose `X-Real-IP` / `X-Forwarded-For` headers are believed
    pub trusted_proxies: Arc<[IpAddr]>,
}

/// Create the control API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/config", get(get_config).post(update_config))
        .route("/api/jobs", get(list_jobs).post(create_job))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn too_many_requests(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            message: message.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_) | Error::UnknownProvider(_) | Error::MalformedParams { .. } => {
                StatusCode::BAD_REQUEST
            }
            Error::RateExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!("Control request failed: {}", err);
        }
        Self {
            status,
            message: err.to_string(),
        }
    }
}

/// Address of the caller, as far as it can be determined
///
/// `None` when the address cannot be determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientAddr(pub Option<IpAddr>);

impl FromRequestParts<AppState> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = ConnectInfo::<SocketAddr>::from_request_parts(parts, state)
            .await
            .ok()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(Self(client_address(
            &parts.headers,
            peer,
            &state.trusted_proxies,
        )))
    }
}

/// Pick the caller address
///
/// When the TCP peer is one of `trusted_proxies`: `X-Real-IP`, then the
/// first valid `X-Forwarded-For` entry, then the peer itself. Any other peer
/// is the caller, whatever its headers say.
pub fn client_address(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trusted_proxies: &[IpAddr],
) -> Option<IpAddr> {
    let peer = peer.map(|addr| addr.to_canonical());
    let behind_proxy = peer.is_some_and(|addr| trusted_proxies.contains(&addr));
    if !behind_proxy {
        return peer;
    }

    let real_ip = headers
        .get_all("x-real-ip")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| value.trim().parse().ok());
    if real_ip.is_some() {
        return real_ip;
    }

    let forwarded = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .find_map(|entry| entry.trim().parse().ok());

    forwarded.or(peer)
}

fn admit(guard: &RateGuard, client: ClientAddr) -> Result<(), ApiError> {
    let Some(source) = client.0 else {
        warn!("Rejecting control request with no identifiable source address");
        return Err(ApiError::too_many_requests(
            "source address could not be determined",
        ));
    };
    guard.admit(source).map_err(|e| {
        info!("Rate limit exceeded for {}", source);
        ApiError::from(e)
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn get_config(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.get())
}

fn settings_from_form(fields: &HashMap<String, String>) -> Result<Settings, ApiError> {
    let field = |name: &str| {
        fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    };

    let port = field("port")
        .ok_or_else(|| ApiError::bad_request("port is required"))?
        .parse::<u16>()
        .map_err(|e| ApiError::bad_request(format!("invalid port: {}", e)))?;

    let interval = field("interval")
        .ok_or_else(|| ApiError::bad_request("interval is required"))?
        .parse::<u64>()
        .map_err(|e| ApiError::bad_request(format!("invalid interval: {}", e)))?;

    let mut settings = Settings::new(port, interval);
    if let Some(resolver) = field("resolver") {
        settings = settings.with_resolver(resolver);
    }
    Ok(settings)
}

async fn update_config(
    State(state): State<AppState>,
    client: ClientAddr,
    headers: HeaderMap,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Result<Redirect, ApiError> {
    admit(&state.guard, client)?;

    let Form(fields) = form.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let settings = settings_from_form(&fields)?;

    state.settings.replace(settings.clone()).await?;
    info!(
        "Settings replaced: port={}, interval={}s, resolver={}",
        settings.port,
        settings.interval,
        settings.resolver.as_deref().unwrap_or("<default>")
    );

    let target = headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or("/");
    Ok(Redirect::temporary(target))
}

/// A job as listed by the API, without its provider parameters
#[derive(Debug, Serialize)]
struct JobView {
    id: u64,
    provider: String,
    domain: String,
    address_id: Option<u64>,
}

async fn list_jobs(State(state): State<AppState>) -> Result<Json<Vec<JobView>>, ApiError> {
    let jobs = state.store.list_jobs().await?;
    Ok(Json(
        jobs.into_iter()
            .map(|job| JobView {
                id: job.id,
                provider: job.provider,
                domain: job.domain,
                address_id: job.address_id,
            })
            .collect(),
    ))
}

#[derive(Serialize)]
struct CreatedJob {
    id: u64,
}

async fn create_job(
    State(state): State<AppState>,
    client: ClientAddr,
    body: Result<Json<NewSyncJob>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedJob>), ApiError> {
    admit(&state.guard, client)?;

    let Json(job) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;

    if job.domain.trim().is_empty() {
        return Err(ApiError::bad_request("domain must not be empty"));
    }
    if !state.providers.has_provider(&job.provider) {
        return Err(Error::unknown_provider(&job.provider).into());
    }

    let created = state.store.create_job(job).await?;
    info!(
        "Provisioned job {} ({} / {})",
        created.id, created.provider, created.domain
    );

    Ok((StatusCode::CREATED, Json(CreatedJob { id: created.id })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::{HeaderValue, Request};
    use dyndns_core::config::RateGuardConfig;
    use dyndns_core::settings::MemorySettingsStore;
    use dyndns_core::store::MemorySyncStore;
    use tower::ServiceExt;

    struct TestApp {
        router: Router,
        settings: Arc<MemorySettingsStore>,
        store: Arc<MemorySyncStore>,
    }

    fn test_app() -> TestApp {
        test_app_with_peer(SocketAddr::from(([192, 0, 2, 10], 40000)))
    }

    /// Router whose connections all come from `peer`; only loopback is a trusted proxy
    fn test_app_with_peer(peer: SocketAddr) -> TestApp {
        let settings = Arc::new(MemorySettingsStore::new(Settings::new(80, 600)));
        let store = Arc::new(MemorySyncStore::new());

        let mut providers = ProviderRegistry::new();
        dyndns_provider_dnsomatic::register(&mut providers).unwrap();

        let state = AppState {
            settings: settings.clone(),
            store: store.clone(),
            providers: Arc::new(providers),
            guard: Arc::new(RateGuard::new(&RateGuardConfig::default()).unwrap()),
            trusted_proxies: Arc::from([IpAddr::from([127, 0, 0, 1])]),
        };

        let router = create_router(state).layer(MockConnectInfo(peer));

        TestApp {
            router,
            settings,
            store,
        }
    }

    fn config_form(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/config")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::REFERER, "/settings")
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_config_update_redirects_and_replaces() {
        let app = test_app();

        let response = app
            .router
            .oneshot(config_form(
                "port=8080&interval=60&resolver=https%3A%2F%2Fip.example.net",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/settings"
        );
        assert_eq!(
            app.settings.get(),
            Settings::new(8080, 60).with_resolver("https://ip.example.net")
        );
    }

    #[tokio::test]
    async fn test_config_update_without_referer_goes_home() {
        let app = test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/api/config")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("port=8080&interval=60&resolver="))
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(response.headers().get(header::LOCATION).unwrap(), "/");
        assert_eq!(app.settings.get().resolver, None);
    }

    #[tokio::test]
    async fn test_config_update_rejects_bad_input() {
        for body in [
            "port=abc&interval=60",
            "port=0&interval=60",
            "port=70000&interval=60",
            "port=8080&interval=5",
            "port=8080&interval=-1",
            "port=8080&interval=31536001",
            "port=8080&interval=18446744073709551615",
            "interval=60",
            "port=8080&interval=60&resolver=ftp%3A%2F%2Fip.example.net",
            "port=8080&interval=60&resolver=not%20a%20url",
        ] {
            let app = test_app();
            let response = app.router.oneshot(config_form(body)).await.unwrap();

            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
            assert_eq!(app.settings.get(), Settings::new(80, 600), "body: {body}");
        }
    }

    #[tokio::test]
    async fn test_ninth_config_update_is_rate_limited() {
        let app = test_app();

        for _ in 0..8 {
            let response = app
                .router
                .clone()
                .oneshot(config_form("port=8080&interval=60"))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        }

        let response = app
            .router
            .clone()
            .oneshot(config_form("port=9090&interval=60"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(app.settings.get().port, 8080);
    }

    fn config_form_from(body: &'static str, real_ip: &str) -> Request<Body> {
        let mut request = config_form(body);
        request
            .headers_mut()
            .insert("x-real-ip", HeaderValue::from_str(real_ip).unwrap());
        request
    }

    #[tokio::test]
    async fn test_rotating_proxy_headers_from_direct_client_share_one_bucket() {
        let app = test_app();

        for i in 0..8 {
            let request = config_form_from("port=8080&interval=60", &format!("198.51.100.{i}"));
            let response = app.router.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        }

        let request = config_form_from("port=8080&interval=60", "198.51.100.200");
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_rate_limit_is_per_client_behind_trusted_proxy() {
        let app = test_app_with_peer(SocketAddr::from(([127, 0, 0, 1], 40000)));

        for _ in 0..8 {
            let request = config_form_from("port=8080&interval=60", "198.51.100.1");
            let response = app.router.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        }

        let request = config_form_from("port=8080&interval=60", "198.51.100.1");
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        // Same proxy, different client
        let request = config_form_from("port=8080&interval=60", "198.51.100.2");
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    }

    #[tokio::test]
    async fn test_get_config() {
        let app = test_app();
        let request = Request::builder()
            .uri("/api/config")
            .body(Body::empty())
            .unwrap();

        let response = app.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["port"], 80);
        assert_eq!(body["interval"], 600);
    }

    #[tokio::test]
    async fn test_create_and_list_jobs() {
        let app = test_app();

        let request = Request::builder()
            .method("POST")
            .uri("/api/jobs")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({
                    "provider": "dnsomatic",
                    "domain": "a.example.com",
                    "params": { "host": "a.example.com", "user": "u", "pass": "secret" }
                })
                .to_string(),
            ))
            .unwrap();
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created = body_json(response).await;
        assert_eq!(created["id"], 1);

        let request = Request::builder()
            .uri("/api/jobs")
            .body(Body::empty())
            .unwrap();
        let response = app.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let listed = body_json(response).await;
        assert_eq!(listed[0]["domain"], "a.example.com");
        assert_eq!(listed[0]["address_id"], serde_json::Value::Null);
        assert!(listed[0].get("params").is_none());
        assert!(!listed.to_string().contains("secret"));
        assert_eq!(app.store.list_jobs().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_job_rejects_unknown_provider_and_empty_domain() {
        for payload in [
            serde_json::json!({ "provider": "nope", "domain": "a.example.com" }),
            serde_json::json!({ "provider": "dnsomatic", "domain": "  " }),
            serde_json::json!({ "domain": "a.example.com" }),
        ] {
            let app = test_app();
            let request = Request::builder()
                .method("POST")
                .uri("/api/jobs")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap();

            let response = app.router.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{payload}");
            assert!(app.store.list_jobs().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_healthz() {
        let app = test_app();
        let request = Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();

        let response = app.router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[test]
    fn test_client_address_precedence() {
        let proxy = IpAddr::from([127, 0, 0, 1]);
        let trusted = [proxy];
        let peer = Some(proxy);

        let mut headers = HeaderMap::new();
        assert_eq!(client_address(&headers, peer, &trusted), peer);
        assert_eq!(client_address(&headers, None, &trusted), None);

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("garbage, 203.0.113.9, 203.0.113.10"),
        );
        assert_eq!(
            client_address(&headers, peer, &trusted),
            Some(IpAddr::from([203, 0, 113, 9]))
        );

        headers.insert("x-real-ip", HeaderValue::from_static("not-an-ip"));
        assert_eq!(
            client_address(&headers, peer, &trusted),
            Some(IpAddr::from([203, 0, 113, 9]))
        );

        headers.insert("x-real-ip", HeaderValue::from_static(" 2001:db8::1 "));
        assert_eq!(
            client_address(&headers, peer, &trusted),
            Some("2001:db8::1".parse().unwrap())
        );
    }

    #[test]
    fn test_client_address_ignores_headers_from_untrusted_peer() {
        let trusted = [IpAddr::from([127, 0, 0, 1])];
        let peer = Some(IpAddr::from([192, 0, 2, 10]));

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.1"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("198.51.100.2"));

        assert_eq!(client_address(&headers, peer, &trusted), peer);
        assert_eq!(client_address(&headers, peer, &[]), peer);
        assert_eq!(client_address(&headers, None, &trusted), None);
    }

    #[test]
    fn test_client_address_matches_mapped_loopback_proxy() {
        let trusted = [IpAddr::from([127, 0, 0, 1])];
        let mapped: IpAddr = "::ffff:127.0.0.1".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.1"));

        assert_eq!(
            client_address(&headers, Some(mapped), &trusted),
            Some(IpAddr::from([198, 51, 100, 1]))
        );
    }
}
