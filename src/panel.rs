//! Panel endpoint: gates reads and writes of the proxy settings.
//!
//! Writes require a valid session and are delegated to the [`DatasetStore`].
//! Reads render the home page, unless the dataset is missing (fatal error
//! page) or a password is set and the caller has no session (login redirect).

use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, error, warn};
use warp::http::header::HOST;
use warp::http::{HeaderMap, Method, StatusCode};
use warp::reply::{Reply, Response};

use crate::auth::Authenticator;
use crate::dataset::{DatasetLookup, DatasetStore};
use crate::render::PageRenderer;
use crate::store::{KvStore, PASSWORD_KEY};

pub const MIN_PASSWORD_LEN: usize = 8;

/// Per-request parameters, built once and passed down explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub origin: String,
}

impl RequestContext {
    /// Uses the configured public origin when there is one, otherwise the request's host.
    pub fn new(public_origin: Option<&str>, headers: &HeaderMap) -> Self {
        if let Some(origin) = public_origin {
            return Self {
                origin: origin.trim_end_matches('/').to_string(),
            };
        }

        let scheme = headers
            .get("x-forwarded-proto")
            .and_then(|v| v.to_str().ok())
            .filter(|v| *v == "https" || *v == "http")
            .unwrap_or("http");
        let host = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("localhost");

        Self {
            origin: format!("{}://{}", scheme, host),
        }
    }

    pub fn login_url(&self) -> String {
        format!("{}/login", self.origin)
    }
}

#[derive(Debug, Clone)]
pub struct PanelRequest {
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub fn is_write_method(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Terminal state of one panel request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelOutcome {
    Unauthorized,
    Updated,
    UpdateFailed { status: StatusCode, message: String },
    ErrorPage { status: StatusCode, html: String },
    RedirectToLogin(String),
    Home(String),
}

impl Reply for PanelOutcome {
    fn into_response(self) -> Response {
        match self {
            PanelOutcome::Unauthorized => {
                warp::reply::with_status("Unauthorized or expired session!", StatusCode::UNAUTHORIZED)
                    .into_response()
            }
            PanelOutcome::Updated => warp::reply::with_status("Success", StatusCode::OK).into_response(),
            PanelOutcome::UpdateFailed { status, message } => {
                warp::reply::with_status(message, status).into_response()
            }
            PanelOutcome::ErrorPage { status, html } => {
                warp::reply::with_status(warp::reply::html(html), status).into_response()
            }
            PanelOutcome::RedirectToLogin(location) => warp::reply::with_header(
                warp::reply::with_status(warp::reply(), StatusCode::FOUND),
                "location",
                location,
            )
            .into_response(),
            PanelOutcome::Home(html) => warp::reply::html(html).into_response(),
        }
    }
}

pub struct PanelController {
    auth: Arc<dyn Authenticator>,
    dataset: Arc<dyn DatasetStore>,
    credentials: Arc<dyn KvStore>,
    renderer: Arc<dyn PageRenderer>,
}

impl PanelController {
    pub fn new(
        auth: Arc<dyn Authenticator>,
        dataset: Arc<dyn DatasetStore>,
        credentials: Arc<dyn KvStore>,
        renderer: Arc<dyn PageRenderer>,
    ) -> Self {
        Self {
            auth,
            dataset,
            credentials,
            renderer,
        }
    }

    pub async fn handle(&self, ctx: &RequestContext, request: &PanelRequest) -> PanelOutcome {
        let authenticated = self.auth.authenticate(&request.headers).await;
        debug!("Panel {} (authenticated: {})", request.method, authenticated);

        if is_write_method(&request.method) {
            self.handle_update(authenticated, &request.body).await
        } else {
            self.handle_render(ctx, authenticated).await
        }
    }

    async fn handle_update(&self, authenticated: bool, body: &[u8]) -> PanelOutcome {
        if !authenticated {
            warn!("Rejected settings update without a valid session");
            return PanelOutcome::Unauthorized;
        }

        match self.dataset.update_dataset(body).await {
            Ok(()) => PanelOutcome::Updated,
            Err(e) => PanelOutcome::UpdateFailed {
                status: e.status(),
                message: e.to_string(),
            },
        }
    }

    async fn handle_render(&self, ctx: &RequestContext, authenticated: bool) -> PanelOutcome {
        let settings = match self.dataset.get_dataset().await {
            Ok(DatasetLookup::Found(settings)) => settings,
            Ok(DatasetLookup::NotFound) => {
                return self.error_page("Proxy settings dataset is not set!", None);
            }
            Err(e) => {
                error!("Failed to load proxy settings: {}", e);
                return self.error_page("Failed to load proxy settings.", Some(&e.to_string()));
            }
        };

        let password = match self.credentials.get(PASSWORD_KEY).await {
            Ok(password) => password.unwrap_or_default(),
            Err(e) => {
                error!("Failed to read panel credential: {}", e);
                return self.error_page("Failed to read panel credential.", Some(&e.to_string()));
            }
        };

        if !password.is_empty() && !authenticated {
            return PanelOutcome::RedirectToLogin(ctx.login_url());
        }

        let is_password_set = password.chars().count() >= MIN_PASSWORD_LEN;
        PanelOutcome::Home(self.renderer.render_home_page(&settings, is_password_set))
    }

    fn error_page(&self, message: &str, cause: Option<&str>) -> PanelOutcome {
        PanelOutcome::ErrorPage {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            html: self.renderer.render_error_page(message, cause, true),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{PanelMetadata, ProxySettings, ProxyTarget};
    use crate::error::DatasetError;
    use crate::render::HtmlRenderer;
    use crate::store::MemoryKvStore;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use warp::http::header::LOCATION;

    struct FixedAuth(bool);

    #[async_trait]
    impl Authenticator for FixedAuth {
        async fn authenticate(&self, _headers: &HeaderMap) -> bool {
            self.0
        }
    }

    struct RecordingDataset {
        settings: Option<ProxySettings>,
        reject_with: Mutex<Option<DatasetError>>,
        updates: AtomicUsize,
        reads: AtomicUsize,
    }

    impl RecordingDataset {
        fn new(settings: Option<ProxySettings>) -> Arc<Self> {
            Arc::new(Self {
                settings,
                reject_with: Mutex::new(None),
                updates: AtomicUsize::new(0),
                reads: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DatasetStore for RecordingDataset {
        async fn get_dataset(&self) -> Result<DatasetLookup, DatasetError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(match &self.settings {
                Some(settings) => DatasetLookup::Found(settings.clone()),
                None => DatasetLookup::NotFound,
            })
        }

        async fn update_dataset(&self, _body: &[u8]) -> Result<(), DatasetError> {
            self.updates.fetch_add(1, Ordering::SeqCst);
            match self.reject_with.lock().unwrap().take() {
                Some(err) => Err(err),
                None => Ok(()),
            }
        }
    }

    fn settings() -> ProxySettings {
        ProxySettings {
            uuid: "3f2b9c1e-8a4d-4c7e-9b1a-2d3e4f5a6b7c".into(),
            targets: vec![ProxyTarget::Address { ip: "198.51.100.4".parse().unwrap() }],
            panel: PanelMetadata {
                version: "0.1.0".into(),
                updated_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            },
        }
    }

    async fn controller(
        authenticated: bool,
        dataset: Arc<RecordingDataset>,
        password: Option<&str>,
    ) -> PanelController {
        let store = Arc::new(MemoryKvStore::new());
        if let Some(password) = password {
            store.set(PASSWORD_KEY, password).await.unwrap();
        }
        PanelController::new(
            Arc::new(FixedAuth(authenticated)),
            dataset,
            store,
            Arc::new(HtmlRenderer),
        )
    }

    fn request(method: Method) -> PanelRequest {
        PanelRequest {
            method,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"{}"),
        }
    }

    fn ctx() -> RequestContext {
        RequestContext {
            origin: "https://panel.example.com".into(),
        }
    }

    #[tokio::test]
    async fn test_write_without_auth_is_rejected_before_dataset() {
        let dataset = RecordingDataset::new(Some(settings()));
        let panel = controller(false, dataset.clone(), Some("password123")).await;

        for method in [Method::POST, Method::PUT, Method::PATCH] {
            let outcome = panel.handle(&ctx(), &request(method)).await;
            assert_eq!(outcome, PanelOutcome::Unauthorized);
        }
        assert_eq!(dataset.updates.load(Ordering::SeqCst), 0);
        assert_eq!(dataset.reads.load(Ordering::SeqCst), 0);

        let response = PanelOutcome::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_authorized_write_updates_dataset() {
        let dataset = RecordingDataset::new(None);
        let panel = controller(true, dataset.clone(), Some("password123")).await;

        let outcome = panel.handle(&ctx(), &request(Method::POST)).await;
        assert_eq!(outcome, PanelOutcome::Updated);
        assert_eq!(dataset.updates.load(Ordering::SeqCst), 1);
        assert_eq!(outcome.into_response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_failed_update_maps_to_status() {
        let dataset = RecordingDataset::new(None);
        *dataset.reject_with.lock().unwrap() = Some(DatasetError::Validation("bad target".into()));
        let panel = controller(true, dataset.clone(), None).await;

        let outcome = panel.handle(&ctx(), &request(Method::POST)).await;
        assert_eq!(
            outcome,
            PanelOutcome::UpdateFailed {
                status: StatusCode::BAD_REQUEST,
                message: "invalid settings: bad target".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_missing_dataset_renders_error_regardless_of_auth() {
        for authenticated in [true, false] {
            for password in [None, Some("password123")] {
                let dataset = RecordingDataset::new(None);
                let panel = controller(authenticated, dataset, password).await;

                let outcome = panel.handle(&ctx(), &request(Method::GET)).await;
                match outcome {
                    PanelOutcome::ErrorPage { status, html } => {
                        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                        assert!(html.contains("dataset is not set"));
                    }
                    other => panic!("expected error page, got {:?}", other),
                }
            }
        }
    }

    #[tokio::test]
    async fn test_unauthenticated_read_with_password_redirects() {
        let dataset = RecordingDataset::new(Some(settings()));
        let panel = controller(false, dataset, Some("password123")).await;

        let outcome = panel.handle(&ctx(), &request(Method::GET)).await;
        assert_eq!(
            outcome,
            PanelOutcome::RedirectToLogin("https://panel.example.com/login".into())
        );

        let response = outcome.into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(LOCATION).unwrap(),
            "https://panel.example.com/login"
        );
    }

    #[tokio::test]
    async fn test_read_without_password_renders_home() {
        let dataset = RecordingDataset::new(Some(settings()));
        let panel = controller(false, dataset, None).await;

        let PanelOutcome::Home(html) = panel.handle(&ctx(), &request(Method::GET)).await else {
            panic!("expected home page");
        };
        assert!(html.contains("198.51.100.4"));
        assert!(html.contains("No panel password is set"));
    }

    #[tokio::test]
    async fn test_short_password_counts_as_unset() {
        let dataset = RecordingDataset::new(Some(settings()));
        let panel = controller(true, dataset, Some("short")).await;

        let PanelOutcome::Home(html) = panel.handle(&ctx(), &request(Method::GET)).await else {
            panic!("expected home page");
        };
        assert!(html.contains("No panel password is set"));
    }

    #[tokio::test]
    async fn test_read_is_idempotent() {
        let dataset = RecordingDataset::new(Some(settings()));
        let panel = controller(true, dataset.clone(), Some("password123")).await;

        let first = panel.handle(&ctx(), &request(Method::GET)).await;
        let second = panel.handle(&ctx(), &request(Method::GET)).await;
        assert!(matches!(first, PanelOutcome::Home(_)));
        assert_eq!(first, second);
        assert_eq!(dataset.updates.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_request_context_origin() {
        let mut headers = HeaderMap::new();
        assert_eq!(RequestContext::new(None, &headers).origin, "http://localhost");

        headers.insert(HOST, "panel.example.com:8443".parse().unwrap());
        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        assert_eq!(
            RequestContext::new(None, &headers).login_url(),
            "https://panel.example.com:8443/login"
        );

        let ctx = RequestContext::new(Some("https://edge.example.org/"), &headers);
        assert_eq!(ctx.origin, "https://edge.example.org");
    }

    #[test]
    fn test_write_methods() {
        assert!(is_write_method(&Method::POST));
        assert!(is_write_method(&Method::PUT));
        assert!(is_write_method(&Method::PATCH));
        assert!(!is_write_method(&Method::GET));
        assert!(!is_write_method(&Method::HEAD));
    }
}
