use bytes::Bytes;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, warn};
use warp::http::{HeaderMap, Method, StatusCode};
use warp::{Filter, Reply};

use crate::auth::{session_cookie, Authenticator, SessionAuthenticator};
use crate::config::Config;
use crate::dataset::KvDataset;
use crate::dns::{DnsResolver, HttpFetch};
use crate::geo::GeoLocator;
use crate::panel::{PanelController, PanelRequest, RequestContext};
use crate::render::{HtmlRenderer, PageRenderer};
use crate::store::KvStore;
use crate::validation::is_domain;

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveRequest {
    pub domain: String,
}

/// Everything the routes share. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    public_origin: Option<String>,
    auth: Arc<SessionAuthenticator>,
    panel: Arc<PanelController>,
    resolver: Arc<DnsResolver>,
    geo: Arc<GeoLocator>,
    renderer: Arc<dyn PageRenderer>,
}

impl AppState {
    pub fn new(
        config: &Config,
        store: Arc<dyn KvStore>,
        fetch: Arc<dyn HttpFetch>,
    ) -> anyhow::Result<Self> {
        let resolver = Arc::new(DnsResolver::new(&config.doh_endpoint, fetch.clone())?);
        let geo = Arc::new(GeoLocator::new(&config.geo_endpoint, fetch)?);
        let auth = Arc::new(SessionAuthenticator::new(store.clone()));
        let renderer: Arc<dyn PageRenderer> = Arc::new(HtmlRenderer);
        let dataset = Arc::new(KvDataset::new(store.clone(), resolver.clone()));
        let panel = Arc::new(PanelController::new(
            auth.clone(),
            dataset,
            store,
            renderer.clone(),
        ));

        Ok(Self {
            public_origin: config.public_origin.clone(),
            auth,
            panel,
            resolver,
            geo,
            renderer,
        })
    }
}

pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = warp::Rejection> + Clone {
    let with_state = warp::any().map(move || state.clone());

    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({
            "status": "healthy",
            "service": "edge-panel"
        })));

    let root = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({
            "service": "edge-panel",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": ["/health", "/panel", "/login", "/my-ip", "/api/dns/resolve"]
        })));

    let panel = warp::path("panel")
        .and(warp::path::end())
        .and(warp::method())
        .and(warp::header::headers_cloned())
        .and(warp::body::bytes())
        .and(with_state.clone())
        .and_then(handle_panel);

    let login_page = warp::path("login")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_state.clone())
        .map(|state: AppState| warp::reply::html(state.renderer.render_login_page()));

    let login = warp::path("login")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::bytes())
        .and(with_state.clone())
        .and_then(handle_login);

    let my_ip = warp::path("my-ip")
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::body::bytes())
        .and(with_state.clone())
        .and_then(handle_my_ip);

    let dns_resolve = warp::path("api")
        .and(warp::path("dns"))
        .and(warp::path("resolve"))
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::header::headers_cloned())
        .and(warp::body::json())
        .and(with_state)
        .and_then(handle_dns_resolve);

    health
        .or(root)
        .or(panel)
        .or(login_page)
        .or(login)
        .or(my_ip)
        .or(dns_resolve)
        .with(warp::trace::request())
}

async fn handle_panel(
    method: Method,
    headers: HeaderMap,
    body: Bytes,
    state: AppState,
) -> Result<impl Reply, warp::Rejection> {
    let ctx = RequestContext::new(state.public_origin.as_deref(), &headers);
    let request = PanelRequest {
        method,
        headers,
        body,
    };

    Ok(state.panel.handle(&ctx, &request).await)
}

async fn handle_login(body: Bytes, state: AppState) -> Result<impl Reply, warp::Rejection> {
    let password = String::from_utf8_lossy(&body);

    let response = match state.auth.login(&password).await {
        Ok(Some(token)) => warp::reply::with_header(
            warp::reply::with_status("Success", StatusCode::OK),
            "set-cookie",
            session_cookie(&token),
        )
        .into_response(),
        Ok(None) => {
            warp::reply::with_status("Wrong password!", StatusCode::UNAUTHORIZED).into_response()
        }
        Err(e) => {
            error!("Login failed: {}", e);
            warp::reply::with_status("Login unavailable", StatusCode::INTERNAL_SERVER_ERROR)
                .into_response()
        }
    };

    Ok(response)
}

async fn handle_my_ip(body: Bytes, state: AppState) -> Result<impl Reply, warp::Rejection> {
    let address = String::from_utf8_lossy(&body);

    let response = match state.geo.lookup(&address).await {
        Ok(geo_location) => warp::reply::with_header(
            geo_location.to_string(),
            "content-type",
            "text/plain;charset=utf-8",
        )
        .into_response(),
        Err(e) => warp::reply::with_status(
            warp::reply::json(&serde_json::json!({ "error": e.to_string() })),
            e.status(),
        )
        .into_response(),
    };

    Ok(response)
}

async fn handle_dns_resolve(
    headers: HeaderMap,
    request: ResolveRequest,
    state: AppState,
) -> Result<impl Reply, warp::Rejection> {
    if !state.auth.authenticate(&headers).await {
        return Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({
                "error": "Unauthorized or expired session!"
            })),
            StatusCode::UNAUTHORIZED,
        ));
    }

    let domain = request.domain.trim();
    if !is_domain(domain) {
        warn!("Refusing to resolve {:?}", domain);
        return Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({
                "error": "Not a valid domain name"
            })),
            StatusCode::BAD_REQUEST,
        ));
    }

    match state.resolver.resolve(domain).await {
        Ok(result) => Ok(warp::reply::with_status(
            warp::reply::json(&result),
            StatusCode::OK,
        )),
        Err(e) => Ok(warp::reply::with_status(
            warp::reply::json(&serde_json::json!({
                "error": e.to_string()
            })),
            StatusCode::BAD_GATEWAY,
        )),
    }
}
