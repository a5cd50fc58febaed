use std::convert::Infallible;
use std::sync::Arc;

use askama::Template;
use axum::{
    async_trait,
    extract::{Form, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::PersistencePort;
use crate::loader::FeedLoader;
use crate::pwa::{InstallClients, InstallOutcome};
use crate::render::LOADING_HTML;
use crate::source::split_lines;

/// Everything the handlers share: the loader with its display surface, the
/// URL store and the per-browser install state.
pub struct AppState {
    pub loader: Arc<FeedLoader>,
    pub store: Arc<dyn PersistencePort>,
    pub install: InstallClients,
}

impl AppState {
    pub fn new(loader: Arc<FeedLoader>, store: Arc<dyn PersistencePort>) -> Self {
        Self::with_install_clients(loader, store, InstallClients::default())
    }

    pub fn with_install_clients(
        loader: Arc<FeedLoader>,
        store: Arc<dyn PersistencePort>,
        install: InstallClients,
    ) -> Self {
        Self {
            loader,
            store,
            install,
        }
    }
}

const CLIENT_COOKIE: &str = "reader_client";

/// Identifies a browser for install state. Requests without a valid
/// `reader_client` cookie get a new id, which must be handed back through
/// [`ClientId::cookie_headers`].
#[derive(Debug, Clone)]
pub struct ClientId {
    id: String,
    fresh: bool,
}

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.id
    }

    /// `Set-Cookie` for a newly issued id; empty for a returning client.
    pub fn cookie_headers(&self) -> Result<HeaderMap, AppError> {
        let mut headers = HeaderMap::new();
        if self.fresh {
            let cookie = format!("{}={}; Path=/; HttpOnly; SameSite=Lax", CLIENT_COOKIE, self.id);
            headers.insert(header::SET_COOKIE, HeaderValue::from_str(&cookie)?);
        }
        Ok(headers)
    }

    fn from_headers(headers: &HeaderMap) -> Self {
        let known = headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| parse_cookie(value, CLIENT_COOKIE))
            .and_then(|value| Uuid::parse_str(value).ok());

        match known {
            Some(id) => Self {
                id: id.to_string(),
                fresh: false,
            },
            None => {
                let id = Uuid::new_v4().to_string();
                debug!("Issuing client id {}", id);
                Self { id, fresh: true }
            }
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientId {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}

fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|part| part.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

// Template structs
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub saved_urls: String,
    pub surface: String,
    pub loading: bool,
    pub install_visible: bool,
}

#[derive(Template)]
#[template(path = "feed_box.html")]
pub struct FeedBoxTemplate {
    pub surface: String,
    pub loading: bool,
}

#[derive(Template)]
#[template(path = "install_button.html")]
pub struct InstallButtonTemplate {
    pub install_visible: bool,
}

// Wrapper for HTML responses
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {}", err),
            )
                .into_response(),
        }
    }
}

// Custom error type
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error: {}", self.0),
        )
            .into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError(err.into())
    }
}

pub fn router(state: Arc<AppState>, service_worker: &str) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/feeds", post(load_feeds))
        .route("/feeds/display", get(feed_display))
        .route("/install", post(install_click))
        .route("/install/available", post(install_available))
        .route("/install/choice", post(install_choice))
        .route("/install/button", get(install_button))
        .route("/health", get(health))
        .route_service("/sw.js", ServeFile::new(service_worker))
        .route_service(
            "/manifest.webmanifest",
            ServeFile::new("static/manifest.webmanifest"),
        )
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start-up restore: when a non-empty URL list was saved, load it again.
/// Returns the spawned load so callers can wait for it.
pub async fn restore_saved(state: &AppState) -> anyhow::Result<Option<JoinHandle<()>>> {
    let Some(saved) = state.store.load().await?.filter(|text| !text.is_empty()) else {
        return Ok(None);
    };

    let urls = split_lines(&saved);
    info!("Restoring {} saved lines", urls.len());
    Ok(Some(state.loader.spawn_load(urls)))
}

// Route handlers
pub async fn index(
    State(state): State<Arc<AppState>>,
    client: ClientId,
) -> Result<impl IntoResponse, AppError> {
    let saved_urls = state.store.load().await?.unwrap_or_default();

    Ok((
        client.cookie_headers()?,
        HtmlTemplate(IndexTemplate {
            saved_urls,
            surface: state.loader.surface().snapshot().await,
            loading: state.loader.is_loading(),
            install_visible: state.install.button_visible(client.as_str()).await,
        }),
    ))
}

#[derive(Deserialize)]
pub struct LoadForm {
    #[serde(default)]
    pub urls: String,
}

pub async fn load_feeds(
    State(state): State<Arc<AppState>>,
    Form(form): Form<LoadForm>,
) -> impl IntoResponse {
    state.loader.spawn_load(split_lines(&form.urls));

    if let Err(e) = state.store.save(&form.urls).await {
        error!("Failed to save feed URLs: {}", e);
    }

    // The spawned load may not have reached the surface yet
    HtmlTemplate(FeedBoxTemplate {
        surface: LOADING_HTML.to_string(),
        loading: true,
    })
}

pub async fn feed_display(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    HtmlTemplate(FeedBoxTemplate {
        surface: state.loader.surface().snapshot().await,
        loading: state.loader.is_loading(),
    })
}

pub async fn install_available(
    State(state): State<Arc<AppState>>,
    client: ClientId,
) -> Result<impl IntoResponse, AppError> {
    state.install.on_installable(client.as_str()).await;

    Ok((
        client.cookie_headers()?,
        HtmlTemplate(InstallButtonTemplate {
            install_visible: true,
        }),
    ))
}

/// 202 tells the page to show the native dialog; 204 means this browser
/// has nothing to install.
pub async fn install_click(State(state): State<Arc<AppState>>, client: ClientId) -> StatusCode {
    let Some(install) = state.install.pending(client.as_str()).await else {
        return StatusCode::NO_CONTENT;
    };

    tokio::spawn(async move {
        install.click().await;
    });
    StatusCode::ACCEPTED
}

#[derive(Deserialize)]
pub struct ChoiceForm {
    pub outcome: InstallOutcome,
}

pub async fn install_choice(
    State(state): State<Arc<AppState>>,
    client: ClientId,
    Form(form): Form<ChoiceForm>,
) -> StatusCode {
    if state.install.resolve(client.as_str(), form.outcome).await {
        StatusCode::NO_CONTENT
    } else {
        warn!("Install choice {:?} with no pending prompt", form.outcome);
        StatusCode::CONFLICT
    }
}

pub async fn install_button(
    State(state): State<Arc<AppState>>,
    client: ClientId,
) -> impl IntoResponse {
    HtmlTemplate(InstallButtonTemplate {
        install_visible: state.install.button_visible(client.as_str()).await,
    })
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}
