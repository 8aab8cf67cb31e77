use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sqlgrid::config::GridConfig;
use sqlgrid::demo::{demo_table, seed_demo};
use sqlgrid::infra::forms::plain::PlainFormRenderer;
use sqlgrid::infra::sqlite::engine::SqliteEngine;
use sqlgrid::infra::sqlite::schema::init_db;
use sqlgrid::infra::sqlite::selection_store::SqliteSelectionStore;
use sqlgrid::platform::blocking::run_blocking;
use sqlgrid::wire::envelope::Envelope;
use sqlgrid::{Dispatcher, GridResponse};

const SESSION_COOKIE: &str = "sqlgrid_session";

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    privileged: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = GridConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .init();

    init_db(&config.db_path)?;
    seed_demo(&config.db_path)?;
    let table = demo_table(config.default_page_size).context("demo table definition is invalid")?;

    let dispatcher = Dispatcher::new(
        Arc::new(table),
        Arc::new(SqliteEngine::new(&config.db_path)),
        Arc::new(SqliteSelectionStore::new(&config.db_path)),
        Arc::new(PlainFormRenderer),
        config.dispatch_settings(),
    );
    let state = AppState {
        dispatcher: Arc::new(dispatcher),
        privileged: config.expose_traces,
    };

    let app = Router::new()
        .route("/grid", get(grid_get).post(grid_post))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, db = %config.db_path.display(), "sqlgrid listening");
    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn grid_get(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    handle_grid(state, &headers, params).await
}

/// Form fields override query parameters of the same name.
async fn grid_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(mut params): Query<HashMap<String, String>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    params.extend(form);
    handle_grid(state, &headers, params).await
}

async fn handle_grid(state: AppState, headers: &HeaderMap, params: HashMap<String, String>) -> Response {
    let (session, new_session) = match session_id(headers, &params) {
        Some(session) => (session, false),
        None => (uuid::Uuid::new_v4().to_string(), true),
    };

    let dispatcher = state.dispatcher.clone();
    let privileged = state.privileged;
    let session_for_task = session.clone();
    let response = match run_blocking(move || dispatcher.respond(&session_for_task, &params, privileged)).await {
        Ok(response) => response,
        Err(err) => GridResponse::Json(Envelope::from_error(&err, privileged)),
    };

    let mut http = match response {
        GridResponse::Json(envelope) => Json(envelope).into_response(),
        GridResponse::Csv { filename, body } => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{filename}\""),
                ),
            ],
            body,
        )
            .into_response(),
    };

    let headers = http.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, must-revalidate, max-age=0"),
    );
    if new_session {
        let cookie = format!("{SESSION_COOKIE}={session}; Path=/; HttpOnly; SameSite=Lax");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.insert(header::SET_COOKIE, value);
        }
    }
    http
}

/// The session cookie, or an explicit `session` parameter for clients without cookies.
fn session_id(headers: &HeaderMap, params: &HashMap<String, String>) -> Option<String> {
    let from_cookie = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().strip_prefix(SESSION_COOKIE)?.strip_prefix('='))
        .find(|value| !value.is_empty())
        .map(str::to_string);

    from_cookie.or_else(|| {
        params
            .get("session")
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_comes_from_cookie_before_param() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; sqlgrid_session=abc123"),
        );
        let mut params = HashMap::new();
        params.insert("session".to_string(), "from-param".to_string());

        assert_eq!(session_id(&headers, &params).as_deref(), Some("abc123"));
        assert_eq!(
            session_id(&HeaderMap::new(), &params).as_deref(),
            Some("from-param")
        );
        assert_eq!(session_id(&HeaderMap::new(), &HashMap::new()), None);
    }
}
