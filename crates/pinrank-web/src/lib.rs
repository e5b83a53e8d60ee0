//! Axum + Askama admin dashboard and JSON API for pinrank.

use std::sync::Arc;

use anyhow::Context;
use askama::Template;
use axum::{
    extract::State,
    http::header,
    middleware,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use pinrank_core::{Domain, ImportLogEntry};
use pinrank_import::{AppConfig, Importer};
use pinrank_store::{PgStore, Store};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod api;
pub mod auth;
mod error;

pub use error::AppError;

pub const CRATE_NAME: &str = "pinrank-web";

const APP_CSS: &str = include_str!("../assets/app.css");
const DASHBOARD_LOG_ROWS: i64 = 10;

#[derive(Debug, Clone)]
pub struct AppState {
    pub importer: Importer,
    /// Shared admin secret; `None` locks every gated route.
    pub admin_key: Option<String>,
}

impl AppState {
    pub fn new(importer: Importer, admin_key: Option<String>) -> Self {
        Self {
            importer,
            admin_key,
        }
    }
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    key_configured: bool,
}

fn format_timestamp(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "never".to_string())
}

#[derive(Debug, Clone)]
struct DomainRow {
    id: i64,
    domain_name: String,
    total_keywords: i32,
    total_recipe_urls: i32,
    last_keywords_import: String,
    last_sitemap_import: String,
}

impl From<Domain> for DomainRow {
    fn from(domain: Domain) -> Self {
        Self {
            id: domain.id,
            domain_name: domain.domain_name,
            total_keywords: domain.total_keywords,
            total_recipe_urls: domain.total_recipe_urls,
            last_keywords_import: format_timestamp(domain.last_keywords_import),
            last_sitemap_import: format_timestamp(domain.last_sitemap_import),
        }
    }
}

#[derive(Debug, Clone)]
struct LogRow {
    domain_name: String,
    import_type: String,
    rows_imported: i32,
    rows_skipped: i32,
    source: String,
    imported_at: String,
}

impl From<ImportLogEntry> for LogRow {
    fn from(entry: ImportLogEntry) -> Self {
        Self {
            domain_name: entry.domain_name.unwrap_or_else(|| "-".to_string()),
            import_type: entry.import_type.as_str().to_string(),
            rows_imported: entry.rows_imported,
            rows_skipped: entry.rows_skipped.unwrap_or(0),
            source: entry.file_name.unwrap_or_else(|| "-".to_string()),
            imported_at: format_timestamp(Some(entry.imported_at)),
        }
    }
}

#[derive(Template)]
#[template(path = "dashboard.html")]
struct DashboardTemplate {
    store_name: String,
    domains: Vec<DomainRow>,
    total_keywords: i64,
    total_urls: i64,
    logs: Vec<LogRow>,
}

pub fn app(state: AppState) -> Router {
    let state = Arc::new(state);

    let gated = Router::new()
        .route("/", get(|| async { Redirect::to("/dashboard") }))
        .route("/dashboard", get(dashboard_handler))
        .route("/api/domains", get(api::list_domains).post(api::create_domain))
        .route("/api/domains/{id}", get(api::get_domain).delete(api::delete_domain))
        .route("/api/domains/{id}/sitemap/fetch", post(api::fetch_sitemap))
        .route("/api/domains/{id}/sitemap/fetch-batch", post(api::fetch_sitemap_batch))
        .route("/api/domains/{id}/sitemap/process", post(api::process_sitemap))
        .route("/api/domains/{id}/keywords/upload", post(api::upload_keywords))
        .route("/api/domains/{id}/keywords/upload-url", post(api::upload_keywords_from_url))
        .route("/api/domains/{id}/slug-analysis", get(api::slug_analysis))
        .route("/api/domains/{id}/keyword-analysis", get(api::keyword_analysis))
        .route("/api/keywords/import-multi", post(api::import_multi))
        .route("/api/keywords/{id}/rankings", get(api::keyword_rankings))
        .route("/api/reports/keyword-coverage", get(api::keyword_coverage))
        .route(
            "/api/settings/stop-words",
            get(api::get_stop_words).post(api::save_stop_words),
        )
        .route("/api/logs", get(api::import_logs))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_admin));

    Router::new()
        .route("/login", get(login_page_handler))
        .route("/api/auth/login", post(auth::login_handler))
        .route("/assets/app.css", get(app_css_handler))
        .merge(gated)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    info!(port, store = state.importer.store().name(), "pinrank web listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// Connects to Postgres, applies migrations and serves on the configured port.
pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = AppConfig::from_env();
    let store = PgStore::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    store.migrate().await.context("failed to run migrations")?;
    let importer = Importer::from_config(Arc::new(store), &config)?;
    serve(AppState::new(importer, config.admin_key.clone()), config.web_port).await
}

async fn login_page_handler(State(state): State<Arc<AppState>>) -> Response {
    render_html(LoginTemplate {
        key_configured: state.admin_key.is_some(),
    })
}

async fn dashboard_handler(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let store = state.importer.store();
    let domains = store.list_domains().await?;
    let logs = store.recent_import_logs(DASHBOARD_LOG_ROWS).await?;

    let total_keywords = domains.iter().map(|d| i64::from(d.total_keywords)).sum();
    let total_urls = domains.iter().map(|d| i64::from(d.total_recipe_urls)).sum();
    Ok(render_html(DashboardTemplate {
        store_name: store.name().to_string(),
        domains: domains.into_iter().map(DomainRow::from).collect(),
        total_keywords,
        total_urls,
        logs: logs.into_iter().map(LogRow::from).collect(),
    }))
}

async fn app_css_handler() -> Response {
    ([(header::CONTENT_TYPE, "text/css; charset=utf-8")], APP_CSS).into_response()
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => AppError::Internal(anyhow::anyhow!(err.to_string())).into_response(),
    }
}
