//! JSON API handlers. Every handler returns `Result<_, AppError>`; body and
//! query extraction failures are reported through it as well.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::{Multipart, WithRejection};
use pinrank_core::{
    Domain, DomainId, ImportLogEntry, KeywordRankingDetail, NewDomain, Pagination, StopWordSettings,
};
use pinrank_import::{ChildSitemapBatch, KeywordImportSummary, MultiTabSummary, SlugAnalysis};
use pinrank_sources::{ParsedSitemap, SitemapEntry};
use pinrank_store::Store;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use crate::{AppError, AppState};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;
pub const LOG_LIMIT: i64 = 50;

type ApiResult<T> = Result<T, AppError>;

pub(crate) fn parse_id(raw: &str) -> ApiResult<i64> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::BadRequest("Invalid ID".to_string()))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDomainRequest {
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub pinclicks_account_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UrlRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UrlListRequest {
    #[serde(default)]
    pub urls: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessSitemapRequest {
    #[serde(default)]
    pub urls: Option<Vec<SitemapEntry>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub success: bool,
    pub count: u64,
    pub skipped: usize,
    pub urls_created: u64,
}

impl From<KeywordImportSummary> for ImportResponse {
    fn from(summary: KeywordImportSummary) -> Self {
        Self {
            success: true,
            count: summary.count,
            skipped: summary.skipped,
            urls_created: summary.urls_created,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MultiImportResponse {
    pub success: bool,
    #[serde(flatten)]
    pub summary: MultiTabSummary,
}

pub async fn list_domains(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<Domain>>> {
    Ok(Json(state.importer.store().list_domains().await?))
}

pub async fn create_domain(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(body), _): WithRejection<Json<CreateDomainRequest>, AppError>,
) -> ApiResult<impl IntoResponse> {
    let name = body.domain_name.unwrap_or_default();
    let new_domain = NewDomain::from_input(&name, body.pinclicks_account_url);
    if new_domain.domain_name.is_empty() {
        return Err(AppError::BadRequest("Domain name is required".to_string()));
    }
    let domain = state.importer.store().create_domain(&new_domain).await?;
    info!(domain_id = domain.id, domain = %domain.domain_name, "domain created");
    Ok((StatusCode::CREATED, Json(domain)))
}

pub async fn get_domain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Domain>> {
    let id = parse_id(&id)?;
    Ok(Json(state.importer.require_domain(id).await?))
}

pub async fn delete_domain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    if !state.importer.store().delete_domain(id).await? {
        return Err(AppError::NotFound("Domain not found".to_string()));
    }
    info!(domain_id = id, "domain deleted");
    Ok(Json(json!({ "success": true })))
}

pub async fn fetch_sitemap(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<UrlRequest>, AppError>,
) -> ApiResult<Json<ParsedSitemap>> {
    let id = parse_id(&id)?;
    let url = body.url.unwrap_or_default();
    Ok(Json(state.importer.fetch_domain_sitemap(id, &url).await?))
}

pub async fn fetch_sitemap_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<UrlListRequest>, AppError>,
) -> ApiResult<Json<ChildSitemapBatch>> {
    let id = parse_id(&id)?;
    Ok(Json(state.importer.fetch_child_sitemaps(id, &body.urls).await?))
}

pub async fn process_sitemap(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<ProcessSitemapRequest>, AppError>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    let Some(entries) = body.urls else {
        return Err(AppError::BadRequest("Valid URLs array is required".to_string()));
    };
    let summary = state.importer.ingest_sitemap_entries(id, &entries).await?;
    Ok(Json(json!({
        "success": true,
        "added": summary.added,
        "skipped": summary.skipped,
        "totalUrls": summary.total_urls,
    })))
}

pub async fn upload_keywords(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> ApiResult<Json<ImportResponse>> {
    let id = parse_id(&id)?;
    let mut upload: Option<(String, String)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::BadRequest(format!("Invalid upload: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload.csv").to_string();
        let text = field
            .text()
            .await
            .map_err(|err| AppError::BadRequest(format!("Invalid upload: {err}")))?;
        upload = Some((file_name, text));
    }

    let Some((file_name, text)) = upload else {
        return Err(AppError::BadRequest("No file uploaded".to_string()));
    };
    let summary = state.importer.import_csv_text(id, &text, &file_name).await?;
    Ok(Json(summary.into()))
}

pub async fn upload_keywords_from_url(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): WithRejection<Json<UrlRequest>, AppError>,
) -> ApiResult<Json<ImportResponse>> {
    let id = parse_id(&id)?;
    let url = body.url.unwrap_or_default();
    let summary = state.importer.import_sheet_url(id, &url).await?;
    Ok(Json(summary.into()))
}

pub async fn import_multi(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(body), _): WithRejection<Json<UrlRequest>, AppError>,
) -> ApiResult<Json<MultiImportResponse>> {
    let url = body.url.unwrap_or_default();
    let summary = state.importer.import_multi_tab(&url).await?;
    Ok(Json(MultiImportResponse {
        success: true,
        summary,
    }))
}

pub async fn keyword_rankings(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<KeywordRankingDetail>>> {
    let id = parse_id(&id)?;
    Ok(Json(state.importer.store().keyword_rankings(id).await?))
}

pub async fn slug_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<SlugAnalysis>> {
    let id = parse_id(&id)?;
    Ok(Json(state.importer.analyze_domain_slugs(id).await?))
}

pub async fn keyword_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id: DomainId = parse_id(&id)?;
    state.importer.require_domain(id).await?;
    let store = state.importer.store();
    let keywords = store.domain_keywords(id).await?;
    let pins = store.pin_rollups(id).await?;
    let stats = store.domain_keyword_stats(id).await?;
    Ok(Json(json!({
        "keywords": keywords,
        "pinAnalysis": pins,
        "stats": stats,
    })))
}

pub async fn keyword_coverage(
    State(state): State<Arc<AppState>>,
    WithRejection(Query(query), _): WithRejection<Query<PageQuery>, AppError>,
) -> ApiResult<Json<Value>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let offset = Pagination::new(page, limit, 0).offset();

    let coverage = state.importer.store().keyword_coverage(i64::from(limit), offset).await?;
    Ok(Json(json!({
        "data": coverage.rows,
        "pagination": Pagination::new(page, limit, coverage.total),
    })))
}

pub async fn get_stop_words(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<StopWordSettings>> {
    Ok(Json(state.importer.stop_word_settings().await?))
}

pub async fn save_stop_words(
    State(state): State<Arc<AppState>>,
    WithRejection(Json(body), _): WithRejection<Json<StopWordSettings>, AppError>,
) -> ApiResult<Json<Value>> {
    state.importer.save_stop_words(&body).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn import_logs(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<Vec<ImportLogEntry>>> {
    Ok(Json(state.importer.store().recent_import_logs(LOG_LIMIT).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_must_be_integers() {
        assert_eq!(parse_id("42").expect("id"), 42);
        assert!(matches!(parse_id("abc"), Err(AppError::BadRequest(ref m)) if m == "Invalid ID"));
    }
}
