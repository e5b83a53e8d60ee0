//! Relational store for domains, page URLs, keywords, rankings, import logs and
//! settings. [`PgStore`] is the production backend; [`MemoryStore`] mirrors its
//! uniqueness and conflict rules for tests and local demos.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pinrank_core::{
    Domain, DomainId, DomainKeywordRow, GlobalSetting, ImportLog, ImportLogEntry, KeywordCoverageRow,
    KeywordId, KeywordRankingDetail, KeywordStats, NewDomain, NewImportLog, NewPageUrl, NewRanking,
    PageUrl, PageUrlId, PinRollup,
};
use thiserror::Error;

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const CRATE_NAME: &str = "pinrank-store";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("unreadable stored value: {0}")]
    Decode(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One page of keyword coverage plus the number of keywords across all pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoveragePage {
    pub rows: Vec<KeywordCoverageRow>,
    pub total: i64,
}

/// Storage contract used by the import flows and the HTTP layer.
///
/// Bulk inserts are insert-or-ignore on the table's unique key and return the
/// number of rows actually written.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &str;

    // Domains

    /// All domains, newest first.
    async fn list_domains(&self) -> StoreResult<Vec<Domain>>;
    async fn get_domain(&self, id: DomainId) -> StoreResult<Option<Domain>>;
    /// Fails with [`StoreError::Conflict`] when the name is taken.
    async fn create_domain(&self, new_domain: &NewDomain) -> StoreResult<Domain>;
    /// Insert-or-ignore on the name, then re-read.
    async fn get_or_create_domain(&self, domain_name: &str) -> StoreResult<Domain>;
    /// Cascades to page URLs, rankings and import logs. Returns whether a row was removed.
    async fn delete_domain(&self, id: DomainId) -> StoreResult<bool>;

    // Keyword import

    async fn all_keyword_ids(&self) -> StoreResult<HashMap<String, KeywordId>>;
    async fn keyword_ids_for(&self, texts: &[String]) -> StoreResult<HashMap<String, KeywordId>>;
    async fn domain_url_ids(&self, domain_id: DomainId) -> StoreResult<HashMap<String, PageUrlId>>;
    /// Looks URLs up regardless of the domain that owns them.
    async fn url_ids_for(&self, urls: &[String]) -> StoreResult<HashMap<String, PageUrlId>>;
    async fn delete_domain_rankings(&self, domain_id: DomainId) -> StoreResult<u64>;
    async fn insert_keywords(&self, texts: &[String]) -> StoreResult<u64>;
    async fn insert_page_urls(&self, urls: &[NewPageUrl]) -> StoreResult<u64>;
    async fn insert_rankings(&self, rankings: &[NewRanking]) -> StoreResult<u64>;
    async fn record_keywords_import(
        &self,
        domain_id: DomainId,
        total_keywords: i32,
        imported_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    // Sitemap ingestion

    /// Upserts on `url`, refreshing `last_modified` and `updated_at` of existing rows.
    /// A batch that names the same `url` twice is rejected as a whole.
    async fn upsert_sitemap_urls(&self, urls: &[NewPageUrl]) -> StoreResult<u64>;
    async fn count_domain_urls(&self, domain_id: DomainId) -> StoreResult<i64>;
    async fn record_sitemap_import(
        &self,
        domain_id: DomainId,
        total_recipe_urls: i32,
        imported_at: DateTime<Utc>,
    ) -> StoreResult<()>;
    async fn domain_page_urls(&self, domain_id: DomainId) -> StoreResult<Vec<PageUrl>>;

    // Import logs

    async fn append_import_log(&self, log: &NewImportLog) -> StoreResult<ImportLog>;
    async fn recent_import_logs(&self, limit: i64) -> StoreResult<Vec<ImportLogEntry>>;

    // Settings

    async fn get_setting(&self, key: &str) -> StoreResult<Option<GlobalSetting>>;
    async fn put_setting(&self, key: &str, value: &serde_json::Value) -> StoreResult<()>;

    // Reports

    async fn pin_rollups(&self, domain_id: DomainId) -> StoreResult<Vec<PinRollup>>;
    async fn domain_keywords(&self, domain_id: DomainId) -> StoreResult<Vec<DomainKeywordRow>>;
    async fn domain_keyword_stats(&self, domain_id: DomainId) -> StoreResult<KeywordStats>;
    async fn keyword_coverage(&self, limit: i64, offset: i64) -> StoreResult<CoveragePage>;
    async fn keyword_rankings(&self, keyword_id: KeywordId) -> StoreResult<Vec<KeywordRankingDetail>>;
}
