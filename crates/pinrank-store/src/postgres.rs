use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pinrank_core::{
    Domain, DomainId, DomainKeywordRow, GlobalSetting, ImportLog, ImportLogEntry, ImportType,
    ImportWarning, KeywordCoverageRow, KeywordId, KeywordRankingDetail, KeywordStats, NewDomain,
    NewImportLog, NewPageUrl, NewRanking, PageUrl, PageUrlId, PageUrlSource, PinRollup,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use crate::{CoveragePage, Store, StoreError, StoreResult};

const DOMAIN_COLUMNS: &str = "id, domain_name, pinclicks_account_url, monthly_views, total_keywords, \
     total_recipe_urls, status, last_sitemap_import, last_keywords_import, created_at";

const PAGE_URL_COLUMNS: &str = "id, domain_id, url, slug, last_modified, source, created_at, updated_at";

const IMPORT_LOG_COLUMNS: &str =
    "id, domain_id, import_type, file_name, rows_imported, rows_skipped, warnings, imported_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("database migrations applied");
        Ok(())
    }
}

fn domain_from_row(row: &PgRow) -> StoreResult<Domain> {
    Ok(Domain {
        id: row.try_get("id")?,
        domain_name: row.try_get("domain_name")?,
        pinclicks_account_url: row.try_get("pinclicks_account_url")?,
        monthly_views: row.try_get("monthly_views")?,
        total_keywords: row.try_get("total_keywords")?,
        total_recipe_urls: row.try_get("total_recipe_urls")?,
        status: row.try_get("status")?,
        last_sitemap_import: row.try_get("last_sitemap_import")?,
        last_keywords_import: row.try_get("last_keywords_import")?,
        created_at: row.try_get("created_at")?,
    })
}

fn page_url_from_row(row: &PgRow) -> StoreResult<PageUrl> {
    let source: String = row.try_get("source")?;
    Ok(PageUrl {
        id: row.try_get("id")?,
        domain_id: row.try_get("domain_id")?,
        url: row.try_get("url")?,
        slug: row.try_get("slug")?,
        last_modified: row.try_get("last_modified")?,
        source: PageUrlSource::parse(&source)
            .ok_or_else(|| StoreError::Decode(format!("page url source {source:?}")))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn import_type_from_row(row: &PgRow) -> StoreResult<ImportType> {
    let import_type: String = row.try_get("import_type")?;
    ImportType::parse(&import_type)
        .ok_or_else(|| StoreError::Decode(format!("import type {import_type:?}")))
}

fn warnings_from_row(row: &PgRow) -> StoreResult<Option<Vec<ImportWarning>>> {
    let warnings: Option<Json<Vec<ImportWarning>>> = row.try_get("warnings")?;
    Ok(warnings.map(|w| w.0))
}

fn id_map(rows: Vec<PgRow>, key: &str) -> StoreResult<HashMap<String, i64>> {
    let mut out = HashMap::with_capacity(rows.len());
    for row in rows {
        out.insert(row.try_get(key)?, row.try_get("id")?);
    }
    Ok(out)
}

#[async_trait]
impl Store for PgStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn list_domains(&self) -> StoreResult<Vec<Domain>> {
        let sql = format!("SELECT {DOMAIN_COLUMNS} FROM domains ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(domain_from_row).collect()
    }

    async fn get_domain(&self, id: DomainId) -> StoreResult<Option<Domain>> {
        let sql = format!("SELECT {DOMAIN_COLUMNS} FROM domains WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(domain_from_row).transpose()
    }

    async fn create_domain(&self, new_domain: &NewDomain) -> StoreResult<Domain> {
        let sql = format!(
            "INSERT INTO domains (domain_name, pinclicks_account_url) VALUES ($1, $2) \
             ON CONFLICT (domain_name) DO NOTHING RETURNING {DOMAIN_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&new_domain.domain_name)
            .bind(&new_domain.pinclicks_account_url)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => domain_from_row(&row),
            None => Err(StoreError::Conflict("Domain already exists".to_string())),
        }
    }

    async fn get_or_create_domain(&self, domain_name: &str) -> StoreResult<Domain> {
        sqlx::query("INSERT INTO domains (domain_name) VALUES ($1) ON CONFLICT (domain_name) DO NOTHING")
            .bind(domain_name)
            .execute(&self.pool)
            .await?;
        let sql = format!("SELECT {DOMAIN_COLUMNS} FROM domains WHERE domain_name = $1");
        let row = sqlx::query(&sql).bind(domain_name).fetch_one(&self.pool).await?;
        domain_from_row(&row)
    }

    async fn delete_domain(&self, id: DomainId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM domains WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn all_keyword_ids(&self) -> StoreResult<HashMap<String, KeywordId>> {
        let rows = sqlx::query("SELECT id, keyword_text FROM keywords")
            .fetch_all(&self.pool)
            .await?;
        id_map(rows, "keyword_text")
    }

    async fn keyword_ids_for(&self, texts: &[String]) -> StoreResult<HashMap<String, KeywordId>> {
        if texts.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query("SELECT id, keyword_text FROM keywords WHERE keyword_text = ANY($1)")
            .bind(texts.to_vec())
            .fetch_all(&self.pool)
            .await?;
        id_map(rows, "keyword_text")
    }

    async fn domain_url_ids(&self, domain_id: DomainId) -> StoreResult<HashMap<String, PageUrlId>> {
        let rows = sqlx::query("SELECT id, url FROM recipe_urls WHERE domain_id = $1")
            .bind(domain_id)
            .fetch_all(&self.pool)
            .await?;
        id_map(rows, "url")
    }

    async fn url_ids_for(&self, urls: &[String]) -> StoreResult<HashMap<String, PageUrlId>> {
        if urls.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query("SELECT id, url FROM recipe_urls WHERE url = ANY($1)")
            .bind(urls.to_vec())
            .fetch_all(&self.pool)
            .await?;
        id_map(rows, "url")
    }

    async fn delete_domain_rankings(&self, domain_id: DomainId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM keyword_rankings WHERE domain_id = $1")
            .bind(domain_id)
            .execute(&self.pool)
            .await?;
        debug!(domain_id, deleted = result.rows_affected(), "cleared domain rankings");
        Ok(result.rows_affected())
    }

    async fn insert_keywords(&self, texts: &[String]) -> StoreResult<u64> {
        if texts.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO keywords (keyword_text) ");
        qb.push_values(texts, |mut b, text| {
            b.push_bind(text.clone());
        });
        qb.push(" ON CONFLICT (keyword_text) DO NOTHING");
        Ok(qb.build().execute(&self.pool).await?.rows_affected())
    }

    async fn insert_page_urls(&self, urls: &[NewPageUrl]) -> StoreResult<u64> {
        if urls.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO recipe_urls (domain_id, url, slug, last_modified, source) ");
        qb.push_values(urls, |mut b, url| {
            b.push_bind(url.domain_id)
                .push_bind(url.url.clone())
                .push_bind(url.slug.clone())
                .push_bind(url.last_modified)
                .push_bind(url.source.as_str());
        });
        qb.push(" ON CONFLICT (url) DO NOTHING");
        Ok(qb.build().execute(&self.pool).await?.rows_affected())
    }

    async fn insert_rankings(&self, rankings: &[NewRanking]) -> StoreResult<u64> {
        if rankings.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO keyword_rankings (keyword_id, domain_id, recipe_url_id, position, \
             position_change, search_volume, pinterest_pin_url, pin_image_url, tracked_date) ",
        );
        qb.push_values(rankings, |mut b, r| {
            b.push_bind(r.keyword_id)
                .push_bind(r.domain_id)
                .push_bind(r.page_url_id)
                .push_bind(r.position)
                .push_bind(r.position_change)
                .push_bind(r.search_volume)
                .push_bind(r.pinterest_pin_url.clone())
                .push_bind(r.pin_image_url.clone())
                .push_bind(r.tracked_date);
        });
        qb.push(" ON CONFLICT (keyword_id, domain_id) DO NOTHING");
        Ok(qb.build().execute(&self.pool).await?.rows_affected())
    }

    async fn record_keywords_import(
        &self,
        domain_id: DomainId,
        total_keywords: i32,
        imported_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE domains SET last_keywords_import = $2, total_keywords = $3 WHERE id = $1")
            .bind(domain_id)
            .bind(imported_at)
            .bind(total_keywords)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn upsert_sitemap_urls(&self, urls: &[NewPageUrl]) -> StoreResult<u64> {
        if urls.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO recipe_urls (domain_id, url, slug, last_modified, source) ");
        qb.push_values(urls, |mut b, url| {
            b.push_bind(url.domain_id)
                .push_bind(url.url.clone())
                .push_bind(url.slug.clone())
                .push_bind(url.last_modified)
                .push_bind(url.source.as_str());
        });
        qb.push(
            " ON CONFLICT (url) DO UPDATE SET last_modified = EXCLUDED.last_modified, updated_at = NOW()",
        );
        Ok(qb.build().execute(&self.pool).await?.rows_affected())
    }

    async fn count_domain_urls(&self, domain_id: DomainId) -> StoreResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM recipe_urls WHERE domain_id = $1")
            .bind(domain_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    async fn record_sitemap_import(
        &self,
        domain_id: DomainId,
        total_recipe_urls: i32,
        imported_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query("UPDATE domains SET last_sitemap_import = $2, total_recipe_urls = $3 WHERE id = $1")
            .bind(domain_id)
            .bind(imported_at)
            .bind(total_recipe_urls)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn domain_page_urls(&self, domain_id: DomainId) -> StoreResult<Vec<PageUrl>> {
        let sql = format!("SELECT {PAGE_URL_COLUMNS} FROM recipe_urls WHERE domain_id = $1 ORDER BY id");
        let rows = sqlx::query(&sql).bind(domain_id).fetch_all(&self.pool).await?;
        rows.iter().map(page_url_from_row).collect()
    }

    async fn append_import_log(&self, log: &NewImportLog) -> StoreResult<ImportLog> {
        let sql = format!(
            "INSERT INTO import_logs (domain_id, import_type, file_name, rows_imported, rows_skipped, warnings) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {IMPORT_LOG_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(log.domain_id)
            .bind(log.import_type.as_str())
            .bind(&log.file_name)
            .bind(log.rows_imported)
            .bind(log.rows_skipped)
            .bind(log.warnings.as_ref().map(Json))
            .fetch_one(&self.pool)
            .await?;
        Ok(ImportLog {
            id: row.try_get("id")?,
            domain_id: row.try_get("domain_id")?,
            import_type: import_type_from_row(&row)?,
            file_name: row.try_get("file_name")?,
            rows_imported: row.try_get("rows_imported")?,
            rows_skipped: row.try_get("rows_skipped")?,
            warnings: warnings_from_row(&row)?,
            imported_at: row.try_get("imported_at")?,
        })
    }

    async fn recent_import_logs(&self, limit: i64) -> StoreResult<Vec<ImportLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT l.id, d.domain_name, l.import_type, l.rows_imported, l.rows_skipped,
                   l.file_name, l.imported_at, l.warnings
              FROM import_logs l
              LEFT JOIN domains d ON d.id = l.domain_id
             ORDER BY l.imported_at DESC, l.id DESC
             LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(ImportLogEntry {
                id: row.try_get("id")?,
                domain_name: row.try_get("domain_name")?,
                import_type: import_type_from_row(&row)?,
                rows_imported: row.try_get("rows_imported")?,
                rows_skipped: row.try_get("rows_skipped")?,
                file_name: row.try_get("file_name")?,
                imported_at: row.try_get("imported_at")?,
                warnings: warnings_from_row(&row)?,
            });
        }
        Ok(out)
    }

    async fn get_setting(&self, key: &str) -> StoreResult<Option<GlobalSetting>> {
        let row = sqlx::query("SELECT id, key, value, updated_at FROM settings WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(GlobalSetting {
                id: row.try_get("id")?,
                key: row.try_get("key")?,
                value: row.try_get("value")?,
                updated_at: row.try_get("updated_at")?,
            })),
            None => Ok(None),
        }
    }

    async fn put_setting(&self, key: &str, value: &serde_json::Value) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn pin_rollups(&self, domain_id: DomainId) -> StoreResult<Vec<PinRollup>> {
        let rows = sqlx::query(
            r#"
            SELECT kr.pinterest_pin_url,
                   COUNT(DISTINCT kr.keyword_id) AS keyword_count,
                   COALESCE(SUM(COALESCE(kr.search_volume, 0)), 0)::BIGINT AS total_volume,
                   MIN(r.url) AS recipe_url
              FROM keyword_rankings kr
              LEFT JOIN recipe_urls r ON r.id = kr.recipe_url_id
             WHERE kr.domain_id = $1 AND kr.pinterest_pin_url IS NOT NULL
             GROUP BY kr.pinterest_pin_url
             ORDER BY keyword_count DESC, kr.pinterest_pin_url
            "#,
        )
        .bind(domain_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(PinRollup {
                pinterest_pin_url: row.try_get("pinterest_pin_url")?,
                keyword_count: row.try_get("keyword_count")?,
                total_volume: row.try_get("total_volume")?,
                recipe_url: row.try_get("recipe_url")?,
            });
        }
        Ok(out)
    }

    async fn domain_keywords(&self, domain_id: DomainId) -> StoreResult<Vec<DomainKeywordRow>> {
        let rows = sqlx::query(
            r#"
            SELECT k.id, k.keyword_text, kr.position, kr.search_volume, kr.pinterest_pin_url,
                   r.url AS recipe_url
              FROM keyword_rankings kr
              JOIN keywords k ON k.id = kr.keyword_id
              LEFT JOIN recipe_urls r ON r.id = kr.recipe_url_id
             WHERE kr.domain_id = $1
             ORDER BY kr.search_volume DESC NULLS LAST, k.id
            "#,
        )
        .bind(domain_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(DomainKeywordRow {
                id: row.try_get("id")?,
                keyword_text: row.try_get("keyword_text")?,
                position: row.try_get("position")?,
                search_volume: row.try_get("search_volume")?,
                pinterest_pin_url: row.try_get("pinterest_pin_url")?,
                recipe_url: row.try_get("recipe_url")?,
            });
        }
        Ok(out)
    }

    async fn domain_keyword_stats(&self, domain_id: DomainId) -> StoreResult<KeywordStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total_keywords,
                   COALESCE(SUM(COALESCE(search_volume, 0)), 0)::BIGINT AS total_volume
              FROM keyword_rankings
             WHERE domain_id = $1
            "#,
        )
        .bind(domain_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(KeywordStats {
            total_keywords: row.try_get("total_keywords")?,
            total_volume: row.try_get("total_volume")?,
        })
    }

    async fn keyword_coverage(&self, limit: i64, offset: i64) -> StoreResult<CoveragePage> {
        let total_row = sqlx::query(
            "SELECT COUNT(DISTINCT k.id) AS total FROM keywords k JOIN keyword_rankings kr ON kr.keyword_id = k.id",
        )
        .fetch_one(&self.pool)
        .await?;
        let total: i64 = total_row.try_get("total")?;

        let rows = sqlx::query(
            r#"
            SELECT k.id, k.keyword_text,
                   COUNT(DISTINCT kr.domain_id) AS domain_count,
                   MAX(kr.search_volume) AS volume
              FROM keywords k
              JOIN keyword_rankings kr ON kr.keyword_id = k.id
             GROUP BY k.id, k.keyword_text
             ORDER BY domain_count DESC, volume DESC NULLS LAST, k.id
             LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(KeywordCoverageRow {
                id: row.try_get("id")?,
                keyword_text: row.try_get("keyword_text")?,
                domain_count: row.try_get("domain_count")?,
                volume: row.try_get("volume")?,
            });
        }
        Ok(CoveragePage { rows: out, total })
    }

    async fn keyword_rankings(&self, keyword_id: KeywordId) -> StoreResult<Vec<KeywordRankingDetail>> {
        let rows = sqlx::query(
            r#"
            SELECT d.domain_name, kr.position, r.url, kr.pinterest_pin_url, kr.pin_image_url
              FROM keyword_rankings kr
              JOIN domains d ON d.id = kr.domain_id
              LEFT JOIN recipe_urls r ON r.id = kr.recipe_url_id
             WHERE kr.keyword_id = $1
             ORDER BY kr.position, d.domain_name
            "#,
        )
        .bind(keyword_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(KeywordRankingDetail {
                domain_name: row.try_get("domain_name")?,
                position: row.try_get("position")?,
                url: row.try_get("url")?,
                pinterest_pin_url: row.try_get("pinterest_pin_url")?,
                pin_image_url: row.try_get("pin_image_url")?,
            });
        }
        Ok(out)
    }
}
