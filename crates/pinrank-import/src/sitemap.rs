//! Sitemap ingestion into a domain's page-URL inventory.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use pinrank_core::{DomainId, ImportType, ImportWarning, NewImportLog, NewPageUrl, PageUrlSource};
use pinrank_sources::{fetch_sitemap, url_path_slug, ParsedSitemap, SitemapEntry};
use serde::Serialize;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{ImportError, Importer};

/// URLs per upsert statement.
pub const SITEMAP_CHUNK: usize = 100;
/// Child sitemaps fetched concurrently per round.
pub const CHILD_FETCH_BATCH: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SitemapIngestSummary {
    pub added: u64,
    pub skipped: usize,
    pub total_urls: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChildSitemapBatch {
    pub urls: Vec<SitemapEntry>,
    pub failed: usize,
}

/// RFC 3339 timestamp or bare `YYYY-MM-DD` date; anything else yields `fallback`.
pub fn parse_lastmod(raw: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return fallback;
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return ts.with_timezone(&Utc);
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(fallback)
}

impl Importer {
    pub async fn fetch_domain_sitemap(
        &self,
        domain_id: DomainId,
        url: &str,
    ) -> Result<ParsedSitemap, ImportError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ImportError::Validation("Sitemap URL is required".to_string()));
        }
        self.require_domain(domain_id).await?;
        Ok(fetch_sitemap(&self.http, url).await?)
    }

    /// Fetches child sitemaps [`CHILD_FETCH_BATCH`] at a time and pools their
    /// page entries. Failed children are counted, not fatal.
    pub async fn fetch_child_sitemaps(
        &self,
        domain_id: DomainId,
        urls: &[String],
    ) -> Result<ChildSitemapBatch, ImportError> {
        self.require_domain(domain_id).await?;

        let mut out = ChildSitemapBatch::default();
        for round in urls.chunks(CHILD_FETCH_BATCH) {
            let results = join_all(round.iter().map(|url| fetch_sitemap(&self.http, url))).await;
            for (url, result) in round.iter().zip(results) {
                match result {
                    Ok(parsed) => out.urls.extend(parsed.urls),
                    Err(err) => {
                        warn!(url = %url, error = %err, "child sitemap failed");
                        out.failed += 1;
                    }
                }
            }
        }
        debug!(children = urls.len(), urls = out.urls.len(), failed = out.failed, "child sitemaps fetched");
        Ok(out)
    }

    /// Upserts page entries for a domain, skipping homepages and unparsable
    /// locations, then refreshes the domain's URL total from a live count.
    pub async fn ingest_sitemap_entries(
        &self,
        domain_id: DomainId,
        entries: &[SitemapEntry],
    ) -> Result<SitemapIngestSummary, ImportError> {
        self.require_domain(domain_id).await?;

        let span = info_span!("sitemap_ingest", run_id = %Uuid::new_v4(), domain_id);
        async move {
            let now = Utc::now();
            let mut records: Vec<NewPageUrl> = Vec::with_capacity(entries.len());
            // A repeated location keeps its first position but the later lastmod.
            let mut positions: HashMap<String, usize> = HashMap::new();
            for entry in entries {
                match url_path_slug(&entry.loc) {
                    Some(slug) if !slug.is_empty() => {
                        let record = NewPageUrl {
                            domain_id,
                            url: entry.loc.clone(),
                            slug,
                            last_modified: Some(parse_lastmod(entry.lastmod.as_deref(), now)),
                            source: PageUrlSource::Sitemap,
                        };
                        match positions.get(&record.url) {
                            Some(&pos) => records[pos] = record,
                            None => {
                                positions.insert(record.url.clone(), records.len());
                                records.push(record);
                            }
                        }
                    }
                    Some(_) => {}
                    None => warn!(loc = %entry.loc, "invalid sitemap URL, skipping"),
                }
            }

            let mut added = 0u64;
            for (idx, chunk) in records.chunks(SITEMAP_CHUNK).enumerate() {
                match self.store.upsert_sitemap_urls(chunk).await {
                    Ok(_) => added += chunk.len() as u64,
                    Err(err) => {
                        warn!(chunk = idx, size = chunk.len(), error = %err, "sitemap chunk failed");
                    }
                }
            }

            let total_urls = self.store.count_domain_urls(domain_id).await?;
            self.store
                .record_sitemap_import(domain_id, i32::try_from(total_urls).unwrap_or(i32::MAX), now)
                .await?;

            let skipped = entries.len().saturating_sub(added as usize);
            let warnings = (skipped > 0).then(|| {
                vec![ImportWarning::new(format!(
                    "{skipped} of {} sitemap entries were skipped",
                    entries.len()
                ))]
            });
            self.store
                .append_import_log(&NewImportLog {
                    domain_id,
                    import_type: ImportType::Sitemap,
                    file_name: None,
                    rows_imported: i32::try_from(added).unwrap_or(i32::MAX),
                    rows_skipped: Some(i32::try_from(skipped).unwrap_or(i32::MAX)),
                    warnings,
                })
                .await?;

            info!(entries = entries.len(), added, skipped, total_urls, "sitemap entries ingested");
            Ok::<_, ImportError>(SitemapIngestSummary {
                added,
                skipped,
                total_urls,
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use httpmock::{Method, MockServer};
    use pinrank_core::NewDomain;
    use pinrank_fetch::{HttpClientConfig, HttpFetcher};
    use pinrank_store::{MemoryStore, Store};

    use super::*;

    fn entry(loc: &str, lastmod: Option<&str>) -> SitemapEntry {
        SitemapEntry {
            loc: loc.into(),
            lastmod: lastmod.map(ToString::to_string),
        }
    }

    async fn setup() -> (Importer, Arc<MemoryStore>, DomainId) {
        let store = Arc::new(MemoryStore::new());
        let id = store
            .create_domain(&NewDomain::from_input("site.com", None))
            .await
            .expect("domain")
            .id;
        let http = HttpFetcher::new(HttpClientConfig::default()).expect("http");
        (Importer::new(store.clone(), http), store, id)
    }

    #[test]
    fn lastmod_accepts_timestamps_and_dates() {
        let fallback = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            parse_lastmod(Some("2024-05-01T10:00:00+02:00"), fallback),
            Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
        );
        assert_eq!(
            parse_lastmod(Some("2024-05-01"), fallback),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(parse_lastmod(Some("yesterday"), fallback), fallback);
        assert_eq!(parse_lastmod(None, fallback), fallback);
    }

    #[tokio::test]
    async fn ingest_skips_homepages_and_invalid_locations() {
        let (importer, store, site) = setup().await;
        let summary = importer
            .ingest_sitemap_entries(
                site,
                &[
                    entry("https://site.com/", None),
                    entry("not a url", None),
                    entry("https://site.com/banana-bread/", Some("2024-05-01")),
                    entry("https://site.com/category/soups/", None),
                ],
            )
            .await
            .expect("ingest");
        assert_eq!(summary.added, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.total_urls, 2);

        let urls = store.domain_page_urls(site).await.expect("urls");
        assert_eq!(urls[0].slug, "banana-bread");
        assert_eq!(urls[1].slug, "category/soups");
        assert_eq!(urls[0].source, PageUrlSource::Sitemap);

        let domain = store.get_domain(site).await.expect("get").expect("domain");
        assert_eq!(domain.total_recipe_urls, 2);
        assert!(domain.last_sitemap_import.is_some());

        let logs = store.recent_import_logs(5).await.expect("logs");
        assert_eq!(logs[0].import_type, ImportType::Sitemap);
        assert_eq!(logs[0].rows_imported, 2);
        assert!(logs[0].warnings.is_some());
    }

    #[tokio::test]
    async fn reingest_updates_lastmod_without_duplicating() {
        let (importer, store, site) = setup().await;
        importer
            .ingest_sitemap_entries(site, &[entry("https://site.com/pie/", Some("2024-01-01"))])
            .await
            .expect("first");
        let summary = importer
            .ingest_sitemap_entries(site, &[entry("https://site.com/pie/", Some("2024-06-01"))])
            .await
            .expect("second");
        assert_eq!(summary.total_urls, 1);

        let urls = store.domain_page_urls(site).await.expect("urls");
        assert_eq!(urls.len(), 1);
        assert_eq!(
            urls[0].last_modified,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
        );
        let logs = store.recent_import_logs(5).await.expect("logs");
        assert!(logs[0].warnings.is_none());
    }

    #[tokio::test]
    async fn repeated_locations_collapse_to_one_row() {
        let (importer, store, site) = setup().await;
        let summary = importer
            .ingest_sitemap_entries(
                site,
                &[
                    entry("https://site.com/pie/", Some("2024-01-01")),
                    entry("https://site.com/soup/", None),
                    entry("https://site.com/pie/", Some("2024-06-01")),
                ],
            )
            .await
            .expect("ingest");
        assert_eq!(summary.added, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.total_urls, 2);

        let urls = store.domain_page_urls(site).await.expect("urls");
        assert_eq!(urls.len(), 2);
        let pie = urls.iter().find(|u| u.slug == "pie").expect("pie");
        assert_eq!(
            pie.last_modified,
            Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
        );
    }

    #[tokio::test]
    async fn ingest_for_unknown_domain_is_not_found() {
        let (importer, _store, _site) = setup().await;
        let err = importer
            .ingest_sitemap_entries(999, &[entry("https://site.com/pie/", None)])
            .await
            .expect_err("unknown");
        assert!(matches!(err, ImportError::NotFound(_)));
    }

    #[tokio::test]
    async fn child_sitemaps_are_pooled_and_failures_counted() {
        let (importer, _store, site) = setup().await;
        let server = MockServer::start_async().await;
        for i in 0..6 {
            let body = format!(
                "<urlset><url><loc>https://site.com/post-{i}/</loc></url></urlset>"
            );
            server
                .mock_async(|when, then| {
                    when.method(Method::GET).path(format!("/post-sitemap{i}.xml"));
                    then.status(200).body(body);
                })
                .await;
        }
        server
            .mock_async(|when, then| {
                when.method(Method::GET).path("/broken-sitemap.xml");
                then.status(500);
            })
            .await;

        let mut children: Vec<String> = (0..6)
            .map(|i| server.url(format!("/post-sitemap{i}.xml")))
            .collect();
        children.insert(2, server.url("/broken-sitemap.xml"));

        let batch = importer
            .fetch_child_sitemaps(site, &children)
            .await
            .expect("batch");
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.urls.len(), 6);
        assert_eq!(batch.urls[0].loc, "https://site.com/post-0/");
    }
}
