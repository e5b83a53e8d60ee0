use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pinrank_core::{
    Domain, DomainId, DomainKeywordRow, GlobalSetting, ImportLog, ImportLogEntry, Keyword,
    KeywordCoverageRow, KeywordId, KeywordRanking, KeywordRankingDetail, KeywordStats, NewDomain,
    NewImportLog, NewPageUrl, NewRanking, PageUrl, PageUrlId, PinRollup,
};
use tokio::sync::Mutex;

use crate::{CoveragePage, Store, StoreError, StoreResult};

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    domains: Vec<Domain>,
    page_urls: Vec<PageUrl>,
    keywords: Vec<Keyword>,
    rankings: Vec<KeywordRanking>,
    import_logs: Vec<ImportLog>,
    settings: Vec<GlobalSetting>,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_domain(&mut self, domain_name: &str, pinclicks_account_url: Option<String>) -> Domain {
        let domain = Domain {
            id: self.next_id(),
            domain_name: domain_name.to_string(),
            pinclicks_account_url,
            monthly_views: 0,
            total_keywords: 0,
            total_recipe_urls: 0,
            status: "active".to_string(),
            last_sitemap_import: None,
            last_keywords_import: None,
            created_at: Utc::now(),
        };
        self.domains.push(domain.clone());
        domain
    }

    fn domain_mut(&mut self, id: DomainId) -> Option<&mut Domain> {
        self.domains.iter_mut().find(|d| d.id == id)
    }

    fn url_of(&self, page_url_id: Option<PageUrlId>) -> Option<String> {
        page_url_id.and_then(|id| self.page_urls.iter().find(|u| u.id == id).map(|u| u.url.clone()))
    }

    fn keyword_text(&self, keyword_id: KeywordId) -> Option<&str> {
        self.keywords
            .iter()
            .find(|k| k.id == keyword_id)
            .map(|k| k.keyword_text.as_str())
    }
}

/// In-process store with the same unique keys and conflict behaviour as the
/// Postgres schema.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn desc_nulls_last(a: Option<i32>, b: Option<i32>) -> std::cmp::Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_domains(&self) -> StoreResult<Vec<Domain>> {
        let state = self.state.lock().await;
        let mut domains = state.domains.clone();
        domains.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(domains)
    }

    async fn get_domain(&self, id: DomainId) -> StoreResult<Option<Domain>> {
        let state = self.state.lock().await;
        Ok(state.domains.iter().find(|d| d.id == id).cloned())
    }

    async fn create_domain(&self, new_domain: &NewDomain) -> StoreResult<Domain> {
        let mut state = self.state.lock().await;
        if state.domains.iter().any(|d| d.domain_name == new_domain.domain_name) {
            return Err(StoreError::Conflict("Domain already exists".to_string()));
        }
        Ok(state.insert_domain(&new_domain.domain_name, new_domain.pinclicks_account_url.clone()))
    }

    async fn get_or_create_domain(&self, domain_name: &str) -> StoreResult<Domain> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.domains.iter().find(|d| d.domain_name == domain_name) {
            return Ok(existing.clone());
        }
        Ok(state.insert_domain(domain_name, None))
    }

    async fn delete_domain(&self, id: DomainId) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.domains.len();
        state.domains.retain(|d| d.id != id);
        if state.domains.len() == before {
            return Ok(false);
        }
        let removed_urls: HashSet<PageUrlId> = state
            .page_urls
            .iter()
            .filter(|u| u.domain_id == id)
            .map(|u| u.id)
            .collect();
        state.page_urls.retain(|u| u.domain_id != id);
        state.rankings.retain(|r| r.domain_id != id);
        for ranking in state.rankings.iter_mut() {
            if ranking.page_url_id.is_some_and(|pid| removed_urls.contains(&pid)) {
                ranking.page_url_id = None;
            }
        }
        state.import_logs.retain(|l| l.domain_id != id);
        Ok(true)
    }

    async fn all_keyword_ids(&self) -> StoreResult<HashMap<String, KeywordId>> {
        let state = self.state.lock().await;
        Ok(state
            .keywords
            .iter()
            .map(|k| (k.keyword_text.clone(), k.id))
            .collect())
    }

    async fn keyword_ids_for(&self, texts: &[String]) -> StoreResult<HashMap<String, KeywordId>> {
        let wanted: HashSet<&str> = texts.iter().map(String::as_str).collect();
        let state = self.state.lock().await;
        Ok(state
            .keywords
            .iter()
            .filter(|k| wanted.contains(k.keyword_text.as_str()))
            .map(|k| (k.keyword_text.clone(), k.id))
            .collect())
    }

    async fn domain_url_ids(&self, domain_id: DomainId) -> StoreResult<HashMap<String, PageUrlId>> {
        let state = self.state.lock().await;
        Ok(state
            .page_urls
            .iter()
            .filter(|u| u.domain_id == domain_id)
            .map(|u| (u.url.clone(), u.id))
            .collect())
    }

    async fn url_ids_for(&self, urls: &[String]) -> StoreResult<HashMap<String, PageUrlId>> {
        let wanted: HashSet<&str> = urls.iter().map(String::as_str).collect();
        let state = self.state.lock().await;
        Ok(state
            .page_urls
            .iter()
            .filter(|u| wanted.contains(u.url.as_str()))
            .map(|u| (u.url.clone(), u.id))
            .collect())
    }

    async fn delete_domain_rankings(&self, domain_id: DomainId) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.rankings.len();
        state.rankings.retain(|r| r.domain_id != domain_id);
        Ok((before - state.rankings.len()) as u64)
    }

    async fn insert_keywords(&self, texts: &[String]) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let mut inserted = 0;
        for text in texts {
            if state.keywords.iter().any(|k| &k.keyword_text == text) {
                continue;
            }
            let id = state.next_id();
            state.keywords.push(Keyword {
                id,
                keyword_text: text.clone(),
                created_at: Utc::now(),
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn insert_page_urls(&self, urls: &[NewPageUrl]) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let mut inserted = 0;
        for url in urls {
            if state.page_urls.iter().any(|u| u.url == url.url) {
                continue;
            }
            let id = state.next_id();
            let now = Utc::now();
            state.page_urls.push(PageUrl {
                id,
                domain_id: url.domain_id,
                url: url.url.clone(),
                slug: url.slug.clone(),
                last_modified: url.last_modified,
                source: url.source,
                created_at: now,
                updated_at: now,
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn insert_rankings(&self, rankings: &[NewRanking]) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        let mut inserted = 0;
        for r in rankings {
            if state
                .rankings
                .iter()
                .any(|existing| existing.keyword_id == r.keyword_id && existing.domain_id == r.domain_id)
            {
                continue;
            }
            let id = state.next_id();
            state.rankings.push(KeywordRanking {
                id,
                keyword_id: r.keyword_id,
                domain_id: r.domain_id,
                page_url_id: r.page_url_id,
                position: r.position,
                position_change: r.position_change,
                search_volume: r.search_volume,
                pinterest_pin_url: r.pinterest_pin_url.clone(),
                pin_image_url: r.pin_image_url.clone(),
                tracked_date: r.tracked_date,
                imported_at: Utc::now(),
            });
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn record_keywords_import(
        &self,
        domain_id: DomainId,
        total_keywords: i32,
        imported_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(domain) = state.domain_mut(domain_id) {
            domain.total_keywords = total_keywords;
            domain.last_keywords_import = Some(imported_at);
        }
        Ok(())
    }

    async fn upsert_sitemap_urls(&self, urls: &[NewPageUrl]) -> StoreResult<u64> {
        // Postgres rejects a whole upsert that touches one row twice.
        let mut seen = HashSet::new();
        if let Some(dup) = urls.iter().find(|u| !seen.insert(u.url.as_str())) {
            return Err(StoreError::Conflict(format!(
                "{} appears more than once in one upsert",
                dup.url
            )));
        }
        let mut state = self.state.lock().await;
        let mut affected = 0;
        for url in urls {
            let now = Utc::now();
            if let Some(idx) = state.page_urls.iter().position(|u| u.url == url.url) {
                let existing = &mut state.page_urls[idx];
                existing.last_modified = url.last_modified;
                existing.updated_at = now;
            } else {
                let id = state.next_id();
                state.page_urls.push(PageUrl {
                    id,
                    domain_id: url.domain_id,
                    url: url.url.clone(),
                    slug: url.slug.clone(),
                    last_modified: url.last_modified,
                    source: url.source,
                    created_at: now,
                    updated_at: now,
                });
            }
            affected += 1;
        }
        Ok(affected)
    }

    async fn count_domain_urls(&self, domain_id: DomainId) -> StoreResult<i64> {
        let state = self.state.lock().await;
        Ok(state.page_urls.iter().filter(|u| u.domain_id == domain_id).count() as i64)
    }

    async fn record_sitemap_import(
        &self,
        domain_id: DomainId,
        total_recipe_urls: i32,
        imported_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(domain) = state.domain_mut(domain_id) {
            domain.total_recipe_urls = total_recipe_urls;
            domain.last_sitemap_import = Some(imported_at);
        }
        Ok(())
    }

    async fn domain_page_urls(&self, domain_id: DomainId) -> StoreResult<Vec<PageUrl>> {
        let state = self.state.lock().await;
        Ok(state
            .page_urls
            .iter()
            .filter(|u| u.domain_id == domain_id)
            .cloned()
            .collect())
    }

    async fn append_import_log(&self, log: &NewImportLog) -> StoreResult<ImportLog> {
        let mut state = self.state.lock().await;
        let entry = ImportLog {
            id: state.next_id(),
            domain_id: log.domain_id,
            import_type: log.import_type,
            file_name: log.file_name.clone(),
            rows_imported: log.rows_imported,
            rows_skipped: log.rows_skipped,
            warnings: log.warnings.clone(),
            imported_at: Utc::now(),
        };
        state.import_logs.push(entry.clone());
        Ok(entry)
    }

    async fn recent_import_logs(&self, limit: i64) -> StoreResult<Vec<ImportLogEntry>> {
        let state = self.state.lock().await;
        let mut logs = state.import_logs.clone();
        logs.sort_by(|a, b| b.imported_at.cmp(&a.imported_at).then(b.id.cmp(&a.id)));
        Ok(logs
            .into_iter()
            .take(usize::try_from(limit).unwrap_or(0))
            .map(|l| ImportLogEntry {
                id: l.id,
                domain_name: state
                    .domains
                    .iter()
                    .find(|d| d.id == l.domain_id)
                    .map(|d| d.domain_name.clone()),
                import_type: l.import_type,
                rows_imported: l.rows_imported,
                rows_skipped: l.rows_skipped,
                file_name: l.file_name,
                imported_at: l.imported_at,
                warnings: l.warnings,
            })
            .collect())
    }

    async fn get_setting(&self, key: &str) -> StoreResult<Option<GlobalSetting>> {
        let state = self.state.lock().await;
        Ok(state.settings.iter().find(|s| s.key == key).cloned())
    }

    async fn put_setting(&self, key: &str, value: &serde_json::Value) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if let Some(idx) = state.settings.iter().position(|s| s.key == key) {
            let existing = &mut state.settings[idx];
            existing.value = value.clone();
            existing.updated_at = Utc::now();
            return Ok(());
        }
        let id = state.next_id();
        state.settings.push(GlobalSetting {
            id,
            key: key.to_string(),
            value: value.clone(),
            updated_at: Utc::now(),
        });
        Ok(())
    }

    async fn pin_rollups(&self, domain_id: DomainId) -> StoreResult<Vec<PinRollup>> {
        let state = self.state.lock().await;
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, (HashSet<KeywordId>, i64, Option<String>)> = HashMap::new();
        for r in state.rankings.iter().filter(|r| r.domain_id == domain_id) {
            let Some(pin) = &r.pinterest_pin_url else {
                continue;
            };
            let group = groups.entry(pin.clone()).or_insert_with(|| {
                order.push(pin.clone());
                (HashSet::new(), 0, None)
            });
            group.0.insert(r.keyword_id);
            group.1 += i64::from(r.search_volume.unwrap_or(0));
            if let Some(url) = state.url_of(r.page_url_id) {
                if group.2.as_ref().map_or(true, |current| url < *current) {
                    group.2 = Some(url);
                }
            }
        }

        let mut out: Vec<PinRollup> = order
            .into_iter()
            .filter_map(|pin| {
                groups.remove(&pin).map(|(keywords, total_volume, recipe_url)| PinRollup {
                    pinterest_pin_url: pin,
                    keyword_count: keywords.len() as i64,
                    total_volume,
                    recipe_url,
                })
            })
            .collect();
        out.sort_by(|a, b| {
            b.keyword_count
                .cmp(&a.keyword_count)
                .then_with(|| a.pinterest_pin_url.cmp(&b.pinterest_pin_url))
        });
        Ok(out)
    }

    async fn domain_keywords(&self, domain_id: DomainId) -> StoreResult<Vec<DomainKeywordRow>> {
        let state = self.state.lock().await;
        let mut out: Vec<DomainKeywordRow> = state
            .rankings
            .iter()
            .filter(|r| r.domain_id == domain_id)
            .filter_map(|r| {
                state.keyword_text(r.keyword_id).map(|text| DomainKeywordRow {
                    id: r.keyword_id,
                    keyword_text: text.to_string(),
                    position: r.position,
                    search_volume: r.search_volume,
                    pinterest_pin_url: r.pinterest_pin_url.clone(),
                    recipe_url: state.url_of(r.page_url_id),
                })
            })
            .collect();
        out.sort_by(|a, b| desc_nulls_last(a.search_volume, b.search_volume).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn domain_keyword_stats(&self, domain_id: DomainId) -> StoreResult<KeywordStats> {
        let state = self.state.lock().await;
        Ok(state
            .rankings
            .iter()
            .filter(|r| r.domain_id == domain_id)
            .fold(KeywordStats::default(), |mut acc, r| {
                acc.total_keywords += 1;
                acc.total_volume += i64::from(r.search_volume.unwrap_or(0));
                acc
            }))
    }

    async fn keyword_coverage(&self, limit: i64, offset: i64) -> StoreResult<CoveragePage> {
        let state = self.state.lock().await;
        let mut groups: HashMap<KeywordId, (HashSet<DomainId>, Option<i32>)> = HashMap::new();
        for r in &state.rankings {
            let group = groups.entry(r.keyword_id).or_insert_with(|| (HashSet::new(), None));
            group.0.insert(r.domain_id);
            group.1 = match (group.1, r.search_volume) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
        }

        let mut rows: Vec<KeywordCoverageRow> = groups
            .into_iter()
            .filter_map(|(keyword_id, (domains, volume))| {
                state.keyword_text(keyword_id).map(|text| KeywordCoverageRow {
                    id: keyword_id,
                    keyword_text: text.to_string(),
                    domain_count: domains.len() as i64,
                    volume,
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            b.domain_count
                .cmp(&a.domain_count)
                .then_with(|| desc_nulls_last(a.volume, b.volume))
                .then(a.id.cmp(&b.id))
        });

        let total = rows.len() as i64;
        let rows = rows
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(0))
            .take(usize::try_from(limit).unwrap_or(0))
            .collect();
        Ok(CoveragePage { rows, total })
    }

    async fn keyword_rankings(&self, keyword_id: KeywordId) -> StoreResult<Vec<KeywordRankingDetail>> {
        let state = self.state.lock().await;
        let mut out: Vec<KeywordRankingDetail> = state
            .rankings
            .iter()
            .filter(|r| r.keyword_id == keyword_id)
            .filter_map(|r| {
                state
                    .domains
                    .iter()
                    .find(|d| d.id == r.domain_id)
                    .map(|d| KeywordRankingDetail {
                        domain_name: d.domain_name.clone(),
                        position: r.position,
                        url: state.url_of(r.page_url_id),
                        pinterest_pin_url: r.pinterest_pin_url.clone(),
                        pin_image_url: r.pin_image_url.clone(),
                    })
            })
            .collect();
        out.sort_by(|a, b| a.position.cmp(&b.position).then_with(|| a.domain_name.cmp(&b.domain_name)));
        Ok(out)
    }
}
