//! Snapshot-replace reconciliation of one domain's keyword rankings.
//!
//! The plan is pure: given the identifiers already known to the store and the
//! normalized rows, it lists what must be created and which identifiers must
//! be re-read. [`reconcile_batch`] drives it against a [`Store`].

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use pinrank_core::{
    CanonicalRow, DomainId, ImportType, ImportWarning, KeywordId, NewImportLog, NewPageUrl, NewRanking,
    PageUrlId, PageUrlSource,
};
use pinrank_sources::{extract_slug, NormalizedBatch};
use pinrank_store::Store;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::keywords::KeywordImportSummary;
use crate::ImportError;

/// Rows per insert statement for keywords, URLs and rankings.
pub const INSERT_CHUNK: usize = 500;

const MAX_URL_WARNINGS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUrl {
    pub url: String,
    pub slug: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationPlan {
    /// Keywords absent from the store, first-seen order, no duplicates.
    pub new_keywords: Vec<String>,
    /// Links absent from the domain's known URLs, first-seen order, no duplicates.
    pub new_urls: Vec<PlannedUrl>,
    pub referenced_keywords: Vec<String>,
    pub referenced_urls: Vec<String>,
    rows: Vec<CanonicalRow>,
}

fn push_unique(seen: &mut HashSet<String>, out: &mut Vec<String>, value: &str) {
    if seen.insert(value.to_string()) {
        out.push(value.to_string());
    }
}

impl ReconciliationPlan {
    pub fn build(
        known_keywords: &HashMap<String, KeywordId>,
        known_urls: &HashMap<String, PageUrlId>,
        rows: Vec<CanonicalRow>,
    ) -> Self {
        let mut plan = Self::default();
        let mut seen_keywords = HashSet::new();
        let mut seen_urls = HashSet::new();
        let mut seen_new_keywords = HashSet::new();
        let mut seen_new_urls = HashSet::new();

        for row in &rows {
            push_unique(&mut seen_keywords, &mut plan.referenced_keywords, &row.keyword);
            push_unique(&mut seen_urls, &mut plan.referenced_urls, &row.link);

            if !known_keywords.contains_key(&row.keyword) {
                push_unique(&mut seen_new_keywords, &mut plan.new_keywords, &row.keyword);
            }
            if !known_urls.contains_key(&row.link) && seen_new_urls.insert(row.link.clone()) {
                plan.new_urls.push(PlannedUrl {
                    url: row.link.clone(),
                    slug: extract_slug(&row.link),
                });
            }
        }

        plan.rows = rows;
        plan
    }

    pub fn rows(&self) -> &[CanonicalRow] {
        &self.rows
    }

    /// Final ranking rows. Rows whose keyword id could not be resolved are dropped;
    /// unresolved links leave the page reference empty.
    pub fn rankings(
        &self,
        domain_id: DomainId,
        keyword_ids: &HashMap<String, KeywordId>,
        url_ids: &HashMap<String, PageUrlId>,
        tracked_date: NaiveDate,
    ) -> Vec<NewRanking> {
        self.rows
            .iter()
            .filter_map(|row| {
                let keyword_id = *keyword_ids.get(&row.keyword)?;
                Some(NewRanking {
                    keyword_id,
                    domain_id,
                    page_url_id: url_ids.get(&row.link).copied(),
                    position: row.position,
                    position_change: row.change,
                    search_volume: Some(row.volume),
                    pinterest_pin_url: row.pin.clone(),
                    pin_image_url: None,
                    tracked_date,
                })
            })
            .collect()
    }

    /// One warning per planned URL that `domain_urls` (the domain's URLs after
    /// insertion) now holds. Links another domain already owned are left out.
    pub fn url_warnings(&self, domain_urls: &HashMap<String, PageUrlId>) -> Option<Vec<ImportWarning>> {
        let warnings: Vec<ImportWarning> = self
            .new_urls
            .iter()
            .filter(|u| domain_urls.contains_key(&u.url))
            .take(MAX_URL_WARNINGS)
            .map(|u| ImportWarning::new(format!("Created missing URL: {}", u.url)))
            .collect();
        (!warnings.is_empty()).then_some(warnings)
    }
}

/// Replaces `domain_id`'s rankings with `batch`. The batch must already have
/// passed column validation; an empty batch is rejected before anything is
/// deleted.
pub async fn reconcile_batch(
    store: &dyn Store,
    domain_id: DomainId,
    batch: NormalizedBatch,
    source: PageUrlSource,
    file_name: &str,
    imported_at: DateTime<Utc>,
) -> Result<KeywordImportSummary, ImportError> {
    if batch.rows.is_empty() {
        return Err(ImportError::Validation(format!(
            "No valid rows found ({} rows skipped for a missing keyword or link)",
            batch.skipped
        )));
    }

    let span = info_span!("reconcile", run_id = %Uuid::new_v4(), domain_id, file_name);
    async move {
        let known_keywords = store.all_keyword_ids().await?;
        let known_urls = store.domain_url_ids(domain_id).await?;

        let cleared = store.delete_domain_rankings(domain_id).await?;

        let plan = ReconciliationPlan::build(&known_keywords, &known_urls, batch.rows);

        let mut keywords_created = 0;
        for chunk in plan.new_keywords.chunks(INSERT_CHUNK) {
            keywords_created += store.insert_keywords(chunk).await?;
        }

        let new_urls: Vec<NewPageUrl> = plan
            .new_urls
            .iter()
            .map(|u| NewPageUrl {
                domain_id,
                url: u.url.clone(),
                slug: u.slug.clone(),
                last_modified: Some(imported_at),
                source,
            })
            .collect();
        let mut urls_created = 0;
        for chunk in new_urls.chunks(INSERT_CHUNK) {
            urls_created += store.insert_page_urls(chunk).await?;
        }
        let warnings = if urls_created > 0 {
            plan.url_warnings(&store.domain_url_ids(domain_id).await?)
        } else {
            None
        };

        let keyword_ids = store.keyword_ids_for(&plan.referenced_keywords).await?;
        let url_ids = store.url_ids_for(&plan.referenced_urls).await?;

        let rankings = plan.rankings(domain_id, &keyword_ids, &url_ids, imported_at.date_naive());
        let mut inserted = 0;
        for chunk in rankings.chunks(INSERT_CHUNK) {
            inserted += store.insert_rankings(chunk).await?;
        }

        let count = i32::try_from(inserted).unwrap_or(i32::MAX);
        let skipped = i32::try_from(batch.skipped).unwrap_or(i32::MAX);
        store
            .record_keywords_import(domain_id, count, imported_at)
            .await?;
        store
            .append_import_log(&NewImportLog {
                domain_id,
                import_type: ImportType::Keywords,
                file_name: Some(file_name.to_string()),
                rows_imported: count,
                rows_skipped: Some(skipped),
                warnings,
            })
            .await?;

        info!(
            cleared,
            rows = plan.rows().len(),
            inserted,
            skipped = batch.skipped,
            keywords_created,
            urls_created,
            "keyword snapshot replaced"
        );

        Ok::<_, ImportError>(KeywordImportSummary {
            domain_id,
            count: inserted,
            skipped: batch.skipped,
            urls_created,
            keywords_created,
        })
    }
    .instrument(span)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(keyword: &str, link: &str) -> CanonicalRow {
        CanonicalRow {
            keyword: keyword.into(),
            link: link.into(),
            position: 1,
            volume: 100,
            change: None,
            pin: None,
        }
    }

    #[test]
    fn plan_lists_only_unknown_keywords_and_urls_once() {
        let known_keywords = HashMap::from([("banana bread".to_string(), 7)]);
        let known_urls = HashMap::from([("https://site.com/banana-bread/".to_string(), 70)]);
        let rows = vec![
            row("banana bread", "https://site.com/banana-bread/"),
            row("easy banana bread", "https://site.com/banana-bread/"),
            row("easy banana bread", "https://site.com/quick-bread/"),
            row("muffins", "https://site.com/quick-bread/"),
        ];

        let plan = ReconciliationPlan::build(&known_keywords, &known_urls, rows);
        assert_eq!(plan.new_keywords, vec!["easy banana bread", "muffins"]);
        assert_eq!(
            plan.new_urls,
            vec![PlannedUrl {
                url: "https://site.com/quick-bread/".into(),
                slug: "quick-bread".into(),
            }]
        );
        assert_eq!(plan.referenced_keywords.len(), 3);
        assert_eq!(plan.referenced_urls.len(), 2);
    }

    #[test]
    fn rankings_drop_unresolved_keywords_and_keep_unresolved_links_empty() {
        let plan = ReconciliationPlan::build(
            &HashMap::new(),
            &HashMap::new(),
            vec![row("soup", "https://a.com/soup"), row("stew", "https://a.com/stew")],
        );
        let keyword_ids = HashMap::from([("soup".to_string(), 1)]);
        let url_ids = HashMap::new();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).expect("date");

        let rankings = plan.rankings(9, &keyword_ids, &url_ids, date);
        assert_eq!(rankings.len(), 1);
        assert_eq!(rankings[0].keyword_id, 1);
        assert_eq!(rankings[0].domain_id, 9);
        assert_eq!(rankings[0].page_url_id, None);
        assert_eq!(rankings[0].search_volume, Some(100));
    }

    #[test]
    fn url_warnings_are_capped() {
        let rows = (0..80)
            .map(|i| row("kw", &format!("https://a.com/p{i}")))
            .collect::<Vec<_>>();
        let plan = ReconciliationPlan::build(&HashMap::new(), &HashMap::new(), rows);
        let owned = (0..80)
            .map(|i| (format!("https://a.com/p{i}"), i))
            .collect::<HashMap<_, _>>();
        let warnings = plan.url_warnings(&owned).expect("warnings");
        assert_eq!(warnings.len(), 50);
        assert_eq!(warnings[0].message, "Created missing URL: https://a.com/p0");
    }

    #[test]
    fn url_warnings_skip_links_the_domain_does_not_own() {
        let plan = ReconciliationPlan::build(
            &HashMap::new(),
            &HashMap::new(),
            vec![row("soup", "https://a.com/soup"), row("stew", "https://b.com/stew")],
        );
        let owned = HashMap::from([("https://a.com/soup".to_string(), 1)]);
        let warnings = plan.url_warnings(&owned).expect("warnings");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "Created missing URL: https://a.com/soup");
        assert!(plan.url_warnings(&HashMap::new()).is_none());
    }
}
