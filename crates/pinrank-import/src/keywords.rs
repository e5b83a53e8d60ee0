//! Keyword import flows: uploaded CSV, single sheet URL, multi-tab workbook.

use chrono::Utc;
use pinrank_core::{DomainId, PageUrlSource};
use pinrank_sources::{
    extract_hostname, normalize_rows, parse_csv, resolve_sheet_tabs, sheet_csv_url, CanonicalField,
    ColumnMap, NormalizedBatch, RawTable, SourceError,
};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::reconcile::reconcile_batch;
use crate::{ImportError, Importer};

pub const SHEET_FETCH_FAILED: &str = "Failed to fetch spreadsheet. Make sure it is shared publicly.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordImportSummary {
    pub domain_id: DomainId,
    /// Rankings written.
    pub count: u64,
    pub skipped: usize,
    pub urls_created: u64,
    pub keywords_created: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TabImportResult {
    pub domain: String,
    pub keywords_imported: u64,
    pub urls_created: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MultiTabSummary {
    pub results: Vec<TabImportResult>,
    pub total_domains: usize,
    pub total_keywords: u64,
}

/// Decodes and validates a keyword CSV. Missing Keyword/Link columns reject the
/// whole table.
pub fn normalize_csv(text: &str) -> Result<(RawTable, NormalizedBatch), SourceError> {
    let table = parse_csv(text)?;
    let map = ColumnMap::resolve(&table.headers);
    map.ensure_required()?;
    let batch = normalize_rows(&table, &map);
    Ok((table, batch))
}

impl Importer {
    /// Replaces a domain's rankings with the rows of an uploaded CSV file.
    pub async fn import_csv_text(
        &self,
        domain_id: DomainId,
        csv_text: &str,
        file_name: &str,
    ) -> Result<KeywordImportSummary, ImportError> {
        self.require_domain(domain_id).await?;
        let (_, batch) = normalize_csv(csv_text)?;
        reconcile_batch(
            self.store.as_ref(),
            domain_id,
            batch,
            PageUrlSource::CsvImport,
            file_name,
            Utc::now(),
        )
        .await
    }

    /// Same as [`Importer::import_csv_text`] for a CSV behind a URL. Editor
    /// links to Google Sheets are rewritten to their CSV export.
    pub async fn import_sheet_url(
        &self,
        domain_id: DomainId,
        url: &str,
    ) -> Result<KeywordImportSummary, ImportError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ImportError::Validation("No URL provided".to_string()));
        }
        self.require_domain(domain_id).await?;

        let csv_url = sheet_csv_url(url, &self.sheets_base_url);
        let text = self
            .http
            .fetch_text(&csv_url)
            .await
            .map_err(|err| ImportError::fetch(SHEET_FETCH_FAILED, err))?;
        let (_, batch) = normalize_csv(&text)?;
        reconcile_batch(
            self.store.as_ref(),
            domain_id,
            batch,
            PageUrlSource::SheetsImport,
            "Google Sheets Import",
            Utc::now(),
        )
        .await
    }

    /// Imports every tab of a workbook, one competitor domain per tab. The
    /// domain is taken from the hostname of the tab's first link and created
    /// when unknown. Tabs that cannot be used are logged and skipped.
    pub async fn import_multi_tab(&self, url: &str) -> Result<MultiTabSummary, ImportError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ImportError::Validation("No URL provided".to_string()));
        }

        let span = info_span!("multi_tab_import", run_id = %Uuid::new_v4());
        async move {
            let tabs = resolve_sheet_tabs(&self.http, url, &self.sheets_base_url).await?;
            info!(tabs = tabs.len(), "importing sheet tabs");

            let mut summary = MultiTabSummary::default();
            for tab in tabs {
                let text = match self.http.fetch_text(&tab.csv_url).await {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(tab = %tab.name, error = %err, "failed to fetch tab, skipping");
                        continue;
                    }
                };

                let table = match parse_csv(&text) {
                    Ok(table) => table,
                    Err(err) => {
                        warn!(tab = %tab.name, error = %err, "unreadable tab, skipping");
                        continue;
                    }
                };
                if table.is_empty() {
                    info!(tab = %tab.name, "tab has no rows, skipping");
                    continue;
                }
                let map = ColumnMap::resolve(&table.headers);
                if let Err(err) = map.ensure_required() {
                    warn!(tab = %tab.name, error = %err, "tab missing required columns, skipping");
                    continue;
                }
                let Some(domain_name) = table
                    .first_value(&map, CanonicalField::Link)
                    .and_then(extract_hostname)
                else {
                    warn!(tab = %tab.name, "could not detect domain from first link, skipping");
                    continue;
                };

                let batch = normalize_rows(&table, &map);
                if batch.rows.is_empty() {
                    warn!(tab = %tab.name, "tab has no valid rows, skipping");
                    continue;
                }

                let domain = self.store.get_or_create_domain(&domain_name).await?;
                let file_name = format!("Google Sheets - {}", tab.name);
                let result = reconcile_batch(
                    self.store.as_ref(),
                    domain.id,
                    batch,
                    PageUrlSource::SheetsImport,
                    &file_name,
                    Utc::now(),
                )
                .await?;

                summary.total_keywords += result.count;
                summary.results.push(TabImportResult {
                    domain: domain.domain_name,
                    keywords_imported: result.count,
                    urls_created: result.urls_created,
                });
            }

            summary.total_domains = summary.results.len();
            info!(
                domains = summary.total_domains,
                keywords = summary.total_keywords,
                "multi-tab import finished"
            );
            Ok::<_, ImportError>(summary)
        }
        .instrument(span)
        .await
    }
}
