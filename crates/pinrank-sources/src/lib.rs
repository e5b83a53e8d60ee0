//! Import sources: keyword-ranking spreadsheets, CSV exports and sitemaps.

use pinrank_fetch::FetchError;
use thiserror::Error;

pub mod columns;
pub mod sheets;
pub mod sitemap;

pub use columns::{
    extract_hostname, extract_slug, normalize_rows, parse_change, parse_count, parse_csv,
    url_path_slug, CanonicalField, ColumnMap, NormalizedBatch, RawTable,
};
pub use sheets::{
    parse_tab_links, resolve_sheet_tabs, sheet_csv_url, SheetSource, SheetTab, DEFAULT_SHEETS_BASE_URL,
};
pub use sitemap::{fetch_sitemap, parse_sitemap, ParsedSitemap, SitemapEntry};

pub const CRATE_NAME: &str = "pinrank-sources";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Missing required columns: {}. Found: {}", .missing.join(", "), .found.join(", "))]
    MissingColumns {
        missing: Vec<String>,
        found: Vec<String>,
    },
    #[error("Invalid Google Sheets URL: {0}")]
    InvalidSheetUrl(String),
    #[error("csv parse error: {0}")]
    Csv(#[from] csv::Error),
    #[error("sitemap parse error: {0}")]
    Sitemap(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
}
