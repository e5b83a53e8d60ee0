//! Core domain model for pinrank: tracked domains, page URLs, keywords and rankings.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub mod slugs;

pub use slugs::{analyze_slugs, tokenize_slug, SlugWordCount, StopWordSettings, DEFAULT_STOP_WORDS};

pub const CRATE_NAME: &str = "pinrank-core";

pub type DomainId = i64;
pub type PageUrlId = i64;
pub type KeywordId = i64;

/// A tracked competitor website, identified by hostname.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domain {
    pub id: DomainId,
    pub domain_name: String,
    pub pinclicks_account_url: Option<String>,
    pub monthly_views: i32,
    pub total_keywords: i32,
    pub total_recipe_urls: i32,
    pub status: String,
    pub last_sitemap_import: Option<DateTime<Utc>>,
    pub last_keywords_import: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDomain {
    pub domain_name: String,
    pub pinclicks_account_url: Option<String>,
}

impl NewDomain {
    /// Strips a leading scheme and one trailing slash from user input.
    pub fn from_input(domain_name: &str, pinclicks_account_url: Option<String>) -> Self {
        let trimmed = domain_name.trim();
        let without_scheme = trimmed
            .strip_prefix("https://")
            .or_else(|| trimmed.strip_prefix("http://"))
            .unwrap_or(trimmed);
        let clean = without_scheme.strip_suffix('/').unwrap_or(without_scheme);
        Self {
            domain_name: clean.to_string(),
            pinclicks_account_url: pinclicks_account_url.filter(|u| !u.trim().is_empty()),
        }
    }
}

/// Where a page URL row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageUrlSource {
    Sitemap,
    CsvImport,
    SheetsImport,
}

impl PageUrlSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageUrlSource::Sitemap => "sitemap",
            PageUrlSource::CsvImport => "csv_import",
            PageUrlSource::SheetsImport => "sheets_import",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sitemap" => Some(PageUrlSource::Sitemap),
            "csv_import" => Some(PageUrlSource::CsvImport),
            "sheets_import" => Some(PageUrlSource::SheetsImport),
            _ => None,
        }
    }
}

/// A specific page on a tracked domain ("recipe URL").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUrl {
    pub id: PageUrlId,
    pub domain_id: DomainId,
    pub url: String,
    pub slug: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub source: PageUrlSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPageUrl {
    pub domain_id: DomainId,
    pub url: String,
    pub slug: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub source: PageUrlSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyword {
    pub id: KeywordId,
    pub keyword_text: String,
    pub created_at: DateTime<Utc>,
}

/// One domain's observed position for one keyword on one import snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordRanking {
    pub id: i64,
    pub keyword_id: KeywordId,
    pub domain_id: DomainId,
    pub page_url_id: Option<PageUrlId>,
    pub position: i32,
    pub position_change: Option<i32>,
    pub search_volume: Option<i32>,
    pub pinterest_pin_url: Option<String>,
    pub pin_image_url: Option<String>,
    pub tracked_date: NaiveDate,
    pub imported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRanking {
    pub keyword_id: KeywordId,
    pub domain_id: DomainId,
    pub page_url_id: Option<PageUrlId>,
    pub position: i32,
    pub position_change: Option<i32>,
    pub search_volume: Option<i32>,
    pub pinterest_pin_url: Option<String>,
    pub pin_image_url: Option<String>,
    pub tracked_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportType {
    Sitemap,
    Keywords,
}

impl ImportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportType::Sitemap => "sitemap",
            ImportType::Keywords => "keywords",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sitemap" => Some(ImportType::Sitemap),
            "keywords" => Some(ImportType::Keywords),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportWarning {
    pub message: String,
}

impl ImportWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Append-only audit record of one import run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportLog {
    pub id: i64,
    pub domain_id: DomainId,
    pub import_type: ImportType,
    pub file_name: Option<String>,
    pub rows_imported: i32,
    pub rows_skipped: Option<i32>,
    pub warnings: Option<Vec<ImportWarning>>,
    pub imported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImportLog {
    pub domain_id: DomainId,
    pub import_type: ImportType,
    pub file_name: Option<String>,
    pub rows_imported: i32,
    pub rows_skipped: Option<i32>,
    pub warnings: Option<Vec<ImportWarning>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSetting {
    pub id: i64,
    pub key: String,
    pub value: serde_json::Value,
    pub updated_at: DateTime<Utc>,
}

/// Normalized handoff contract from the row normalizer into reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub keyword: String,
    pub link: String,
    pub position: i32,
    pub volume: i32,
    pub change: Option<i32>,
    pub pin: Option<String>,
}

// Report rows.

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinRollup {
    pub pinterest_pin_url: String,
    pub keyword_count: i64,
    pub total_volume: i64,
    pub recipe_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordCoverageRow {
    pub id: KeywordId,
    pub keyword_text: String,
    pub domain_count: i64,
    pub volume: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordRankingDetail {
    pub domain_name: String,
    pub position: i32,
    pub url: Option<String>,
    pub pinterest_pin_url: Option<String>,
    pub pin_image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainKeywordRow {
    pub id: KeywordId,
    pub keyword_text: String,
    pub position: i32,
    pub search_volume: Option<i32>,
    pub pinterest_pin_url: Option<String>,
    pub recipe_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordStats {
    pub total_keywords: i64,
    pub total_volume: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportLogEntry {
    pub id: i64,
    pub domain_name: Option<String>,
    pub import_type: ImportType,
    pub rows_imported: i32,
    pub rows_skipped: Option<i32>,
    pub file_name: Option<String>,
    pub imported_at: DateTime<Utc>,
    pub warnings: Option<Vec<ImportWarning>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(page: u32, limit: u32, total: i64) -> Self {
        let limit = limit.max(1);
        let total_pages = if total <= 0 {
            0
        } else {
            (total + i64::from(limit) - 1) / i64::from(limit)
        };
        Self {
            page: page.max(1),
            limit,
            total,
            total_pages,
        }
    }

    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_domain_strips_scheme_and_trailing_slash() {
        let d = NewDomain::from_input("https://www.bakingsite.com/", None);
        assert_eq!(d.domain_name, "www.bakingsite.com");
        let d = NewDomain::from_input("http://foodblog.net", Some("  ".into()));
        assert_eq!(d.domain_name, "foodblog.net");
        assert_eq!(d.pinclicks_account_url, None);
    }

    #[test]
    fn pagination_rounds_total_pages_up() {
        let p = Pagination::new(2, 50, 101);
        assert_eq!(p.total_pages, 3);
        assert_eq!(p.offset(), 50);
        assert_eq!(Pagination::new(0, 0, 0).total_pages, 0);
    }
}
