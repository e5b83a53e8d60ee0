//! Google Sheets URL handling: CSV export URLs and tab discovery.

use pinrank_fetch::HttpFetcher;
use regex::Regex;
use tracing::{info, warn};
use url::Url;

use crate::SourceError;

/// Host that serves editor pages and CSV exports for spreadsheet links.
pub const DEFAULT_SHEETS_BASE_URL: &str = "https://docs.google.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SheetTab {
    pub gid: String,
    pub name: String,
    pub csv_url: String,
}

/// The two shapes of shareable sheet links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetSource {
    /// "Publish to web" link (`/d/e/...`) or any URL already asking for CSV.
    Published { csv_url: String, gid: String },
    /// Regular `/spreadsheets/d/{id}/...` editor link.
    Spreadsheet {
        base_url: String,
        spreadsheet_id: String,
        gid: Option<String>,
    },
}

fn regex(pattern: &str) -> Result<Regex, SourceError> {
    Regex::new(pattern).map_err(|e| SourceError::InvalidSheetUrl(format!("regex compilation failed: {e}")))
}

fn gid_in(url: &str) -> Result<Option<String>, SourceError> {
    Ok(regex(r"gid=(\d+)")?
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string()))
}

impl SheetSource {
    /// Editor links are rebased onto `base_url`; published links keep their own host.
    pub fn classify(url: &str, base_url: &str) -> Result<Self, SourceError> {
        let url = url.trim();
        if url.contains("/d/e/") || url.contains("output=csv") {
            let csv_url = if url.contains("output=csv") {
                url.to_string()
            } else if url.contains('?') {
                format!("{url}&output=csv")
            } else {
                format!("{url}?output=csv")
            };
            return Ok(SheetSource::Published {
                csv_url,
                gid: gid_in(url)?.unwrap_or_else(|| "0".to_string()),
            });
        }

        let parsed = Url::parse(url).map_err(|e| SourceError::InvalidSheetUrl(format!("{e}")))?;
        let spreadsheet_id = regex(r"/d/([a-zA-Z0-9_-]+)")?
            .captures(parsed.path())
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| SourceError::InvalidSheetUrl("could not find sheet ID in URL path".to_string()))?;

        Ok(SheetSource::Spreadsheet {
            base_url: base_url.trim_end_matches('/').to_string(),
            spreadsheet_id,
            gid: gid_in(url)?,
        })
    }

    fn export_url(base_url: &str, spreadsheet_id: &str, gid: &str) -> String {
        format!("{base_url}/spreadsheets/d/{spreadsheet_id}/export?format=csv&gid={gid}")
    }
}

/// CSV location for a single-sheet import. Editor links are rewritten to the
/// export endpoint; anything else is fetched as given.
pub fn sheet_csv_url(url: &str, base_url: &str) -> String {
    let trimmed = url.trim();
    if trimmed.contains("/export") || trimmed.contains("output=csv") || !trimmed.contains("/spreadsheets/d/") {
        return trimmed.to_string();
    }
    match SheetSource::classify(trimmed, base_url) {
        Ok(SheetSource::Spreadsheet {
            base_url,
            spreadsheet_id,
            gid,
        }) => SheetSource::export_url(&base_url, &spreadsheet_id, gid.as_deref().unwrap_or("0")),
        _ => trimmed.to_string(),
    }
}

/// Scrapes `(gid, name)` pairs from a sheet's editor HTML, first occurrence of
/// each gid wins.
pub fn parse_tab_links(html: &str) -> Result<Vec<(String, String)>, SourceError> {
    let re = regex(r"gid=(\d+)[^>]*>([^<]+)<")?;
    let mut tabs: Vec<(String, String)> = Vec::new();
    for caps in re.captures_iter(html) {
        let gid = caps[1].to_string();
        let name = caps[2].trim().to_string();
        if name.is_empty() || tabs.iter().any(|(g, _)| *g == gid) {
            continue;
        }
        tabs.push((gid, name));
    }
    Ok(tabs)
}

/// Lists the tabs to import for `url`. Editor pages that cannot be fetched or
/// list no tabs fall back to the URL's gid (or `0`).
pub async fn resolve_sheet_tabs(
    http: &HttpFetcher,
    url: &str,
    base_url: &str,
) -> Result<Vec<SheetTab>, SourceError> {
    match SheetSource::classify(url, base_url)? {
        SheetSource::Published { csv_url, gid } => Ok(vec![SheetTab {
            name: format!("Sheet (gid={gid})"),
            gid,
            csv_url,
        }]),
        SheetSource::Spreadsheet {
            base_url,
            spreadsheet_id,
            gid,
        } => {
            let edit_url = format!("{base_url}/spreadsheets/d/{spreadsheet_id}/edit");
            let mut tabs = match http.fetch_text(&edit_url).await {
                Ok(html) => parse_tab_links(&html)?,
                Err(err) => {
                    warn!(error = %err, "could not fetch sheet tabs, using gid from URL");
                    Vec::new()
                }
            };
            if tabs.is_empty() {
                tabs.push((gid.unwrap_or_else(|| "0".to_string()), "Sheet1".to_string()));
            }
            info!(spreadsheet_id = %spreadsheet_id, tabs = tabs.len(), "resolved sheet tabs");
            Ok(tabs
                .into_iter()
                .map(|(gid, name)| SheetTab {
                    csv_url: SheetSource::export_url(&base_url, &spreadsheet_id, &gid),
                    gid,
                    name,
                })
                .collect())
        }
    }
}
