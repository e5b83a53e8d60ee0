//! Row normalizer: maps arbitrary spreadsheet headers onto [`CanonicalRow`]s.

use std::collections::BTreeMap;

use pinrank_core::CanonicalRow;
use url::Url;

use crate::SourceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalField {
    Keyword,
    Volume,
    Link,
    Pin,
    Position,
    Change,
}

impl CanonicalField {
    pub fn label(&self) -> &'static str {
        match self {
            CanonicalField::Keyword => "Keyword",
            CanonicalField::Volume => "Volume",
            CanonicalField::Link => "Link",
            CanonicalField::Pin => "Pin",
            CanonicalField::Position => "Position",
            CanonicalField::Change => "Change",
        }
    }
}

pub const REQUIRED_FIELDS: &[CanonicalField] = &[CanonicalField::Keyword, CanonicalField::Link];

#[derive(Debug, Clone, Copy)]
enum HeaderPattern {
    Exact(&'static [&'static str]),
    Contains(&'static str),
}

impl HeaderPattern {
    fn matches(&self, normalized_header: &str) -> bool {
        match self {
            HeaderPattern::Exact(names) => names.iter().any(|n| *n == normalized_header),
            HeaderPattern::Contains(needle) => normalized_header.contains(needle),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ColumnRule {
    field: CanonicalField,
    pattern: HeaderPattern,
}

const COLUMN_RULES: &[ColumnRule] = &[
    ColumnRule {
        field: CanonicalField::Keyword,
        pattern: HeaderPattern::Contains("keyword"),
    },
    ColumnRule {
        field: CanonicalField::Keyword,
        pattern: HeaderPattern::Exact(&["search term"]),
    },
    ColumnRule {
        field: CanonicalField::Volume,
        pattern: HeaderPattern::Exact(&["volume"]),
    },
    ColumnRule {
        field: CanonicalField::Link,
        pattern: HeaderPattern::Exact(&["link", "url"]),
    },
    ColumnRule {
        field: CanonicalField::Pin,
        pattern: HeaderPattern::Exact(&["pin", "pinterest"]),
    },
    ColumnRule {
        field: CanonicalField::Position,
        pattern: HeaderPattern::Contains("position"),
    },
    ColumnRule {
        field: CanonicalField::Change,
        pattern: HeaderPattern::Exact(&["change"]),
    },
];

/// Header → canonical field resolution for one import. Later headers win when
/// several match the same field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    headers: Vec<String>,
    columns: BTreeMap<CanonicalField, usize>,
}

impl ColumnMap {
    pub fn resolve(headers: &[String]) -> Self {
        let mut columns = BTreeMap::new();
        for (idx, header) in headers.iter().enumerate() {
            let normalized = header.trim().to_lowercase();
            for rule in COLUMN_RULES {
                if rule.pattern.matches(&normalized) {
                    columns.insert(rule.field, idx);
                }
            }
        }
        Self {
            headers: headers.to_vec(),
            columns,
        }
    }

    pub fn header_for(&self, field: CanonicalField) -> Option<&str> {
        self.columns
            .get(&field)
            .and_then(|idx| self.headers.get(*idx))
            .map(String::as_str)
    }

    pub fn index_of(&self, field: CanonicalField) -> Option<usize> {
        self.columns.get(&field).copied()
    }

    pub fn missing_required(&self) -> Vec<CanonicalField> {
        REQUIRED_FIELDS
            .iter()
            .filter(|f| !self.columns.contains_key(f))
            .copied()
            .collect()
    }

    pub fn ensure_required(&self) -> Result<(), SourceError> {
        let missing = self.missing_required();
        if missing.is_empty() {
            return Ok(());
        }
        Err(SourceError::MissingColumns {
            missing: missing.iter().map(|f| f.label().to_string()).collect(),
            found: self.headers.clone(),
        })
    }
}

/// Header row plus data records as decoded from CSV.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `field` in the first data row, if that column is mapped.
    pub fn first_value(&self, map: &ColumnMap, field: CanonicalField) -> Option<&str> {
        let idx = map.index_of(field)?;
        self.rows.first().map(|row| cell(row, Some(idx)))
    }
}

/// Decodes CSV text with a header row; ragged records are tolerated.
pub fn parse_csv(text: &str) -> Result<RawTable, SourceError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()?
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        rows.push(record.iter().map(ToString::to_string).collect());
    }

    Ok(RawTable { headers, rows })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedBatch {
    pub rows: Vec<CanonicalRow>,
    pub skipped: usize,
}

fn cell(row: &[String], idx: Option<usize>) -> &str {
    idx.and_then(|i| row.get(i)).map(String::as_str).unwrap_or("")
}

/// Maps every raw record to a [`CanonicalRow`]; records without a keyword or
/// link are counted as skipped.
pub fn normalize_rows(table: &RawTable, map: &ColumnMap) -> NormalizedBatch {
    let keyword_idx = map.index_of(CanonicalField::Keyword);
    let link_idx = map.index_of(CanonicalField::Link);
    let position_idx = map.index_of(CanonicalField::Position);
    let volume_idx = map.index_of(CanonicalField::Volume);
    let change_idx = map.index_of(CanonicalField::Change);
    let pin_idx = map.index_of(CanonicalField::Pin);

    let mut batch = NormalizedBatch::default();
    for row in &table.rows {
        let keyword = cell(row, keyword_idx).trim();
        let link = cell(row, link_idx).trim();
        if keyword.is_empty() || link.is_empty() {
            batch.skipped += 1;
            continue;
        }

        let pin = cell(row, pin_idx).trim();
        batch.rows.push(CanonicalRow {
            keyword: keyword.to_string(),
            link: link.to_string(),
            position: parse_count(cell(row, position_idx)),
            volume: parse_count(cell(row, volume_idx)),
            change: change_idx.and_then(|idx| parse_change(cell(row, Some(idx)))),
            pin: (!pin.is_empty()).then(|| pin.to_string()),
        });
    }
    batch
}

/// Leading-integer parse after removing thousands separators; `None` for
/// empty, `unknown` or non-numeric input.
fn parse_leading_int(raw: &str) -> Option<i64> {
    let cleaned = raw.replace(',', "");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("unknown") {
        return None;
    }

    let (sign, digits) = if let Some(rest) = trimmed.strip_prefix('-') {
        (-1, rest)
    } else if let Some(rest) = trimmed.strip_prefix('+') {
        (1, rest)
    } else {
        (1, trimmed)
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    digits[..end].parse::<i64>().ok().map(|v| sign * v)
}

/// Position/volume parsing: non-negative, defaulting to 0.
pub fn parse_count(raw: &str) -> i32 {
    parse_leading_int(raw)
        .filter(|v| *v >= 0)
        .and_then(|v| i32::try_from(v).ok())
        .unwrap_or(0)
}

/// Position-change parsing: `None` means no change was recorded.
pub fn parse_change(raw: &str) -> Option<i32> {
    parse_leading_int(raw).and_then(|v| i32::try_from(v).ok())
}

/// URL path with one leading and one trailing slash removed; `None` when the
/// URL cannot be parsed.
pub fn url_path_slug(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let path = parsed.path();
    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    Some(path.to_string())
}

pub fn extract_slug(url: &str) -> String {
    url_path_slug(url)
        .filter(|slug| !slug.is_empty())
        .unwrap_or_else(|| "home".to_string())
}

/// Hostname with a leading `www.` removed.
pub fn extract_hostname(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    (!host.is_empty()).then(|| host.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn exact_rules_do_not_match_substrings() {
        let map = ColumnMap::resolve(&headers(&["Search Term", "Est. Volume", "Page Link", "Pin URL"]));
        assert_eq!(map.header_for(CanonicalField::Keyword), Some("Search Term"));
        assert_eq!(map.header_for(CanonicalField::Volume), None);
        assert_eq!(map.header_for(CanonicalField::Link), None);
        assert_eq!(map.header_for(CanonicalField::Pin), None);
        assert_eq!(map.missing_required(), vec![CanonicalField::Link]);
    }

    #[test]
    fn contains_rules_are_case_insensitive_and_last_header_wins() {
        let map = ColumnMap::resolve(&headers(&[
            " KEYWORD ",
            "Current Position",
            "URL",
            "Pinterest",
            "Change",
            "Target Keyword",
        ]));
        assert_eq!(map.header_for(CanonicalField::Keyword), Some("Target Keyword"));
        assert_eq!(map.header_for(CanonicalField::Position), Some("Current Position"));
        assert_eq!(map.header_for(CanonicalField::Link), Some("URL"));
        assert_eq!(map.header_for(CanonicalField::Pin), Some("Pinterest"));
        assert_eq!(map.header_for(CanonicalField::Change), Some("Change"));
        assert!(map.ensure_required().is_ok());
    }

    #[test]
    fn missing_required_columns_report_found_headers() {
        let map = ColumnMap::resolve(&headers(&["Volume", "Pin"]));
        let err = map.ensure_required().expect_err("missing columns");
        let message = err.to_string();
        assert_eq!(message, "Missing required columns: Keyword, Link. Found: Volume, Pin");
    }

    #[test]
    fn numeric_parsing_never_fails() {
        assert_eq!(parse_count("1,200"), 1200);
        assert_eq!(parse_count(" 3 "), 3);
        assert_eq!(parse_count("Unknown"), 0);
        assert_eq!(parse_count(""), 0);
        assert_eq!(parse_count("abc"), 0);
        assert_eq!(parse_count("12.7"), 12);
        assert_eq!(parse_count("-4"), 0);
        assert_eq!(parse_count("99999999999"), 0);

        assert_eq!(parse_change("-4"), Some(-4));
        assert_eq!(parse_change("+2"), Some(2));
        assert_eq!(parse_change("0"), Some(0));
        assert_eq!(parse_change("unknown"), None);
        assert_eq!(parse_change("n/a"), None);
    }

    #[test]
    fn slug_extraction_examples() {
        assert_eq!(extract_slug("https://x.com/a/b/"), "a/b");
        assert_eq!(extract_slug("https://x.com/"), "home");
        assert_eq!(extract_slug("not a url"), "home");
        assert_eq!(url_path_slug("https://x.com/"), Some(String::new()));
        assert_eq!(url_path_slug("::"), None);
    }

    #[test]
    fn hostname_drops_www_prefix() {
        assert_eq!(extract_hostname("https://www.site.com/x").as_deref(), Some("site.com"));
        assert_eq!(extract_hostname("https://blog.site.com").as_deref(), Some("blog.site.com"));
        assert_eq!(extract_hostname("site.com/x"), None);
    }

    #[test]
    fn csv_rows_normalize_with_defaults_and_skips() {
        let csv = "\u{feff}Keyword,Link,Position,Volume,Pin,Change\n\
                   banana bread,https://site.com/banana-bread,3,\"1,200\",https://pinterest.com/pin/1,\n\
                   ,https://site.com/empty-keyword,1,10,,\n\
                   soup,,1,10,,\n\
                   \n\
                   chili,https://site.com/chili,unknown,n/a, ,-2\n\
                   short row,https://site.com/short\n";
        let table = parse_csv(csv).expect("csv");
        assert_eq!(table.headers[0], "Keyword");
        let map = ColumnMap::resolve(&table.headers);
        let batch = normalize_rows(&table, &map);

        assert_eq!(batch.skipped, 2);
        assert_eq!(batch.rows.len(), 3);
        assert_eq!(
            batch.rows[0],
            CanonicalRow {
                keyword: "banana bread".into(),
                link: "https://site.com/banana-bread".into(),
                position: 3,
                volume: 1200,
                change: None,
                pin: Some("https://pinterest.com/pin/1".into()),
            }
        );
        assert_eq!(batch.rows[1].position, 0);
        assert_eq!(batch.rows[1].volume, 0);
        assert_eq!(batch.rows[1].change, Some(-2));
        assert_eq!(batch.rows[1].pin, None);
        assert_eq!(batch.rows[2].keyword, "short row");
        assert_eq!(batch.rows[2].position, 0);
    }

    #[test]
    fn change_stays_null_when_column_is_absent() {
        let table = parse_csv("keyword,url\nsoup,https://a.com/soup\n").expect("csv");
        let batch = normalize_rows(&table, &ColumnMap::resolve(&table.headers));
        assert_eq!(batch.rows[0].change, None);
        assert_eq!(table.first_value(&ColumnMap::resolve(&table.headers), CanonicalField::Link), Some("https://a.com/soup"));
    }
}
