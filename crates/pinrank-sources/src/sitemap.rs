//! Sitemap fetch + parse. Index documents are returned as child URLs; the
//! caller decides which children to fetch.

use pinrank_fetch::HttpFetcher;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::SourceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SitemapEntry {
    pub loc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lastmod: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedSitemap {
    pub urls: Vec<SitemapEntry>,
    pub sitemaps: Vec<String>,
}

fn selector(css: &str) -> Result<Selector, SourceError> {
    Selector::parse(css).map_err(|e| SourceError::Sitemap(format!("invalid selector {css}: {e}")))
}

fn child_text(element: &ElementRef<'_>, sel: &Selector) -> Option<String> {
    element
        .select(sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Parses a `<sitemapindex>` or `<urlset>` document. Any other root yields
/// empty lists.
pub fn parse_sitemap(xml: &str) -> Result<ParsedSitemap, SourceError> {
    // The HTML tree builder turns CDATA sections into comments, so unwrap them first.
    let xml = xml.replace("<![CDATA[", "").replace("]]>", "");
    let document = Html::parse_document(&xml);

    let index_entry = selector("sitemapindex > sitemap")?;
    let url_entry = selector("urlset > url")?;
    let loc = selector("loc")?;
    let lastmod = selector("lastmod")?;

    let sitemaps = document
        .select(&index_entry)
        .filter_map(|entry| child_text(&entry, &loc))
        .collect::<Vec<_>>();

    let urls = document
        .select(&url_entry)
        .filter_map(|entry| {
            child_text(&entry, &loc).map(|loc_text| SitemapEntry {
                loc: loc_text,
                lastmod: child_text(&entry, &lastmod),
            })
        })
        .collect::<Vec<_>>();

    Ok(ParsedSitemap { urls, sitemaps })
}

pub async fn fetch_sitemap(http: &HttpFetcher, url: &str) -> Result<ParsedSitemap, SourceError> {
    let xml = http.fetch_text(url).await?;
    let parsed = parse_sitemap(&xml)?;
    info!(
        url,
        urls = parsed.urls.len(),
        sitemaps = parsed.sitemaps.len(),
        "parsed sitemap"
    );
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method, MockServer};
    use pinrank_fetch::HttpClientConfig;

    const URLSET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
        xmlns:image="http://www.google.com/schemas/sitemap-image/1.1">
  <url>
    <loc>https://site.com/banana-bread/</loc>
    <lastmod>2024-05-01T10:00:00+00:00</lastmod>
    <image:image><image:loc>https://site.com/img/banana.jpg</image:loc></image:image>
  </url>
  <url>
    <loc><![CDATA[https://site.com/pasta?a=1&b=2]]></loc>
  </url>
  <url><lastmod>2024-01-01</lastmod></url>
</urlset>"#;

    const INDEX: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://site.com/post-sitemap.xml</loc></sitemap>
  <sitemap><loc> https://site.com/page-sitemap.xml </loc><lastmod>2024-02-01</lastmod></sitemap>
</sitemapindex>"#;

    #[test]
    fn urlset_yields_page_entries() {
        let parsed = parse_sitemap(URLSET).expect("parse");
        assert!(parsed.sitemaps.is_empty());
        assert_eq!(
            parsed.urls,
            vec![
                SitemapEntry {
                    loc: "https://site.com/banana-bread/".into(),
                    lastmod: Some("2024-05-01T10:00:00+00:00".into()),
                },
                SitemapEntry {
                    loc: "https://site.com/pasta?a=1&b=2".into(),
                    lastmod: None,
                },
            ]
        );
    }

    #[test]
    fn sitemap_index_yields_child_sitemaps_only() {
        let parsed = parse_sitemap(INDEX).expect("parse");
        assert!(parsed.urls.is_empty());
        assert_eq!(
            parsed.sitemaps,
            vec![
                "https://site.com/post-sitemap.xml".to_string(),
                "https://site.com/page-sitemap.xml".to_string(),
            ]
        );
    }

    #[test]
    fn unknown_root_yields_empty_lists() {
        let parsed = parse_sitemap("<rss><channel><item><loc>x</loc></item></channel></rss>")
            .expect("parse");
        assert_eq!(parsed, ParsedSitemap::default());
    }

    #[tokio::test]
    async fn fetch_failure_surfaces_as_fetch_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::GET).path("/sitemap.xml");
                then.status(404);
            })
            .await;
        let http = HttpFetcher::new(HttpClientConfig::default()).expect("http");
        let err = fetch_sitemap(&http, &server.url("/sitemap.xml"))
            .await
            .expect_err("404");
        assert!(matches!(err, SourceError::Fetch(_)));
    }

    #[tokio::test]
    async fn fetch_parses_remote_document() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(Method::GET).path("/sitemap_index.xml");
                then.status(200)
                    .header("content-type", "application/xml")
                    .body(INDEX);
            })
            .await;
        let http = HttpFetcher::new(HttpClientConfig::default()).expect("http");
        let parsed = fetch_sitemap(&http, &server.url("/sitemap_index.xml"))
            .await
            .expect("fetch");
        assert_eq!(parsed.sitemaps.len(), 2);
    }
}
