//! Stop-word configuration service and the slug analysis that consumes it.

use std::collections::HashSet;

use pinrank_core::{analyze_slugs, DomainId, SlugWordCount, StopWordSettings};
use serde::Serialize;
use tracing::warn;

use crate::{ImportError, Importer};

pub const STOP_WORDS_KEY: &str = "stop_words";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlugAnalysis {
    pub domain_name: String,
    pub total_urls: usize,
    pub all_urls: Vec<String>,
    pub analysis: Vec<SlugWordCount>,
}

impl Importer {
    /// Stored stop-word settings, or the defaults when nothing (readable) is stored.
    pub async fn stop_word_settings(&self) -> Result<StopWordSettings, ImportError> {
        let Some(setting) = self.store.get_setting(STOP_WORDS_KEY).await? else {
            return Ok(StopWordSettings::default());
        };
        match serde_json::from_value(setting.value) {
            Ok(settings) => Ok(settings),
            Err(err) => {
                warn!(error = %err, "stored stop words are unreadable, using defaults");
                Ok(StopWordSettings::default())
            }
        }
    }

    pub async fn stop_words(&self) -> Result<HashSet<String>, ImportError> {
        Ok(self.stop_word_settings().await?.effective_set())
    }

    pub async fn save_stop_words(&self, settings: &StopWordSettings) -> Result<(), ImportError> {
        let value = serde_json::to_value(settings)
            .map_err(|err| ImportError::Validation(format!("invalid stop words: {err}")))?;
        self.store.put_setting(STOP_WORDS_KEY, &value).await?;
        Ok(())
    }

    pub async fn analyze_domain_slugs(&self, domain_id: DomainId) -> Result<SlugAnalysis, ImportError> {
        let domain = self.require_domain(domain_id).await?;
        let stop_words = self.stop_words().await?;
        let pages = self.store.domain_page_urls(domain_id).await?;

        let analysis = analyze_slugs(
            pages
                .iter()
                .filter(|p| !p.slug.is_empty())
                .map(|p| (p.slug.as_str(), p.url.as_str())),
            &stop_words,
        );

        Ok(SlugAnalysis {
            domain_name: domain.domain_name,
            total_urls: pages.len(),
            all_urls: pages.into_iter().map(|p| p.url).collect(),
            analysis,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pinrank_core::{NewDomain, NewPageUrl, PageUrlSource};
    use pinrank_fetch::{HttpClientConfig, HttpFetcher};
    use pinrank_store::{MemoryStore, Store};

    use super::*;

    fn importer(store: Arc<MemoryStore>) -> Importer {
        Importer::new(store, HttpFetcher::new(HttpClientConfig::default()).expect("http"))
    }

    #[tokio::test]
    async fn unset_stop_words_fall_back_to_defaults() {
        let importer = importer(Arc::new(MemoryStore::new()));
        let settings = importer.stop_word_settings().await.expect("settings");
        assert_eq!(settings, StopWordSettings::default());
        assert_eq!(
            serde_json::to_value(&settings).expect("json"),
            serde_json::json!({"stopWords": null, "customWords": []})
        );
        assert!(importer.stop_words().await.expect("set").contains("recipe"));
    }

    #[tokio::test]
    async fn saved_stop_words_replace_defaults_and_add_custom_words() {
        let importer = importer(Arc::new(MemoryStore::new()));
        importer
            .save_stop_words(&StopWordSettings {
                stop_words: Some(vec!["the".into()]),
                custom_words: vec!["Chocolate".into()],
            })
            .await
            .expect("save");
        let set = importer.stop_words().await.expect("set");
        assert!(set.contains("the"));
        assert!(set.contains("chocolate"));
        assert!(!set.contains("recipe"));
    }

    #[tokio::test]
    async fn slug_analysis_counts_words_across_domain_urls() {
        let store = Arc::new(MemoryStore::new());
        let site = store
            .create_domain(&NewDomain::from_input("site.com", None))
            .await
            .expect("domain");
        let page = |slug: &str| NewPageUrl {
            domain_id: site.id,
            url: format!("https://site.com/{slug}/"),
            slug: slug.to_string(),
            last_modified: None,
            source: PageUrlSource::Sitemap,
        };
        store
            .upsert_sitemap_urls(&[
                page("easy-chocolate-chip-cookies"),
                page("chocolate-cake-2024"),
                page("best-banana-bread"),
            ])
            .await
            .expect("urls");

        let analysis = importer(store)
            .analyze_domain_slugs(site.id)
            .await
            .expect("analysis");
        assert_eq!(analysis.domain_name, "site.com");
        assert_eq!(analysis.total_urls, 3);
        assert_eq!(analysis.all_urls.len(), 3);
        assert_eq!(analysis.analysis[0].word, "chocolate");
        assert_eq!(analysis.analysis[0].count, 2);
        assert!(analysis.analysis.iter().all(|w| w.word != "2024" && w.word != "easy"));
    }
}
