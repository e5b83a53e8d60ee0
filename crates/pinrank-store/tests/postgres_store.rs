use chrono::{NaiveDate, Utc};
use pinrank_core::{ImportType, NewDomain, NewImportLog, NewPageUrl, NewRanking, PageUrlSource};
use pinrank_store::{PgStore, Store, StoreError};

async fn store_from_env() -> Option<PgStore> {
    let database_url = std::env::var("DATABASE_URL").ok()?;
    let store = PgStore::connect(&database_url).await.expect("connect");
    store.migrate().await.expect("migrate");
    Some(store)
}

#[tokio::test]
async fn postgres_store_honours_unique_keys() {
    let Some(store) = store_from_env().await else {
        return;
    };
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let domain_name = format!("pg-{suffix}.example.com");

    let domain = store
        .create_domain(&NewDomain::from_input(&domain_name, None))
        .await
        .expect("create");
    let dup = store.create_domain(&NewDomain::from_input(&domain_name, None)).await;
    assert!(matches!(dup, Err(StoreError::Conflict(_))));
    assert_eq!(
        store.get_or_create_domain(&domain_name).await.expect("reread").id,
        domain.id
    );

    let keyword = format!("pg keyword {suffix}");
    let url = format!("https://{domain_name}/banana-bread/");
    store.insert_keywords(&[keyword.clone()]).await.expect("keywords");
    store
        .insert_page_urls(&[NewPageUrl {
            domain_id: domain.id,
            url: url.clone(),
            slug: "banana-bread".into(),
            last_modified: Some(Utc::now()),
            source: PageUrlSource::CsvImport,
        }])
        .await
        .expect("urls");

    let keyword_id = store.keyword_ids_for(&[keyword.clone()]).await.expect("ids")[&keyword];
    let url_id = store.url_ids_for(&[url.clone()]).await.expect("ids")[&url];
    let ranking = NewRanking {
        keyword_id,
        domain_id: domain.id,
        page_url_id: Some(url_id),
        position: 3,
        position_change: Some(-1),
        search_volume: Some(1200),
        pinterest_pin_url: Some("https://pinterest.com/pin/1".into()),
        pin_image_url: None,
        tracked_date: NaiveDate::from_ymd_opt(2024, 5, 1).expect("date"),
    };
    assert_eq!(store.insert_rankings(&[ranking.clone(), ranking]).await.expect("insert"), 1);

    let detail = store.keyword_rankings(keyword_id).await.expect("detail");
    assert_eq!(detail.len(), 1);
    assert_eq!(detail[0].url.as_deref(), Some(url.as_str()));

    let log = store
        .append_import_log(&NewImportLog {
            domain_id: domain.id,
            import_type: ImportType::Keywords,
            file_name: Some("test.csv".into()),
            rows_imported: 1,
            rows_skipped: Some(0),
            warnings: None,
        })
        .await
        .expect("log");
    assert_eq!(log.import_type, ImportType::Keywords);

    assert!(store.delete_domain(domain.id).await.expect("delete"));
    assert_eq!(store.count_domain_urls(domain.id).await.expect("count"), 0);
}
