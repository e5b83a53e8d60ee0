use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pinrank_core::DomainId;
use pinrank_import::{AppConfig, Importer};
use pinrank_store::{MemoryStore, PgStore, Store};
use pinrank_web::AppState;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "pinrank-cli")]
#[command(about = "Competitor Pinterest keyword rank tracker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the admin dashboard and JSON API.
    Serve {
        #[arg(long)]
        port: Option<u16>,
        /// Keep everything in process memory instead of Postgres.
        #[arg(long)]
        in_memory: bool,
    },
    /// Apply database migrations.
    Migrate,
    /// Replace a domain's rankings with a local CSV export.
    ImportCsv {
        #[arg(long)]
        domain: DomainId,
        file: PathBuf,
    },
    /// Replace a domain's rankings with a published sheet or CSV URL.
    ImportSheet {
        #[arg(long)]
        domain: DomainId,
        url: String,
    },
    /// Import every tab of a workbook, one competitor domain per tab.
    ImportSheets { url: String },
    /// Fetch a sitemap (following one level of index) into a domain's URL inventory.
    Sitemap {
        #[arg(long)]
        domain: DomainId,
        url: String,
    },
    /// Print the most frequent slug words for a domain.
    Slugs {
        #[arg(long)]
        domain: DomainId,
        #[arg(long, default_value_t = 20)]
        top: usize,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).compact().init();
}

async fn postgres_store(config: &AppConfig) -> Result<PgStore> {
    let store = PgStore::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;
    store.migrate().await.context("failed to run migrations")?;
    Ok(store)
}

async fn importer(config: &AppConfig) -> Result<Importer> {
    let store: Arc<dyn Store> = Arc::new(postgres_store(config).await?);
    Importer::from_config(store, config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve {
        port: None,
        in_memory: false,
    }) {
        Commands::Serve { port, in_memory } => {
            let store: Arc<dyn Store> = if in_memory {
                warn!("using in-memory store; data is lost on exit");
                Arc::new(MemoryStore::new())
            } else {
                Arc::new(postgres_store(&config).await?)
            };
            if config.admin_key.is_none() {
                warn!("ADMIN_KEY is not set; every dashboard and API route will be rejected");
            }
            let importer = Importer::from_config(store, &config)?;
            let state = AppState::new(importer, config.admin_key.clone());
            pinrank_web::serve(state, port.unwrap_or(config.web_port)).await?;
        }
        Commands::Migrate => {
            postgres_store(&config).await?;
            println!("migrations applied");
        }
        Commands::ImportCsv { domain, file } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.csv".to_string());
            let summary = importer(&config)
                .await?
                .import_csv_text(domain, &text, &file_name)
                .await?;
            println!(
                "import complete: domain={} rankings={} skipped={} urls_created={} keywords_created={}",
                summary.domain_id, summary.count, summary.skipped, summary.urls_created, summary.keywords_created
            );
        }
        Commands::ImportSheet { domain, url } => {
            let summary = importer(&config).await?.import_sheet_url(domain, &url).await?;
            println!(
                "import complete: domain={} rankings={} skipped={} urls_created={}",
                summary.domain_id, summary.count, summary.skipped, summary.urls_created
            );
        }
        Commands::ImportSheets { url } => {
            let summary = importer(&config).await?.import_multi_tab(&url).await?;
            for result in &summary.results {
                println!(
                    "{}: keywords={} urls_created={}",
                    result.domain, result.keywords_imported, result.urls_created
                );
            }
            println!(
                "import complete: domains={} keywords={}",
                summary.total_domains, summary.total_keywords
            );
        }
        Commands::Sitemap { domain, url } => {
            let importer = importer(&config).await?;
            let parsed = importer.fetch_domain_sitemap(domain, &url).await?;
            let mut entries = parsed.urls;
            if !parsed.sitemaps.is_empty() {
                info!(children = parsed.sitemaps.len(), "sitemap index found, fetching children");
                let batch = importer.fetch_child_sitemaps(domain, &parsed.sitemaps).await?;
                if batch.failed > 0 {
                    warn!(failed = batch.failed, "some child sitemaps could not be fetched");
                }
                entries.extend(batch.urls);
            }
            let summary = importer.ingest_sitemap_entries(domain, &entries).await?;
            println!(
                "sitemap complete: added={} skipped={} total_urls={}",
                summary.added, summary.skipped, summary.total_urls
            );
        }
        Commands::Slugs { domain, top } => {
            let analysis = importer(&config).await?.analyze_domain_slugs(domain).await?;
            println!("{} ({} urls)", analysis.domain_name, analysis.total_urls);
            for word in analysis.analysis.iter().take(top) {
                println!("{:>6}  {}", word.count, word.word);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_import_csv_arguments() {
        let cli = Cli::parse_from(["pinrank-cli", "import-csv", "--domain", "3", "ranks.csv"]);
        match cli.command {
            Some(Commands::ImportCsv { domain, file }) => {
                assert_eq!(domain, 3);
                assert_eq!(file, PathBuf::from("ranks.csv"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn serve_flags_are_optional() {
        let cli = Cli::parse_from(["pinrank-cli", "serve", "--in-memory"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Serve { port: None, in_memory: true })
        ));
    }
}
