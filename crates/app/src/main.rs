use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use s1000d_index_core::{
    ContentClassifier, ContentExtractor, ContentType, DiskStore, HashEmbedder, HttpOcrClient,
    IndexConfig, IndexSession, InMemoryStore, LopdfReader, MetadataFilter, OcrEngine, VectorStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "s1000d-index", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to the S1000D specification PDF.
    #[arg(long, env = "PDF_PATH", default_value = "s1000d.pdf")]
    pdf: PathBuf,

    /// Collection name inside the store.
    #[arg(long, env = "COLLECTION_NAME", default_value = "s1000d_docs")]
    collection: String,

    /// Directory for the persistent store backend.
    #[arg(long, env = "INDEX_DATA_DIR", default_value = "./index_data")]
    data_dir: PathBuf,

    /// Store backend to use.
    #[arg(long, value_enum, default_value_t = StoreKind::Disk)]
    store: StoreKind,

    /// OCR service endpoint; OCR is skipped when unset.
    #[arg(long, env = "OCR_ENDPOINT")]
    ocr_endpoint: Option<String>,

    /// Bearer key for the OCR service.
    #[arg(long, env = "OCR_API_KEY")]
    ocr_api_key: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum StoreKind {
    Disk,
    Memory,
}

#[derive(Subcommand)]
enum Command {
    /// Extract, chunk, embed and store a page range.
    Index {
        #[arg(long, default_value = "1")]
        start_page: u32,
        /// Last page to index; the whole document when omitted.
        #[arg(long)]
        end_page: Option<u32>,
        /// Delete the collection before indexing.
        #[arg(long, default_value_t = false)]
        force: bool,
        /// Skip the OCR pass even when an endpoint is configured.
        #[arg(long, default_value_t = false)]
        no_ocr: bool,
    },
    /// Ranked search over the indexed collection.
    Search {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "10")]
        top_k: usize,
        /// Restrict results to one chapter.
        #[arg(long)]
        chapter: Option<String>,
        /// Restrict results to one content type.
        #[arg(long)]
        content_type: Option<ContentType>,
        /// Minimum importance (1-5).
        #[arg(long)]
        min_importance: Option<u8>,
        /// Emit results as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Collection and document statistics.
    Stats,
    /// Delete the collection.
    Reset,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        "s1000d-index boot"
    );

    let ocr_disabled = matches!(&cli.command, Command::Index { no_ocr: true, .. });
    let config = IndexConfig {
        pdf_path: cli.pdf.clone(),
        collection_name: cli.collection.clone(),
        persist_dir: cli.data_dir.clone(),
        ocr_enabled: !ocr_disabled && cli.ocr_endpoint.is_some(),
        ocr_endpoint: cli.ocr_endpoint.clone(),
        ocr_api_key: cli.ocr_api_key.clone(),
        ..Default::default()
    };

    let embedder = Arc::new(HashEmbedder::new(config.embedding_dimensions));
    let store: Arc<dyn VectorStore> = match cli.store {
        StoreKind::Disk => Arc::new(
            DiskStore::open(&config.persist_dir, &config.collection_name, embedder)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?,
        ),
        StoreKind::Memory => Arc::new(InMemoryStore::new(&config.collection_name, embedder)),
    };

    let reader = Arc::new(
        LopdfReader::open(&config.pdf_path)
            .map_err(|error| anyhow::anyhow!(error.to_string()))?,
    );

    let ocr: Option<Arc<dyn OcrEngine>> = if config.ocr_enabled {
        config
            .ocr_endpoint
            .as_ref()
            .map(|endpoint| {
                Arc::new(HttpOcrClient::new(endpoint, config.ocr_api_key.clone()))
                    as Arc<dyn OcrEngine>
            })
    } else {
        None
    };

    let classifier = ContentClassifier::new(
        config.heading_font_size,
        config.important_keywords.clone(),
    );
    let extractor = ContentExtractor::new(classifier, ocr, None);

    let session = IndexSession::new(config, reader, store, extractor)
        .map_err(|error| anyhow::anyhow!(error.to_string()))?;

    match cli.command {
        Command::Index {
            start_page,
            end_page,
            force,
            no_ocr: _,
        } => {
            let progress = |page: u32, end: u32| {
                if page % 50 == 0 || page == end {
                    println!("processed page {page}/{end}");
                }
            };

            let report = session
                .index(start_page, end_page, force, Some(&progress))
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!(
                "{} pages, {} blocks, {} chunks indexed in {:.2}s (extraction {:.2}s)",
                report.pages_processed,
                report.blocks_extracted,
                report.chunks_indexed,
                report.extraction_secs + report.indexing_secs,
                report.extraction_secs
            );
            if report.failed_batches > 0 {
                println!("{} batches failed and were skipped", report.failed_batches);
            }
        }
        Command::Search {
            query,
            top_k,
            chapter,
            content_type,
            min_importance,
            json,
        } => {
            let filter = MetadataFilter {
                chapter,
                content_type,
                min_importance,
                page: None,
            };
            let filter = (!filter.is_empty()).then_some(filter);

            let outcome = session.search(&query, top_k, filter.as_ref()).await;

            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
                return Ok(());
            }

            if outcome.degraded {
                println!("warning: vector backend unavailable, keyword scan results follow");
            }
            if outcome.results.is_empty() {
                println!("no results for: {query}");
            }
            for hit in outcome.results {
                println!(
                    "score={:.3} page={} chapter={} type={} importance={}",
                    hit.score,
                    hit.metadata.page,
                    hit.metadata.chapter,
                    hit.metadata.content_type,
                    hit.metadata.importance
                );
                let preview: String = hit.text.chars().take(160).collect();
                println!("  {preview}");
            }
        }
        Command::Stats => {
            let stats = session
                .stats()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!(
                "collection={} documents={} backend={}",
                stats.collection_name, stats.document_count, stats.backend
            );

            let info = session
                .document_info()
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!(
                "document={} pages={} checksum={}",
                info.filename, info.page_count, info.checksum
            );
        }
        Command::Reset => {
            session
                .reset()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            println!("collection deleted");
        }
    }

    Ok(())
}
