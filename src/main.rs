// src/main.rs

use std::{error, sync::Arc};

use tracing_subscriber::EnvFilter;

use grc_rebates::{
    config::Config,
    db::{MongoStore, DB},
    mailer::{LogMailer, Mailer, PostmarkMailer},
    ocr::VeryfiScanner,
    routes,
    search::{Meilisearch, MemoryDirectory, StoreDirectory},
    store::{MemoryStore, Store},
    Error, Platform,
};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,grc_rebates=debug")),
        )
        .init();

    let config = Config::from_env()?;
    let in_memory = std::env::args().any(|a| a == "--memory");

    let store: Arc<dyn Store> = match (&config.mongodb_uri, in_memory) {
        (Some(uri), false) => {
            let db = DB::new(uri, &config.mongodb_database).await?;
            db.ensure_indexes().await?;
            tracing::info!(database = %config.mongodb_database, "connected to mongodb");
            Arc::new(MongoStore::new(db))
        }
        (None, false) => {
            return Err(Error::Config("MONGODB_URI is required unless --memory is given".to_string()).into());
        }
        (_, true) => {
            tracing::warn!("using in-memory storage; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let directory: Arc<dyn StoreDirectory> = match &config.meilisearch {
        Some(meili) => Arc::new(Meilisearch::new(meili)),
        None => {
            tracing::warn!("MEILISEARCH_URL not set; grocery store search is in-memory");
            Arc::new(MemoryDirectory::default())
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.postmark_token {
        Some(token) => Arc::new(PostmarkMailer::new(&config.postmark_base_url, token, &config.mail_from)),
        None => {
            tracing::warn!("POSTMARK_SERVER_TOKEN not set; email is logged, not sent");
            Arc::new(LogMailer)
        }
    };

    let scanner = config.veryfi.clone().map(VeryfiScanner::new);
    let bind_addr = config.bind_addr.clone();

    let mut platform = Platform::new(config, store, mailer, directory);
    if let Some(scanner) = scanner {
        platform = platform.with_scanner(Arc::new(scanner));
    }

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "listening");
    axum::serve(listener, routes::router(platform)).await?;

    Ok(())
}
