use anyhow::{Context, Result};
use axum::{Router, http::HeaderName};
use std::{fs, io::ErrorKind, path::Path, path::PathBuf, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

use services::{
    download_service::DownloadService,
    file_catalog::SqliteFileCatalog,
    session_store::SqliteSessionStore,
    signed_url::SignedUrlIssuer,
    storage_service::{LocalStorage, StorageBackend, StorageKind},
    upload_service::UploadService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    tracing::info!("Starting chunkvault with config: {:?}", cfg);

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    // --- Initialize SQLite connection ---
    let db_path = cfg
        .database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let pool = db::connect(&cfg.database_url, 5)
        .await
        .with_context(|| format!("connecting to {}", cfg.database_url))?;
    let db = Arc::new(pool);

    db::run_migrations(&db).await?;

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(()); // exit after migration
    }

    // --- Initialize core services ---
    let signer = Arc::new(
        SignedUrlIssuer::new(cfg.signing_secret.as_bytes(), cfg.public_base_url.clone())
            .context("initializing download link signer")?,
    );
    let storage: Arc<dyn StorageBackend> = match cfg.storage_backend {
        StorageKind::Local => Arc::new(LocalStorage::new(&cfg.storage_dir, signer.clone())),
    };
    let files = Arc::new(SqliteFileCatalog::new(db.clone()));
    let uploads = UploadService::new(
        Arc::new(SqliteSessionStore::new(db.clone())),
        files.clone(),
        storage.clone(),
        cfg.chunk_size,
    );
    let downloads = DownloadService::new(files, storage.clone(), cfg.download_ttl);

    let identity_header = HeaderName::try_from(cfg.identity_header.as_str())
        .with_context(|| format!("invalid identity header `{}`", cfg.identity_header))?;

    let state = state::AppState {
        uploads,
        downloads,
        storage,
        signer,
        db,
        storage_dir: PathBuf::from(&cfg.storage_dir),
        identity_header,
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
