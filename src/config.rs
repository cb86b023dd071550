use crate::services::storage_service::StorageKind;
use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::{env, fmt, str::FromStr, time::Duration};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub storage_backend: StorageKind,
    pub chunk_size: u64,
    pub signing_secret: String,
    pub public_base_url: String,
    pub download_ttl: Duration,
    pub identity_header: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Chunked upload service with signed download links")]
pub struct Args {
    /// Host to bind to (overrides CHUNKVAULT_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CHUNKVAULT_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory holding staged chunks and merged objects (overrides CHUNKVAULT_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides CHUNKVAULT_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Storage backend, only `local` is supported (overrides CHUNKVAULT_STORAGE_BACKEND)
    #[arg(long)]
    pub storage_backend: Option<String>,

    /// Chunk size in bytes for new uploads (overrides CHUNKVAULT_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// HMAC secret for download links (overrides CHUNKVAULT_SIGNING_SECRET)
    #[arg(long)]
    pub signing_secret: Option<String>,

    /// Origin used in issued download links (overrides CHUNKVAULT_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Lifetime of download links in seconds (overrides CHUNKVAULT_DOWNLOAD_TTL_SECS)
    #[arg(long)]
    pub download_ttl_secs: Option<u64>,

    /// Header carrying the authenticated caller id (overrides CHUNKVAULT_IDENTITY_HEADER)
    #[arg(long)]
    pub identity_header: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    fn merge(args: Args) -> Result<Self> {
        // --- Environment fallback ---
        let env_host = env::var("CHUNKVAULT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = env_parse("CHUNKVAULT_PORT", 8080u16)?;
        let env_storage =
            env::var("CHUNKVAULT_STORAGE_DIR").unwrap_or_else(|_| "./data/objects".into());
        let env_db = env::var("CHUNKVAULT_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/meta/chunkvault.db".into());
        let env_backend =
            env::var("CHUNKVAULT_STORAGE_BACKEND").unwrap_or_else(|_| "local".into());
        let env_chunk = env_parse("CHUNKVAULT_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let env_secret = env::var("CHUNKVAULT_SIGNING_SECRET").ok();
        let env_base_url = env::var("CHUNKVAULT_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8080".into());
        let env_ttl = env_parse("CHUNKVAULT_DOWNLOAD_TTL_SECS", 3600u64)?;
        let env_identity =
            env::var("CHUNKVAULT_IDENTITY_HEADER").unwrap_or_else(|_| "x-user-id".into());

        // --- Merge ---
        let storage_backend = args
            .storage_backend
            .unwrap_or(env_backend)
            .parse::<StorageKind>()
            .map_err(|e| anyhow!(e))
            .context("parsing storage backend")?;

        let chunk_size = args.chunk_size.unwrap_or(env_chunk);
        if chunk_size == 0 || i64::try_from(chunk_size).is_err() {
            bail!("chunk size must be between 1 and {} bytes", i64::MAX);
        }

        let signing_secret = args
            .signing_secret
            .or(env_secret)
            .filter(|s| !s.is_empty())
            .context("a signing secret is required (CHUNKVAULT_SIGNING_SECRET or --signing-secret)")?;

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            database_url: args.database_url.unwrap_or(env_db),
            storage_backend,
            chunk_size,
            signing_secret,
            public_base_url: args.public_base_url.unwrap_or(env_base_url),
            download_ttl: Duration::from_secs(args.download_ttl_secs.unwrap_or(env_ttl)),
            identity_header: args.identity_header.unwrap_or(env_identity),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("storage_dir", &self.storage_dir)
            .field("database_url", &self.database_url)
            .field("storage_backend", &self.storage_backend)
            .field("chunk_size", &self.chunk_size)
            .field("signing_secret", &"<redacted>")
            .field("public_base_url", &self.public_base_url)
            .field("download_ttl", &self.download_ttl)
            .field("identity_header", &self.identity_header)
            .finish()
    }
}

/// Read and parse `key`, falling back to `default` when it is unset.
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
