use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use std::{env, str::FromStr, time::Duration};

use crate::services::{
    descriptor_cache::DEFAULT_MENU_TTL,
    metadata::{ApiKey, Tables},
    responder::{DEFAULT_CHUNK_SIZE, StreamingResponder},
};

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Backend location, e.g. `s3://bucket/prefix`.
    pub store_url: String,
    /// Base URL under which clients reach this service.
    pub public_url: String,
    pub chunk_size: usize,
    pub backend_timeout: Duration,
    pub write_timeout: Duration,
    /// Catalog used for IGV menus; menus are disabled without it.
    pub metadata: Option<MetadataConfig>,
    pub menu_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct MetadataConfig {
    pub url: String,
    pub api_key: ApiKey,
    pub tables: Tables,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Range-aware file proxy for IGV")]
pub struct Args {
    /// Host to bind to (overrides IGV_PROXY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IGV_PROXY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store URL (overrides IGV_PROXY_STORE_URL, then S3_BUCKET)
    #[arg(long)]
    pub store_url: Option<String>,

    /// Public base URL (overrides IGV_PROXY_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Bytes forwarded per write (overrides IGV_PROXY_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Seconds to wait on the backend (overrides IGV_PROXY_BACKEND_TIMEOUT_SECS)
    #[arg(long)]
    pub backend_timeout_secs: Option<u64>,

    /// Seconds to wait on a client write (overrides IGV_PROXY_WRITE_TIMEOUT_SECS)
    #[arg(long)]
    pub write_timeout_secs: Option<u64>,

    /// Metadata store base URL (overrides IGV_PROXY_METADATA_URL, then AIRTABLE_API_ENDPOINT)
    #[arg(long)]
    pub metadata_url: Option<String>,

    /// Seconds a rendered menu is reused (overrides IGV_PROXY_MENU_TTL_SECS)
    #[arg(long)]
    pub menu_ttl_secs: Option<u64>,

    /// Print the proxy URL for an s3:// object URL and exit
    #[arg(long, value_name = "S3_URL")]
    pub file_url: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the
    /// optional one-shot `--file-url` argument.
    pub fn from_env_and_args() -> Result<(Self, Option<String>)> {
        // Parse CLI once
        let args = Args::parse();
        let file_url = args.file_url.clone();
        let cfg = Self::merge(args, |key| env::var(key))?;
        Ok((cfg, file_url))
    }

    /// Merge CLI args over variables looked up through `var`.
    pub fn merge<F>(args: Args, var: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        // --- Environment fallback ---
        let env_host = var("IGV_PROXY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = parse_var(&var, "IGV_PROXY_PORT")?.unwrap_or(5000);
        let env_store = match var("IGV_PROXY_STORE_URL") {
            Ok(url) => Some(url),
            Err(_) => var("S3_BUCKET").ok().map(|bucket| format!("s3://{}", bucket)),
        };
        let env_chunk = parse_var(&var, "IGV_PROXY_CHUNK_SIZE")?.unwrap_or(DEFAULT_CHUNK_SIZE);
        let env_backend_timeout = parse_var(&var, "IGV_PROXY_BACKEND_TIMEOUT_SECS")?.unwrap_or(30);
        let env_write_timeout = parse_var(&var, "IGV_PROXY_WRITE_TIMEOUT_SECS")?.unwrap_or(60);
        let env_menu_ttl =
            parse_var(&var, "IGV_PROXY_MENU_TTL_SECS")?.unwrap_or(DEFAULT_MENU_TTL.as_secs());

        // --- Merge ---
        let host = args.host.unwrap_or(env_host);
        let port = args.port.unwrap_or(env_port);
        let store_url = match args.store_url.or(env_store) {
            Some(url) => url,
            None => bail!("no object store configured: set IGV_PROXY_STORE_URL or S3_BUCKET"),
        };
        let public_url = args
            .public_url
            .or_else(|| var("IGV_PROXY_PUBLIC_URL").ok())
            .unwrap_or_else(|| format!("http://{}:{}", host, port));
        let chunk_size = args.chunk_size.unwrap_or(env_chunk);
        if chunk_size == 0 {
            bail!("chunk size must be at least one byte");
        }

        let metadata_url = args
            .metadata_url
            .or_else(|| var("IGV_PROXY_METADATA_URL").ok())
            .or_else(|| var("AIRTABLE_API_ENDPOINT").ok());
        let metadata = match metadata_url {
            Some(url) => {
                let key = var("IGV_PROXY_METADATA_API_KEY")
                    .or_else(|_| var("AIRTABLE_API_KEY"))
                    .map_err(|_| {
                        anyhow!(
                            "metadata store `{}` needs IGV_PROXY_METADATA_API_KEY or AIRTABLE_API_KEY",
                            url
                        )
                    })?;
                let defaults = Tables::default();
                Some(MetadataConfig {
                    url,
                    api_key: ApiKey::new(key),
                    tables: Tables {
                        experiments: var("IGV_PROXY_EXPERIMENT_TABLE")
                            .unwrap_or(defaults.experiments),
                        samples: var("IGV_PROXY_SAMPLE_TABLE").unwrap_or(defaults.samples),
                        experiment_field: var("IGV_PROXY_EXPERIMENT_FIELD")
                            .unwrap_or(defaults.experiment_field),
                    },
                })
            }
            None => None,
        };

        Ok(Self {
            host,
            port,
            store_url,
            public_url,
            chunk_size,
            backend_timeout: Duration::from_secs(
                args.backend_timeout_secs.unwrap_or(env_backend_timeout),
            ),
            write_timeout: Duration::from_secs(args.write_timeout_secs.unwrap_or(env_write_timeout)),
            metadata,
            menu_ttl: Duration::from_secs(args.menu_ttl_secs.unwrap_or(env_menu_ttl)),
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn responder(&self) -> StreamingResponder {
        StreamingResponder::new(self.chunk_size, self.backend_timeout, self.write_timeout)
    }

    /// Bucket name when the store is S3, as used for catalog URL rewriting.
    pub fn bucket(&self) -> Option<&str> {
        let rest = self.store_url.strip_prefix("s3://")?;
        rest.split('/').next().filter(|b| !b.is_empty())
    }
}

/// Read and parse an optional variable; a present but invalid value is an error.
fn parse_var<F, T>(var: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Result<String, env::VarError>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", key, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", key)),
    }
}
