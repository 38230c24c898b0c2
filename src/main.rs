use anyhow::{Context, Result};
use axum::Router;
use igv_file_proxy::{
    catalog, config,
    routes::routes,
    services::{
        descriptor_cache::{DescriptorCache, SystemClock},
        menu_service::MenuService,
        metadata::AirtableClient,
        proxy_service::ProxyService,
        store::RemoteObjectStore,
    },
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + one-shot url rewrite ---
    let (cfg, file_url) = config::AppConfig::from_env_and_args()?;

    if let Some(s3_url) = file_url {
        let bucket = cfg
            .bucket()
            .context("--file-url needs an s3:// store url")?;
        let url = catalog::file_url(&cfg.public_url, bucket, &s3_url)?;
        println!("{}", url);
        println!("{}", catalog::index_url(&url));
        return Ok(());
    }

    tracing::info!("Starting igv-file-proxy with config: {:?}", cfg);

    // --- Backend client, shared by every request ---
    let store = RemoteObjectStore::from_url(&cfg.store_url)?;
    tracing::info!("Serving objects from {}", cfg.store_url);

    let mut service = ProxyService::new(Arc::new(store), cfg.responder());

    // --- Optional catalog for IGV menus ---
    match &cfg.metadata {
        Some(metadata) => {
            let client = AirtableClient::new(
                &metadata.url,
                metadata.api_key.clone(),
                metadata.tables.clone(),
                cfg.backend_timeout,
            )?;
            let cache = DescriptorCache::new(cfg.menu_ttl, Arc::new(SystemClock));
            service = service.with_menus(MenuService::new(
                Arc::new(client),
                cache,
                cfg.public_url.clone(),
                cfg.bucket().map(str::to_string),
            ));
            tracing::info!("Building IGV menus from {}", metadata.url);
        }
        None => tracing::info!("No metadata store configured; menus are disabled"),
    }

    // --- Build router ---
    let app: Router = routes::routes().with_state(service);

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
