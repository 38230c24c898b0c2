//! MenuService — builds the IGV data registry and per-experiment menus.
//!
//! Sample alignments are rewritten to `<public-url>/files/<key>` so IGV reads
//! them through this proxy. Rendered menus are cached; the registry is not.

use crate::{
    catalog::{self, CatalogError},
    models::menu::{MenuEntry, Sample},
    services::{
        descriptor_cache::DescriptorCache,
        metadata::{MetadataError, MetadataStore},
    },
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum MenuError {
    #[error("experiment `{0}` not found")]
    UnknownExperiment(String),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

#[derive(Clone)]
pub struct MenuService {
    metadata: Arc<dyn MetadataStore>,
    cache: Arc<DescriptorCache>,
    public_url: String,
    /// Bucket served by the proxy; samples elsewhere are left out.
    bucket: Option<String>,
}

impl MenuService {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        cache: DescriptorCache,
        public_url: impl Into<String>,
        bucket: Option<String>,
    ) -> Self {
        Self {
            metadata,
            cache: Arc::new(cache),
            public_url: public_url.into(),
            bucket,
        }
    }

    /// One menu URL per experiment, newline separated.
    pub async fn registry(&self) -> Result<String, MenuError> {
        let experiments = self.metadata.experiments().await?;
        let urls = experiments
            .iter()
            .map(|experiment| catalog::menu_url(&self.public_url, &experiment.name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(urls.join("\n"))
    }

    /// Menu of `name`, samples sorted by name.
    pub async fn experiment_menu(&self, name: &str) -> Result<String, MenuError> {
        if let Some(menu) = self.cache.get(name) {
            debug!("menu for {} served from cache", name);
            return Ok(menu);
        }

        let samples = self.metadata.samples(name).await?;
        let experiment = self
            .metadata
            .experiments()
            .await?
            .into_iter()
            .find(|experiment| experiment.name == name)
            .ok_or_else(|| MenuError::UnknownExperiment(name.to_string()))?;

        let mut entries: Vec<MenuEntry> = samples
            .into_iter()
            .filter_map(|sample| self.entry(sample))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let menu = catalog::render_menu(&experiment, &entries);
        self.cache.insert(name, menu.clone());
        Ok(menu)
    }

    fn entry(&self, sample: Sample) -> Option<MenuEntry> {
        let path = match &self.bucket {
            Some(bucket) => catalog::file_url(&self.public_url, bucket, &sample.url),
            None => catalog::split_s3_url(&sample.url)
                .and_then(|(_, key)| catalog::files_url(&self.public_url, &key)),
        };
        match path {
            Ok(path) => Some(MenuEntry {
                name: sample.name,
                description: sample.description,
                index: catalog::index_url(&path),
                path,
            }),
            Err(err) => {
                warn!("leaving sample {} out of the menu: {}", sample.name, err);
                None
            }
        }
    }
}
