//! src/services/metadata.rs
//!
//! MetadataStore — the experiment/sample catalog that menus are built from.
//!
//! `AirtableClient` reads it over the Airtable REST API: a bearer key, one
//! table per record type, `filterByFormula` to select samples of an
//! experiment and `fields[]` to keep responses small. Pages are followed
//! through the `offset` token.

use crate::models::menu::{Experiment, Sample};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::{fmt, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

const NAME_FIELD: &str = "Name";
const DESCRIPTION_FIELD: &str = "Description";
const BAM_FIELD: &str = "BAM";

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("`{0}` is not a usable metadata endpoint")]
    InvalidEndpoint(String),
}

/// Read-only view of the catalog.
#[async_trait]
pub trait MetadataStore: Send + Sync + 'static {
    async fn experiments(&self) -> Result<Vec<Experiment>, MetadataError>;

    /// Samples linked to the experiment called `experiment`.
    async fn samples(&self, experiment: &str) -> Result<Vec<Sample>, MetadataError>;
}

/// Table layout of the catalog base.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tables {
    pub experiments: String,
    pub samples: String,
    /// Field of a sample naming its experiment.
    pub experiment_field: String,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            experiments: "Genomics Expt".into(),
            samples: "Genomics Sample".into(),
            experiment_field: "Experiment".into(),
        }
    }
}

/// Secret that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

#[derive(Debug, Deserialize)]
struct RecordPage {
    #[serde(default)]
    records: Vec<Record>,
    offset: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Record {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub fields: RecordFields,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordFields {
    #[serde(rename = "Name")]
    pub name: Option<String>,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "BAM")]
    pub bam: Option<String>,
}

pub struct AirtableClient {
    client: Client,
    endpoint: Url,
    api_key: ApiKey,
    tables: Tables,
}

impl AirtableClient {
    /// `endpoint` is the base URL, e.g. `https://api.airtable.com/v0/<base>/`.
    pub fn new(
        endpoint: &str,
        api_key: ApiKey,
        tables: Tables,
        timeout: Duration,
    ) -> Result<Self, MetadataError> {
        let endpoint =
            Url::parse(endpoint).map_err(|_| MetadataError::InvalidEndpoint(endpoint.into()))?;
        if endpoint.cannot_be_a_base() {
            return Err(MetadataError::InvalidEndpoint(endpoint.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint,
            api_key,
            tables,
        })
    }

    fn table_url(&self, table: &str) -> Result<Url, MetadataError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| MetadataError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .push(table)
            .push("");
        Ok(url)
    }

    /// Every record of `table` matching `filter`, restricted to `fields`.
    pub async fn list_records(
        &self,
        table: &str,
        filter: Option<&str>,
        fields: &[&str],
    ) -> Result<Vec<Record>, MetadataError> {
        let url = self.table_url(table)?;
        let mut records = Vec::new();
        let mut offset: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = fields.iter().map(|f| ("fields[]", *f)).collect();
            if let Some(formula) = filter {
                query.push(("filterByFormula", formula));
            }
            if let Some(offset) = offset.as_deref() {
                query.push(("offset", offset));
            }

            let page: RecordPage = self
                .client
                .get(url.clone())
                .bearer_auth(self.api_key.expose())
                .query(&query)
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            debug!("{}: {} records", table, page.records.len());

            records.extend(page.records);
            match page.offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl MetadataStore for AirtableClient {
    async fn experiments(&self) -> Result<Vec<Experiment>, MetadataError> {
        let records = self
            .list_records(
                &self.tables.experiments,
                None,
                &[NAME_FIELD, DESCRIPTION_FIELD],
            )
            .await?;

        Ok(records
            .into_iter()
            .filter_map(|record| match record.fields.name {
                Some(name) => Some(Experiment {
                    name,
                    description: record.fields.description.unwrap_or_default(),
                }),
                None => {
                    warn!("experiment record {} has no name", record.id);
                    None
                }
            })
            .collect())
    }

    async fn samples(&self, experiment: &str) -> Result<Vec<Sample>, MetadataError> {
        let formula = match_formula(&self.tables.experiment_field, experiment);
        let records = self
            .list_records(
                &self.tables.samples,
                Some(&formula),
                &[NAME_FIELD, DESCRIPTION_FIELD, BAM_FIELD],
            )
            .await?;

        Ok(records
            .into_iter()
            .filter_map(|record| match record.fields.name {
                Some(name) => Some(Sample {
                    name,
                    description: record.fields.description.unwrap_or_default(),
                    url: record.fields.bam.unwrap_or_default(),
                }),
                None => {
                    warn!("sample record {} has no name", record.id);
                    None
                }
            })
            .collect())
    }
}

/// `{field} = "value"` with the value quoted as a formula string.
fn match_formula(field: &str, value: &str) -> String {
    let quoted = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("{{{}}} = \"{}\"", field, quoted)
}
