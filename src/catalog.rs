//! Links between catalog entries and the proxy.
//!
//! Sample records point at their alignments with `s3://bucket/key` URLs. IGV
//! cannot read those, so the menu builder rewrites them into
//! `<public-url>/files/<key>`, which this service resolves against the same
//! bucket. IGV finds the index next to the alignment at `<url>.bai`.
//!
//! Menus themselves are small XML documents listing one `Resource` per
//! sample, and the registry points IGV at one menu per experiment.

use crate::models::menu::{Experiment, MenuEntry};
use thiserror::Error;
use url::Url;

const FILES_SEGMENT: &str = "files";
const MENU_SEGMENT: &str = "xml";
const INDEX_SUFFIX: &str = ".bai";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("`{0}` is not a valid url")]
    InvalidUrl(String),
    #[error("`{0}` is not an s3:// url")]
    NotS3(String),
    #[error("`{url}` lives in bucket `{found}`, the proxy serves `{expected}`")]
    ForeignBucket {
        url: String,
        found: String,
        expected: String,
    },
    #[error("`{0}` has no object key")]
    MissingKey(String),
}

/// Split `s3://bucket/some/key.bam` into `("bucket", "some/key.bam")`.
///
/// The key is returned as it appears in the URL, percent-encoding included.
pub fn split_s3_url(s3_url: &str) -> Result<(String, String), CatalogError> {
    let url = Url::parse(s3_url).map_err(|_| CatalogError::InvalidUrl(s3_url.to_string()))?;
    if url.scheme() != "s3" {
        return Err(CatalogError::NotS3(s3_url.to_string()));
    }
    let bucket = url
        .host_str()
        .filter(|b| !b.is_empty())
        .ok_or_else(|| CatalogError::InvalidUrl(s3_url.to_string()))?
        .to_string();
    let key = url.path().trim_start_matches('/');
    if key.is_empty() {
        return Err(CatalogError::MissingKey(s3_url.to_string()));
    }
    Ok((bucket, key.to_string()))
}

/// Rewrite a backing object URL into the URL this proxy serves it under.
pub fn file_url(public_url: &str, bucket: &str, s3_url: &str) -> Result<String, CatalogError> {
    let (found, key) = split_s3_url(s3_url)?;
    if found != bucket {
        return Err(CatalogError::ForeignBucket {
            url: s3_url.to_string(),
            found,
            expected: bucket.to_string(),
        });
    }
    files_url(public_url, &key)
}

/// `<public-url>/files/<key>` for a key that is already escaped.
pub fn files_url(public_url: &str, key: &str) -> Result<String, CatalogError> {
    let mut url = base_url(public_url)?;
    // set_path leaves existing %XX untouched
    let path = format!(
        "{}/{}/{}",
        url.path().trim_end_matches('/'),
        FILES_SEGMENT,
        key
    );
    url.set_path(&path);
    Ok(url.to_string())
}

/// URL of the BAM index that sits next to an alignment.
pub fn index_url(file_url: &str) -> String {
    format!("{}{}", file_url, INDEX_SUFFIX)
}

/// `<public-url>/xml/<experiment>`, the menu of one experiment. The name is
/// escaped as a single path segment.
pub fn menu_url(public_url: &str, experiment: &str) -> Result<String, CatalogError> {
    let mut url = base_url(public_url)?;
    url.path_segments_mut()
        .map_err(|_| CatalogError::InvalidUrl(public_url.to_string()))?
        .pop_if_empty()
        .push(MENU_SEGMENT)
        .push(experiment);
    Ok(url.to_string())
}

fn base_url(public_url: &str) -> Result<Url, CatalogError> {
    let url =
        Url::parse(public_url).map_err(|_| CatalogError::InvalidUrl(public_url.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(CatalogError::InvalidUrl(public_url.to_string()));
    }
    Ok(url)
}

/// Render the IGV menu of one experiment. Entries are written in the order
/// given.
pub fn render_menu(experiment: &Experiment, entries: &[MenuEntry]) -> String {
    let category = if experiment.description.is_empty() {
        &experiment.name
    } else {
        &experiment.description
    };

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!(
        "<Global name=\"{}\" version=\"1\">\n",
        escape_xml(&experiment.name)
    ));
    xml.push_str(&format!("  <Category name=\"{}\">\n", escape_xml(category)));
    for entry in entries {
        xml.push_str(&format!(
            "    <Resource name=\"{}\" description=\"{}\" path=\"{}\" index=\"{}\"/>\n",
            escape_xml(&entry.name),
            escape_xml(&entry.description),
            escape_xml(&entry.path),
            escape_xml(&entry.index)
        ));
    }
    xml.push_str("  </Category>\n</Global>\n");
    xml
}

fn escape_xml(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}
