//! Catalog records that IGV menus are built from.

/// One experiment of the catalog; each gets its own menu.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Experiment {
    pub name: String,
    pub description: String,
}

/// A sample record. `url` is the backing `s3://` location of its alignment
/// and may be empty when the record has none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub name: String,
    pub description: String,
    pub url: String,
}

/// A sample rewritten to addresses served by this proxy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuEntry {
    pub name: String,
    pub description: String,
    pub path: String,
    pub index: String,
}
