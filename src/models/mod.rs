//! Core data models for the file proxy.
//!
//! Everything here is request-scoped: object paths and handles are built per
//! request and dropped with it, and range specs are derived from the `Range`
//! header together with the size returned by the backend probe. The menu
//! records come from the metadata store.

pub mod menu;
pub mod object;
pub mod range;
