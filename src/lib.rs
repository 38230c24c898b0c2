//! Range-aware HTTP proxy that serves objects from a remote blob store as
//! plain files, so byte-range clients such as IGV can read BAM/BAI files
//! without downloading them whole.

pub mod catalog;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
