//! cellarbook-core - Core library for cellarbook
//!
//! This crate contains the catalog models, the libSQL-backed repository,
//! live queries, CSV interchange, collection statistics and the
//! last-write-wins sync workers used by every cellarbook front end.

pub mod collection;
pub mod config;
pub mod dates;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod models;
pub mod preferences;
pub mod services;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Item, ItemDetails, ItemId, Tin, TinId};
