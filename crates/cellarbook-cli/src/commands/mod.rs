pub mod add;
pub mod common;
pub mod completions;
pub mod delete;
pub mod edit;
pub mod export;
pub mod import;
pub mod list;
pub mod names;
pub mod prefs;
pub mod show;
pub mod stats;
pub mod sync;
pub mod tin;
