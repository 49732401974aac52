//! Component and flavoring name tables

use serde::{Deserialize, Serialize};

/// The two deduplicated name tables joined to items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameKind {
    Component,
    Flavoring,
}

impl NameKind {
    pub(crate) const fn table(self) -> &'static str {
        match self {
            Self::Component => "components",
            Self::Flavoring => "flavoring",
        }
    }

    pub(crate) const fn join_table(self) -> &'static str {
        match self {
            Self::Component => "items_components",
            Self::Flavoring => "items_flavoring",
        }
    }

    pub(crate) const fn join_column(self) -> &'static str {
        match self {
            Self::Component => "component_id",
            Self::Flavoring => "flavoring_id",
        }
    }
}

/// A name with the number of items referencing it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameUsage {
    pub name: String,
    pub item_count: usize,
}
