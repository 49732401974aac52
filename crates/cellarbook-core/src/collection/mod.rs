//! Collection view: filtering, sorting and aggregate statistics

mod filter;
mod stats;

pub use filter::{
    CollectionFilter, CollectionView, ProductionFilter, RatingFilter, SortDirection, SortField,
    SortOrder, TinFilter,
};
pub use stats::CollectionStats;
