//! Feature engineering on the raw census and election tables: cleaning,
//! merging, imputation, and the two aggregates behind the plots.

pub mod clean;
pub mod evolution;
pub mod heatmap;
pub mod impute;
pub mod merge;
pub mod quantile;
pub mod types;
