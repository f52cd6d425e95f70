pub mod config;
pub mod features;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod render;
