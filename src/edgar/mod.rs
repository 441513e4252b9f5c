pub mod aggregate;
pub mod audit;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod ip_filter;
pub mod log_ingest;
pub mod master_index;
pub mod model;
pub mod paths;
pub mod pipeline;
pub mod reconcile;
pub mod scratch;
pub mod table;

#[cfg(test)]
pub mod testing;
