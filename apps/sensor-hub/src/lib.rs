pub mod app;
pub mod cli;
pub mod config;
pub mod device_class;
pub mod error;
pub mod history;
pub mod ingest;
pub mod live;
pub mod openapi;
pub mod reading;
pub mod routes;
pub mod state;
pub mod static_assets;
pub mod store;
pub mod time;

#[cfg(test)]
pub mod test_support;
