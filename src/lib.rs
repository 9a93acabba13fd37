pub mod backoff;
pub mod config;
pub mod connection;
pub mod db;
pub mod error;
pub mod extract;
pub mod filters;
pub mod graph;
pub mod oauth;
pub mod pipeline;
pub mod schema;
pub mod settings;
pub mod stream;
pub mod utils;
