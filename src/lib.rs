pub mod api;
pub mod client;
pub mod config;
pub mod connectors;
pub mod core;
pub mod metrics;
pub mod parser;
pub mod relay;
pub mod routing;
pub mod stream;
pub mod tools;
