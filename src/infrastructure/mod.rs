// Infrastructure layer - External dependencies and adapters
pub mod chunked_stream;
pub mod config;
pub mod influx_store;
pub mod memory_store;
