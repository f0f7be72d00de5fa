// Application layer - Use cases and ports
pub mod clock;
pub mod historical_store;
pub mod live_buffer;
pub mod live_stream;
pub mod render;
pub mod retention;
pub mod trend_service;
