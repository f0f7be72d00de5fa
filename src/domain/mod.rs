// Domain layer - Pure trend types and algorithms
pub mod display;
pub mod error;
pub mod quality;
pub mod reducer;
pub mod sample;
pub mod series;
pub mod zoom;
