// Domain errors
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("malformed quality mask {0:?}: expected a decimal 64-bit unsigned integer")]
    MalformedMask(String),
    #[error("malformed timestamp {0:?}: expected epoch milliseconds or RFC 3339")]
    MalformedTimestamp(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TickError {
    #[error("live tick for generation {requested} rejected, series is at generation {current}")]
    StaleGeneration { requested: u64, current: u64 },
    #[error("live ticks are suspended while a historical reduction is outstanding")]
    Suspended,
}
