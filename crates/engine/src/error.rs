use serial_protocol::Suffix;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No free suffix left after {last}")]
    SuffixSpaceExhausted { last: Suffix },

    #[error("Mapping belongs to order {actual}, expected {expected}")]
    OrderMismatch { expected: String, actual: String },

    #[error("Invalid mapping for order {order_id}: {reason}")]
    InvalidMapping { order_id: String, reason: String },
}
