use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Store error: {0}")]
    StoreError(#[from] serial_store::StoreError),

    #[error("Engine error: {0}")]
    EngineError(#[from] serial_engine::EngineError),

    /// Recoverable: the next run re-reads the mapping and tries again.
    #[error("Mapping for order {order_id} kept changing underneath us ({attempts} attempts)")]
    MappingConflict { order_id: String, attempts: u32 },

    #[error("Order source error: {0}")]
    SourceError(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl SyncError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MappingConflict { .. } | Self::SourceError(_))
    }
}
