// Single-file cache store
// Values live in one append-allocated data file; keys and file positions
// are kept in memory.

#![warn(rust_2018_idioms)]

pub mod store;

// Re-exports for convenience
pub use store::{
    JsonMarshaller, LegacyStore, Marshaller, SingleFileStore, StoreConfig, StoreEntry, StoreStats,
};

/// Store error types
pub mod error {
    use thiserror::Error;

    /// The single error kind surfaced by all store operations.
    #[derive(Error, Debug)]
    pub enum StoreError {
        #[error("I/O error: {0}")]
        Io(#[from] std::io::Error),

        #[error("Directory cannot be created: {0}")]
        DirectoryCannotBeCreated(String),

        #[error("Serialization error: {0}")]
        Serialization(String),

        #[error("Legacy store upgrade failed: {0}")]
        LegacyUpgrade(String),

        #[error("Operation not supported: {0}")]
        Unsupported(&'static str),

        #[error("Store is not started")]
        NotStarted,
    }

    pub type Result<T> = std::result::Result<T, StoreError>;
}

pub use error::{Result, StoreError};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
