//! # Rowbridge - Relational Data Bridge
//!
//! Generic encode/decode between a tree-shaped value model and a SQLite store.
//!
//! Rowbridge provides:
//! - A tagged Node value model (Empty/Number/String/List/Map) shared by all
//!   encoders and decoders
//! - A SQLite data bridge that materializes rows as Nodes and stages Nodes
//!   as ephemeral relations
//! - A versioned schema-migration engine that brings a store current at
//!   process start
//! - An auxiliary staging store that is recreated on demand and holds no
//!   durable state

pub mod node;
pub mod bridge;
pub mod migrate;
pub mod store;
pub mod config;

// Re-exports for convenient access
pub use node::{Node, Number, Primitive};
pub use bridge::SqliteBridge;
pub use bridge::staging::StagingStore;
pub use migrate::{MigrationEngine, MigrationOutcome};
pub use migrate::step::{Cleanup, MigrationStep, SqlStep};
pub use store::Store;

/// Result type alias for Rowbridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Rowbridge operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Value not found")]
    ValueNotFound,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Adapter error: {0}")]
    Adapter(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}
