//! Relational Data Bridge - Node operations over SQLite
//!
//! The bridge lets generic record encoders and decoders operate on a
//! relational store:
//! - decode: result rows materialize as Map Nodes (`read_row`)
//! - encode: Nodes round-trip through an ephemeral staging relation
//!   (`stage`) in an auxiliary store that holds no durable state

pub mod sqlite;
pub mod staging;

pub use sqlite::{MapEntries, SqliteBridge};
pub use staging::StagingStore;
