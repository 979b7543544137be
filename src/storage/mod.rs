//! SQLite storage layer for the memory engine.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - `IMMEDIATE`-transaction discipline for atomic writes
//! - Audit events for history
//!
//! # Submodules
//!
//! - [`events`] - Audit event storage
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod events;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use sqlite::{
    ChunkWithVector, FactWithVector, MutationContext, RankedChunk, RankedFact, SqliteStorage,
};
