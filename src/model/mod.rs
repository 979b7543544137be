//! Data models for coderecall.
//!
//! This module contains all domain models:
//! - Project
//! - Session
//! - Fact
//! - IndexedFile / Chunk
//! - Decision / Change
//! - Identity

pub mod chunk;
pub mod decision;
pub mod fact;
pub mod identity;
pub mod project;
pub mod session;

pub use chunk::{Chunk, IndexedFile};
pub use decision::{Change, ChangeAction, Decision};
pub use fact::{Fact, Staleness};
pub use identity::Identity;
pub use project::Project;
pub use session::{Session, SessionCounts, SessionStatus};
