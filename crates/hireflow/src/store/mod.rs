//! Storage abstractions shared by the matching and pipeline workflows.

pub mod memory;

pub use memory::MemoryStore;

use crate::workflows::domain::CandidacyId;

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// Another unit of work holds the pairing's row lock.
    #[error("{0} is locked by a concurrent transition")]
    Locked(CandidacyId),
    #[error("record already exists: {0}")]
    Duplicate(String),
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
