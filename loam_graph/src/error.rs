// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error types for graph editing, merging, and persistence.

use thiserror::Error;

use crate::object::ObjectRef;

/// Errors surfaced by the object graph.
#[derive(Debug, Error)]
pub enum Error {
    /// Deleting an object that something still references.
    #[error("{target:?} is still referenced by {referenced_by:?}")]
    Referential {
        /// The object whose deletion was attempted.
        target: ObjectRef,
        /// A live object still referencing it.
        referenced_by: ObjectRef,
    },

    /// A local edit's base version no longer matches the server's.
    /// Detected at upload time, never resolved automatically.
    #[error("version conflict on {target:?}: local base {local}, server has {server}")]
    VersionConflict {
        /// The conflicted object.
        target: ObjectRef,
        /// The version local edits are based on.
        local: i32,
        /// The version the server reports.
        server: i32,
    },

    /// Persisted state failed to decode; the store must be discarded and
    /// rebuilt from scratch.
    #[error("persisted store is corrupt: {0}")]
    CorruptPersistedState(String),

    /// A consistency check found structural violations. Reported, never
    /// silently repaired.
    #[error("consistency check found {0} violations")]
    InvariantViolation(usize),

    /// An operation referenced an object the graph does not hold.
    #[error("unknown object {0:?}")]
    UnknownObject(ObjectRef),

    /// The referenced object exists but is tombstoned.
    #[error("object {0:?} is deleted")]
    Deleted(ObjectRef),

    /// An index was out of bounds for a path or member list.
    #[error("index {index} out of bounds for {target:?} (len {len})")]
    IndexOutOfBounds {
        /// The object being edited.
        target: ObjectRef,
        /// The offending index.
        index: usize,
        /// Current sequence length.
        len: usize,
    },

    /// Underlying I/O failure while saving.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Result alias for graph operations.
pub type Result<T> = std::result::Result<T, Error>;
