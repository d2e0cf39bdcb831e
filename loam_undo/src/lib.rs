// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Loam Undo: a stack-based undo/redo transaction log.
//!
//! The log records *inverse operations* of a caller-defined closed type `O`
//! (a tagged union of every reversible edit), grouped into named
//! transactions. It knows nothing about the data model it serves: the owner
//! applies ops through its own mutation entry points, and those entry points
//! register inverses back into the log. While a replay is running
//! ([`TransactionLog::begin_undo`] / [`TransactionLog::begin_redo`]),
//! registrations are routed to the opposite stack, so undo builds redo and
//! vice versa without re-recording into the stack being replayed.
//!
//! Groups carry an optional human-readable comment (first one registered
//! wins) returned to the caller on replay for UI feedback. A configurable
//! hook can coalesce an op that duplicates the previous one in the same
//! group, keeping continuous gestures from exploding the stack.
//!
//! The whole log — both stacks, with comments — serializes with serde so
//! history survives a process restart.

mod error;
mod group;
mod log;

pub use error::UndoError;
pub use group::{LogState, UndoGroup};
pub use log::{CoalesceFn, TransactionLog};
