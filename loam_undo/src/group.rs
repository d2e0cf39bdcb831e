// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Undo groups and the log's state machine states.

use serde::{Deserialize, Serialize};

/// What the log is currently doing.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogState {
    /// No group open, no replay running.
    Idle,
    /// Inside a `begin_group`/`end_group` pair; registrations accumulate.
    Recording,
    /// Replaying an undo group; registrations build the matching redo group.
    Undoing,
    /// Replaying a redo group; registrations rebuild the undo group.
    Redoing,
}

/// An atomic batch of operations presented to the user as one undo step.
///
/// Operations are stored in registration order and must be applied in
/// *reverse* of that order: each op is the inverse of the edit that
/// registered it, so the last edit is unwound first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UndoGroup<O> {
    pub(crate) ops: Vec<O>,
    pub(crate) comment: Option<String>,
}

impl<O> UndoGroup<O> {
    pub(crate) fn empty() -> Self {
        Self {
            ops: Vec::new(),
            comment: None,
        }
    }

    /// The logged operations, in registration order.
    pub fn ops(&self) -> &[O] {
        &self.ops
    }

    /// The group's human-readable comment, if one was registered.
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
