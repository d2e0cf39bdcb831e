// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The transaction log: grouped, reversible operation recording.

use serde::{Deserialize, Serialize};

use crate::error::UndoError;
use crate::group::{LogState, UndoGroup};

/// Hook deciding whether a newly registered op duplicates the previous one
/// in the same group and should be dropped (e.g. repeated drag updates).
pub type CoalesceFn<O> = fn(new: &O, prev: &O) -> bool;

/// A stack-based record of reversible operations, grouped into named
/// transactions.
///
/// The log is independent of any data model: `O` is a caller-defined closed
/// operation type. Every stored op is an *inverse* — applying it reverts the
/// edit that registered it. The owner drives replay in two phases
/// ([`Self::begin_undo`] / [`Self::end_undo`]) and applies the popped
/// group's ops in reverse registration order through its normal mutation
/// entry points; those entry points re-register inverses, which the log
/// routes to the opposite stack while in the `Undoing`/`Redoing` state.
///
/// New edits recorded in the `Idle`→`Recording` path clear the redo stack:
/// a fresh edit invalidates redo history, intentionally.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(bound(serialize = "O: Serialize", deserialize = "O: Deserialize<'de>"))]
pub struct TransactionLog<O> {
    undo_stack: Vec<UndoGroup<O>>,
    redo_stack: Vec<UndoGroup<O>>,
    state: LogState,
    depth: u32,
    pending: UndoGroup<O>,
    #[serde(skip)]
    coalesce: Option<CoalesceFn<O>>,
}

impl<O> Default for TransactionLog<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O> TransactionLog<O> {
    /// Create an empty log with no coalescing policy.
    pub fn new() -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            state: LogState::Idle,
            depth: 0,
            pending: UndoGroup::empty(),
            coalesce: None,
        }
    }

    /// Install the duplicate-suppression hook. Not persisted: re-install
    /// after deserializing.
    pub fn set_coalesce(&mut self, f: CoalesceFn<O>) {
        self.coalesce = Some(f);
    }

    /// Current state of the log's state machine.
    pub fn state(&self) -> LogState {
        self.state
    }

    /// True when a group is open (at any nesting depth).
    pub fn is_grouping(&self) -> bool {
        self.depth > 0
    }

    /// Whether an undo step is available.
    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    /// Whether a redo step is available.
    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Number of undo steps.
    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    /// Number of redo steps.
    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Comment of the next undo step, for UI labels.
    pub fn undo_comment(&self) -> Option<&str> {
        self.undo_stack.last().and_then(UndoGroup::comment)
    }

    /// Comment of the next redo step, for UI labels.
    pub fn redo_comment(&self) -> Option<&str> {
        self.redo_stack.last().and_then(UndoGroup::comment)
    }

    /// The logged groups, oldest first. Useful to enumerate every object the
    /// history still references (e.g. to keep them alive across a save).
    pub fn undo_groups(&self) -> &[UndoGroup<O>] {
        &self.undo_stack
    }

    /// The redo groups, oldest first.
    pub fn redo_groups(&self) -> &[UndoGroup<O>] {
        &self.redo_stack
    }

    /// Ops registered in the currently open group, in registration order.
    pub fn pending_ops(&self) -> &[O] {
        &self.pending.ops
    }

    /// Open a group; nested calls only deepen the nesting counter.
    pub fn begin_group(&mut self) {
        if self.depth == 0 && self.state == LogState::Idle {
            self.state = LogState::Recording;
        }
        self.depth += 1;
    }

    /// Close a group. Only the outermost close flushes the accumulated ops:
    /// while `Recording` the group lands on the undo stack and the redo
    /// stack is cleared; while `Undoing`/`Redoing` it lands on the opposite
    /// stack and redo history is preserved. Empty groups are discarded
    /// without touching either stack.
    pub fn end_group(&mut self) {
        debug_assert!(self.depth > 0, "end_group without begin_group");
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 {
            return;
        }
        let group = core::mem::replace(&mut self.pending, UndoGroup::empty());
        match self.state {
            LogState::Recording | LogState::Idle => {
                if !group.is_empty() {
                    self.undo_stack.push(group);
                    self.redo_stack.clear();
                }
                self.state = LogState::Idle;
            }
            LogState::Undoing => {
                if !group.is_empty() {
                    self.redo_stack.push(group);
                }
            }
            LogState::Redoing => {
                if !group.is_empty() {
                    self.undo_stack.push(group);
                }
            }
        }
    }

    /// Append an inverse op to the open group.
    ///
    /// Errors when no group is open. The coalescing hook may drop the op if
    /// it duplicates the immediately preceding one in this group.
    pub fn register(&mut self, op: O) -> Result<(), UndoError> {
        if self.depth == 0 {
            return Err(UndoError::NotRecording);
        }
        if let (Some(dup), Some(prev)) = (self.coalesce, self.pending.ops.last())
            && dup(&op, prev)
        {
            return Ok(());
        }
        self.pending.ops.push(op);
        Ok(())
    }

    /// Attach a human-readable comment to the open group. The first comment
    /// in a group wins; later ones are ignored.
    pub fn register_comment(&mut self, comment: &str) -> Result<(), UndoError> {
        if self.depth == 0 {
            return Err(UndoError::NotRecording);
        }
        if self.pending.comment.is_none() {
            self.pending.comment = Some(comment.to_owned());
        }
        Ok(())
    }

    /// Pop the top undo group and enter replay.
    ///
    /// Returns `None` when the stack is empty (undo is a no-op, not an
    /// error) or when the log is mid-group or mid-replay. The caller applies
    /// the returned group's ops in reverse registration order, then calls
    /// [`Self::end_undo`].
    #[must_use]
    pub fn begin_undo(&mut self) -> Option<UndoGroup<O>> {
        debug_assert_eq!(self.state, LogState::Idle, "undo during group or replay");
        if self.state != LogState::Idle {
            return None;
        }
        let group = self.undo_stack.pop()?;
        self.state = LogState::Undoing;
        self.depth = 1;
        Some(group)
    }

    /// Finish an undo replay, flushing the re-registered ops onto the redo
    /// stack.
    pub fn end_undo(&mut self) {
        debug_assert_eq!(self.state, LogState::Undoing, "end_undo without begin_undo");
        self.end_group();
        self.state = LogState::Idle;
    }

    /// Pop the top redo group and enter replay. Mirror of
    /// [`Self::begin_undo`].
    #[must_use]
    pub fn begin_redo(&mut self) -> Option<UndoGroup<O>> {
        debug_assert_eq!(self.state, LogState::Idle, "redo during group or replay");
        if self.state != LogState::Idle {
            return None;
        }
        let group = self.redo_stack.pop()?;
        self.state = LogState::Redoing;
        self.depth = 1;
        Some(group)
    }

    /// Finish a redo replay, flushing the re-registered ops onto the undo
    /// stack.
    pub fn end_redo(&mut self) {
        debug_assert_eq!(self.state, LogState::Redoing, "end_redo without begin_redo");
        self.end_group();
        self.state = LogState::Idle;
    }

    /// Discard the top of the redo stack without replaying it.
    ///
    /// Used when an incoming edit is about to make the entry inapplicable
    /// and the caller wants a clean stack rather than an invalidated one.
    pub fn remove_most_recent_redo(&mut self) {
        self.redo_stack.pop();
    }

    /// Drop all recorded history.
    pub fn clear(&mut self) {
        debug_assert_eq!(self.state, LogState::Idle, "clear during group or replay");
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.pending = UndoGroup::empty();
        self.depth = 0;
        self.state = LogState::Idle;
    }
}
