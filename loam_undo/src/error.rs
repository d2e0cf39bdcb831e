// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type for misuse of the log's recording API.

use thiserror::Error;

/// Errors returned by [`TransactionLog`](crate::TransactionLog).
///
/// Undo and redo themselves never fail: replaying with an empty stack is a
/// no-op. Only registration outside a group is an error.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum UndoError {
    /// `register` or `register_comment` was called with no open group.
    #[error("operation registered outside an undo group")]
    NotRecording,
}
