// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The closed set of reversible edit operations.
//!
//! Every mutation of the graph is expressed as one of these variants, and
//! every application of one registers its own inverse with the transaction
//! log. Arguments are captured value snapshots, never live references, so a
//! logged op stays applicable after unrelated edits.

use kurbo::Point;
use serde::{Deserialize, Serialize};

use crate::object::{ObjectId, ObjectRef, ObjectSnapshot, RelMember};
use crate::tags::Tags;

/// One reversible edit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EditOp {
    /// Materialize a full object (creation, or the inverse of a purge).
    Insert(ObjectSnapshot),
    /// Remove an object record entirely (the inverse of an insert).
    Purge(ObjectRef),
    /// Replace an object's tag set.
    SetTags {
        /// Object whose tags change.
        target: ObjectRef,
        /// The tag set to install.
        tags: Tags,
    },
    /// Move a node.
    SetPosition {
        /// Node being moved.
        node: ObjectId,
        /// Position to install.
        pos: Point,
    },
    /// Splice a node reference into a path.
    InsertPathNode {
        /// Path being edited.
        path: ObjectId,
        /// Insertion index.
        index: usize,
        /// Node to reference.
        node: ObjectId,
    },
    /// Remove a node reference from a path.
    RemovePathNode {
        /// Path being edited.
        path: ObjectId,
        /// Index to remove.
        index: usize,
    },
    /// Splice a member into a relation.
    InsertMember {
        /// Relation being edited.
        relation: ObjectId,
        /// Insertion index.
        index: usize,
        /// Member to add.
        member: RelMember,
    },
    /// Remove a member from a relation.
    RemoveMember {
        /// Relation being edited.
        relation: ObjectId,
        /// Index to remove.
        index: usize,
    },
    /// Set or clear the tombstone flag.
    SetDeleted {
        /// Object whose tombstone changes.
        target: ObjectRef,
        /// New tombstone state.
        deleted: bool,
    },
    /// Install an exact modify-count (snapshot, not delta).
    SetModifyCount {
        /// Object whose count changes.
        target: ObjectRef,
        /// Count to install.
        count: i32,
    },
}

impl EditOp {
    /// The object this op touches.
    pub fn target(&self) -> ObjectRef {
        match self {
            Self::Insert(snap) => snap.object_ref(),
            Self::Purge(target)
            | Self::SetTags { target, .. }
            | Self::SetDeleted { target, .. }
            | Self::SetModifyCount { target, .. } => *target,
            Self::SetPosition { node, .. } => ObjectRef::Node(*node),
            Self::InsertPathNode { path, .. } | Self::RemovePathNode { path, .. } => {
                ObjectRef::Path(*path)
            }
            Self::InsertMember { relation, .. } | Self::RemoveMember { relation, .. } => {
                ObjectRef::Relation(*relation)
            }
        }
    }

    /// Default duplicate-suppression policy for the transaction log: a
    /// position or modify-count op duplicates an adjacent one for the same
    /// target. Keeping the first registration preserves the oldest state,
    /// which is what undo must restore after a continuous drag.
    pub fn coalesces(new: &Self, prev: &Self) -> bool {
        match (new, prev) {
            (Self::SetPosition { node: a, .. }, Self::SetPosition { node: b, .. }) => a == b,
            (
                Self::SetModifyCount { target: a, .. },
                Self::SetModifyCount { target: b, .. },
            ) => a == b,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesce_policy_matches_same_target_only() {
        let a = EditOp::SetPosition {
            node: 1,
            pos: Point::new(0.0, 0.0),
        };
        let b = EditOp::SetPosition {
            node: 1,
            pos: Point::new(1.0, 1.0),
        };
        let c = EditOp::SetPosition {
            node: 2,
            pos: Point::new(1.0, 1.0),
        };
        assert!(EditOp::coalesces(&b, &a));
        assert!(!EditOp::coalesces(&c, &a));

        let m1 = EditOp::SetModifyCount {
            target: ObjectRef::Node(1),
            count: 0,
        };
        let m2 = EditOp::SetModifyCount {
            target: ObjectRef::Node(1),
            count: 3,
        };
        assert!(EditOp::coalesces(&m2, &m1));
        assert!(!EditOp::coalesces(&m1, &a));
    }

    #[test]
    fn target_of_each_variant() {
        assert_eq!(
            EditOp::RemovePathNode { path: 9, index: 0 }.target(),
            ObjectRef::Path(9)
        );
        assert_eq!(
            EditOp::SetDeleted {
                target: ObjectRef::Relation(4),
                deleted: true
            }
            .target(),
            ObjectRef::Relation(4)
        );
    }
}
