// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Plain-data findings returned by [`SpatialIndex::consistency_check`](crate::SpatialIndex::consistency_check).

use core::fmt;

use kurbo::Rect;

/// One structural problem found while walking the tree.
///
/// Checks report; they never repair. A non-empty report means the index and
/// its owner have diverged and the caller decides what to do about it.
#[derive(Clone, Debug, PartialEq)]
pub enum Discrepancy<P> {
    /// A child cell's rectangle is not the exact quadrant of its parent.
    ChildRectMismatch {
        /// Parent cell rectangle.
        parent: Rect,
        /// Expected quadrant rectangle.
        expected: Rect,
        /// Rectangle actually stored on the child.
        actual: Rect,
    },
    /// A child cell's parent link does not point back at its parent.
    ParentLinkBroken {
        /// Rectangle of the mislinked child.
        child: Rect,
    },
    /// A cell is flagged both whole and busy.
    WholeAndBusy {
        /// Rectangle of the offending cell.
        rect: Rect,
    },
    /// A member's stored bbox differs from the owner's current bbox.
    StaleMemberBbox {
        /// The member's payload.
        payload: P,
        /// Bbox recorded in the index.
        stored: Rect,
        /// Bbox the owner reports now, if the object is still known.
        current: Option<Rect>,
    },
    /// A member's bbox is not contained by the cell holding it.
    MisplacedMember {
        /// The member's payload.
        payload: P,
        /// Bbox recorded in the index.
        stored: Rect,
        /// Rectangle of the cell holding the member.
        cell: Rect,
    },
    /// An arena slot holds a cell that is unreachable from the root.
    OrphanCell {
        /// Rectangle of the orphaned cell.
        rect: Rect,
    },
}

impl<P: fmt::Debug> fmt::Display for Discrepancy<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChildRectMismatch {
                parent,
                expected,
                actual,
            } => write!(
                f,
                "child of {parent:?} should cover {expected:?}, covers {actual:?}"
            ),
            Self::ParentLinkBroken { child } => {
                write!(f, "cell {child:?} has a broken parent link")
            }
            Self::WholeAndBusy { rect } => {
                write!(f, "cell {rect:?} is marked both whole and busy")
            }
            Self::StaleMemberBbox {
                payload,
                stored,
                current,
            } => write!(
                f,
                "member {payload:?} indexed at {stored:?} but owner reports {current:?}"
            ),
            Self::MisplacedMember {
                payload,
                stored,
                cell,
            } => write!(
                f,
                "member {payload:?} with bbox {stored:?} is not contained by its cell {cell:?}"
            ),
            Self::OrphanCell { rect } => write!(f, "cell {rect:?} is unreachable from the root"),
        }
    }
}
