// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! A single quad cell: rectangle, region flags, and member list.

use std::time::SystemTime;

use kurbo::Rect;
use serde::{Deserialize, Serialize};

use crate::types::{CellIdx, CellState, state_bits};

/// An indexed object reference held by a cell.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Member<P> {
    /// Caller-supplied payload identifying the object.
    pub payload: P,
    /// The bounding box the object was indexed under.
    pub bbox: Rect,
    /// Last time this member was inserted or moved; drives eviction.
    pub touched: SystemTime,
}

/// One rectangular cell of the quad partition.
///
/// Children are arena indices in [`Quadrant`](crate::Quadrant) order; absent
/// children mean the quadrant has never been subdivided (or was pruned).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct QuadCell<P> {
    pub(crate) rect: Rect,
    #[serde(with = "state_bits")]
    pub(crate) state: CellState,
    /// When this cell was last marked whole; cleared with the flag.
    pub(crate) fetched: Option<SystemTime>,
    pub(crate) parent: Option<CellIdx>,
    pub(crate) children: [Option<CellIdx>; 4],
    pub(crate) members: Vec<Member<P>>,
}

impl<P> QuadCell<P> {
    pub(crate) fn new(rect: Rect, parent: Option<CellIdx>) -> Self {
        Self {
            rect,
            state: CellState::empty(),
            fetched: None,
            parent,
            children: [None; 4],
            members: Vec::new(),
        }
    }

    pub(crate) fn is_whole(&self) -> bool {
        self.state.contains(CellState::WHOLE)
    }

    pub(crate) fn is_busy(&self) -> bool {
        self.state.contains(CellState::BUSY)
    }

    pub(crate) fn has_children(&self) -> bool {
        self.children.iter().any(Option::is_some)
    }

    /// True when nothing justifies keeping the cell in the arena.
    pub(crate) fn is_prunable(&self) -> bool {
        self.members.is_empty() && !self.has_children() && self.state.is_empty()
    }
}
