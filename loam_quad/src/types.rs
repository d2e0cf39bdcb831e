// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Quadrants, cell state flags, and rectangle helpers.

use kurbo::Rect;
use serde::{Deserialize, Serialize};

/// The rectangle covered by a root cell: the whole world in lon/lat degrees.
pub const WORLD_RECT: Rect = Rect::new(-180.0, -90.0, 180.0, 90.0);

/// Smallest cell edge the tree will subdivide to, in degrees.
///
/// Matches a 2^16 split of the longitude range; cells at this size are taken
/// whole by region tracking and never split further by insertion.
pub const MIN_CELL_DEG: f64 = 360.0 / 65536.0;

/// One of the four child cells of a quad, in a fixed enumeration order.
///
/// The order is part of the on-disk format and of the cell-partition
/// invariant: `Quadrant::rect` is a pure function of the parent rectangle,
/// and the four child rectangles exactly tile the parent.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quadrant {
    /// North-west: left half, upper half.
    Nw,
    /// South-west: left half, lower half.
    Sw,
    /// South-east: right half, lower half.
    Se,
    /// North-east: right half, upper half.
    Ne,
}

impl Quadrant {
    /// All quadrants in enumeration order.
    pub const ALL: [Self; 4] = [Self::Nw, Self::Sw, Self::Se, Self::Ne];

    /// Index of this quadrant in a cell's child array.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Nw => 0,
            Self::Sw => 1,
            Self::Se => 2,
            Self::Ne => 3,
        }
    }

    /// The sub-rectangle of `parent` covered by this quadrant.
    ///
    /// `y1` is the northern edge, so "north" quadrants take the upper half.
    pub fn rect(self, parent: Rect) -> Rect {
        let cx = 0.5 * (parent.x0 + parent.x1);
        let cy = 0.5 * (parent.y0 + parent.y1);
        match self {
            Self::Nw => Rect::new(parent.x0, cy, cx, parent.y1),
            Self::Sw => Rect::new(parent.x0, parent.y0, cx, cy),
            Self::Se => Rect::new(cx, parent.y0, parent.x1, cy),
            Self::Ne => Rect::new(cx, cy, parent.x1, parent.y1),
        }
    }
}

bitflags::bitflags! {
    /// Region-tracking state of a single cell.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct CellState: u8 {
        /// Every point of this cell's rectangle has been fetched.
        const WHOLE = 0b0000_0001;
        /// A fetch for this cell is outstanding.
        const BUSY  = 0b0000_0010;
    }
}

/// Serde shim for [`CellState`]: stored as its raw bits.
pub(crate) mod state_bits {
    use super::CellState;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(state: &CellState, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(state.bits())
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<CellState, D::Error> {
        let bits = u8::deserialize(d)?;
        CellState::from_bits(bits).ok_or_else(|| serde::de::Error::custom("invalid cell state bits"))
    }
}

/// Arena index of a cell.
///
/// Indices are internal handles: they are only handed out within the crate
/// and are invalidated when a cell is pruned.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellIdx(pub(crate) u32);

impl CellIdx {
    /// The root cell always lives in slot 0.
    pub(crate) const ROOT: Self = Self(0);

    #[inline]
    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// Whether `outer` fully contains `inner` (closed edges).
#[inline]
pub(crate) fn rect_contains(outer: &Rect, inner: &Rect) -> bool {
    inner.x0 >= outer.x0 && inner.x1 <= outer.x1 && inner.y0 >= outer.y0 && inner.y1 <= outer.y1
}

/// Whether two rectangles overlap with positive extent in both axes.
///
/// Strict on edges: rectangles that merely touch do not intersect, so
/// sibling cells never both claim a shared boundary. A degenerate (point)
/// rectangle intersects anything whose interior contains it.
#[inline]
pub(crate) fn rects_intersect(a: &Rect, b: &Rect) -> bool {
    a.x0 < b.x1 && b.x0 < a.x1 && a.y0 < b.y1 && b.y0 < a.y1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quadrants_tile_parent_exactly() {
        let parent = Rect::new(-180.0, -90.0, 180.0, 90.0);
        let rects: Vec<Rect> = Quadrant::ALL.iter().map(|q| q.rect(parent)).collect();
        // Pairwise interiors are disjoint and the union area matches.
        let total: f64 = rects.iter().map(|r| r.width() * r.height()).sum();
        assert_eq!(total, parent.width() * parent.height());
        for (i, a) in rects.iter().enumerate() {
            for b in rects.iter().skip(i + 1) {
                let ix = a.intersect(*b);
                assert!(ix.width() * ix.height() == 0.0, "quadrants must not overlap");
            }
        }
        // Shared center corner.
        assert_eq!(Quadrant::Nw.rect(parent).x1, Quadrant::Ne.rect(parent).x0);
        assert_eq!(Quadrant::Sw.rect(parent).y1, Quadrant::Nw.rect(parent).y0);
    }

    #[test]
    fn containment_and_intersection_edges() {
        let outer = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(rect_contains(&outer, &Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert!(rect_contains(&outer, &Rect::new(2.0, 2.0, 3.0, 3.0)));
        assert!(!rect_contains(&outer, &Rect::new(5.0, 5.0, 11.0, 6.0)));
        // Touching edges do not intersect; proper overlap does.
        assert!(!rects_intersect(&outer, &Rect::new(10.0, 0.0, 20.0, 10.0)));
        assert!(rects_intersect(&outer, &Rect::new(9.9, 0.0, 20.0, 10.0)));
        // A point rectangle intersects a rect whose interior contains it.
        let point = Rect::new(5.0, 5.0, 5.0, 5.0);
        assert!(rects_intersect(&outer, &point));
        assert!(!rects_intersect(&Rect::new(5.0, 5.0, 6.0, 6.0), &point));
    }

    #[test]
    fn state_bits_round_trip() {
        let state = CellState::WHOLE;
        assert_eq!(CellState::from_bits(state.bits()), Some(CellState::WHOLE));
        assert!(CellState::from_bits(0b1000_0000).is_none());
    }
}
