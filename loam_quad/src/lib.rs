// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Loam Quad: a quadtree over lon/lat space for a map editor core.
//!
//! One arena-backed tree serves two orthogonal jobs:
//!
//! - **Region tracking** — remember which rectangles of the world have been
//!   completely fetched from the server, compute the minimal set of cell
//!   rectangles still needed to cover a requested area, and merge completed
//!   (or failed, or cancelled) fetches back in.
//! - **Object indexing** — answer "which objects overlap this rectangle"
//!   over a large, mutable set of bounding boxes.
//!
//! Cells are addressed by arena index; children are optional indices in a
//! fixed [`Quadrant`] order, so subtree teardown is slot invalidation rather
//! than pointer surgery. Cells appear lazily on first use and are pruned
//! once they hold nothing, which bounds memory under churn.
//!
//! Age-based eviction ([`SpatialIndex::discard_older_than`],
//! [`SpatialIndex::discard_fraction`]) drops stale members and clears the
//! whole-region flag over any rectangle that now has holes — coverage never
//! overstates what is actually present.
//!
//! The index is designed for single-writer access; the owner serializes all
//! mutation and must not mutate during a live query walk.
//!
//! # Example
//!
//! ```rust
//! use kurbo::Rect;
//! use loam_quad::SpatialIndex;
//!
//! let mut index: SpatialIndex<u64> = SpatialIndex::new();
//!
//! // Ask what needs fetching to cover a viewport, then report completion.
//! let viewport = Rect::new(11.5, 48.1, 11.6, 48.2);
//! for piece in index.rects_needed_to_cover(viewport) {
//!     // ... fetch the piece, parse it ...
//!     index.merge_fetched_region(piece, true);
//! }
//! assert!(index.covered(viewport));
//!
//! // Index an object and query it back.
//! index.add(42, Rect::new(11.54, 48.14, 11.55, 48.15));
//! let mut hits = Vec::new();
//! index.query(viewport, |id| hits.push(*id));
//! assert_eq!(hits, vec![42]);
//! ```

mod cell;
mod index;
mod report;
mod types;

pub use cell::Member;
pub use index::SpatialIndex;
pub use report::Discrepancy;
pub use types::{CellIdx, CellState, MIN_CELL_DEG, Quadrant, WORLD_RECT};

#[cfg(test)]
mod tests {
    use super::*;
    use kurbo::Rect;

    #[test]
    fn serde_round_trip_preserves_index() {
        let mut index: SpatialIndex<u64> = SpatialIndex::new();
        let viewport = Rect::new(0.0, 0.0, 1.0, 1.0);
        for piece in index.rects_needed_to_cover(viewport) {
            index.merge_fetched_region(piece, true);
        }
        index.add(1, Rect::new(0.25, 0.25, 0.5, 0.5));
        index.add(2, Rect::new(-170.0, -80.0, -169.0, -79.0));

        let bytes = bincode::serialize(&index).unwrap();
        let restored: SpatialIndex<u64> = bincode::deserialize(&bytes).unwrap();

        assert_eq!(restored.len(), 2);
        assert!(restored.covered(viewport));
        let mut hits = Vec::new();
        restored.query(viewport, |id| hits.push(*id));
        assert_eq!(hits, vec![1]);
    }
}
