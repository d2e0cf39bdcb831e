// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The spatial index: one quad arena serving region tracking and object lookup.

use std::time::{Duration, SystemTime};

use kurbo::Rect;
use serde::{Deserialize, Serialize};

use crate::cell::{Member, QuadCell};
use crate::report::Discrepancy;
use crate::types::{CellIdx, CellState, MIN_CELL_DEG, Quadrant, WORLD_RECT, rect_contains, rects_intersect};

/// A quadtree over lon/lat space with two orthogonal jobs:
///
/// - **Region tracking**: which rectangles have been completely fetched
///   ([`Self::rects_needed_to_cover`], [`Self::merge_fetched_region`]).
/// - **Object indexing**: which payloads overlap a query rectangle
///   ([`Self::add`], [`Self::remove`], [`Self::update`], [`Self::query`]).
///
/// Cells live in an arena addressed by index; children are optional indices
/// and subtree deletion is slot invalidation, never pointer surgery. Cells
/// are created lazily on first use and pruned when they hold nothing.
///
/// The index is single-writer: callers serialize mutation externally and
/// must not mutate during a live query walk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpatialIndex<P> {
    cells: Vec<Option<QuadCell<P>>>,
    free_list: Vec<usize>,
    member_count: usize,
}

impl<P: Copy + Eq + core::fmt::Debug> Default for SpatialIndex<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Copy + Eq + core::fmt::Debug> SpatialIndex<P> {
    /// Create an empty index over the world rectangle.
    pub fn new() -> Self {
        Self::with_rect(WORLD_RECT)
    }

    /// Create an empty index over a custom root rectangle.
    pub fn with_rect(rect: Rect) -> Self {
        Self {
            cells: vec![Some(QuadCell::new(rect, None))],
            free_list: Vec::new(),
            member_count: 0,
        }
    }

    /// The rectangle covered by the root cell.
    pub fn root_rect(&self) -> Rect {
        self.cell(CellIdx::ROOT).rect
    }

    /// Number of indexed members.
    pub fn len(&self) -> usize {
        self.member_count
    }

    /// True when no members are indexed.
    pub fn is_empty(&self) -> bool {
        self.member_count == 0
    }

    /// Number of live cells in the arena.
    pub fn cell_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Drop all members, all cells, and all region state.
    pub fn clear(&mut self) {
        let rect = self.root_rect();
        *self = Self::with_rect(rect);
    }

    // --- region tracking ---

    /// Minimal set of cell rectangles that must be fetched before `rect` is
    /// fully covered. Every returned cell is marked busy, so concurrent
    /// requests for overlapping areas do not produce duplicate fetches; each
    /// piece must be answered by a later [`Self::merge_fetched_region`].
    ///
    /// Returns an empty list iff `rect` is already covered by whole cells
    /// (or entirely claimed by outstanding fetches).
    pub fn rects_needed_to_cover(&mut self, rect: Rect) -> Vec<Rect> {
        let mut out = Vec::new();
        self.missing_pieces(CellIdx::ROOT, rect, &mut out);
        out
    }

    fn missing_pieces(&mut self, idx: CellIdx, target: Rect, out: &mut Vec<Rect>) {
        let (rect, skip, has_children) = {
            let c = self.cell(idx);
            (c.rect, c.is_whole() || c.is_busy(), c.has_children())
        };
        if skip || !rects_intersect(&rect, &target) {
            return;
        }
        // Take the cell whole once it is at the minimum size or no larger
        // than half the request in either dimension; fetching a margin is
        // cheaper than splitting further.
        let small_enough = rect.width() <= MIN_CELL_DEG
            || rect.width() <= 0.5 * target.width()
            || rect.height() <= 0.5 * target.height();
        if small_enough || (rect_contains(&target, &rect) && !has_children) {
            self.cell_mut(idx).state.insert(CellState::BUSY);
            out.push(rect);
            return;
        }
        for q in Quadrant::ALL {
            if rects_intersect(&q.rect(rect), &target) {
                let child = self.ensure_child(idx, q);
                self.missing_pieces(child, target, out);
            }
        }
    }

    /// Record the outcome of a fetch for a rectangle previously returned by
    /// [`Self::rects_needed_to_cover`].
    ///
    /// On success the cell becomes whole (and a parent whose four children
    /// are all whole coalesces to whole). On failure — including a cancelled
    /// fetch — only the busy flag is cleared, so a retry starts clean.
    /// Merging the same success twice is a no-op.
    pub fn merge_fetched_region(&mut self, rect: Rect, success: bool) {
        let Some(idx) = self.cell_for_rect(rect) else {
            tracing::warn!(?rect, "fetched rectangle does not align to any cell");
            return;
        };
        if success {
            self.mark_whole(idx);
        } else {
            self.cell_mut(idx).state.remove(CellState::BUSY);
        }
    }

    /// True when every point of `rect` lies inside whole cells.
    pub fn covered(&self, rect: Rect) -> bool {
        self.covered_inner(CellIdx::ROOT, rect)
    }

    fn covered_inner(&self, idx: CellIdx, target: Rect) -> bool {
        let c = self.cell(idx);
        if !rects_intersect(&c.rect, &target) || c.is_whole() {
            return true;
        }
        if !c.has_children() {
            return false;
        }
        Quadrant::ALL.iter().all(|q| {
            if !rects_intersect(&q.rect(c.rect), &target) {
                return true;
            }
            match c.children[q.index()] {
                Some(child) => self.covered_inner(child, target),
                None => false,
            }
        })
    }

    /// Locate the cell whose rectangle is exactly `rect`, re-creating the
    /// path if it was pruned while the fetch was in flight.
    fn cell_for_rect(&mut self, rect: Rect) -> Option<CellIdx> {
        let mut idx = CellIdx::ROOT;
        loop {
            let cur = self.cell(idx).rect;
            if cur == rect {
                return Some(idx);
            }
            if cur.width() <= MIN_CELL_DEG {
                return None;
            }
            let q = Quadrant::ALL
                .into_iter()
                .find(|q| rect_contains(&q.rect(cur), &rect))?;
            idx = self.ensure_child(idx, q);
        }
    }

    fn mark_whole(&mut self, idx: CellIdx) {
        {
            let cell = self.cell_mut(idx);
            if cell.is_whole() {
                cell.state.remove(CellState::BUSY);
                return;
            }
            cell.state.insert(CellState::WHOLE);
            cell.state.remove(CellState::BUSY);
            cell.fetched = Some(SystemTime::now());
        }
        let mut cur = idx;
        while let Some(parent) = self.cell(cur).parent {
            let all_whole = self
                .cell(parent)
                .children
                .iter()
                .all(|c| c.is_some_and(|i| self.cell(i).is_whole()));
            if !all_whole {
                break;
            }
            let p = self.cell_mut(parent);
            p.state.insert(CellState::WHOLE);
            p.state.remove(CellState::BUSY);
            p.fetched = Some(SystemTime::now());
            cur = parent;
        }
    }

    // --- object indexing ---

    /// Index `payload` under `bbox`, touched now.
    pub fn add(&mut self, payload: P, bbox: Rect) {
        self.add_touched(payload, bbox, SystemTime::now());
    }

    /// Index `payload` under `bbox` with an explicit touch time.
    ///
    /// The member is pushed to the smallest cell wholly containing `bbox`;
    /// oversized members stay at the level where no single quadrant contains
    /// them. Insertion is O(tree depth).
    pub fn add_touched(&mut self, payload: P, bbox: Rect, touched: SystemTime) {
        let mut idx = CellIdx::ROOT;
        loop {
            let rect = self.cell(idx).rect;
            if rect.width() <= MIN_CELL_DEG {
                break;
            }
            let Some(q) = Quadrant::ALL
                .into_iter()
                .find(|q| rect_contains(&q.rect(rect), &bbox))
            else {
                break;
            };
            idx = self.ensure_child(idx, q);
        }
        self.cell_mut(idx).members.push(Member {
            payload,
            bbox,
            touched,
        });
        self.member_count += 1;
    }

    /// Remove `payload`, located by the bbox it was indexed under.
    ///
    /// Returns `false` when the member is not present — a non-fatal signal
    /// (for example, a remove raced an eviction). Cells left empty are
    /// pruned from the arena.
    pub fn remove(&mut self, payload: P, bbox: Rect) -> bool {
        let mut idx = CellIdx::ROOT;
        loop {
            let cell = self.cell_mut(idx);
            if let Some(pos) = cell.members.iter().position(|m| m.payload == payload) {
                cell.members.swap_remove(pos);
                self.member_count -= 1;
                self.prune_upward(idx);
                return true;
            }
            let rect = self.cell(idx).rect;
            let next = Quadrant::ALL
                .into_iter()
                .find(|q| rect_contains(&q.rect(rect), &bbox))
                .and_then(|q| self.cell(idx).children[q.index()]);
            match next {
                Some(child) => idx = child,
                None => return false,
            }
        }
    }

    /// Move a member whose bbox changed. Returns whether the old entry was
    /// found; the new entry is indexed either way so membership tracks the
    /// caller's live set.
    pub fn update(&mut self, payload: P, old_bbox: Rect, new_bbox: Rect) -> bool {
        let found = self.remove(payload, old_bbox);
        self.add(payload, new_bbox);
        found
    }

    /// Visit every member whose bbox intersects `rect`.
    ///
    /// Subtrees whose cell rectangle does not intersect `rect` are never
    /// descended.
    pub fn query(&self, rect: Rect, mut visit: impl FnMut(&P)) {
        self.query_inner(CellIdx::ROOT, rect, &mut visit);
    }

    /// Visit every member with its stored bbox and touch time, in no
    /// particular order.
    pub fn for_each(&self, mut f: impl FnMut(&P, Rect, SystemTime)) {
        for cell in self.cells.iter().flatten() {
            for m in &cell.members {
                f(&m.payload, m.bbox, m.touched);
            }
        }
    }

    fn query_inner(&self, idx: CellIdx, rect: Rect, visit: &mut impl FnMut(&P)) {
        let c = self.cell(idx);
        if !rects_intersect(&c.rect, &rect) {
            return;
        }
        for m in &c.members {
            if rects_intersect(&m.bbox, &rect) {
                visit(&m.payload);
            }
        }
        for child in c.children.into_iter().flatten() {
            self.query_inner(child, rect, visit);
        }
    }

    // --- eviction ---

    /// Discard members last touched before `cutoff`, except those `keep`
    /// protects, and clear the whole flag over every region that now has
    /// holes. Returns the removed payloads.
    pub fn discard_older_than(&mut self, cutoff: SystemTime, keep: impl Fn(&P) -> bool) -> Vec<P> {
        let mut removed = Vec::new();
        self.discard_inner(CellIdx::ROOT, cutoff, &keep, &mut removed);
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "evicted stale members");
        }
        removed
    }

    /// Discard roughly `fraction` of members, oldest first. Returns the
    /// cutoff date used and the removed payloads, or `None` when there is
    /// nothing to discard.
    pub fn discard_fraction(
        &mut self,
        fraction: f64,
        keep: impl Fn(&P) -> bool,
    ) -> Option<(SystemTime, Vec<P>)> {
        let mut dates: Vec<SystemTime> = self
            .cells
            .iter()
            .flatten()
            .flat_map(|c| c.members.iter().map(|m| m.touched))
            .collect();
        if dates.is_empty() {
            return None;
        }
        dates.sort();
        let k = ((dates.len() as f64) * fraction.clamp(0.0, 1.0)).ceil() as usize;
        if k == 0 {
            return None;
        }
        let cutoff = if k < dates.len() {
            dates[k]
        } else {
            dates[k - 1] + Duration::from_nanos(1)
        };
        let removed = self.discard_older_than(cutoff, keep);
        Some((cutoff, removed))
    }

    /// Returns whether the subtree is still fully intact: nothing removed
    /// and no whole flag cleared. A parent above a damaged subtree loses its
    /// own whole flag, so coverage never overstates what is present.
    fn discard_inner(
        &mut self,
        idx: CellIdx,
        cutoff: SystemTime,
        keep: &impl Fn(&P) -> bool,
        removed: &mut Vec<P>,
    ) -> bool {
        let children = self.cell(idx).children;
        let mut intact = true;
        for child in children.into_iter().flatten() {
            intact &= self.discard_inner(child, cutoff, keep, removed);
        }
        let lost = {
            let cell = self.cell_mut(idx);
            let before = cell.members.len();
            let mut i = 0;
            while i < cell.members.len() {
                let m = &cell.members[i];
                if m.touched < cutoff && !keep(&m.payload) {
                    let m = cell.members.swap_remove(i);
                    removed.push(m.payload);
                } else {
                    i += 1;
                }
            }
            let lost = before - cell.members.len();
            if lost > 0 {
                intact = false;
            }
            let stale_fetch = cell.fetched.is_some_and(|d| d < cutoff);
            if stale_fetch || (!intact && cell.is_whole()) {
                cell.state.remove(CellState::WHOLE);
                cell.fetched = None;
                intact = false;
            }
            lost
        };
        self.member_count -= lost;
        for q in Quadrant::ALL {
            if let Some(child) = self.cell(idx).children[q.index()]
                && self.cell(child).is_prunable()
            {
                self.cell_mut(idx).children[q.index()] = None;
                self.cells[child.idx()] = None;
                self.free_list.push(child.idx());
            }
        }
        intact
    }

    // --- consistency ---

    /// Walk the tree verifying structural invariants and that every stored
    /// member bbox matches `current_bbox` for its payload. Reports are
    /// returned, never repaired.
    pub fn consistency_check(
        &self,
        current_bbox: impl Fn(&P) -> Option<Rect>,
    ) -> Vec<Discrepancy<P>> {
        let mut out = Vec::new();
        let mut seen = vec![false; self.cells.len()];
        self.check_inner(CellIdx::ROOT, &current_bbox, &mut seen, &mut out);
        for (i, cell) in self.cells.iter().enumerate() {
            if let Some(cell) = cell
                && !seen[i]
            {
                out.push(Discrepancy::OrphanCell { rect: cell.rect });
            }
        }
        out
    }

    fn check_inner(
        &self,
        idx: CellIdx,
        current_bbox: &impl Fn(&P) -> Option<Rect>,
        seen: &mut [bool],
        out: &mut Vec<Discrepancy<P>>,
    ) {
        seen[idx.idx()] = true;
        let c = self.cell(idx);
        if c.is_whole() && c.is_busy() {
            out.push(Discrepancy::WholeAndBusy { rect: c.rect });
        }
        for m in &c.members {
            match current_bbox(&m.payload) {
                Some(cur) if cur == m.bbox => {}
                other => out.push(Discrepancy::StaleMemberBbox {
                    payload: m.payload,
                    stored: m.bbox,
                    current: other,
                }),
            }
            if !rect_contains(&c.rect, &m.bbox) {
                out.push(Discrepancy::MisplacedMember {
                    payload: m.payload,
                    stored: m.bbox,
                    cell: c.rect,
                });
            }
        }
        for q in Quadrant::ALL {
            if let Some(ci) = c.children[q.index()] {
                let child = self.cell(ci);
                let expected = q.rect(c.rect);
                if child.rect != expected {
                    out.push(Discrepancy::ChildRectMismatch {
                        parent: c.rect,
                        expected,
                        actual: child.rect,
                    });
                }
                if child.parent != Some(idx) {
                    out.push(Discrepancy::ParentLinkBroken { child: child.rect });
                }
                self.check_inner(ci, current_bbox, seen, out);
            }
        }
    }

    // --- arena plumbing ---

    fn cell(&self, idx: CellIdx) -> &QuadCell<P> {
        self.cells[idx.idx()].as_ref().expect("dangling cell index")
    }

    fn cell_mut(&mut self, idx: CellIdx) -> &mut QuadCell<P> {
        self.cells[idx.idx()].as_mut().expect("dangling cell index")
    }

    fn ensure_child(&mut self, parent: CellIdx, q: Quadrant) -> CellIdx {
        if let Some(existing) = self.cell(parent).children[q.index()] {
            return existing;
        }
        let rect = q.rect(self.cell(parent).rect);
        let cell = QuadCell::new(rect, Some(parent));
        let idx = match self.free_list.pop() {
            Some(slot) => {
                self.cells[slot] = Some(cell);
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "cell indices are 32-bit by design"
                )]
                CellIdx(slot as u32)
            }
            None => {
                self.cells.push(Some(cell));
                #[allow(
                    clippy::cast_possible_truncation,
                    reason = "cell indices are 32-bit by design"
                )]
                CellIdx((self.cells.len() - 1) as u32)
            }
        };
        self.cell_mut(parent).children[q.index()] = Some(idx);
        idx
    }

    fn prune_upward(&mut self, mut idx: CellIdx) {
        while idx != CellIdx::ROOT {
            let (prunable, parent) = {
                let c = self.cell(idx);
                (c.is_prunable(), c.parent)
            };
            let Some(parent) = parent else {
                return;
            };
            if !prunable {
                return;
            }
            for slot in &mut self.cell_mut(parent).children {
                if *slot == Some(idx) {
                    *slot = None;
                }
            }
            self.cells[idx.idx()] = None;
            self.free_list.push(idx.idx());
            idx = parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Rect {
        Rect::new(x0, y0, x1, y1)
    }

    #[test]
    fn needed_then_merge_covers() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let target = rect(0.0, 0.0, 1.0, 1.0);
        assert!(!idx.covered(target));

        let pieces = idx.rects_needed_to_cover(target);
        assert!(!pieces.is_empty());
        // Pieces tile the missing area: pairwise disjoint interiors, and
        // together they cover the target.
        for (i, a) in pieces.iter().enumerate() {
            for b in pieces.iter().skip(i + 1) {
                let ix = a.intersect(*b);
                assert!(
                    ix.width() * ix.height() == 0.0,
                    "pieces {a:?} and {b:?} overlap"
                );
            }
        }
        for piece in &pieces {
            idx.merge_fetched_region(*piece, true);
        }
        assert!(idx.covered(target));
        assert!(idx.rects_needed_to_cover(target).is_empty());
    }

    #[test]
    fn busy_suppresses_duplicate_requests() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let target = rect(10.0, 10.0, 11.0, 11.0);
        let first = idx.rects_needed_to_cover(target);
        assert!(!first.is_empty());
        // Same request again while fetches are outstanding: nothing new.
        assert!(idx.rects_needed_to_cover(target).is_empty());
        assert!(!idx.covered(target));
    }

    #[test]
    fn failed_fetch_allows_retry() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let target = rect(-5.0, -5.0, -4.0, -4.0);
        let pieces = idx.rects_needed_to_cover(target);
        for piece in &pieces {
            idx.merge_fetched_region(*piece, false);
        }
        assert!(!idx.covered(target));
        let retry = idx.rects_needed_to_cover(target);
        assert_eq!(retry, pieces, "retry should request the same cells");
    }

    #[test]
    fn merge_success_is_idempotent() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let target = rect(0.0, 0.0, 0.5, 0.5);
        let pieces = idx.rects_needed_to_cover(target);
        for piece in &pieces {
            idx.merge_fetched_region(*piece, true);
            idx.merge_fetched_region(*piece, true);
        }
        let snapshot = format!("{idx:?}");
        for piece in &pieces {
            idx.merge_fetched_region(*piece, true);
        }
        assert_eq!(snapshot, format!("{idx:?}"));
        assert!(idx.covered(target));
    }

    #[test]
    fn children_coalesce_to_whole_parent() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let parent = rect(0.0, 0.0, 45.0, 22.5);
        for q in Quadrant::ALL {
            idx.merge_fetched_region(q.rect(parent), true);
        }
        assert!(idx.covered(parent));
        // The parent cell itself must be whole, not just its children.
        let pieces = idx.rects_needed_to_cover(parent);
        assert!(pieces.is_empty());
    }

    #[test]
    fn add_query_remove_round_trip() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let bbox = rect(1.0, 1.0, 1.1, 1.1);
        idx.add(7, bbox);
        assert_eq!(idx.len(), 1);

        let mut hits = Vec::new();
        idx.query(rect(0.0, 0.0, 2.0, 2.0), |p| hits.push(*p));
        assert_eq!(hits, vec![7]);

        hits.clear();
        idx.query(rect(50.0, 50.0, 60.0, 60.0), |p| hits.push(*p));
        assert!(hits.is_empty());

        assert!(idx.remove(7, bbox));
        assert!(!idx.remove(7, bbox));
        assert!(idx.is_empty());
    }

    #[test]
    fn removing_members_prunes_cells() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let bbox = rect(3.0, 3.0, 3.001, 3.001);
        idx.add(1, bbox);
        let populated = idx.cell_count();
        assert!(populated > 1, "a tiny bbox should create a deep path");
        assert!(idx.remove(1, bbox));
        assert_eq!(idx.cell_count(), 1, "only the root should survive");
    }

    #[test]
    fn update_moves_member() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let old = rect(0.0, 0.0, 0.1, 0.1);
        let new = rect(20.0, 20.0, 20.1, 20.1);
        idx.add(5, old);
        assert!(idx.update(5, old, new));
        let mut hits = Vec::new();
        idx.query(rect(19.0, 19.0, 21.0, 21.0), |p| hits.push(*p));
        assert_eq!(hits, vec![5]);
        hits.clear();
        idx.query(rect(-1.0, -1.0, 0.5, 0.5), |p| hits.push(*p));
        assert!(hits.is_empty());
    }

    #[test]
    fn query_matches_brute_force() {
        let mut rng = SmallRng::seed_from_u64(0x10aD);
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let mut live: Vec<(u32, Rect)> = Vec::new();

        for i in 0..500_u32 {
            let x = rng.random_range(-170.0..170.0);
            let y = rng.random_range(-80.0..80.0);
            let w = rng.random_range(0.0..5.0);
            let h = rng.random_range(0.0..5.0);
            let bbox = rect(x, y, x + w, y + h);
            idx.add(i, bbox);
            live.push((i, bbox));
        }
        // Remove a third of them.
        for i in (0..500_u32).step_by(3) {
            let pos = live.iter().position(|(p, _)| *p == i).unwrap();
            let (_, bbox) = live.swap_remove(pos);
            assert!(idx.remove(i, bbox));
        }

        for _ in 0..50 {
            let x = rng.random_range(-180.0..170.0);
            let y = rng.random_range(-90.0..80.0);
            let q = rect(x, y, x + rng.random_range(0.0..20.0), y + rng.random_range(0.0..20.0));
            let mut got: Vec<u32> = Vec::new();
            idx.query(q, |p| got.push(*p));
            got.sort_unstable();
            let mut want: Vec<u32> = live
                .iter()
                .filter(|(_, b)| rects_intersect(b, &q))
                .map(|(p, _)| *p)
                .collect();
            want.sort_unstable();
            assert_eq!(got, want, "query {q:?} disagrees with brute force");
        }
    }

    #[test]
    fn eviction_removes_stale_and_clears_whole() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let target = rect(0.0, 0.0, 1.0, 1.0);
        for piece in idx.rects_needed_to_cover(target) {
            idx.merge_fetched_region(piece, true);
        }
        assert!(idx.covered(target));

        let old = SystemTime::now() - Duration::from_secs(3600);
        idx.add_touched(1, rect(0.2, 0.2, 0.3, 0.3), old);
        idx.add(2, rect(0.5, 0.5, 0.6, 0.6));

        let cutoff = SystemTime::now() - Duration::from_secs(60);
        let removed = idx.discard_older_than(cutoff, |_| false);
        assert_eq!(removed, vec![1]);
        assert_eq!(idx.len(), 1);
        // The evicted member left a hole: the region must be refetched.
        assert!(!idx.covered(target));
    }

    #[test]
    fn eviction_keep_predicate_protects() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let old = SystemTime::now() - Duration::from_secs(3600);
        idx.add_touched(1, rect(0.0, 0.0, 0.1, 0.1), old);
        idx.add_touched(2, rect(1.0, 1.0, 1.1, 1.1), old);
        let cutoff = SystemTime::now();
        let removed = idx.discard_older_than(cutoff, |p| *p == 2);
        assert_eq!(removed, vec![1]);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn discard_fraction_uses_quantile_cutoff() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let base = SystemTime::now() - Duration::from_secs(1000);
        for i in 0..10_u32 {
            idx.add_touched(
                i,
                rect(f64::from(i), 0.0, f64::from(i) + 0.5, 0.5),
                base + Duration::from_secs(u64::from(i)),
            );
        }
        let (cutoff, removed) = idx.discard_fraction(0.3, |_| false).unwrap();
        assert_eq!(removed.len(), 3);
        assert!(cutoff > base);
        assert_eq!(idx.len(), 7);
    }

    #[test]
    fn consistency_check_reports_stale_bbox() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        let bbox = rect(0.0, 0.0, 0.5, 0.5);
        idx.add(9, bbox);
        assert!(idx.consistency_check(|_| Some(bbox)).is_empty());

        let moved = rect(5.0, 5.0, 5.5, 5.5);
        let report = idx.consistency_check(|_| Some(moved));
        assert_eq!(report.len(), 1);
        assert!(matches!(
            report[0],
            Discrepancy::StaleMemberBbox { payload: 9, .. }
        ));
    }

    #[test]
    fn clear_resets_everything() {
        let mut idx: SpatialIndex<u32> = SpatialIndex::new();
        idx.add(1, rect(0.0, 0.0, 1.0, 1.0));
        for piece in idx.rects_needed_to_cover(rect(0.0, 0.0, 1.0, 1.0)) {
            idx.merge_fetched_region(piece, true);
        }
        idx.clear();
        assert!(idx.is_empty());
        assert_eq!(idx.cell_count(), 1);
        assert!(!idx.covered(rect(0.0, 0.0, 1.0, 1.0)));
    }
}
