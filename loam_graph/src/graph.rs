// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The object graph: authoritative collections, undo-aware mutation, and
//! spatial-index synchronization.

use std::collections::{BTreeMap, BTreeSet};
use std::time::SystemTime;

use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

use loam_quad::SpatialIndex;
use loam_undo::TransactionLog;

use crate::error::{Error, Result};
use crate::object::{
    Node, ObjectCore, ObjectId, ObjectRef, ObjectSnapshot, Path, RelMember, Relation,
};
use crate::op::EditOp;
use crate::tags::Tags;

/// The editable graph of nodes, paths, and relations.
///
/// All mutation funnels through one dispatcher that registers the inverse of
/// every edit with the transaction log and keeps the spatial index in step
/// with the live object set. The graph is single-writer: the owner
/// serializes all mutation onto one logical execution context, and read-only
/// queries may not run concurrently with a writer.
#[derive(Debug, Serialize, Deserialize)]
pub struct ObjectGraph {
    pub(crate) nodes: BTreeMap<ObjectId, Node>,
    pub(crate) paths: BTreeMap<ObjectId, Path>,
    pub(crate) relations: BTreeMap<ObjectId, Relation>,
    pub(crate) spatial: SpatialIndex<ObjectRef>,
    pub(crate) log: TransactionLog<EditOp>,
    next_local_id: ObjectId,
}

impl Default for ObjectGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        let mut log = TransactionLog::new();
        log.set_coalesce(EditOp::coalesces);
        Self {
            nodes: BTreeMap::new(),
            paths: BTreeMap::new(),
            relations: BTreeMap::new(),
            spatial: SpatialIndex::new(),
            log,
            next_local_id: -1,
        }
    }

    // --- lookups ---

    /// A node by identifier, tombstones included.
    pub fn node(&self, id: ObjectId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    /// A path by identifier, tombstones included.
    pub fn path(&self, id: ObjectId) -> Option<&Path> {
        self.paths.get(&id)
    }

    /// A relation by identifier, tombstones included.
    pub fn relation(&self, id: ObjectId) -> Option<&Relation> {
        self.relations.get(&id)
    }

    /// Resolve a packed extended identifier to a present object.
    pub fn object_with_extended_id(&self, ext: u64) -> Option<ObjectRef> {
        let r = ObjectRef::from_extended(ext)?;
        self.exists(r).then_some(r)
    }

    /// Number of node records (tombstones included).
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of path records (tombstones included).
    pub fn path_count(&self) -> usize {
        self.paths.len()
    }

    /// Number of relation records (tombstones included).
    pub fn relation_count(&self) -> usize {
        self.relations.len()
    }

    /// Every distinct value the given tag key takes across live objects.
    pub fn tag_values_for_key(&self, key: &str) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for core in self.all_cores() {
            if !core.deleted
                && let Some(v) = core.tags.get(key)
            {
                out.insert(v.clone());
            }
        }
        out
    }

    /// Identifiers of live paths referencing the node. Recomputed from the
    /// authoritative path collection, never cached.
    pub fn paths_containing_node(&self, id: ObjectId) -> Vec<ObjectId> {
        self.paths
            .iter()
            .filter(|(_, p)| !p.core.deleted && p.node_ids.contains(&id))
            .map(|(pid, _)| *pid)
            .collect()
    }

    /// Identifiers of live relations directly referencing the object.
    pub fn relations_containing(&self, target: ObjectRef) -> Vec<ObjectId> {
        self.relations
            .iter()
            .filter(|(_, rel)| !rel.core.deleted && rel.contains_ref(target))
            .map(|(rid, _)| *rid)
            .collect()
    }

    /// Current bounding box of an object: the maintained cache, or a fresh
    /// computation if the cache is cold.
    pub fn bounding_box(&self, target: ObjectRef) -> Option<Rect> {
        self.cached_bbox(target).or_else(|| self.compute_bbox(target))
    }

    /// Visit every live indexed object whose bbox intersects `rect`.
    pub fn query(&self, rect: Rect, visit: impl FnMut(&ObjectRef)) {
        self.spatial.query(rect, visit);
    }

    /// Resolved positions of a path's nodes, in order. Unresolved node
    /// references are skipped.
    pub fn path_points(&self, id: ObjectId) -> Option<Vec<Point>> {
        let p = self.paths.get(&id)?;
        Some(
            p.node_ids
                .iter()
                .filter_map(|nid| self.nodes.get(nid))
                .map(|n| n.pos)
                .collect(),
        )
    }

    /// Whether the path's ring winds clockwise.
    pub fn path_is_clockwise(&self, id: ObjectId) -> Option<bool> {
        self.path_points(id).map(|ps| crate::geom::is_clockwise(&ps))
    }

    /// Unsigned ring area of a path, in square degrees.
    pub fn path_area(&self, id: ObjectId) -> Option<f64> {
        self.path_points(id)
            .map(|ps| crate::geom::signed_area(&ps).abs())
    }

    /// Great-circle length of a path in meters.
    pub fn path_length_meters(&self, id: ObjectId) -> Option<f64> {
        self.path_points(id).map(|ps| crate::geom::length_meters(&ps))
    }

    /// Area-weighted centroid of a path's ring, for label placement.
    pub fn path_centroid(&self, id: ObjectId) -> Option<Point> {
        self.path_points(id).and_then(|ps| crate::geom::centroid(&ps))
    }

    // --- editing ---

    /// Create a node at `pos` with a fresh local identifier.
    pub fn create_node(&mut self, pos: Point) -> ObjectId {
        let id = self.alloc_id();
        let node = Node {
            core: ObjectCore::local(id),
            pos,
            path_count: 0,
        };
        self.with_group(Some("create node"), |g| {
            g.apply(EditOp::Insert(ObjectSnapshot::Node(node)))
        })
        .expect("inserting a fresh object cannot fail");
        id
    }

    /// Create an empty path with a fresh local identifier. It enters the
    /// spatial index once it has nodes, and therefore a bounding box.
    pub fn create_path(&mut self) -> ObjectId {
        let id = self.alloc_id();
        let path = Path {
            core: ObjectCore::local(id),
            node_ids: Vec::new(),
        };
        self.with_group(Some("create path"), |g| {
            g.apply(EditOp::Insert(ObjectSnapshot::Path(path)))
        })
        .expect("inserting a fresh object cannot fail");
        id
    }

    /// Create an empty relation with a fresh local identifier.
    pub fn create_relation(&mut self) -> ObjectId {
        let id = self.alloc_id();
        let relation = Relation {
            core: ObjectCore::local(id),
            members: Vec::new(),
        };
        self.with_group(Some("create relation"), |g| {
            g.apply(EditOp::Insert(ObjectSnapshot::Relation(relation)))
        })
        .expect("inserting a fresh object cannot fail");
        id
    }

    /// Tombstone an object.
    ///
    /// Fails with [`Error::Referential`] while any live path or relation
    /// still references it; detach those references first (possibly in the
    /// same undo group). The record is retained for the pending-upload
    /// tombstone and for undo.
    pub fn delete(&mut self, target: ObjectRef) -> Result<()> {
        self.ensure_live(target)?;
        if let Some(referenced_by) = self.first_referrer(target) {
            return Err(Error::Referential {
                target,
                referenced_by,
            });
        }
        let comment = match target {
            ObjectRef::Node(_) => "delete node",
            ObjectRef::Path(_) => "delete path",
            ObjectRef::Relation(_) => "delete relation",
        };
        self.with_group(Some(comment), |g| {
            g.apply(EditOp::SetDeleted {
                target,
                deleted: true,
            })?;
            g.bump_modify(target)
        })
    }

    /// Replace an object's tag set.
    pub fn set_tags(&mut self, target: ObjectRef, tags: Tags) -> Result<()> {
        self.ensure_live(target)?;
        self.with_group(Some("change tags"), |g| {
            g.apply(EditOp::SetTags { target, tags })?;
            g.bump_modify(target)
        })
    }

    /// Move a node. Dependent path and relation bounding boxes follow.
    pub fn move_node(&mut self, id: ObjectId, pos: Point) -> Result<()> {
        self.ensure_live(ObjectRef::Node(id))?;
        self.with_group(Some("move"), |g| {
            g.apply(EditOp::SetPosition { node: id, pos })?;
            g.bump_modify(ObjectRef::Node(id))
        })
    }

    /// Splice an existing live node into a path at `index`.
    pub fn add_node_to_path(&mut self, path: ObjectId, index: usize, node: ObjectId) -> Result<()> {
        self.ensure_live(ObjectRef::Path(path))?;
        self.ensure_live(ObjectRef::Node(node))?;
        let len = self.paths[&path].node_ids.len();
        if index > len {
            return Err(Error::IndexOutOfBounds {
                target: ObjectRef::Path(path),
                index,
                len,
            });
        }
        self.with_group(Some("add node to path"), |g| {
            g.apply(EditOp::InsertPathNode { path, index, node })?;
            g.bump_modify(ObjectRef::Path(path))
        })
    }

    /// Remove the node reference at `index` from a path.
    pub fn remove_node_from_path(&mut self, path: ObjectId, index: usize) -> Result<()> {
        self.ensure_live(ObjectRef::Path(path))?;
        let len = self.paths[&path].node_ids.len();
        if index >= len {
            return Err(Error::IndexOutOfBounds {
                target: ObjectRef::Path(path),
                index,
                len,
            });
        }
        self.with_group(Some("remove node from path"), |g| {
            g.apply(EditOp::RemovePathNode { path, index })?;
            g.bump_modify(ObjectRef::Path(path))
        })
    }

    /// Splice a member into a relation at `index`. The member's reference
    /// may be unresolved (not yet fetched).
    pub fn add_member(&mut self, relation: ObjectId, index: usize, member: RelMember) -> Result<()> {
        self.ensure_live(ObjectRef::Relation(relation))?;
        let len = self.relations[&relation].members.len();
        if index > len {
            return Err(Error::IndexOutOfBounds {
                target: ObjectRef::Relation(relation),
                index,
                len,
            });
        }
        self.with_group(Some("add member"), |g| {
            g.apply(EditOp::InsertMember {
                relation,
                index,
                member,
            })?;
            g.bump_modify(ObjectRef::Relation(relation))
        })
    }

    /// Remove the member at `index` from a relation.
    pub fn remove_member(&mut self, relation: ObjectId, index: usize) -> Result<()> {
        self.ensure_live(ObjectRef::Relation(relation))?;
        let len = self.relations[&relation].members.len();
        if index >= len {
            return Err(Error::IndexOutOfBounds {
                target: ObjectRef::Relation(relation),
                index,
                len,
            });
        }
        self.with_group(Some("remove member"), |g| {
            g.apply(EditOp::RemoveMember { relation, index })?;
            g.bump_modify(ObjectRef::Relation(relation))
        })
    }

    // --- undo/redo ---

    /// Open an explicit undo group so several edits form one step. Nests.
    pub fn begin_group(&mut self) {
        self.log.begin_group();
    }

    /// Close the current undo group.
    pub fn end_group(&mut self) {
        self.log.end_group();
    }

    /// Name the open group; the first comment registered wins.
    pub fn register_comment(&mut self, comment: &str) {
        let _ = self.log.register_comment(comment);
    }

    /// Whether an undo step is available.
    pub fn can_undo(&self) -> bool {
        self.log.can_undo()
    }

    /// Whether a redo step is available.
    pub fn can_redo(&self) -> bool {
        self.log.can_redo()
    }

    /// Undo the most recent group. Returns its comment (possibly empty) or
    /// `None` when there was nothing to undo.
    pub fn undo(&mut self) -> Option<String> {
        let group = self.log.begin_undo()?;
        for op in group.ops().iter().rev() {
            if let Err(err) = self.apply(op.clone()) {
                tracing::warn!(%err, "undo replay skipped an inapplicable op");
            }
        }
        self.log.end_undo();
        Some(group.comment().unwrap_or("").to_owned())
    }

    /// Redo the most recently undone group. Mirror of [`Self::undo`].
    pub fn redo(&mut self) -> Option<String> {
        let group = self.log.begin_redo()?;
        for op in group.ops().iter().rev() {
            if let Err(err) = self.apply(op.clone()) {
                tracing::warn!(%err, "redo replay skipped an inapplicable op");
            }
        }
        self.log.end_redo();
        Some(group.comment().unwrap_or("").to_owned())
    }

    /// Discard the top redo entry without replaying it.
    pub fn remove_most_recent_redo(&mut self) {
        self.log.remove_most_recent_redo();
    }

    /// Read access to the transaction log (counts, comments, history).
    pub fn history(&self) -> &TransactionLog<EditOp> {
        &self.log
    }

    /// Drop all undo/redo history.
    pub fn clear_history(&mut self) {
        self.log.clear();
    }

    // --- eviction ---

    /// Drop unmodified, unreferenced objects last touched before `cutoff`
    /// and clear region coverage over the holes they leave. Locally
    /// modified or tombstoned objects are never evicted. Returns how many
    /// objects were dropped.
    pub fn evict_older_than(&mut self, cutoff: SystemTime) -> usize {
        // Paths and relations go first so node participation counts are
        // settled before nodes are considered.
        let protected = self.protected_containers();
        let removed = self
            .spatial
            .discard_older_than(cutoff, |r: &ObjectRef| match r {
                ObjectRef::Node(_) => true,
                other => protected.contains(other),
            });
        for r in &removed {
            self.drop_record(*r);
        }
        let mut count = removed.len();

        let keep_nodes = self.protected_nodes();
        let removed = self
            .spatial
            .discard_older_than(cutoff, |r: &ObjectRef| match r {
                ObjectRef::Node(_) => keep_nodes.contains(r),
                _ => true,
            });
        for r in &removed {
            self.drop_record(*r);
        }
        count += removed.len();
        if count > 0 {
            tracing::debug!(count, "evicted stale objects");
        }
        count
    }

    /// Drop roughly `fraction` of evictable objects, oldest first.
    pub fn evict_fraction(&mut self, fraction: f64) -> usize {
        let mut dates = Vec::new();
        self.spatial.for_each(|_, _, touched| dates.push(touched));
        if dates.is_empty() {
            return 0;
        }
        dates.sort();
        let k = ((dates.len() as f64) * fraction.clamp(0.0, 1.0)).ceil() as usize;
        if k == 0 {
            return 0;
        }
        let cutoff = if k < dates.len() {
            dates[k]
        } else {
            dates[k - 1] + std::time::Duration::from_nanos(1)
        };
        self.evict_older_than(cutoff)
    }

    /// Drop everything: objects, spatial state, history. Local identifier
    /// allocation continues where it left off.
    pub fn purge_all(&mut self) {
        self.nodes.clear();
        self.paths.clear();
        self.relations.clear();
        self.spatial.clear();
        self.log.clear();
    }

    /// The region tracker: what needs fetching to cover `rect`.
    pub fn rects_needed_to_cover(&mut self, rect: Rect) -> Vec<Rect> {
        self.spatial.rects_needed_to_cover(rect)
    }

    /// Whether `rect` is fully covered by fetched regions.
    pub fn covered(&self, rect: Rect) -> bool {
        self.spatial.covered(rect)
    }

    // --- the dispatcher ---

    /// Apply one edit op, registering its inverse with the open group and
    /// keeping the spatial index and cached bounding boxes synchronized.
    pub(crate) fn apply(&mut self, op: EditOp) -> Result<()> {
        match op {
            EditOp::Insert(snap) => {
                let target = snap.object_ref();
                self.register(EditOp::Purge(target));
                self.insert_record(snap);
                Ok(())
            }
            EditOp::Purge(target) => {
                let snap = self.take_record(target)?;
                self.register(EditOp::Insert(snap));
                Ok(())
            }
            EditOp::SetTags { target, tags } => {
                let core = self.core_mut(target)?;
                let prev = std::mem::replace(&mut core.tags, tags);
                self.register(EditOp::SetTags { target, tags: prev });
                Ok(())
            }
            EditOp::SetPosition { node, pos } => {
                let n = self
                    .nodes
                    .get_mut(&node)
                    .ok_or(Error::UnknownObject(ObjectRef::Node(node)))?;
                let prev = std::mem::replace(&mut n.pos, pos);
                self.register(EditOp::SetPosition { node, pos: prev });
                self.refresh_geometry(ObjectRef::Node(node));
                Ok(())
            }
            EditOp::InsertPathNode { path, index, node } => {
                let p = self
                    .paths
                    .get_mut(&path)
                    .ok_or(Error::UnknownObject(ObjectRef::Path(path)))?;
                if index > p.node_ids.len() {
                    return Err(Error::IndexOutOfBounds {
                        target: ObjectRef::Path(path),
                        index,
                        len: p.node_ids.len(),
                    });
                }
                p.node_ids.insert(index, node);
                let live = !p.core.deleted;
                if live && let Some(n) = self.nodes.get_mut(&node) {
                    n.path_count += 1;
                }
                self.register(EditOp::RemovePathNode { path, index });
                self.refresh_geometry(ObjectRef::Path(path));
                Ok(())
            }
            EditOp::RemovePathNode { path, index } => {
                let p = self
                    .paths
                    .get_mut(&path)
                    .ok_or(Error::UnknownObject(ObjectRef::Path(path)))?;
                if index >= p.node_ids.len() {
                    return Err(Error::IndexOutOfBounds {
                        target: ObjectRef::Path(path),
                        index,
                        len: p.node_ids.len(),
                    });
                }
                let node = p.node_ids.remove(index);
                let live = !p.core.deleted;
                if live && let Some(n) = self.nodes.get_mut(&node) {
                    n.path_count = n.path_count.saturating_sub(1);
                }
                self.register(EditOp::InsertPathNode { path, index, node });
                self.refresh_geometry(ObjectRef::Path(path));
                Ok(())
            }
            EditOp::InsertMember {
                relation,
                index,
                member,
            } => {
                let rel = self
                    .relations
                    .get_mut(&relation)
                    .ok_or(Error::UnknownObject(ObjectRef::Relation(relation)))?;
                if index > rel.members.len() {
                    return Err(Error::IndexOutOfBounds {
                        target: ObjectRef::Relation(relation),
                        index,
                        len: rel.members.len(),
                    });
                }
                rel.members.insert(index, member);
                self.register(EditOp::RemoveMember { relation, index });
                self.refresh_geometry(ObjectRef::Relation(relation));
                Ok(())
            }
            EditOp::RemoveMember { relation, index } => {
                let rel = self
                    .relations
                    .get_mut(&relation)
                    .ok_or(Error::UnknownObject(ObjectRef::Relation(relation)))?;
                if index >= rel.members.len() {
                    return Err(Error::IndexOutOfBounds {
                        target: ObjectRef::Relation(relation),
                        index,
                        len: rel.members.len(),
                    });
                }
                let member = rel.members.remove(index);
                self.register(EditOp::InsertMember {
                    relation,
                    index,
                    member,
                });
                self.refresh_geometry(ObjectRef::Relation(relation));
                Ok(())
            }
            EditOp::SetDeleted { target, deleted } => {
                let core = self.core_mut(target)?;
                let prev = core.deleted;
                core.deleted = deleted;
                let bbox = core.bbox;
                self.register(EditOp::SetDeleted {
                    target,
                    deleted: prev,
                });
                if prev != deleted {
                    if let Some(b) = bbox {
                        if deleted {
                            self.spatial.remove(target, b);
                        } else {
                            self.spatial.add(target, b);
                        }
                    }
                    self.adjust_counts_for_tombstone(target, deleted);
                }
                Ok(())
            }
            EditOp::SetModifyCount { target, count } => {
                let core = self.core_mut(target)?;
                let prev = core.modify_count;
                core.modify_count = count;
                self.register(EditOp::SetModifyCount {
                    target,
                    count: prev,
                });
                Ok(())
            }
        }
    }

    // --- internals ---

    fn alloc_id(&mut self) -> ObjectId {
        let id = self.next_local_id;
        self.next_local_id -= 1;
        id
    }

    pub(crate) fn with_group<T>(
        &mut self,
        comment: Option<&str>,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.log.begin_group();
        if let Some(c) = comment {
            let _ = self.log.register_comment(c);
        }
        let result = f(self);
        self.log.end_group();
        result
    }

    fn register(&mut self, op: EditOp) {
        self.log
            .register(op)
            .expect("a group is open for the duration of every mutation");
    }

    /// Bump the modify-count once per open group per target.
    pub(crate) fn bump_modify(&mut self, target: ObjectRef) -> Result<()> {
        let already = self.log.pending_ops().iter().any(
            |op| matches!(op, EditOp::SetModifyCount { target: t, .. } if *t == target),
        );
        if already {
            return Ok(());
        }
        let count = self.core(target)?.modify_count + 1;
        self.apply(EditOp::SetModifyCount { target, count })
    }

    pub(crate) fn exists(&self, target: ObjectRef) -> bool {
        match target {
            ObjectRef::Node(id) => self.nodes.contains_key(&id),
            ObjectRef::Path(id) => self.paths.contains_key(&id),
            ObjectRef::Relation(id) => self.relations.contains_key(&id),
        }
    }

    pub(crate) fn is_live(&self, target: ObjectRef) -> bool {
        self.core(target).map(|c| !c.deleted).unwrap_or(false)
    }

    fn ensure_live(&self, target: ObjectRef) -> Result<()> {
        let core = self.core(target)?;
        if core.deleted {
            return Err(Error::Deleted(target));
        }
        Ok(())
    }

    pub(crate) fn core(&self, target: ObjectRef) -> Result<&ObjectCore> {
        match target {
            ObjectRef::Node(id) => self.nodes.get(&id).map(|n| &n.core),
            ObjectRef::Path(id) => self.paths.get(&id).map(|p| &p.core),
            ObjectRef::Relation(id) => self.relations.get(&id).map(|r| &r.core),
        }
        .ok_or(Error::UnknownObject(target))
    }

    pub(crate) fn core_mut(&mut self, target: ObjectRef) -> Result<&mut ObjectCore> {
        match target {
            ObjectRef::Node(id) => self.nodes.get_mut(&id).map(|n| &mut n.core),
            ObjectRef::Path(id) => self.paths.get_mut(&id).map(|p| &mut p.core),
            ObjectRef::Relation(id) => self.relations.get_mut(&id).map(|r| &mut r.core),
        }
        .ok_or(Error::UnknownObject(target))
    }

    fn all_cores(&self) -> impl Iterator<Item = &ObjectCore> {
        self.nodes
            .values()
            .map(|n| &n.core)
            .chain(self.paths.values().map(|p| &p.core))
            .chain(self.relations.values().map(|r| &r.core))
    }

    fn first_referrer(&self, target: ObjectRef) -> Option<ObjectRef> {
        if let ObjectRef::Node(id) = target
            && let Some(pid) = self
                .paths
                .iter()
                .find(|(_, p)| !p.core.deleted && p.node_ids.contains(&id))
                .map(|(pid, _)| *pid)
        {
            return Some(ObjectRef::Path(pid));
        }
        self.relations
            .iter()
            .find(|(_, rel)| !rel.core.deleted && rel.contains_ref(target))
            .map(|(rid, _)| ObjectRef::Relation(*rid))
    }

    /// Install a record, rebuild its derived state, and index it.
    pub(crate) fn insert_record(&mut self, snap: ObjectSnapshot) {
        let target = snap.object_ref();
        match snap {
            ObjectSnapshot::Node(mut n) => {
                n.core.bbox = None;
                n.path_count = 0;
                let id = n.core.id;
                self.nodes.insert(id, n);
                self.recount_node(id);
            }
            ObjectSnapshot::Path(mut p) => {
                p.core.bbox = None;
                let id = p.core.id;
                let live = !p.core.deleted;
                let node_ids = p.node_ids.clone();
                self.paths.insert(id, p);
                if live {
                    for nid in node_ids {
                        if let Some(n) = self.nodes.get_mut(&nid) {
                            n.path_count += 1;
                        }
                    }
                }
            }
            ObjectSnapshot::Relation(mut r) => {
                r.core.bbox = None;
                self.relations.insert(r.core.id, r);
            }
        }
        self.refresh_geometry(target);
    }

    /// Remove a record entirely, unindexing it and settling counts.
    pub(crate) fn take_record(&mut self, target: ObjectRef) -> Result<ObjectSnapshot> {
        let live = self.is_live(target);
        let bbox = self.cached_bbox(target);
        let snap = match target {
            ObjectRef::Node(id) => self
                .nodes
                .remove(&id)
                .map(ObjectSnapshot::Node)
                .ok_or(Error::UnknownObject(target))?,
            ObjectRef::Path(id) => {
                let p = self.paths.remove(&id).ok_or(Error::UnknownObject(target))?;
                if !p.core.deleted {
                    for nid in &p.node_ids {
                        if let Some(n) = self.nodes.get_mut(nid) {
                            n.path_count = n.path_count.saturating_sub(1);
                        }
                    }
                }
                ObjectSnapshot::Path(p)
            }
            ObjectRef::Relation(id) => self
                .relations
                .remove(&id)
                .map(ObjectSnapshot::Relation)
                .ok_or(Error::UnknownObject(target))?,
        };
        if live && let Some(b) = bbox {
            self.spatial.remove(target, b);
        }
        Ok(snap)
    }

    /// Remove a record that eviction already unindexed.
    fn drop_record(&mut self, target: ObjectRef) {
        match target {
            ObjectRef::Node(id) => {
                self.nodes.remove(&id);
            }
            ObjectRef::Path(id) => {
                if let Some(p) = self.paths.remove(&id)
                    && !p.core.deleted
                {
                    for nid in &p.node_ids {
                        if let Some(n) = self.nodes.get_mut(nid) {
                            n.path_count = n.path_count.saturating_sub(1);
                        }
                    }
                }
            }
            ObjectRef::Relation(id) => {
                self.relations.remove(&id);
            }
        }
    }

    fn recount_node(&mut self, id: ObjectId) {
        let count = self
            .paths
            .values()
            .filter(|p| !p.core.deleted)
            .flat_map(|p| p.node_ids.iter())
            .filter(|nid| **nid == id)
            .count();
        if let Some(n) = self.nodes.get_mut(&id) {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "participation counts are far below u32::MAX"
            )]
            {
                n.path_count = count as u32;
            }
        }
    }

    fn adjust_counts_for_tombstone(&mut self, target: ObjectRef, deleted: bool) {
        if let ObjectRef::Path(id) = target {
            let node_ids = match self.paths.get(&id) {
                Some(p) => p.node_ids.clone(),
                None => return,
            };
            for nid in node_ids {
                if let Some(n) = self.nodes.get_mut(&nid) {
                    if deleted {
                        n.path_count = n.path_count.saturating_sub(1);
                    } else {
                        n.path_count += 1;
                    }
                }
            }
        }
    }

    pub(crate) fn cached_bbox(&self, target: ObjectRef) -> Option<Rect> {
        self.core(target).ok().and_then(|c| c.bbox)
    }

    /// Fresh bbox from leaf data, with a cycle guard for relations that
    /// reference relations.
    pub(crate) fn compute_bbox(&self, target: ObjectRef) -> Option<Rect> {
        let mut visited = BTreeSet::new();
        self.compute_bbox_inner(target, &mut visited)
    }

    fn compute_bbox_inner(&self, target: ObjectRef, visited: &mut BTreeSet<ObjectRef>) -> Option<Rect> {
        if !visited.insert(target) {
            return None;
        }
        match target {
            ObjectRef::Node(id) => self.nodes.get(&id).map(|n| Rect::from_points(n.pos, n.pos)),
            ObjectRef::Path(id) => {
                let p = self.paths.get(&id)?;
                let mut rect: Option<Rect> = None;
                for nid in &p.node_ids {
                    if let Some(n) = self.nodes.get(nid) {
                        let r = Rect::from_points(n.pos, n.pos);
                        rect = Some(match rect {
                            Some(acc) => acc.union(r),
                            None => r,
                        });
                    }
                }
                rect
            }
            ObjectRef::Relation(id) => {
                let rel = self.relations.get(&id)?;
                let mut rect: Option<Rect> = None;
                for m in &rel.members {
                    if let Some(r) = self.compute_bbox_inner(m.object_ref(), visited) {
                        rect = Some(match rect {
                            Some(acc) => acc.union(r),
                            None => r,
                        });
                    }
                }
                rect
            }
        }
    }

    /// Recompute the bbox of `start` and everything that transitively
    /// contains it, moving spatial index entries whose boxes changed.
    pub(crate) fn refresh_geometry(&mut self, start: ObjectRef) {
        let mut stack = vec![start];
        let mut seen = BTreeSet::new();
        while let Some(target) = stack.pop() {
            if !seen.insert(target) {
                continue;
            }
            if !self.exists(target) {
                continue;
            }
            let old = self.cached_bbox(target);
            let fresh = self.compute_bbox(target);
            let live = self.is_live(target);
            if let Ok(core) = self.core_mut(target) {
                core.bbox = fresh;
            }
            if live {
                match (old, fresh) {
                    (Some(o), Some(n)) if o != n => {
                        self.spatial.update(target, o, n);
                    }
                    (None, Some(n)) => {
                        self.spatial.add(target, n);
                    }
                    (Some(o), None) => {
                        self.spatial.remove(target, o);
                    }
                    _ => {}
                }
            }
            if let ObjectRef::Node(id) = target {
                for (pid, p) in &self.paths {
                    if p.node_ids.contains(&id) {
                        stack.push(ObjectRef::Path(*pid));
                    }
                }
            }
            for (rid, rel) in &self.relations {
                if rel.contains_ref(target) {
                    stack.push(ObjectRef::Relation(*rid));
                }
            }
        }
    }

    /// Paths and relations that must survive eviction: locally modified, or
    /// referenced by any live relation.
    fn protected_containers(&self) -> BTreeSet<ObjectRef> {
        let mut out = BTreeSet::new();
        for (id, p) in &self.paths {
            if p.core.is_modified() {
                out.insert(ObjectRef::Path(*id));
            }
        }
        for (id, r) in &self.relations {
            if r.core.is_modified() {
                out.insert(ObjectRef::Relation(*id));
            }
        }
        for rel in self.relations.values() {
            if rel.core.deleted {
                continue;
            }
            for m in &rel.members {
                match m.kind {
                    crate::object::MemberKind::Node => {}
                    _ => {
                        out.insert(m.object_ref());
                    }
                }
            }
        }
        out
    }

    /// Nodes that must survive eviction: modified, still participating in a
    /// path, or referenced by a live relation.
    fn protected_nodes(&self) -> BTreeSet<ObjectRef> {
        let mut out = BTreeSet::new();
        for (id, n) in &self.nodes {
            if n.core.is_modified() || n.path_count > 0 {
                out.insert(ObjectRef::Node(*id));
            }
        }
        for rel in self.relations.values() {
            if rel.core.deleted {
                continue;
            }
            for m in &rel.members {
                if m.kind == crate::object::MemberKind::Node {
                    out.insert(m.object_ref());
                }
            }
        }
        out
    }
}
