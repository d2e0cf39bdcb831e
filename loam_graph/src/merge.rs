// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Server reconciliation: merging fetched regions and applying upload
//! confirmations.

use kurbo::Rect;

use crate::error::{Error, Result};
use crate::graph::ObjectGraph;
use crate::object::{MemberKind, ObjectRef, ObjectSnapshot, ServerMeta};

impl ObjectGraph {
    /// Merge a batch of fully parsed server objects fetched for `rect`.
    ///
    /// Policy per object:
    /// - not present locally → inserted as-is;
    /// - present and unmodified (`modify_count == 0`) → replaced outright,
    ///   the server is authoritative for unmodified data;
    /// - present and locally modified → only the authoritative fields
    ///   (version, changeset) are absorbed; local tags, geometry, and
    ///   tombstones survive. The conflict, if any, surfaces at upload time
    ///   as a version mismatch — never here.
    ///
    /// Merging is not a local edit: nothing is recorded in the undo log.
    /// Afterwards the region tracker is told the fetch outcome, so a failed
    /// or cancelled fetch (`success = false`) clears the busy flag without
    /// marking anything whole.
    pub fn merge_server_region(
        &mut self,
        objects: Vec<ObjectSnapshot>,
        rect: Rect,
        success: bool,
    ) {
        let mut added = 0_usize;
        let mut replaced = 0_usize;
        let mut absorbed = 0_usize;

        // Nodes first so paths arriving in the same batch resolve and count
        // their nodes; relations last for the same reason.
        let mut batch = objects;
        batch.sort_by_key(|snap| match snap.object_ref().kind() {
            MemberKind::Node => 0_u8,
            MemberKind::Path => 1,
            MemberKind::Relation => 2,
        });

        for snap in batch {
            let target = snap.object_ref();
            if !self.exists(target) {
                self.insert_record(snap);
                added += 1;
            } else if self.core(target).map(|c| c.modify_count == 0).unwrap_or(false) {
                self.replace_record(snap);
                replaced += 1;
            } else {
                self.absorb_meta(target, snap.core().meta.clone());
                absorbed += 1;
            }
        }
        tracing::debug!(added, replaced, absorbed, success, ?rect, "merged server region");
        self.spatial.merge_fetched_region(rect, success);
    }

    /// All objects the upload collaborator must push: locally modified
    /// objects, and tombstones that exist server-side. Locally created
    /// objects that were deleted again never upload.
    pub fn changed_objects(&self) -> Vec<ObjectRef> {
        let mut out = Vec::new();
        for (id, n) in &self.nodes {
            push_changed(&mut out, ObjectRef::Node(*id), &n.core);
        }
        for (id, p) in &self.paths {
            push_changed(&mut out, ObjectRef::Path(*id), &p.core);
        }
        for (id, r) in &self.relations {
            push_changed(&mut out, ObjectRef::Relation(*id), &r.core);
        }
        out
    }

    /// Check that local edits to `target` are based on the version the
    /// server currently holds. Called by the uploader before building a
    /// changeset; a mismatch is reported, never resolved automatically.
    pub fn assert_fresh(&self, target: ObjectRef, server_version: i32) -> Result<()> {
        let core = self.core(target)?;
        let local = core.meta.as_ref().map(|m| m.version).unwrap_or(0);
        if local != server_version {
            return Err(Error::VersionConflict {
                target,
                local,
                server: server_version,
            });
        }
        Ok(())
    }

    /// Apply a post-upload confirmation: new version and changeset, a
    /// server-assigned identifier for locally created objects, and a reset
    /// modify-count. Renumbering rewrites every reference to the old
    /// identifier. The undo history is cleared — logged groups may name the
    /// old identity and replaying them against the server-assigned one
    /// would corrupt sync state.
    pub fn server_update(
        &mut self,
        target: ObjectRef,
        version: i32,
        changeset: i64,
        new_id: Option<i64>,
    ) -> Result<()> {
        let core = self.core_mut(target)?;
        match &mut core.meta {
            Some(meta) => {
                meta.version = version;
                meta.changeset = changeset;
            }
            None => core.meta = Some(ServerMeta::bare(version, changeset)),
        }
        core.modify_count = 0;

        if let Some(new_id) = new_id
            && new_id != target.id()
        {
            self.renumber(target, new_id)?;
        }
        self.log.clear();
        Ok(())
    }

    /// Purge a tombstone whose deletion the server confirmed.
    pub fn server_confirm_delete(&mut self, target: ObjectRef) -> Result<()> {
        let core = self.core(target)?;
        debug_assert!(core.deleted, "confirming deletion of a live object");
        let bbox = core.bbox;
        let deleted = core.deleted;
        match target {
            ObjectRef::Node(id) => {
                self.nodes.remove(&id);
            }
            ObjectRef::Path(id) => {
                self.paths.remove(&id);
            }
            ObjectRef::Relation(id) => {
                self.relations.remove(&id);
            }
        }
        if !deleted && let Some(b) = bbox {
            self.spatial.remove(target, b);
        }
        self.log.clear();
        Ok(())
    }

    fn absorb_meta(&mut self, target: ObjectRef, server: Option<ServerMeta>) {
        let Some(server) = server else { return };
        if let Ok(core) = self.core_mut(target) {
            match &mut core.meta {
                Some(meta) => {
                    meta.version = server.version;
                    meta.changeset = server.changeset;
                }
                None => core.meta = Some(server),
            }
        }
    }

    /// Replace an unmodified object with the server's version.
    fn replace_record(&mut self, snap: ObjectSnapshot) {
        let target = snap.object_ref();
        if let Ok(removed) = self.take_record(target) {
            debug_assert_eq!(removed.object_ref(), target);
        }
        self.insert_record(snap);
    }

    fn renumber(&mut self, old: ObjectRef, new_id: i64) -> Result<()> {
        let snap = self.take_record(old)?;
        let snap = match snap {
            ObjectSnapshot::Node(mut n) => {
                n.core.id = new_id;
                ObjectSnapshot::Node(n)
            }
            ObjectSnapshot::Path(mut p) => {
                p.core.id = new_id;
                ObjectSnapshot::Path(p)
            }
            ObjectSnapshot::Relation(mut r) => {
                r.core.id = new_id;
                ObjectSnapshot::Relation(r)
            }
        };
        // Rewrite references before reinserting so participation counts and
        // parent bboxes settle against the new identifier.
        if let ObjectRef::Node(old_id) = old {
            for p in self.paths.values_mut() {
                for nid in &mut p.node_ids {
                    if *nid == old_id {
                        *nid = new_id;
                    }
                }
            }
        }
        for rel in self.relations.values_mut() {
            for m in &mut rel.members {
                if m.kind == old.kind() && m.id == old.id() {
                    m.id = new_id;
                }
            }
        }
        self.insert_record(snap);
        Ok(())
    }
}

fn push_changed(out: &mut Vec<ObjectRef>, target: ObjectRef, core: &crate::object::ObjectCore) {
    if core.deleted {
        if target.id() > 0 {
            out.push(target);
        }
    } else if core.modify_count != 0 {
        out.push(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Node, ObjectCore, Path};
    use kurbo::Point;

    fn server_node(id: i64, pos: Point, version: i32) -> ObjectSnapshot {
        let mut core = ObjectCore::local(id);
        core.meta = Some(ServerMeta::bare(version, 100));
        ObjectSnapshot::Node(Node {
            core,
            pos,
            path_count: 0,
        })
    }

    fn server_path(id: i64, node_ids: Vec<i64>, version: i32) -> ObjectSnapshot {
        let mut core = ObjectCore::local(id);
        core.meta = Some(ServerMeta::bare(version, 100));
        ObjectSnapshot::Path(Path { core, node_ids })
    }

    fn fetch_rect() -> Rect {
        Rect::new(0.0, 0.0, 1.0, 1.0)
    }

    #[test]
    fn merge_inserts_and_indexes_fetched_objects() {
        let mut g = ObjectGraph::new();
        let rect = fetch_rect();
        let pieces = g.rects_needed_to_cover(rect);
        g.merge_server_region(
            vec![
                server_node(1, Point::new(0.2, 0.2), 1),
                server_node(2, Point::new(0.4, 0.4), 1),
                server_path(10, vec![1, 2], 1),
            ],
            pieces[0],
            true,
        );
        for piece in &pieces[1..] {
            g.merge_server_region(Vec::new(), *piece, true);
        }
        assert!(g.covered(rect));
        assert_eq!(g.node_count(), 2);
        assert_eq!(g.path_count(), 1);
        assert_eq!(g.node(1).unwrap().path_count(), 1);

        let mut hits = Vec::new();
        g.query(rect, |r| hits.push(*r));
        assert!(hits.contains(&ObjectRef::Path(10)));
        assert!(hits.contains(&ObjectRef::Node(1)));
    }

    #[test]
    fn merge_replaces_unmodified_and_preserves_local_edits() {
        let mut g = ObjectGraph::new();
        let rect = fetch_rect();
        let pieces = g.rects_needed_to_cover(rect);
        g.merge_server_region(
            vec![
                server_node(1, Point::new(0.2, 0.2), 1),
                server_node(2, Point::new(0.4, 0.4), 1),
            ],
            pieces[0],
            true,
        );
        for piece in &pieces[1..] {
            g.merge_server_region(Vec::new(), *piece, true);
        }

        // Local edit on node 1.
        let mut tags = crate::tags::Tags::new();
        tags.insert("name".into(), "local cafe".into());
        g.set_tags(ObjectRef::Node(1), tags).unwrap();
        assert!(g.node(1).unwrap().core.is_modified());

        // Server re-sends the region: node 1 got new server tags and
        // version, node 2 moved.
        let mut snap1 = server_node(1, Point::new(0.21, 0.21), 2);
        if let ObjectSnapshot::Node(n) = &mut snap1 {
            n.core.tags.insert("name".into(), "server cafe".into());
        }
        assert!(
            g.rects_needed_to_cover(rect).is_empty(),
            "region is already whole"
        );
        g.merge_server_region(
            vec![snap1, server_node(2, Point::new(0.5, 0.5), 2)],
            pieces[0],
            true,
        );

        // The local edit survived; the authoritative version was absorbed.
        let n1 = g.node(1).unwrap();
        assert_eq!(n1.core.tags.get("name").map(String::as_str), Some("local cafe"));
        assert_eq!(n1.core.meta.as_ref().unwrap().version, 2);
        assert_eq!(n1.pos, Point::new(0.2, 0.2), "modified geometry is kept");

        // The unmodified node reflects the server's new data.
        assert_eq!(g.node(2).unwrap().pos, Point::new(0.5, 0.5));
        assert_eq!(g.node(2).unwrap().core.meta.as_ref().unwrap().version, 2);
    }

    #[test]
    fn changed_objects_reports_edits_and_server_tombstones() {
        let mut g = ObjectGraph::new();
        let pieces = g.rects_needed_to_cover(fetch_rect());
        g.merge_server_region(
            vec![
                server_node(1, Point::new(0.2, 0.2), 1),
                server_node(2, Point::new(0.4, 0.4), 1),
            ],
            pieces[0],
            true,
        );
        assert!(g.changed_objects().is_empty());

        g.move_node(1, Point::new(0.3, 0.3)).unwrap();
        g.delete(ObjectRef::Node(2)).unwrap();
        // A local create+delete pair has nothing to upload.
        let scratch = g.create_node(Point::new(0.9, 0.9));
        g.delete(ObjectRef::Node(scratch)).unwrap();

        let changed = g.changed_objects();
        assert!(changed.contains(&ObjectRef::Node(1)));
        assert!(changed.contains(&ObjectRef::Node(2)), "server tombstone uploads");
        assert!(!changed.contains(&ObjectRef::Node(scratch)));
    }

    #[test]
    fn server_update_renumbers_references_and_resets_state() {
        let mut g = ObjectGraph::new();
        let n1 = g.create_node(Point::new(0.1, 0.1));
        let n2 = g.create_node(Point::new(0.2, 0.2));
        let p = g.create_path();
        g.add_node_to_path(p, 0, n1).unwrap();
        g.add_node_to_path(p, 1, n2).unwrap();
        assert!(n1 < 0);

        g.server_update(ObjectRef::Node(n1), 1, 500, Some(9001)).unwrap();

        assert!(g.node(n1).is_none());
        let renumbered = g.node(9001).unwrap();
        assert_eq!(renumbered.core.modify_count, 0);
        assert_eq!(renumbered.core.meta.as_ref().unwrap().version, 1);
        assert_eq!(renumbered.path_count(), 1);
        assert_eq!(g.path(p).unwrap().node_ids, vec![9001, n2]);
        assert!(!g.can_undo(), "history is cleared on upload confirmation");
    }

    #[test]
    fn confirmed_delete_purges_the_tombstone() {
        let mut g = ObjectGraph::new();
        let pieces = g.rects_needed_to_cover(fetch_rect());
        g.merge_server_region(vec![server_node(1, Point::new(0.2, 0.2), 1)], pieces[0], true);
        g.delete(ObjectRef::Node(1)).unwrap();
        assert_eq!(g.changed_objects(), vec![ObjectRef::Node(1)]);

        g.server_confirm_delete(ObjectRef::Node(1)).unwrap();
        assert!(g.node(1).is_none());
        assert!(g.changed_objects().is_empty());
    }

    #[test]
    fn assert_fresh_detects_version_conflicts() {
        let mut g = ObjectGraph::new();
        let pieces = g.rects_needed_to_cover(fetch_rect());
        g.merge_server_region(vec![server_node(1, Point::new(0.2, 0.2), 3)], pieces[0], true);
        assert!(g.assert_fresh(ObjectRef::Node(1), 3).is_ok());
        let err = g.assert_fresh(ObjectRef::Node(1), 4).unwrap_err();
        assert!(matches!(err, Error::VersionConflict { local: 3, server: 4, .. }));
    }

    #[test]
    fn failed_merge_leaves_region_fetchable() {
        let mut g = ObjectGraph::new();
        let rect = fetch_rect();
        let pieces = g.rects_needed_to_cover(rect);
        for piece in &pieces {
            g.merge_server_region(Vec::new(), *piece, false);
        }
        assert!(!g.covered(rect));
        let retry = g.rects_needed_to_cover(rect);
        assert_eq!(retry, pieces);
    }
}
