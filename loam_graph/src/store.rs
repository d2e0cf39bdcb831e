// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Binary persistence for the whole editor core.
//!
//! The graph, its spatial index, and the transaction log round-trip through
//! one bincode body behind a magic tag and a format version. Anything that
//! fails to decode — wrong magic, wrong version, truncation, garbage — is
//! [`Error::CorruptPersistedState`]: the caller discards the store and
//! starts fresh rather than loading partial state.

use std::io::{Read, Write};

use crate::error::{Error, Result};
use crate::graph::ObjectGraph;
use crate::op::EditOp;

const MAGIC: &[u8; 4] = b"LOAM";
const FORMAT_VERSION: u16 = 1;

impl ObjectGraph {
    /// Serialize the graph, spatial index, and undo history.
    ///
    /// Must be called between groups and outside replay; history written
    /// mid-transaction would not replay meaningfully.
    pub fn save(&self, mut w: impl Write) -> Result<()> {
        debug_assert!(
            !self.log.is_grouping(),
            "saving while an undo group is open"
        );
        w.write_all(MAGIC)?;
        w.write_all(&FORMAT_VERSION.to_le_bytes())?;
        bincode::serialize_into(&mut w, self).map_err(|e| Error::Io(std::io::Error::other(e)))?;
        Ok(())
    }

    /// Restore a previously saved graph.
    ///
    /// Rejects on any mismatch or decode failure, and on a store whose
    /// contents fail the consistency check — a corrupt store is discarded,
    /// never partially loaded.
    pub fn load(mut r: impl Read) -> Result<Self> {
        let corrupt = |what: &str| Error::CorruptPersistedState(what.to_owned());

        let mut magic = [0_u8; 4];
        r.read_exact(&mut magic)
            .map_err(|_| corrupt("truncated header"))?;
        if &magic != MAGIC {
            return Err(corrupt("bad magic"));
        }
        let mut version = [0_u8; 2];
        r.read_exact(&mut version)
            .map_err(|_| corrupt("truncated header"))?;
        if u16::from_le_bytes(version) != FORMAT_VERSION {
            return Err(Error::CorruptPersistedState(format!(
                "unsupported format version {}",
                u16::from_le_bytes(version)
            )));
        }

        let mut graph: Self = bincode::deserialize_from(&mut r)
            .map_err(|e| Error::CorruptPersistedState(e.to_string()))?;
        graph.log.set_coalesce(EditOp::coalesces);

        let violations = graph.consistency_check();
        if !violations.is_empty() {
            tracing::warn!(
                count = violations.len(),
                "persisted store fails consistency; discarding"
            );
            return Err(Error::CorruptPersistedState(format!(
                "{} consistency violations",
                violations.len()
            )));
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectRef;
    use kurbo::{Point, Rect};

    fn sample_graph() -> ObjectGraph {
        let mut g = ObjectGraph::new();
        let n1 = g.create_node(Point::new(0.0, 0.0));
        let n2 = g.create_node(Point::new(1.0, 0.0));
        let p = g.create_path();
        g.add_node_to_path(p, 0, n1).unwrap();
        g.add_node_to_path(p, 1, n2).unwrap();
        let mut tags = crate::tags::Tags::new();
        tags.insert("highway".into(), "residential".into());
        g.set_tags(ObjectRef::Path(p), tags).unwrap();
        g.move_node(n2, Point::new(1.0, 0.5)).unwrap();
        g.undo();
        g
    }

    #[test]
    fn save_load_round_trip() {
        let g = sample_graph();
        let mut buf = Vec::new();
        g.save(&mut buf).unwrap();

        let restored = ObjectGraph::load(buf.as_slice()).unwrap();
        assert_eq!(restored.node_count(), g.node_count());
        assert_eq!(restored.path_count(), g.path_count());
        assert_eq!(restored.history().undo_count(), g.history().undo_count());
        assert_eq!(restored.history().redo_count(), 1, "undo history survives");

        // Spatial queries answer identically.
        let view = Rect::new(-0.5, -0.5, 1.5, 1.5);
        let mut before = Vec::new();
        g.query(view, |r| before.push(*r));
        let mut after = Vec::new();
        restored.query(view, |r| after.push(*r));
        before.sort();
        after.sort();
        assert_eq!(before, after);

        // And the restored log still replays.
        let mut restored = restored;
        assert!(restored.redo().is_some());
        assert!(restored.consistency_check().is_empty());
    }

    #[test]
    fn load_rejects_bad_magic() {
        let g = sample_graph();
        let mut buf = Vec::new();
        g.save(&mut buf).unwrap();
        buf[0] = b'X';
        match ObjectGraph::load(buf.as_slice()) {
            Err(Error::CorruptPersistedState(_)) => {}
            other => panic!("expected corrupt-store rejection, got {other:?}"),
        }
    }

    #[test]
    fn load_rejects_unsupported_version() {
        let g = sample_graph();
        let mut buf = Vec::new();
        g.save(&mut buf).unwrap();
        buf[4] = 0xFF;
        buf[5] = 0xFF;
        assert!(matches!(
            ObjectGraph::load(buf.as_slice()),
            Err(Error::CorruptPersistedState(_))
        ));
    }

    #[test]
    fn load_rejects_truncated_body() {
        let g = sample_graph();
        let mut buf = Vec::new();
        g.save(&mut buf).unwrap();
        buf.truncate(buf.len() / 2);
        assert!(matches!(
            ObjectGraph::load(buf.as_slice()),
            Err(Error::CorruptPersistedState(_))
        ));
    }

    #[test]
    fn load_rejects_garbage() {
        let garbage = vec![0xAB_u8; 64];
        assert!(matches!(
            ObjectGraph::load(garbage.as_slice()),
            Err(Error::CorruptPersistedState(_))
        ));
    }
}
