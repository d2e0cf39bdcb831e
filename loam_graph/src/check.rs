// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Whole-graph consistency checking.
//!
//! Violations are reported and logged, never repaired: silent repair could
//! mask data loss.

use core::fmt;

use loam_quad::Discrepancy;

use crate::graph::ObjectGraph;
use crate::object::{ObjectId, ObjectRef};

/// One violation found by [`ObjectGraph::consistency_check`].
#[derive(Clone, Debug, PartialEq)]
pub enum Violation {
    /// A live path references a node that is missing or tombstoned.
    DanglingPathNode {
        /// The referencing path.
        path: ObjectId,
        /// The missing or deleted node.
        node: ObjectId,
    },
    /// A node's cached participation count disagrees with the live paths.
    PathCountMismatch {
        /// The node in question.
        node: ObjectId,
        /// Count stored on the node.
        stored: u32,
        /// Count recomputed from the path collection.
        actual: u32,
    },
    /// A live object with a bounding box is missing from the spatial index.
    NotIndexed {
        /// The unindexed object.
        target: ObjectRef,
    },
    /// The spatial index holds an object that is dead or unknown.
    IndexedButDead {
        /// The stale index entry.
        target: ObjectRef,
    },
    /// The spatial index holds more than one entry for an object.
    DuplicateIndexEntry {
        /// The duplicated entry.
        target: ObjectRef,
        /// How many entries were found.
        count: usize,
    },
    /// A structural problem inside the spatial index itself.
    Spatial(Discrepancy<ObjectRef>),
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DanglingPathNode { path, node } => {
                write!(f, "path {path} references missing or deleted node {node}")
            }
            Self::PathCountMismatch {
                node,
                stored,
                actual,
            } => write!(
                f,
                "node {node} stores participation count {stored}, paths say {actual}"
            ),
            Self::NotIndexed { target } => write!(f, "{target:?} is live but not indexed"),
            Self::IndexedButDead { target } => {
                write!(f, "{target:?} is indexed but dead or unknown")
            }
            Self::DuplicateIndexEntry { target, count } => {
                write!(f, "{target:?} appears {count} times in the spatial index")
            }
            Self::Spatial(d) => write!(f, "spatial index: {d}"),
        }
    }
}

impl ObjectGraph {
    /// Validate referential integrity, participation counts, and the
    /// two-way correspondence between the live object set and the spatial
    /// index, then delegate tree-structure and bbox checks to the index.
    ///
    /// Every violation is logged at warn level and returned. Relation
    /// members are allowed to be unresolved (fetched lazily), so a missing
    /// member target is not a violation; a missing path node is.
    pub fn consistency_check(&self) -> Vec<Violation> {
        let mut out = Vec::new();

        for (pid, p) in &self.paths {
            if p.core.deleted {
                continue;
            }
            for nid in &p.node_ids {
                let live = self.nodes.get(nid).is_some_and(|n| !n.core.deleted);
                if !live {
                    out.push(Violation::DanglingPathNode {
                        path: *pid,
                        node: *nid,
                    });
                }
            }
        }

        for (nid, node) in &self.nodes {
            let actual = self
                .paths
                .values()
                .filter(|p| !p.core.deleted)
                .flat_map(|p| p.node_ids.iter())
                .filter(|id| *id == nid)
                .count();
            #[allow(
                clippy::cast_possible_truncation,
                reason = "participation counts are far below u32::MAX"
            )]
            let actual = actual as u32;
            if node.path_count() != actual {
                out.push(Violation::PathCountMismatch {
                    node: *nid,
                    stored: node.path_count(),
                    actual,
                });
            }
        }

        // Index membership must match the live, boxed object set exactly.
        let mut indexed = std::collections::BTreeMap::new();
        self.spatial.for_each(|r, _, _| {
            *indexed.entry(*r).or_insert(0_usize) += 1;
        });
        for (target, count) in &indexed {
            if !self.is_live(*target) {
                out.push(Violation::IndexedButDead { target: *target });
            } else if *count > 1 {
                out.push(Violation::DuplicateIndexEntry {
                    target: *target,
                    count: *count,
                });
            }
        }
        for target in self.live_refs() {
            if self.cached_bbox(target).is_some() && !indexed.contains_key(&target) {
                out.push(Violation::NotIndexed { target });
            }
        }

        out.extend(
            self.spatial
                .consistency_check(|r| self.cached_bbox(*r))
                .into_iter()
                .map(Violation::Spatial),
        );

        for v in &out {
            tracing::warn!(%v, "consistency violation");
        }
        out
    }

    fn live_refs(&self) -> Vec<ObjectRef> {
        let mut out = Vec::new();
        for (id, n) in &self.nodes {
            if !n.core.deleted {
                out.push(ObjectRef::Node(*id));
            }
        }
        for (id, p) in &self.paths {
            if !p.core.deleted {
                out.push(ObjectRef::Path(*id));
            }
        }
        for (id, r) in &self.relations {
            if !r.core.deleted {
                out.push(ObjectRef::Relation(*id));
            }
        }
        out
    }
}
