// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Loam Graph: an undo-aware editable graph of geographic entities.
//!
//! The graph owns the authoritative collections of [`Node`], [`Path`]
//! ("way"), and [`Relation`] records keyed by stable identifier, and ties
//! together the two other pieces of the editor core:
//!
//! - every mutation entry point funnels through one dispatcher that records
//!   the inverse operation with a [`loam_undo::TransactionLog`], so
//!   arbitrary edits group into named, replayable undo steps;
//! - the same dispatcher keeps a [`loam_quad::SpatialIndex`] synchronized
//!   with the live object set, so bounding-box queries and region tracking
//!   never drift from the data.
//!
//! Cross-references are integer identifiers resolved through the owning
//! collections (never pointers), and "which relations mention me" is
//! recomputed from the authoritative membership rather than stored as
//! reverse links.
//!
//! Background fetches reconcile through
//! [`ObjectGraph::merge_server_region`]: unmodified objects are replaced by
//! the server's version, locally modified ones keep their edits and absorb
//! only the authoritative version fields. Conflicts surface at upload time
//! ([`ObjectGraph::assert_fresh`]), never during merge.
//!
//! The whole core — graph, index, history — persists to a local binary
//! store ([`ObjectGraph::save`] / [`ObjectGraph::load`]); a store that
//! fails to decode or validate is rejected so the caller can start fresh.
//!
//! # Concurrency
//!
//! Single-writer: all mutation must be serialized onto one logical
//! execution context. Fetches run elsewhere and hand their parsed results
//! to the writer; queries for rendering may not overlap mutation.
//!
//! # Example
//!
//! ```rust
//! use kurbo::{Point, Rect};
//! use loam_graph::{ObjectGraph, ObjectRef};
//!
//! let mut graph = ObjectGraph::new();
//!
//! // Draw a short path.
//! let a = graph.create_node(Point::new(0.0, 0.0));
//! let b = graph.create_node(Point::new(1.0, 0.0));
//! let path = graph.create_path();
//! graph.add_node_to_path(path, 0, a).unwrap();
//! graph.add_node_to_path(path, 1, b).unwrap();
//!
//! // Move a corner, then change your mind.
//! graph.move_node(b, Point::new(1.0, 1.0)).unwrap();
//! assert_eq!(graph.undo().as_deref(), Some("move"));
//! assert_eq!(graph.node(b).unwrap().pos, Point::new(1.0, 0.0));
//!
//! // The spatial index tracked every step.
//! let mut hits = Vec::new();
//! graph.query(Rect::new(-0.5, -0.5, 1.5, 0.5), |r| hits.push(*r));
//! assert!(hits.contains(&ObjectRef::Path(path)));
//! ```

mod check;
mod error;
mod geom;
mod graph;
mod merge;
mod object;
mod op;
mod store;
mod tags;

pub use check::Violation;
pub use error::{Error, Result};
pub use geom::{centroid, great_circle_distance, is_clockwise, length_meters, signed_area};
pub use graph::ObjectGraph;
pub use object::{
    MemberKind, Node, ObjectCore, ObjectId, ObjectRef, ObjectSnapshot, OneWay, Path, RelMember,
    Relation, ServerMeta,
};
pub use op::EditOp;
pub use tags::{Tags, is_false, is_true};
