// Copyright 2025 the Loam Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The geographic entities: nodes, paths, relations, and their shared core.
//!
//! Cross-references are stable integer identifiers resolved through the
//! graph's owning collections — never pointers. Negative identifiers mark
//! locally created objects that have not been uploaded yet.

use kurbo::{Point, Rect};
use serde::{Deserialize, Serialize};

use crate::tags::{self, Tags};

/// Stable identifier of an object within its kind.
pub type ObjectId = i64;

/// Kind discriminant used by relation members and extended identifiers.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MemberKind {
    /// A point entity.
    Node,
    /// An ordered node sequence ("way").
    Path,
    /// A grouped set of typed, role-tagged references.
    Relation,
}

impl MemberKind {
    const fn code(self) -> u64 {
        match self {
            Self::Node => 1,
            Self::Path => 2,
            Self::Relation => 3,
        }
    }
}

/// A typed reference to an object, used as the spatial payload and as the
/// cross-reference currency throughout the graph.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ObjectRef {
    /// Reference to a node.
    Node(ObjectId),
    /// Reference to a path.
    Path(ObjectId),
    /// Reference to a relation.
    Relation(ObjectId),
}

impl ObjectRef {
    /// The raw identifier.
    pub const fn id(self) -> ObjectId {
        match self {
            Self::Node(id) | Self::Path(id) | Self::Relation(id) => id,
        }
    }

    /// The kind discriminant.
    pub const fn kind(self) -> MemberKind {
        match self {
            Self::Node(_) => MemberKind::Node,
            Self::Path(_) => MemberKind::Path,
            Self::Relation(_) => MemberKind::Relation,
        }
    }

    /// Pack kind and identifier into one 64-bit key: kind in the top two
    /// bits, the identifier's low 62 bits below.
    pub fn to_extended(self) -> u64 {
        let id_bits = (self.id() as u64) & 0x3FFF_FFFF_FFFF_FFFF;
        (self.kind().code() << 62) | id_bits
    }

    /// Unpack an extended identifier. Returns `None` for the reserved kind
    /// code zero. The identifier is sign-extended from 62 bits, so local
    /// (negative) identifiers survive the round trip.
    pub fn from_extended(ext: u64) -> Option<Self> {
        #[allow(
            clippy::cast_possible_wrap,
            reason = "sign extension from 62 bits is the point"
        )]
        let id = ((ext << 2) as i64) >> 2;
        match ext >> 62 {
            1 => Some(Self::Node(id)),
            2 => Some(Self::Path(id)),
            3 => Some(Self::Relation(id)),
            _ => None,
        }
    }
}

/// Server-assigned provenance, absent for purely local objects.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerMeta {
    /// Object version on the server.
    pub version: i32,
    /// Changeset that last touched the object.
    pub changeset: i64,
    /// Display name of the last editor.
    pub user: String,
    /// Numeric id of the last editor.
    pub uid: i32,
    /// Server-side visibility.
    pub visible: bool,
    /// RFC 3339 timestamp of the last server edit.
    pub timestamp: String,
}

impl ServerMeta {
    pub(crate) fn bare(version: i32, changeset: i64) -> Self {
        Self {
            version,
            changeset,
            user: String::new(),
            uid: 0,
            visible: true,
            timestamp: String::new(),
        }
    }
}

/// State shared by every object variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectCore {
    /// Stable identifier; negative while local-only.
    pub id: ObjectId,
    /// Key/value tags; may be empty.
    pub tags: Tags,
    /// Server provenance, `None` for local objects.
    pub meta: Option<ServerMeta>,
    /// Local edits since the last server sync; zero means unmodified.
    pub modify_count: i32,
    /// Tombstone: deleted locally, retained until upload confirms removal.
    pub deleted: bool,
    /// Cached bounding box, kept fresh by the graph on structural change.
    pub(crate) bbox: Option<Rect>,
}

impl ObjectCore {
    pub(crate) fn local(id: ObjectId) -> Self {
        Self {
            id,
            tags: Tags::new(),
            meta: None,
            modify_count: 0,
            deleted: false,
            bbox: None,
        }
    }

    /// Whether the object carries unsynced local edits.
    pub fn is_modified(&self) -> bool {
        self.modify_count != 0
    }
}

/// One-way traffic direction derived from tags.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OneWay {
    /// One-way against node order.
    Backward,
    /// Not one-way.
    None,
    /// One-way along node order.
    Forward,
}

/// A point entity with a fixed lon/lat position.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Shared object state.
    pub core: ObjectCore,
    /// Position: `x` is longitude, `y` is latitude, degrees.
    pub pos: Point,
    /// How many live paths reference this node.
    pub(crate) path_count: u32,
}

impl Node {
    /// Number of live paths referencing this node.
    pub fn path_count(&self) -> u32 {
        self.path_count
    }
}

/// An ordered sequence of node references describing a line or polygon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Path {
    /// Shared object state.
    pub core: ObjectCore,
    /// Node identifiers in drawing order. Owned by identity: a node may
    /// belong to many paths at once.
    pub node_ids: Vec<ObjectId>,
}

impl Path {
    /// A ring: more than two nodes and the ends meet.
    pub fn is_closed(&self) -> bool {
        self.node_ids.len() > 2 && self.node_ids.first() == self.node_ids.last()
    }

    /// Whether consecutive entries repeat a node.
    pub fn has_duplicated_node(&self) -> bool {
        self.node_ids.windows(2).any(|w| w[0] == w[1])
    }

    /// One-way direction from the tag set. `junction=roundabout` implies
    /// forward unless tagged otherwise.
    pub fn one_way(&self) -> OneWay {
        match self.core.tags.get("oneway").map(String::as_str) {
            Some("-1") | Some("reverse") => OneWay::Backward,
            Some(v) if tags::is_true(v) => OneWay::Forward,
            Some(v) if tags::is_false(v) => OneWay::None,
            Some(_) => OneWay::None,
            None => {
                if self
                    .core
                    .tags
                    .get("junction")
                    .is_some_and(|v| v == "roundabout")
                {
                    OneWay::Forward
                } else {
                    OneWay::None
                }
            }
        }
    }
}

/// A role-tagged reference inside a relation. The identifier may be
/// unresolved — pointing at an object the graph has not fetched yet.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelMember {
    /// Kind of the referenced object.
    pub kind: MemberKind,
    /// Identifier of the referenced object.
    pub id: ObjectId,
    /// Role of the member within the relation, possibly empty.
    pub role: String,
}

impl RelMember {
    /// The member as a typed reference.
    pub fn object_ref(&self) -> ObjectRef {
        match self.kind {
            MemberKind::Node => ObjectRef::Node(self.id),
            MemberKind::Path => ObjectRef::Path(self.id),
            MemberKind::Relation => ObjectRef::Relation(self.id),
        }
    }
}

/// An ordered set of typed, role-tagged references grouping related
/// entities.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    /// Shared object state.
    pub core: ObjectCore,
    /// Members in order.
    pub members: Vec<RelMember>,
}

impl Relation {
    /// First member carrying the given role.
    pub fn member_by_role(&self, role: &str) -> Option<&RelMember> {
        self.members.iter().find(|m| m.role == role)
    }

    /// Whether the relation directly references the given object.
    pub fn contains_ref(&self, target: ObjectRef) -> bool {
        self.members.iter().any(|m| m.object_ref() == target)
    }

    /// `type=multipolygon` relations stitch rings into areas.
    pub fn is_multipolygon(&self) -> bool {
        self.core.tags.get("type").is_some_and(|v| v == "multipolygon")
    }

    /// `type=restriction` relations encode turn restrictions.
    pub fn is_restriction(&self) -> bool {
        self.core
            .tags
            .get("type")
            .is_some_and(|v| v.starts_with("restriction"))
    }
}

/// A captured object value, the unit of create/purge operations and of
/// server merges.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ObjectSnapshot {
    /// A node value.
    Node(Node),
    /// A path value.
    Path(Path),
    /// A relation value.
    Relation(Relation),
}

impl ObjectSnapshot {
    /// Typed reference to the snapshotted object.
    pub fn object_ref(&self) -> ObjectRef {
        match self {
            Self::Node(n) => ObjectRef::Node(n.core.id),
            Self::Path(p) => ObjectRef::Path(p.core.id),
            Self::Relation(r) => ObjectRef::Relation(r.core.id),
        }
    }

    /// The shared core of the snapshotted object.
    pub fn core(&self) -> &ObjectCore {
        match self {
            Self::Node(n) => &n.core,
            Self::Path(p) => &p.core,
            Self::Relation(r) => &r.core,
        }
    }
}
