// ── Signal tree ──
//
// Every signal and branch of a vehicle model is a `Node`. Children are
// owned by their parent's registry; a child only keeps a weak reference
// back up, so dropping the root releases the whole tree. Paths are
// computed once at construction and never change.

use std::fmt;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use tracing::warn;

/// Separator between node names in a path.
pub const PATH_SEPARATOR: char = '.';

/// What kind of element of the signal tree a node is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    Sensor,
    Actuator,
    Attribute,
    Branch,
}

impl Role {
    pub fn is_leaf(self) -> bool {
        !matches!(self, Self::Branch)
    }
}

struct NodeInner {
    name: String,
    path: String,
    role: Role,
    parent: Weak<NodeInner>,
    children: DashMap<String, Node>,
}

/// Cheaply clonable handle to one element of the signal tree.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Create a parentless branch node.
    pub fn root(name: impl Into<String>) -> Self {
        Self::new(name, None, Role::Branch)
    }

    /// Create a node and register it with `parent`.
    ///
    /// If the parent already has a child with this name, the existing
    /// registration is kept and the returned node is detached from the
    /// parent's registry (its path is still computed from the parent).
    pub fn new(name: impl Into<String>, parent: Option<&Node>, role: Role) -> Self {
        let name = name.into();
        let path = match parent {
            Some(p) => format!("{}{PATH_SEPARATOR}{name}", p.path()),
            None => name.clone(),
        };

        let node = Self {
            inner: Arc::new(NodeInner {
                name,
                path,
                role,
                parent: parent.map_or_else(Weak::new, |p| Arc::downgrade(&p.inner)),
                children: DashMap::new(),
            }),
        };

        if let Some(parent) = parent {
            match parent.inner.children.entry(node.name().to_owned()) {
                Entry::Occupied(_) => {
                    warn!(
                        parent = parent.path(),
                        child = node.name(),
                        "duplicate child name, keeping the first registration"
                    );
                }
                Entry::Vacant(slot) => {
                    slot.insert(node.clone());
                }
            }
        }

        node
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Fully qualified dotted path, e.g. `Vehicle.Cabin.Speed`.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn role(&self) -> Role {
        self.inner.role
    }

    /// The parent node, or `None` for a root (or once the tree is dropped).
    pub fn parent(&self) -> Option<Node> {
        self.inner.parent.upgrade().map(|inner| Node { inner })
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.upgrade().is_none()
    }

    /// Registered children, sorted by name.
    pub fn children(&self) -> Vec<Node> {
        let mut children: Vec<Node> = self
            .inner
            .children
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        children.sort_by(|a, b| a.name().cmp(b.name()));
        children
    }

    pub fn child(&self, name: &str) -> Option<Node> {
        self.inner.children.get(name).map(|c| c.value().clone())
    }

    /// Resolve a dotted path that starts with this node's own name.
    ///
    /// `vehicle.find("Vehicle.Cabin.Light")` walks `Cabin` then `Light`.
    pub fn find(&self, path: &str) -> Option<Node> {
        let mut segments = path.split(PATH_SEPARATOR);
        if segments.next()? != self.name() {
            return None;
        }
        segments.try_fold(self.clone(), |node, segment| node.child(segment))
    }

    /// `true` if both handles refer to the same tree element.
    pub fn same_node(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("path", &self.inner.path)
            .field("role", &self.inner.role)
            .field("children", &self.inner.children.len())
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}
