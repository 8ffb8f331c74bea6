use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::node::Node;

/// One directory action.
///
/// The wire shape is a single self-describing object: an `action` tag plus
/// the record attributes by name. Anything that does not deserialize into
/// one of these variants is an invalid request and answered with an error
/// object by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Request {
    Register {
        #[serde(flatten)]
        node: Node,
    },
    Update {
        #[serde(flatten)]
        node: Node,
    },
    Deregister {
        name: String,
    },
    List,
}

/// A directory answer: the record array for `list`, a message for accepted
/// mutations, an error object otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Nodes(Vec<Node>),
    Message { message: String },
    Error { error: String },
}

/// The authoritative membership collection.
///
/// One mutex over the whole record vector serializes every action; `list`
/// hands out a clone so readers never hold the lock across I/O. Nothing is
/// persisted: a restarted registry starts empty and fills back up as peers
/// re-register and push updates.
#[derive(Default)]
pub struct Registry {
    nodes: Mutex<Vec<Node>>,
}

/// Deregister requests may arrive NUL-padded from fixed-width buffers;
/// names are compared after stripping NULs and surrounding whitespace.
fn normalize(name: &str) -> &str {
    name.trim_matches(|c: char| c == '\0' || c.is_whitespace())
}

impl Registry {
    /// Inserts a record, replacing any record with the same name. The
    /// logical name is the identity; address, position, class and key are
    /// attributes.
    pub fn register(&self, node: Node) {
        let mut nodes = self.nodes.lock();

        match nodes.iter_mut().find(|existing| existing.name == node.name) {
            Some(existing) => *existing = node,
            None => nodes.push(node),
        }
    }

    /// Replaces the attributes of an existing record. Returns whether the
    /// record existed; absent names are never implicitly created.
    pub fn update(&self, node: Node) -> bool {
        let mut nodes = self.nodes.lock();

        match nodes.iter_mut().find(|existing| existing.name == node.name) {
            Some(existing) => {
                *existing = node;
                true
            }
            None => false,
        }
    }

    /// Removes the record with this exact (normalized) name. Returns
    /// whether anything was removed; removing an absent name is a no-op.
    pub fn deregister(&self, name: &str) -> bool {
        let name = normalize(name);
        let mut nodes = self.nodes.lock();

        let before = nodes.len();
        nodes.retain(|node| node.name != name);
        nodes.len() != before
    }

    /// A point-in-time copy of the record set.
    pub fn list(&self) -> Vec<Node> {
        self.nodes.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}
