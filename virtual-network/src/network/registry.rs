use crate::network::NetworkError;
use crate::network::node::{Node, NodeKind};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Every named entity of the network, keyed by name
///
/// Listings of all nodes are sorted by name, while the per-kind views keep the order in which
/// nodes were added.
#[derive(Default)]
pub struct Registry {
    nodes: BTreeMap<Arc<str>, Node>,
    order: Vec<Arc<str>>,
}

impl Registry {
    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Registers `node`, leaving the registry untouched if the name is taken
    pub fn insert(&mut self, node: Node) -> Result<(), NetworkError> {
        if self.nodes.contains_key(&*node.name) {
            return Err(NetworkError::DuplicateName(node.name.to_string()));
        }

        self.order.push(node.name.clone());
        self.nodes.insert(node.name.clone(), node);
        Ok(())
    }

    /// All nodes, ordered by name
    pub fn iter_sorted(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Hosts in the order they were added
    pub fn hosts(&self) -> impl Iterator<Item = &Node> {
        self.of_kind(NodeKind::Host)
    }

    pub fn switches(&self) -> impl Iterator<Item = &Node> {
        self.of_kind(NodeKind::Switch)
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Node> {
        self.of_kind(NodeKind::Controller)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.order
            .iter()
            .filter_map(|name| self.nodes.get(name))
            .filter(move |n| n.kind == kind)
    }
}
