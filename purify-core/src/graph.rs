use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a node in a measurement model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum NodeType {
    #[default]
    Measured,
    Latent,
    Error,
}

/// A named variable. Two nodes with the same name denote the same variable
/// for purification purposes, whatever their origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    #[serde(default)]
    pub node_type: NodeType,
}

impl Node {
    /// A measured node.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: NodeType::Measured,
        }
    }

    pub fn latent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: NodeType::Latent,
        }
    }

    pub fn error(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_type: NodeType::Error,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Build measured nodes from a list of names.
pub fn nodes<S: AsRef<str>>(names: &[S]) -> Vec<Node> {
    names.iter().map(|n| Node::new(n.as_ref())).collect()
}

/// Mark at one end of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Endpoint {
    Tail,
    Arrow,
    Circle,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub node1: Node,
    pub node2: Node,
    pub endpoint1: Endpoint,
    pub endpoint2: Endpoint,
}

impl Edge {
    pub fn new(node1: Node, node2: Node, endpoint1: Endpoint, endpoint2: Endpoint) -> Self {
        Self {
            node1,
            node2,
            endpoint1,
            endpoint2,
        }
    }

    /// `from --> to`
    pub fn directed(from: Node, to: Node) -> Self {
        Self::new(from, to, Endpoint::Tail, Endpoint::Arrow)
    }

    /// `a <-> b`
    pub fn bidirected(a: Node, b: Node) -> Self {
        Self::new(a, b, Endpoint::Arrow, Endpoint::Arrow)
    }

    /// `a --- b`
    pub fn undirected(a: Node, b: Node) -> Self {
        Self::new(a, b, Endpoint::Tail, Endpoint::Tail)
    }

    /// Exactly one tail and one arrowhead.
    pub fn is_directed(&self) -> bool {
        matches!(
            (self.endpoint1, self.endpoint2),
            (Endpoint::Tail, Endpoint::Arrow) | (Endpoint::Arrow, Endpoint::Tail)
        )
    }

    /// The node at the arrowhead of a directed edge.
    pub fn head(&self) -> Option<&Node> {
        if !self.is_directed() {
            return None;
        }
        if self.endpoint1 == Endpoint::Arrow {
            Some(&self.node1)
        } else {
            Some(&self.node2)
        }
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let left = match self.endpoint1 {
            Endpoint::Tail => "-",
            Endpoint::Arrow => "<",
            Endpoint::Circle => "o",
        };
        let right = match self.endpoint2 {
            Endpoint::Tail => "-",
            Endpoint::Arrow => ">",
            Endpoint::Circle => "o",
        };
        write!(f, "{} {}-{} {}", self.node1, left, right, self.node2)
    }
}

/// A structural rule consulted before a graph is edited.
pub trait GraphConstraint: fmt::Display {
    fn is_edge_addable(&self, edge: &Edge) -> bool;

    fn is_node_addable(&self, _node: &Node) -> bool {
        true
    }

    fn is_edge_removable(&self, _edge: &Edge) -> bool {
        true
    }

    fn is_node_removable(&self, _node: &Node) -> bool {
        true
    }
}

/// Forbids directed edges pointing into error nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEdgesIntoError;

impl GraphConstraint for NoEdgesIntoError {
    fn is_edge_addable(&self, edge: &Edge) -> bool {
        match edge.head() {
            Some(into) => into.node_type != NodeType::Error,
            None => true,
        }
    }
}

impl fmt::Display for NoEdgesIntoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<Directed edges must be into non-error nodes.>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directed_edge_into_error_is_rejected() {
        let c = NoEdgesIntoError;
        let x = Node::new("X1");
        let e = Node::error("E_X1");
        assert!(!c.is_edge_addable(&Edge::directed(x.clone(), e.clone())));
        assert!(c.is_edge_addable(&Edge::directed(e.clone(), x.clone())));
        // Arrow stored on the first endpoint.
        let reversed = Edge::new(e.clone(), x.clone(), Endpoint::Arrow, Endpoint::Tail);
        assert!(!c.is_edge_addable(&reversed));
    }

    #[test]
    fn non_directed_edges_always_addable() {
        let c = NoEdgesIntoError;
        let e = Node::error("E1");
        let l = Node::latent("L1");
        assert!(c.is_edge_addable(&Edge::bidirected(l.clone(), e.clone())));
        assert!(c.is_edge_addable(&Edge::undirected(l.clone(), e.clone())));
        assert!(c.is_node_addable(&e));
        assert!(c.is_node_removable(&e));
        assert!(c.is_edge_removable(&Edge::directed(l, e)));
    }

    #[test]
    fn display_forms() {
        assert_eq!(
            NoEdgesIntoError.to_string(),
            "<Directed edges must be into non-error nodes.>"
        );
        let edge = Edge::directed(Node::latent("L1"), Node::new("X1"));
        assert_eq!(edge.to_string(), "L1 --> X1");
        assert_eq!(edge.head().map(Node::name), Some("X1"));
    }
}
