use std::collections::HashMap;

use crate::error::{PurifyError, PurifyResult};
use crate::graph::Node;

/// Dense positions for an oracle's variables, looked up by name.
#[derive(Debug, Clone)]
pub struct VariableIndex {
    nodes: Vec<Node>,
    by_name: HashMap<String, usize>,
}

impl VariableIndex {
    pub fn new(nodes: &[Node]) -> PurifyResult<Self> {
        let mut by_name = HashMap::with_capacity(nodes.len());
        for (pos, node) in nodes.iter().enumerate() {
            if by_name.insert(node.name.clone(), pos).is_some() {
                return Err(PurifyError::data(format!(
                    "variable name '{}' is used twice by the tetrad test",
                    node.name
                )));
            }
        }
        Ok(Self {
            nodes: nodes.to_vec(),
            by_name,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Canonical position of an externally supplied node.
    pub fn resolve(&self, node: &Node) -> PurifyResult<usize> {
        self.position(&node.name)
            .ok_or_else(|| PurifyError::UnknownVariable {
                name: node.name.clone(),
            })
    }

    pub fn node(&self, pos: usize) -> &Node {
        &self.nodes[pos]
    }

    pub fn name(&self, pos: usize) -> &str {
        &self.nodes[pos].name
    }

    /// Comma separated names, for log lines.
    pub fn describe(&self, positions: &[usize]) -> String {
        positions
            .iter()
            .map(|&p| self.name(p))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::nodes;

    #[test]
    fn resolves_by_name_not_identity() {
        let index = VariableIndex::new(&nodes(&["X1", "X2", "X3"])).unwrap();
        let foreign = Node::latent("X2");
        assert_eq!(index.resolve(&foreign).unwrap(), 1);
        assert_eq!(index.describe(&[2, 0]), "X3, X1");
    }

    #[test]
    fn unknown_and_duplicate_names() {
        let index = VariableIndex::new(&nodes(&["X1"])).unwrap();
        assert!(matches!(
            index.resolve(&Node::new("Y")),
            Err(PurifyError::UnknownVariable { name }) if name == "Y"
        ));
        assert!(VariableIndex::new(&nodes(&["A", "A"])).is_err());
    }
}
