//! Node storage: typed vectors of doubles addressed by integer index.
//!
//! A [`NodeType`] defines an ordered list of named variable slots; a [`Node`]
//! is one fixed-length array of doubles using that layout. All nodes of one
//! type share the same index layout, so a transport code can exchange values
//! with calculators through plain integer indices.

pub mod processor;

use std::collections::HashMap;
use std::sync::Arc;

use crate::calculator::Calculator;

/// Layout definition shared by all nodes of one type.
#[derive(Debug, Clone, Default)]
pub struct NodeType {
    names: Vec<String>,
    defaults: Vec<f64>,
    statics: Vec<bool>,
    origins: Vec<String>,
    index: HashMap<String, usize>,
}

impl NodeType {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named slot; re-registering a name returns the existing
    /// index and leaves its definition untouched.
    ///
    /// `is_static` marks variables that conceptually have a single value for
    /// all nodes (time step, temperature); `origin` records where the
    /// definition came from, for diagnostics.
    pub fn add_variable(
        &mut self,
        name: &str,
        default: f64,
        is_static: bool,
        origin: &str,
    ) -> usize {
        if let Some(&i) = self.index.get(name) {
            return i;
        }
        let i = self.names.len();
        self.names.push(name.to_string());
        self.defaults.push(default);
        self.statics.push(is_static);
        self.origins.push(origin.to_string());
        self.index.insert(name.to_string(), i);
        i
    }

    /// Import the storage requirements of a calculator: its global cells and
    /// its solver unknowns (so converged values can seed later calculations).
    pub fn use_global_variables_from_calculator(&mut self, calc: &Calculator) {
        for (name, default) in calc.storage_requirements() {
            self.add_variable(&name, default, false, "calculator");
        }
    }

    /// Index of a named slot.
    pub fn index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Name of the slot at `i`.
    pub fn name(&self, i: usize) -> &str {
        &self.names[i]
    }

    /// Origin recorded for the slot at `i`.
    pub fn origin(&self, i: usize) -> &str {
        &self.origins[i]
    }

    /// True if the slot at `i` is a static (shared) variable.
    pub fn is_static(&self, i: usize) -> bool {
        self.statics[i]
    }

    /// All slot names in layout order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True if no slots are registered.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One cell of a reactive-transport simulation: a fixed-length array of
/// doubles laid out by its [`NodeType`].
#[derive(Debug, Clone)]
pub struct Node {
    node_type: Arc<NodeType>,
    values: Vec<f64>,
}

impl Node {
    /// Create a node initialized with the type's default values.
    pub fn new(node_type: Arc<NodeType>) -> Self {
        let values = node_type.defaults.clone();
        Self { node_type, values }
    }

    /// The layout shared by all nodes of this type.
    pub fn node_type(&self) -> &Arc<NodeType> {
        &self.node_type
    }

    /// Write the slot at `i`.
    pub fn set_value(&mut self, i: usize, value: f64) {
        self.values[i] = value;
    }

    /// Read the slot at `i`.
    pub fn get_value(&self, i: usize) -> f64 {
        self.values[i]
    }

    /// All values in layout order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::Calculator;

    #[test]
    fn test_index_name_roundtrip() {
        let mut node_type = NodeType::new();
        for name in ["tot_ca", "tot_co3", "pH", "tot_nr_iter"] {
            node_type.add_variable(name, 0.0, false, "test");
        }
        for i in 0..node_type.len() {
            assert_eq!(node_type.index(node_type.name(i)), Some(i));
        }
        assert_eq!(node_type.index("missing"), None);
    }

    #[test]
    fn test_add_variable_dedupes() {
        let mut node_type = NodeType::new();
        let a = node_type.add_variable("x", 1.0, false, "first");
        let b = node_type.add_variable("x", 2.0, false, "second");
        assert_eq!(a, b);
        assert_eq!(node_type.len(), 1);
        // first definition wins
        let node = Node::new(Arc::new(node_type));
        assert!((node.get_value(a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_node_defaults_and_mutation() {
        let mut node_type = NodeType::new();
        let i = node_type.add_variable("x", 3.5, false, "test");
        let mut node = Node::new(Arc::new(node_type));
        assert!((node.get_value(i) - 3.5).abs() < 1e-12);
        node.set_value(i, -1.0);
        assert!((node.get_value(i) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_storage_import_from_calculator() {
        let system = "\
.global tot_ca 2.5
.var x 0.5
.calc f = x - tot_ca
.uneq x f
";
        let calc = Calculator::from_text(system).unwrap();
        let mut node_type = NodeType::new();
        node_type.use_global_variables_from_calculator(&calc);
        // global cell and unknown both get slots, with current values as defaults
        let g = node_type.index("tot_ca").expect("global slot");
        let u = node_type.index("x").expect("unknown slot");
        let node = Node::new(Arc::new(node_type));
        assert!((node.get_value(g) - 2.5).abs() < 1e-12);
        assert!((node.get_value(u) - 0.5).abs() < 1e-12);
    }
}
