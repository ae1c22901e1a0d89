//! Variable scopes
//!
//! A scope is the structural path from the root document to a nested object.
//! Variables are named from the path, so the same document always compiles
//! to the same text and sibling objects never share a variable.

use crate::validation::sanitize_segment;
use tql::Variable;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    segments: Vec<String>,
}

impl Scope {
    /// Scope of a top-level document
    pub fn root() -> Self {
        Self::default()
    }

    /// Scope of the value at `field` (and `index`, for list elements)
    pub fn child(&self, field: &str, index: Option<usize>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(sanitize_segment(field));
        if let Some(i) = index {
            segments.push(i.to_string());
        }
        Self { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Variable for `base` in this scope
    pub fn bind(&self, base: &str) -> Variable {
        let base = sanitize_segment(base);
        if self.segments.is_empty() {
            Variable::new(base)
        } else {
            Variable::new(format!("{}_{}", self.segments.join("_"), base))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_binding() {
        assert_eq!(Scope::root().bind("attack-pattern").name(), "attack-pattern");
    }

    #[test]
    fn test_nested_binding() {
        let scope = Scope::root().child("kill_chain_phases", Some(1));
        assert_eq!(scope.bind("kill-chain-phase").name(), "kill_chain_phases_1_kill-chain-phase");

        let deeper = scope.child("created_by_ref", None);
        assert_eq!(deeper.bind("ref").name(), "kill_chain_phases_1_created_by_ref_ref");
    }

    #[test]
    fn test_siblings_differ() {
        let root = Scope::root();
        let a = root.child("items", Some(0)).bind("item");
        let b = root.child("items", Some(1)).bind("item");
        assert_ne!(a, b);
    }

    #[test]
    fn test_unsafe_field_names() {
        let scope = Scope::root().child("x mitre.data", None);
        assert_eq!(scope.bind("v").name(), "x_mitre_data_v");
    }
}
