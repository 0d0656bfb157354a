// layermap_core/src/params.rs

//! Tree-shaped, read-only dump of configuration for logging.

use std::fmt;

/// One node of a parameter dump: either a leaf with a value or a named group.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterTreeNode {
    pub name: String,
    pub value: Option<String>,
    pub children: Vec<ParameterTreeNode>,
}

impl ParameterTreeNode {
    pub fn leaf(name: impl Into<String>, value: impl fmt::Display) -> Self {
        Self {
            name: name.into(),
            value: Some(value.to_string()),
            children: Vec::new(),
        }
    }

    pub fn group(name: impl Into<String>, children: Vec<ParameterTreeNode>) -> Self {
        Self {
            name: name.into(),
            value: None,
            children,
        }
    }

    /// Depth-first search for a node by a `/`-separated path below this node,
    /// e.g. `"unmasked_mapper/esdf/max_esdf_distance_m"`.
    pub fn find(&self, path: &str) -> Option<&ParameterTreeNode> {
        let mut node = self;
        for part in path.split('/').filter(|p| !p.is_empty()) {
            node = node.children.iter().find(|c| c.name == part)?;
        }
        Some(node)
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        match &self.value {
            Some(value) => writeln!(f, "{indent}{}: {value}", self.name)?,
            None => writeln!(f, "{indent}{}:", self.name)?,
        }
        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for ParameterTreeNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_and_lookup() {
        let tree = ParameterTreeNode::group(
            "root",
            vec![
                ParameterTreeNode::leaf("voxel_size_m", 0.05),
                ParameterTreeNode::group("esdf", vec![ParameterTreeNode::leaf("mode", "3d")]),
            ],
        );
        assert_eq!(
            tree.to_string(),
            "root:\n  voxel_size_m: 0.05\n  esdf:\n    mode: 3d\n"
        );
        assert_eq!(
            tree.find("esdf/mode").and_then(|n| n.value.as_deref()),
            Some("3d")
        );
        assert!(tree.find("esdf/missing").is_none());
    }
}
