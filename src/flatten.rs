use serde::Serialize;
use std::fmt;
use std::ops::Range;

use crate::expand_state::ExpansionState;
use crate::tree::TreeNode;

/// Row identity. A leaf and a namespace may share a path, so the kind is part
/// of the id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "path", rename_all = "lowercase")]
pub enum RowId {
    Key(String),
    Namespace(String),
}

impl RowId {
    pub fn for_node(node: &TreeNode) -> Self {
        if node.is_leaf {
            Self::Key(node.full_path.clone())
        } else {
            Self::Namespace(node.full_path.clone())
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::Key(p) | Self::Namespace(p) => p,
        }
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(p) => write!(f, "key:{p}"),
            Self::Namespace(p) => write!(f, "ns:{p}"),
        }
    }
}

/// One rendered line of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlatRow {
    pub id: RowId,
    pub node: TreeNode,
    pub expanded: bool,
    pub indent: u32,
}

/// Project the tree into rows: pre-order, descending only into namespaces that
/// are expanded and have cached children.
///
/// Always recomputed from scratch; never patched.
pub fn flatten(roots: &[TreeNode], expansion: &ExpansionState) -> Vec<FlatRow> {
    let mut out = Vec::with_capacity(roots.len());
    flatten_level(roots, expansion, 0, &mut out);
    out
}

fn flatten_level(nodes: &[TreeNode], expansion: &ExpansionState, indent: u32, out: &mut Vec<FlatRow>) {
    for node in nodes {
        let open_children = if node.is_leaf || !expansion.is_expanded(&node.full_path) {
            None
        } else {
            expansion.cached_children(&node.full_path)
        };

        out.push(FlatRow {
            id: RowId::for_node(node),
            node: node.clone(),
            expanded: open_children.is_some(),
            indent,
        });

        if let Some(children) = open_children {
            flatten_level(children, expansion, indent.saturating_add(1), out);
        }
    }
}

/// Keys of the leaf rows inside `range`, clamped to the row count.
pub fn leaf_keys_in(rows: &[FlatRow], range: Range<usize>) -> Vec<String> {
    let end = range.end.min(rows.len());
    let start = range.start.min(end);
    rows[start..end]
        .iter()
        .filter(|row| row.node.is_leaf)
        .map(|row| row.node.full_path.clone())
        .collect()
}

/// A fixed-height window over the row sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub offset: usize,
    pub height: usize,
}

impl Viewport {
    pub fn new(height: usize) -> Self {
        Self { offset: 0, height }
    }

    /// Visible row indices for a sequence of `len` rows.
    pub fn range(&self, len: usize) -> Range<usize> {
        let start = self.offset.min(len);
        let end = start.saturating_add(self.height).min(len);
        start..end
    }

    /// Scroll the minimum amount needed to show `index`.
    pub fn reveal(&mut self, index: usize) {
        if index < self.offset {
            self.offset = index;
        } else if self.height > 0 && index >= self.offset + self.height {
            self.offset = index + 1 - self.height;
        }
    }

    /// Keep the window inside a sequence that may have shrunk.
    pub fn clamp(&mut self, len: usize) {
        let max_offset = len.saturating_sub(self.height);
        self.offset = self.offset.min(max_offset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::build_roots;
    use std::collections::HashSet;

    fn setup(list: &[&str]) -> (HashSet<String>, Vec<TreeNode>) {
        let keys: HashSet<String> = list.iter().map(|s| s.to_string()).collect();
        let mut sorted: Vec<&str> = list.to_vec();
        sorted.sort();
        let roots = build_roots(sorted, ":");
        (keys, roots)
    }

    fn ids(rows: &[FlatRow]) -> Vec<String> {
        rows.iter().map(|r| r.id.to_string()).collect()
    }

    #[test]
    fn test_flatten_collapsed() {
        let (_, roots) = setup(&["a", "a:b", "a:c:d", "x"]);
        let rows = flatten(&roots, &ExpansionState::default());

        assert_eq!(ids(&rows), vec!["key:a", "ns:a", "key:x"]);
        assert!(rows.iter().all(|r| r.indent == 0 && !r.expanded));
    }

    #[test]
    fn test_flatten_inlines_expanded_children_pre_order() {
        let (keys, roots) = setup(&["a", "a:b", "a:c:d", "x"]);
        let mut expansion = ExpansionState::default();
        expansion.expand("a", &keys, ":", usize::MAX);
        expansion.expand("a:c", &keys, ":", usize::MAX);

        let rows = flatten(&roots, &expansion);
        assert_eq!(
            ids(&rows),
            vec!["key:a", "ns:a", "key:a:b", "ns:a:c", "key:a:c:d", "key:x"]
        );
        let indents: Vec<u32> = rows.iter().map(|r| r.indent).collect();
        assert_eq!(indents, vec![0, 0, 1, 1, 2, 0]);
        // The leaf sharing the namespace path is never marked expanded
        assert!(!rows[0].expanded);
        assert!(rows[1].expanded);
    }

    #[test]
    fn test_collapsed_parent_hides_expanded_descendants() {
        let (keys, roots) = setup(&["a:c:d"]);
        let mut expansion = ExpansionState::default();
        expansion.expand("a", &keys, ":", usize::MAX);
        expansion.expand("a:c", &keys, ":", usize::MAX);
        expansion.collapse("a");

        let rows = flatten(&roots, &expansion);
        assert_eq!(ids(&rows), vec!["ns:a"]);
    }

    #[test]
    fn test_leaf_keys_in_range() {
        let (keys, roots) = setup(&["a", "a:b", "a:c:d", "x"]);
        let mut expansion = ExpansionState::default();
        expansion.expand("a", &keys, ":", usize::MAX);
        let rows = flatten(&roots, &expansion);

        assert_eq!(leaf_keys_in(&rows, 1..4), vec!["a:b".to_string()]);
        assert_eq!(leaf_keys_in(&rows, 0..100).len(), 3);
        assert!(leaf_keys_in(&rows, 50..100).is_empty());
    }

    #[test]
    fn test_viewport_reveal_and_clamp() {
        let mut viewport = Viewport::new(10);
        assert_eq!(viewport.range(4), 0..4);

        viewport.reveal(15);
        assert_eq!(viewport.offset, 6);
        assert_eq!(viewport.range(100), 6..16);

        viewport.reveal(2);
        assert_eq!(viewport.offset, 2);

        viewport.offset = 40;
        viewport.clamp(45);
        assert_eq!(viewport.offset, 35);
    }
}
