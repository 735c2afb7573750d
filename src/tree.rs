use rayon::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

/// One node of the key namespace tree.
///
/// Leaves are real keys. Namespaces are synthesized prefixes that exist only
/// because at least one key lives below them. A leaf and a namespace may share
/// a `full_path` (`a` next to `a:b`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub full_path: String,
    /// Last delimiter segment
    pub name: String,
    pub is_leaf: bool,
    /// 0 = root level
    pub depth: u32,
    /// Number of direct children; always 0 for leaves
    pub children_count: u64,
}

/// Children seen below one namespace at the next segment boundary.
#[derive(Default)]
struct NamespaceEntry<'a> {
    leaf_names: HashSet<&'a str>,
    namespace_names: HashSet<&'a str>,
}

/// One tree level under construction.
#[derive(Default)]
struct Level<'a> {
    /// name -> full key
    leaves: BTreeMap<&'a str, &'a str>,
    namespaces: BTreeMap<&'a str, NamespaceEntry<'a>>,
}

impl<'a> Level<'a> {
    /// Add a key given its remainder below the level's prefix.
    fn insert(&mut self, suffix: &'a str, full_key: &'a str, delimiter: &str) {
        if delimiter.is_empty() {
            self.leaves.insert(suffix, full_key);
            return;
        }
        match suffix.split_once(delimiter) {
            None => {
                self.leaves.insert(suffix, full_key);
            }
            Some((head, rest)) => {
                let entry = self.namespaces.entry(head).or_default();
                match rest.split_once(delimiter) {
                    None => entry.leaf_names.insert(rest),
                    Some((next, _)) => entry.namespace_names.insert(next),
                };
            }
        }
    }

    fn into_nodes(self, prefix: Option<&str>, delimiter: &str, depth: u32) -> Vec<TreeNode> {
        let mut nodes = Vec::with_capacity(self.leaves.len() + self.namespaces.len());

        for (name, full_key) in self.leaves {
            nodes.push(TreeNode {
                full_path: full_key.to_string(),
                name: name.to_string(),
                is_leaf: true,
                depth,
                children_count: 0,
            });
        }

        for (name, entry) in self.namespaces {
            let full_path = match prefix {
                Some(p) => format!("{p}{delimiter}{name}"),
                None => name.to_string(),
            };
            nodes.push(TreeNode {
                full_path,
                name: name.to_string(),
                is_leaf: false,
                depth,
                children_count: (entry.leaf_names.len() + entry.namespace_names.len()) as u64,
            });
        }

        sort_nodes(&mut nodes);
        nodes
    }
}

/// Order by name (case-sensitive), then full path, then leaf before namespace.
pub fn sort_nodes(nodes: &mut [TreeNode]) {
    nodes.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then_with(|| a.full_path.cmp(&b.full_path))
            .then_with(|| b.is_leaf.cmp(&a.is_leaf))
    });
}

/// Build the root level of the namespace tree from a flat key list.
///
/// Only depth 0 is materialized. Deeper levels come from [`children_of`] when
/// a namespace is expanded. For `["a", "a:b", "a:c:d", "x"]` and `:` this
/// yields `a` (leaf), `a` (namespace, 2 children) and `x` (leaf).
pub fn build_roots<'a, I>(keys: I, delimiter: &str) -> Vec<TreeNode>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut level = Level::default();
    for key in keys {
        level.insert(key, key, delimiter);
    }
    level.into_nodes(None, delimiter, 0)
}

/// Direct children of the namespace at `path`.
///
/// `depth` is the depth assigned to the returned nodes (one more than the
/// namespace's own depth).
pub fn children_of<'a, I>(keys: I, path: &str, delimiter: &str, depth: u32) -> Vec<TreeNode>
where
    I: IntoIterator<Item = &'a str>,
{
    if delimiter.is_empty() {
        return Vec::new();
    }
    let prefix = format!("{path}{delimiter}");
    let mut level = Level::default();
    for key in keys {
        if let Some(suffix) = key.strip_prefix(prefix.as_str()) {
            level.insert(suffix, key, delimiter);
        }
    }
    level.into_nodes(Some(path), delimiter, depth)
}

/// Same as [`children_of`], filtering the key set on the rayon pool first.
pub fn children_of_par(keys: &HashSet<String>, path: &str, delimiter: &str, depth: u32) -> Vec<TreeNode> {
    if delimiter.is_empty() {
        return Vec::new();
    }
    let prefix = format!("{path}{delimiter}");
    let matching: Vec<&str> = keys
        .par_iter()
        .filter(|key| key.starts_with(prefix.as_str()))
        .map(String::as_str)
        .collect();
    children_of(matching, path, delimiter, depth)
}

/// Number of keys anywhere below the namespace at `prefix`.
pub fn count_leaves<'a, I>(keys: I, prefix: &str, delimiter: &str) -> u64
where
    I: IntoIterator<Item = &'a str>,
{
    let prefix_with_delim = format!("{prefix}{delimiter}");
    keys.into_iter()
        .filter(|k| k.starts_with(&prefix_with_delim))
        .count() as u64
}

/// Depth of a namespace path: number of delimiters it contains.
pub fn path_depth(path: &str, delimiter: &str) -> u32 {
    if delimiter.is_empty() {
        return 0;
    }
    path.matches(delimiter).count() as u32
}

/// Namespace paths strictly above `key` (`a:b:c` -> `a`, `a:b`).
pub fn ancestor_paths(key: &str, delimiter: &str) -> Vec<String> {
    if delimiter.is_empty() {
        return Vec::new();
    }
    key.match_indices(delimiter)
        .map(|(idx, _)| key[..idx].to_string())
        .collect()
}
