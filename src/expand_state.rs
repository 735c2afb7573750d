use std::collections::{HashMap, HashSet};

use crate::tree::{ancestor_paths, children_of, children_of_par, path_depth, TreeNode};

/// Tracks which namespaces are expanded and caches their materialized children.
///
/// A path can be expanded without a cache entry, and a collapsed path keeps
/// its entry so re-expanding it is a lookup. Within one scan epoch entries are
/// never dropped: keys arriving or leaving below a namespace only mark its
/// entry stale, and a stale entry is recomputed the next time it is shown.
#[derive(Debug, Default)]
pub struct ExpansionState {
    expanded: HashSet<String>,
    children: HashMap<String, Vec<TreeNode>>,
    stale: HashSet<String>,
    materializations: u64,
}

impl ExpansionState {
    /// Expand a namespace, computing its children on first use.
    ///
    /// Computing children scans the whole key set, so a fresh cache entry
    /// always short-circuits.
    pub fn expand(
        &mut self,
        path: &str,
        keys: &HashSet<String>,
        delimiter: &str,
        parallel_threshold: usize,
    ) -> &[TreeNode] {
        self.expanded.insert(path.to_string());
        if !self.children.contains_key(path) || self.stale.contains(path) {
            self.materialize_into(path, keys, delimiter, parallel_threshold);
        }
        self.children
            .get(path)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn materialize_into(
        &mut self,
        path: &str,
        keys: &HashSet<String>,
        delimiter: &str,
        parallel_threshold: usize,
    ) {
        let depth = path_depth(path, delimiter) + 1;
        let nodes = if keys.len() >= parallel_threshold {
            children_of_par(keys, path, delimiter, depth)
        } else {
            children_of(keys.iter().map(String::as_str), path, delimiter, depth)
        };
        self.materializations += 1;
        self.stale.remove(path);
        self.children.insert(path.to_string(), nodes);
    }

    /// Collapse a namespace. Its cached children are kept.
    pub fn collapse(&mut self, path: &str) -> bool {
        self.expanded.remove(path)
    }

    /// Collapse everything, keeping the cache.
    pub fn collapse_all(&mut self) {
        self.expanded.clear();
    }

    pub fn is_expanded(&self, path: &str) -> bool {
        self.expanded.contains(path)
    }

    /// Cached children, fresh or stale.
    pub fn cached_children(&self, path: &str) -> Option<&[TreeNode]> {
        self.children.get(path).map(Vec::as_slice)
    }

    pub fn is_stale(&self, path: &str) -> bool {
        self.stale.contains(path)
    }

    pub fn expanded_count(&self) -> usize {
        self.expanded.len()
    }

    /// How many times children were computed from the key set.
    pub fn materializations(&self) -> u64 {
        self.materializations
    }

    /// Mark the cached namespaces above each of `changed` keys as stale.
    /// Returns how many entries were newly marked.
    pub fn invalidate_ancestors(&mut self, changed: &[String], delimiter: &str) -> usize {
        let mut marked = 0;
        for key in changed {
            for path in ancestor_paths(key, delimiter) {
                if self.children.contains_key(&path) && self.stale.insert(path) {
                    marked += 1;
                }
            }
        }
        marked
    }

    /// Recompute the stale entries of expanded namespaces reachable from
    /// `roots` through expanded ancestors. Entries hidden under a collapsed
    /// ancestor stay stale until they are shown again.
    pub fn refresh_visible(
        &mut self,
        roots: &[TreeNode],
        keys: &HashSet<String>,
        delimiter: &str,
        parallel_threshold: usize,
    ) -> usize {
        let mut pending = self.open_namespaces(roots);
        let mut refreshed = 0;

        while let Some(path) = pending.pop() {
            if self.stale.contains(&path) {
                self.materialize_into(&path, keys, delimiter, parallel_threshold);
                refreshed += 1;
            }
            if let Some(children) = self.children.get(&path) {
                pending.extend(self.open_namespaces(children));
            }
        }
        refreshed
    }

    fn open_namespaces(&self, nodes: &[TreeNode]) -> Vec<String> {
        nodes
            .iter()
            .filter(|n| !n.is_leaf && self.expanded.contains(&n.full_path))
            .map(|n| n.full_path.clone())
            .collect()
    }

    /// Forget everything. Used when a new scan epoch starts.
    pub fn reset(&mut self) {
        self.expanded.clear();
        self.children.clear();
        self.stale.clear();
    }
}
