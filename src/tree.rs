//! Tree Builder
//!
//! Re-derives the folder hierarchy from the flat node list any driver returns.
//! Siblings are ordered folders first, then by name.

use crate::node::Node;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// A node together with its (sorted) children
#[derive(Debug, Clone, Serialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub node: Node,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Total number of nodes in this subtree, self included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }
}

/// Sibling order: folders before files, then alphabetical ignoring case.
///
/// Names equal up to case put lowercase first (`a` before `A`), as locale
/// collation does.
pub fn sibling_order(a: &Node, b: &Node) -> Ordering {
    match (a.is_folder(), b.is_folder()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| b.name.cmp(&a.name)),
    }
}

/// Build a rooted forest from a flat node list.
///
/// Nodes whose `parent_id` is missing from the list, or does not name a folder,
/// become roots rather than being dropped.
pub fn build_tree(nodes: &[Node]) -> Vec<TreeNode> {
    let folder_ids: HashSet<&str> = nodes
        .iter()
        .filter(|n| n.is_folder())
        .map(|n| n.id.as_str())
        .collect();

    let mut children_of: HashMap<&str, Vec<&Node>> = HashMap::new();
    let mut roots: Vec<&Node> = Vec::new();
    for node in nodes {
        match node.parent_id.as_deref() {
            Some(parent) if parent != node.id && folder_ids.contains(parent) => {
                children_of.entry(parent).or_default().push(node)
            }
            _ => roots.push(node),
        }
    }

    // A parent chain that loops back on itself never reaches a root; those are
    // detected by the visited set and promoted.
    let mut visited: HashSet<*const Node> = HashSet::new();
    let mut forest: Vec<TreeNode> = roots
        .into_iter()
        .map(|n| assemble(n, &children_of, &mut visited))
        .collect();

    for node in nodes {
        if !visited.contains(&(node as *const Node)) {
            forest.push(assemble(node, &children_of, &mut visited));
        }
    }

    sort_level(&mut forest);
    forest
}

fn assemble<'a>(
    node: &'a Node,
    children_of: &HashMap<&'a str, Vec<&'a Node>>,
    visited: &mut HashSet<*const Node>,
) -> TreeNode {
    visited.insert(node as *const Node);
    let mut children = Vec::new();
    if let Some(kids) = children_of.get(node.id.as_str()) {
        for child in kids {
            if visited.contains(&(*child as *const Node)) {
                continue;
            }
            children.push(assemble(child, children_of, visited));
        }
    }
    sort_level(&mut children);
    TreeNode {
        node: node.clone(),
        children,
    }
}

fn sort_level(level: &mut [TreeNode]) {
    level.sort_by(|a, b| sibling_order(&a.node, &b.node));
}

/// Depth-first flatten, the inverse of [`build_tree`] up to ordering.
pub fn flatten(forest: &[TreeNode]) -> Vec<&Node> {
    let mut out = Vec::new();
    let mut stack: Vec<&TreeNode> = forest.iter().rev().collect();
    while let Some(tree) = stack.pop() {
        out.push(&tree.node);
        stack.extend(tree.children.iter().rev());
    }
    out
}

/// Render the forest as an indented outline (used by the CLI `tree` command).
pub fn render_outline(forest: &[TreeNode]) -> String {
    fn walk(tree: &TreeNode, depth: usize, out: &mut String) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&tree.node.name);
        if tree.node.is_folder() {
            out.push('/');
        }
        out.push('\n');
        for child in &tree.children {
            walk(child, depth + 1, out);
        }
    }

    let mut out = String::new();
    for tree in forest {
        walk(tree, 0, &mut out);
    }
    out
}
