use notestore::node::path;
use notestore::tree::{build_tree, flatten};
use notestore::{Node, NodeKind};
use proptest::prelude::*;
use std::collections::HashSet;

/// Random forests: each generated id may sit under an earlier id, which is
/// sometimes a file or absent from the list entirely.
fn arb_nodes() -> impl Strategy<Value = Vec<Node>> {
    prop::collection::vec(
        (
            prop::option::of(0usize..32),
            "[a-e]{1,3}",
            any::<bool>(),
            any::<bool>(),
        ),
        0..32,
    )
    .prop_map(|specs| {
        let mut ids: Vec<String> = Vec::new();
        let mut nodes = Vec::new();
        let mut seen = HashSet::new();
        for (parent, name, is_folder, dangling) in specs {
            let parent_id = match parent {
                Some(i) if i < ids.len() => Some(ids[i].clone()),
                Some(_) if dangling => Some("missing".to_string()),
                _ => None,
            };
            let id = path::join(parent_id.as_deref(), &name);
            if !seen.insert(id.clone()) {
                continue;
            }
            ids.push(id.clone());
            let kind = if is_folder { NodeKind::Folder } else { NodeKind::File };
            let content = (!is_folder).then(String::new);
            nodes.push(Node::from_id(&id, kind, content));
        }
        nodes
    })
}

proptest! {
    #[test]
    fn every_node_appears_exactly_once(nodes in arb_nodes()) {
        let forest = build_tree(&nodes);
        let flat = flatten(&forest);
        prop_assert_eq!(flat.len(), nodes.len());
        prop_assert_eq!(forest.iter().map(|t| t.size()).sum::<usize>(), nodes.len());

        let ids: HashSet<&str> = flat.iter().map(|n| n.id.as_str()).collect();
        prop_assert_eq!(ids.len(), nodes.len());
    }

    #[test]
    fn children_sit_under_their_folder(nodes in arb_nodes()) {
        let folders: HashSet<&str> = nodes
            .iter()
            .filter(|n| n.is_folder())
            .map(|n| n.id.as_str())
            .collect();
        let forest = build_tree(&nodes);

        for root in &forest {
            let parent = root.node.parent_id.as_deref();
            prop_assert!(parent.map_or(true, |p| !folders.contains(p)));
        }

        let mut stack: Vec<_> = forest.iter().collect();
        while let Some(tree) = stack.pop() {
            if !tree.children.is_empty() {
                prop_assert!(tree.node.is_folder());
            }
            for child in &tree.children {
                prop_assert_eq!(child.node.parent_id.as_deref(), Some(tree.node.id.as_str()));
                stack.push(child);
            }
        }
    }

    #[test]
    fn siblings_list_folders_first(nodes in arb_nodes()) {
        let forest = build_tree(&nodes);
        let mut levels = vec![forest.as_slice()];
        while let Some(level) = levels.pop() {
            let kinds: Vec<bool> = level.iter().map(|t| t.node.is_folder()).collect();
            let first_file = kinds.iter().position(|f| !f).unwrap_or(kinds.len());
            prop_assert!(kinds[first_file..].iter().all(|f| !f));
            for tree in level {
                levels.push(tree.children.as_slice());
            }
        }
    }
}
