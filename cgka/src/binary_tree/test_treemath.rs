use super::treemath::*;

fn size(leaves: u32) -> TreeSize {
    TreeSize::from_leaf_count(leaves)
}

#[test]
fn test_tree_size() {
    assert_eq!(size(1).u32(), 1);
    assert_eq!(size(2).u32(), 3);
    assert_eq!(size(3).u32(), 7);
    assert_eq!(size(5).u32(), 15);
    assert_eq!(size(5).leaf_count(), 8);
    assert!(size(4).contains_leaf(LeafNodeIndex::new(3)));
    assert!(!size(4).contains_leaf(LeafNodeIndex::new(4)));
}

#[test]
fn test_root_and_children() {
    assert_eq!(root(size(1)), 0);
    assert_eq!(root(size(2)), 1);
    assert_eq!(root(size(4)), 3);
    assert_eq!(root(size(8)), 7);

    assert_eq!(left(7), Ok(3));
    assert_eq!(right(7), Ok(11));
    assert_eq!(left(3), Ok(1));
    assert_eq!(right(3), Ok(5));
    assert_eq!(left(5), Ok(4));
    assert_eq!(right(5), Ok(6));
    assert_eq!(left(4), Err(TreeMathError::LeafHasNoChildren));
    assert_eq!(right(0), Err(TreeMathError::LeafHasNoChildren));
}

#[test]
fn test_parent_and_sibling() {
    let s = size(4);
    assert_eq!(parent(0, s), Ok(1));
    assert_eq!(parent(2, s), Ok(1));
    assert_eq!(parent(1, s), Ok(3));
    assert_eq!(parent(5, s), Ok(3));
    assert_eq!(parent(3, s), Err(TreeMathError::RootHasNoParent));
    assert_eq!(parent(7, s), Err(TreeMathError::NodeNotInTree));

    assert_eq!(sibling(0, s), Ok(2));
    assert_eq!(sibling(2, s), Ok(0));
    assert_eq!(sibling(1, s), Ok(5));
    assert_eq!(sibling(6, s), Ok(4));
    assert_eq!(sibling(3, s), Err(TreeMathError::RootHasNoParent));
}

#[test]
fn test_direct_path() {
    let s = size(8);
    assert_eq!(direct_path(0, s), Ok(vec![1, 3, 7]));
    assert_eq!(direct_path(6, s), Ok(vec![5, 3, 7]));
    assert_eq!(direct_path(14, s), Ok(vec![13, 11, 7]));
    assert_eq!(direct_path(7, s), Ok(vec![]));
    assert_eq!(direct_path(15, s), Err(TreeMathError::NodeNotInTree));

    // Single leaf tree.
    assert_eq!(direct_path(0, size(1)), Ok(vec![]));
}

#[test]
fn test_copath() {
    let s = size(8);
    assert_eq!(copath(0, s), Ok(vec![2, 5, 11]));
    assert_eq!(copath(6, s), Ok(vec![4, 1, 11]));
    assert_eq!(copath(8, s), Ok(vec![10, 13, 3]));
    assert_eq!(copath(0, size(1)), Ok(vec![]));
}

#[test]
fn test_lowest_common_ancestor() {
    let lca = |x, y| lowest_common_ancestor(LeafNodeIndex::new(x), LeafNodeIndex::new(y));
    assert_eq!(lca(0, 1), 1);
    assert_eq!(lca(0, 2), 3);
    assert_eq!(lca(1, 3), 3);
    assert_eq!(lca(2, 3), 5);
    assert_eq!(lca(0, 4), 7);
    assert_eq!(lca(3, 7), 7);
    assert_eq!(lca(5, 5), 10);
}

#[test]
fn test_subtree_helpers() {
    assert!(in_subtree(3, 0));
    assert!(in_subtree(3, 6));
    assert!(in_subtree(3, 3));
    assert!(!in_subtree(3, 8));
    assert!(in_subtree(4, 4));
    assert!(!in_subtree(4, 6));
    assert!(!in_subtree(1, 3));
    assert!(!in_subtree(0, 1));

    let leaves: Vec<u32> = leaves_below(11).map(|l| l.u32()).collect();
    assert_eq!(leaves, vec![4, 5, 6, 7]);
    let leaves: Vec<u32> = leaves_below(6).map(|l| l.u32()).collect();
    assert_eq!(leaves, vec![3]);
}

#[test]
fn test_direct_path_ends_in_root() {
    for leaves in [1u32, 2, 4, 8, 16, 32] {
        let s = size(leaves);
        for leaf in 0..leaves {
            let node = LeafNodeIndex::new(leaf).to_node_index();
            let path = direct_path(node, s).expect("leaf is in tree");
            assert_eq!(path.last().copied().unwrap_or(node), root(s));
            let copath = copath(node, s).expect("leaf is in tree");
            assert_eq!(path.len(), copath.len());
        }
    }
}
