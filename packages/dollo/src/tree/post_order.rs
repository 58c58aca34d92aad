use crate::make_error;
use crate::tree::tree::PhyloTree;
use eyre::Report;

/// Builds a visitation order in which every node appears after all of its children and the root comes last.
pub fn post_order_traversal(tree: &dyn PhyloTree) -> Result<Vec<usize>, Report> {
  let mut order = vec![0; tree.node_count()];
  post_order_traversal_into(tree, &mut order)?;
  Ok(order)
}

/// Same as [`post_order_traversal`], writing into a preallocated buffer of length `node_count`.
///
/// Slots are filled from the end: the root goes last, and the children of the node under the
/// output cursor are pushed below the fill cursor, so that the result is a reversed breadth-first order.
pub fn post_order_traversal_into(tree: &dyn PhyloTree, order: &mut [usize]) -> Result<(), Report> {
  let n_nodes = tree.node_count();
  if order.len() != n_nodes {
    return make_error!(
      "When building post-order traversal: buffer has length {}, but the tree has {n_nodes} nodes",
      order.len()
    );
  }
  if n_nodes == 0 {
    return make_error!("When building post-order traversal: the tree has no nodes");
  }

  let mut out = n_nodes - 1;
  let mut fill = n_nodes - 1;
  order[fill] = tree.root();

  while fill > 0 {
    if out < fill {
      return make_error!(
        "When building post-order traversal: only {} of {n_nodes} nodes are reachable from the root",
        n_nodes - fill
      );
    }

    let children = tree.children(order[out]);
    if children.len() > fill {
      return make_error!("When building post-order traversal: the tree has more reachable nodes than {n_nodes}");
    }

    for &child in children.iter().rev() {
      fill -= 1;
      order[fill] = child;
    }

    // out >= fill >= 1 here
    out -= 1;
  }

  Ok(())
}
