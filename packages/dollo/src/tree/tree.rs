use crate::utils::string::quote;
use crate::{make_error, make_report};
use eyre::Report;
use getset::Getters;
use itertools::Itertools;

/// Read-only view of a rooted phylogenetic tree.
///
/// Node keys are dense in `[0, node_count)`. Leaves occupy `[0, leaf_count)`, internal nodes and
/// the root occupy the remainder.
pub trait PhyloTree {
  fn node_count(&self) -> usize;

  fn leaf_count(&self) -> usize;

  fn root(&self) -> usize;

  fn parent(&self, node: usize) -> Option<usize>;

  fn children(&self, node: usize) -> &[usize];

  /// Length of the branch leading to `node` from its parent
  fn branch_length(&self, node: usize) -> f64;

  fn name(&self, node: usize) -> Option<&str>;

  #[inline]
  fn is_leaf(&self, node: usize) -> bool {
    node < self.leaf_count()
  }

  #[inline]
  fn is_root(&self, node: usize) -> bool {
    self.parent(node).is_none()
  }
}

/// Tree stored as a parent array with per-node branch lengths and names.
#[derive(Clone, Debug, Getters)]
pub struct ParentTree {
  #[getset(get = "pub")]
  parents: Vec<Option<usize>>,

  #[getset(get = "pub")]
  branch_lengths: Vec<f64>,

  names: Vec<Option<String>>,
  children: Vec<Vec<usize>>,
  leaf_count: usize,
  root: usize,
}

impl ParentTree {
  /// Builds a tree from per-node parent keys (`None` for the root), branch lengths and names.
  ///
  /// Nodes without children must come first, such that leaves occupy keys `[0, leaf_count)`.
  pub fn from_parents(
    parents: Vec<Option<usize>>,
    branch_lengths: Vec<f64>,
    names: Vec<Option<String>>,
  ) -> Result<Self, Report> {
    let n_nodes = parents.len();

    if n_nodes == 0 {
      return make_error!("When building tree: the tree has no nodes");
    }

    if branch_lengths.len() != n_nodes || names.len() != n_nodes {
      return make_error!(
        "When building tree: expected {n_nodes} branch lengths and names, but found {} branch lengths and {} names",
        branch_lengths.len(),
        names.len()
      );
    }

    if let Some((node, length)) = branch_lengths
      .iter()
      .enumerate()
      .find(|(_, length)| !length.is_finite() || **length < 0.0)
    {
      return make_error!("When building tree: branch length of node {node} is invalid: {length}");
    }

    let roots = parents
      .iter()
      .enumerate()
      .filter_map(|(node, parent)| parent.is_none().then_some(node))
      .collect_vec();

    let root = match roots.as_slice() {
      [root] => *root,
      [] => return make_error!("When building tree: no root found (no node without a parent)"),
      _ => return make_error!("When building tree: multiple roots found: {}", roots.iter().join(", ")),
    };

    let children = build_children(&parents)?;

    let leaf_count = children.iter().take_while(|c| c.is_empty()).count();
    if let Some(leaf) = children.iter().skip(leaf_count).position(Vec::is_empty) {
      return make_error!(
        "When building tree: node {} has no children, but leaves are expected to occupy the first {leaf_count} keys",
        leaf + leaf_count
      );
    }

    let tree = Self {
      parents,
      branch_lengths,
      names,
      children,
      leaf_count,
      root,
    };

    tree.ensure_connected()?;

    Ok(tree)
  }

  /// Builds a tree where only leaves are named.
  pub fn from_leaf_names<S: AsRef<str>>(
    parents: Vec<Option<usize>>,
    branch_lengths: Vec<f64>,
    leaf_names: &[S],
  ) -> Result<Self, Report> {
    let names = (0..parents.len())
      .map(|node| leaf_names.get(node).map(|name| name.as_ref().to_owned()))
      .collect_vec();
    Self::from_parents(parents, branch_lengths, names)
  }

  pub fn set_branch_length(&mut self, node: usize, length: f64) -> Result<(), Report> {
    if !length.is_finite() || length < 0.0 {
      return make_error!("When setting branch length of node {node}: invalid length {length}");
    }
    let slot = self
      .branch_lengths
      .get_mut(node)
      .ok_or_else(|| make_report!("When setting branch length: node {node} not found"))?;
    *slot = length;
    Ok(())
  }

  /// Detaches `node` from its parent and attaches it to `new_parent`.
  ///
  /// Fails, leaving the tree unchanged, when the move would create a cycle, detach the root, or
  /// turn an internal node into a leaf.
  pub fn set_parent(&mut self, node: usize, new_parent: usize) -> Result<(), Report> {
    let n_nodes = self.node_count();
    if node >= n_nodes || new_parent >= n_nodes {
      return make_error!("When re-parenting node {node} to {new_parent}: node not found");
    }

    let Some(old_parent) = self.parents[node] else {
      return make_error!("When re-parenting node {node}: the root cannot be moved");
    };

    if old_parent == new_parent {
      return Ok(());
    }

    if self.is_leaf(new_parent) {
      return make_error!("When re-parenting node {node}: new parent {new_parent} is a leaf");
    }

    if self.children[old_parent].len() == 1 {
      return make_error!("When re-parenting node {node}: parent {old_parent} would become a leaf");
    }

    let mut ancestor = Some(new_parent);
    while let Some(current) = ancestor {
      if current == node {
        return make_error!("When re-parenting node {node}: {new_parent} is a descendant of {node}");
      }
      ancestor = self.parents[current];
    }

    self.children[old_parent].retain(|&child| child != node);
    self.children[new_parent].push(node);
    self.parents[node] = Some(new_parent);
    Ok(())
  }

  pub fn find_by_name(&self, name: &str) -> Option<usize> {
    self.names.iter().position(|n| n.as_deref() == Some(name))
  }

  fn ensure_connected(&self) -> Result<(), Report> {
    let mut seen = vec![false; self.node_count()];
    let mut stack = vec![self.root];
    while let Some(node) = stack.pop() {
      if seen[node] {
        return make_error!("When building tree: node {node} is reachable through more than one path");
      }
      seen[node] = true;
      stack.extend_from_slice(&self.children[node]);
    }

    let unreachable = seen
      .iter()
      .enumerate()
      .filter_map(|(node, seen)| (!seen).then(|| self.names[node].as_deref().map_or(node.to_string(), quote)))
      .collect_vec();

    if !unreachable.is_empty() {
      return make_error!(
        "When building tree: nodes not reachable from the root: {}",
        unreachable.iter().join(", ")
      );
    }

    Ok(())
  }
}

fn build_children(parents: &[Option<usize>]) -> Result<Vec<Vec<usize>>, Report> {
  let n_nodes = parents.len();
  let mut children = vec![vec![]; n_nodes];
  for (node, parent) in parents.iter().enumerate() {
    match *parent {
      Some(parent) if parent >= n_nodes => {
        return make_error!("When building tree: parent {parent} of node {node} not found");
      }
      Some(parent) if parent == node => {
        return make_error!("When building tree: node {node} is its own parent");
      }
      Some(parent) => children[parent].push(node),
      None => {}
    }
  }
  Ok(children)
}

impl PhyloTree for ParentTree {
  #[inline]
  fn node_count(&self) -> usize {
    self.parents.len()
  }

  #[inline]
  fn leaf_count(&self) -> usize {
    self.leaf_count
  }

  #[inline]
  fn root(&self) -> usize {
    self.root
  }

  #[inline]
  fn parent(&self, node: usize) -> Option<usize> {
    self.parents[node]
  }

  #[inline]
  fn children(&self, node: usize) -> &[usize] {
    &self.children[node]
  }

  #[inline]
  fn branch_length(&self, node: usize) -> f64 {
    self.branch_lengths[node]
  }

  #[inline]
  fn name(&self, node: usize) -> Option<&str> {
    self.names[node].as_deref()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::tree::examples::tests::{get_example_tree, get_two_leaf_tree};
  use crate::utils::error::report_to_string;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn builds_two_leaf_tree() -> Result<(), Report> {
    let tree = get_two_leaf_tree()?;
    assert_eq!(tree.node_count(), 3);
    assert_eq!(tree.leaf_count(), 2);
    assert_eq!(tree.root(), 2);
    assert_eq!(tree.children(2), &[0, 1]);
    assert_eq!(tree.parent(0), Some(2));
    assert_eq!(tree.name(1), Some("B"));
    assert!(tree.is_root(2));
    assert!(tree.is_leaf(1));
    assert!(!tree.is_leaf(2));
    Ok(())
  }

  #[rstest]
  fn rejects_multiple_roots() {
    let result = ParentTree::from_leaf_names(vec![Some(2), None, None], vec![1.0; 3], &["A", "B"]);
    let message = report_to_string(&result.unwrap_err());
    assert!(message.contains("multiple roots"), "{message}");
  }

  #[rstest]
  fn rejects_internal_node_before_leaf() {
    // node 0 is internal while node 1 is a leaf
    let result = ParentTree::from_leaf_names(vec![Some(3), Some(0), Some(3), None], vec![1.0; 4], &["A", "B"]);
    assert!(result.is_err());
  }

  #[rstest]
  fn rejects_cycles() {
    // 2 -> 3 -> 2 is detached from the root 4
    let result = ParentTree::from_leaf_names(
      vec![Some(2), Some(4), Some(3), Some(2), None],
      vec![1.0; 5],
      &["A", "B"],
    );
    let message = report_to_string(&result.unwrap_err());
    assert!(message.contains("not reachable"), "{message}");
  }

  #[rstest]
  fn rejects_negative_branch_length() {
    let result = ParentTree::from_leaf_names(vec![Some(2), Some(2), None], vec![1.0, -0.5, 0.0], &["A", "B"]);
    assert!(result.is_err());
  }

  #[rstest]
  fn moves_subtree_to_new_parent() -> Result<(), Report> {
    // ((A,B)4,(C,D)5)6
    let mut tree = get_example_tree()?;
    tree.set_parent(2, 4)?;
    assert_eq!(tree.children(4), &[0, 1, 2]);
    assert_eq!(tree.children(5), &[3]);
    assert_eq!(tree.parent(2), Some(4));
    Ok(())
  }

  #[rstest]
  fn refuses_moves_creating_cycles() -> Result<(), Report> {
    let mut tree = get_example_tree()?;
    let before = tree.parents().clone();
    assert!(tree.set_parent(4, 4).is_err());
    assert!(tree.set_parent(6, 4).is_err());
    assert!(tree.set_parent(4, 0).is_err());
    assert_eq!(tree.parents(), &before);
    Ok(())
  }

  #[rstest]
  fn finds_nodes_by_name() -> Result<(), Report> {
    let tree = get_example_tree()?;
    assert_eq!(tree.find_by_name("C"), Some(2));
    assert_eq!(tree.find_by_name("Z"), None);
    Ok(())
  }
}
