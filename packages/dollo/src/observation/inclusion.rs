use crate::alignment::patterns::PatternSource;
use crate::make_error;
use crate::tree::tree::PhyloTree;
use eyre::Report;
use ndarray::{Array1, Array2, Axis, Zip};

/// Decides per (node, pattern) whether the subtree below the node holds every tip in which the
/// character is extant.
///
/// Tip counts depend only on the data and are computed once. Internal counts are recomputed from the
/// children when the topology changes.
#[derive(Clone, Debug)]
pub struct PatternInclusion {
  leaf_count: usize,

  /// Number of tips with the character extant, per pattern
  extant_in_tips: Array1<u32>,

  /// Number of tips with the character extant below each node, per pattern
  extant_below: Array2<u32>,

  mask: Array2<bool>,
  stored_mask: Array2<bool>,
}

impl PatternInclusion {
  /// `leaf_taxa[leaf]` is the row of `patterns` observed at each leaf of `tree`.
  pub fn new(tree: &dyn PhyloTree, patterns: &dyn PatternSource, leaf_taxa: &[usize]) -> Result<Self, Report> {
    let n_nodes = tree.node_count();
    let n_leaves = tree.leaf_count();
    let n_patterns = patterns.pattern_count();

    if leaf_taxa.len() != n_leaves {
      return make_error!(
        "When computing pattern inclusion: expected a taxon for each of {n_leaves} leaves, but found {}",
        leaf_taxa.len()
      );
    }

    let mut extant_below = Array2::<u32>::zeros((n_nodes, n_patterns));
    for (leaf, &taxon) in leaf_taxa.iter().enumerate() {
      for pattern in 0..n_patterns {
        extant_below[[leaf, pattern]] = u32::from(!patterns.may_be_absent(taxon, pattern));
      }
    }

    let extant_in_tips = extant_below.slice(ndarray::s![..n_leaves, ..]).sum_axis(Axis(0));

    let mask = Array2::from_elem((n_nodes, n_patterns), false);
    let stored_mask = mask.clone();

    Ok(Self {
      leaf_count: n_leaves,
      extant_in_tips,
      extant_below,
      mask,
      stored_mask,
    })
  }

  /// Recomputes the counts of internal nodes and the mask. `order` must list children before parents.
  pub fn recompute(&mut self, tree: &dyn PhyloTree, order: &[usize]) -> Result<(), Report> {
    let (n_nodes, n_patterns) = self.extant_below.dim();
    if tree.node_count() != n_nodes || tree.leaf_count() != self.leaf_count || order.len() != n_nodes {
      return make_error!(
        "When recomputing pattern inclusion: expected {n_nodes} nodes of which {} leaves, but the tree has {} nodes of which {} leaves, and the traversal has {} nodes",
        self.leaf_count,
        tree.node_count(),
        tree.leaf_count(),
        order.len()
      );
    }

    let mut counts = Array1::<u32>::zeros(n_patterns);
    for &node in order {
      if !tree.is_leaf(node) {
        counts.fill(0);
        for &child in tree.children(node) {
          counts += &self.extant_below.row(child);
        }
        self.extant_below.row_mut(node).assign(&counts);
      }

      Zip::from(self.mask.row_mut(node))
        .and(self.extant_below.row(node))
        .and(&self.extant_in_tips)
        .for_each(|included, &below, &total| *included = below >= total);
    }

    Ok(())
  }

  #[inline]
  pub fn is_included(&self, node: usize, pattern: usize) -> bool {
    self.mask[[node, pattern]]
  }

  pub fn mask(&self) -> &Array2<bool> {
    &self.mask
  }

  pub fn extant_in_tips(&self) -> &Array1<u32> {
    &self.extant_in_tips
  }

  pub fn extant_below(&self) -> &Array2<u32> {
    &self.extant_below
  }

  /// Copies the mask into the snapshot buffer
  pub fn store(&mut self) {
    self.stored_mask.assign(&self.mask);
  }

  /// Brings back the mask saved by the last [`store`](Self::store)
  pub fn restore(&mut self) {
    std::mem::swap(&mut self.mask, &mut self.stored_mask);
  }
}
