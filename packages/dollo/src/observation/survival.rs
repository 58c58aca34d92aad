use crate::models::branch_rates::BranchRateModel;
use crate::tree::tree::PhyloTree;

/// Probability that a character present at the parent end of a branch is lost along it.
#[derive(Clone, Copy)]
pub struct SurvivalModel<'a> {
  tree: &'a dyn PhyloTree,
  branch_rates: &'a dyn BranchRateModel,
  mu: f64,
}

impl<'a> SurvivalModel<'a> {
  pub fn new(tree: &'a dyn PhyloTree, branch_rates: &'a dyn BranchRateModel, mu: f64) -> Self {
    Self { tree, branch_rates, mu }
  }

  /// Loss probability along the branch above `node`: `1 - exp(-mu * average_rate * branch_rate * length)`.
  ///
  /// The root has no branch above it and every character present there is counted as lost, so it returns 1.
  pub fn loss_probability(&self, node: usize, average_rate: f64) -> f64 {
    if self.tree.is_root(node) {
      return 1.0;
    }

    let death_rate = self.mu * average_rate;
    let branch_time = self.branch_rates.rate(node) * self.tree.branch_length(node);
    let x = death_rate * branch_time;
    if x == 0.0 {
      return 0.0;
    }
    -(-x).exp_m1()
  }

  /// Loss probabilities of all nodes, indexed by node
  pub fn loss_probabilities_into(&self, average_rate: f64, out: &mut Vec<f64>) {
    out.clear();
    out.extend((0..self.tree.node_count()).map(|node| self.loss_probability(node, average_rate)));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::branch_rates::{PerBranchRates, StrictClock};
  use crate::tree::examples::tests::get_example_tree;
  use crate::tree::tree::ParentTree;
  use approx::{assert_abs_diff_eq, assert_ulps_eq};
  use eyre::Report;
  use rstest::rstest;

  #[rstest]
  fn root_loses_everything() -> Result<(), Report> {
    let tree = get_example_tree()?;
    let clock = StrictClock::default();
    for mu in [0.0, 1e-11, 1.0, 100.0] {
      assert_ulps_eq!(SurvivalModel::new(&tree, &clock, mu).loss_probability(6, 1.0), 1.0);
    }
    Ok(())
  }

  #[rstest]
  fn matches_exponential_decay() -> Result<(), Report> {
    // ((A:0.1,B:0.2)E:0.3,(C:0.4,D:0.5)F:0.6)G
    let tree = get_example_tree()?;
    let rates = PerBranchRates::new(vec![1.0, 3.0, 1.0, 1.0, 1.0, 1.0, 1.0])?;
    let model = SurvivalModel::new(&tree, &rates, 0.8);
    assert_abs_diff_eq!(model.loss_probability(0, 1.5), 1.0 - (-0.8 * 1.5 * 0.1_f64).exp(), epsilon = 1e-15);
    assert_abs_diff_eq!(model.loss_probability(1, 1.5), 1.0 - (-0.8 * 1.5 * 3.0 * 0.2_f64).exp(), epsilon = 1e-15);
    Ok(())
  }

  #[rstest]
  fn is_exactly_zero_without_losses() -> Result<(), Report> {
    let tree = ParentTree::from_leaf_names(vec![Some(2), Some(2), None], vec![0.0, 1.0, 0.0], &["A", "B"])?;
    let clock = StrictClock::default();
    assert_eq!(SurvivalModel::new(&tree, &clock, 1.0).loss_probability(0, 1.0), 0.0);
    assert_eq!(SurvivalModel::new(&tree, &clock, 0.0).loss_probability(1, 1.0), 0.0);
    assert!(SurvivalModel::new(&tree, &clock, 1e-300).loss_probability(1, 1.0) > 0.0);
    Ok(())
  }

  #[rstest]
  fn increases_with_rate_and_length() -> Result<(), Report> {
    let tree = get_example_tree()?;
    let clock = StrictClock::default();

    let mut previous = 0.0;
    for mu in [1e-12, 1e-6, 0.01, 0.5, 1.0, 5.0, 50.0] {
      let loss = SurvivalModel::new(&tree, &clock, mu).loss_probability(3, 1.0);
      assert!(loss > previous, "mu = {mu}: {loss} <= {previous}");
      assert!(loss <= 1.0);
      previous = loss;
    }

    let model = SurvivalModel::new(&tree, &clock, 1.0);
    let mut losses = vec![];
    model.loss_probabilities_into(1.0, &mut losses);
    // branch lengths 0.1 < 0.2 < 0.3 < 0.4 < 0.5 < 0.6 at nodes 0, 1, 4, 2, 3, 5
    for (shorter, longer) in [(0, 1), (1, 4), (4, 2), (2, 3), (3, 5)] {
      assert!(losses[shorter] < losses[longer]);
    }
    assert!(model.loss_probability(0, 1.0) < model.loss_probability(0, 2.0));
    assert_eq!(losses.len(), 7);
    assert_ulps_eq!(losses[6], 1.0);
    Ok(())
  }
}
