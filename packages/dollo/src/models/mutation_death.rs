use crate::alignment::patterns::{leaf_taxa, PatternSource};
use crate::make_error;
use crate::models::branch_rates::BranchRateModel;
use crate::models::partials::PartialsTable;
use crate::tree::post_order::post_order_traversal;
use crate::tree::tree::PhyloTree;
use eyre::{Report, WrapErr};
use ndarray::{Array2, Zip};

/// Felsenstein pruning under the mutation-death process.
///
/// Alive states persist along a branch and die at rate `death_rate`. The death state is absorbing.
/// Over a branch of operational time `t`:
///
/// ```text
/// P(a -> a)         = exp(-death_rate * t)
/// P(a -> death)     = 1 - exp(-death_rate * t)
/// P(a -> b), b != a = 0
/// P(death -> death) = 1
/// ```
#[derive(Copy, Clone, Debug)]
pub struct MutationDeathPruning {
  death_rate: f64,
}

impl MutationDeathPruning {
  pub fn new(death_rate: f64) -> Result<Self, Report> {
    if !death_rate.is_finite() || death_rate < 0.0 {
      return make_error!("When creating mutation-death process: death rate must be finite and non-negative, but found {death_rate}");
    }
    Ok(Self { death_rate })
  }

  pub fn death_rate(&self) -> f64 {
    self.death_rate
  }

  /// Computes the partials of every node
  pub fn partials(
    &self,
    tree: &dyn PhyloTree,
    patterns: &dyn PatternSource,
    branch_rates: &dyn BranchRateModel,
  ) -> Result<PartialsTable, Report> {
    let mut table = PartialsTable::zeros(tree.node_count(), patterns.pattern_count(), patterns.state_count());
    self.update_partials(tree, patterns, branch_rates, &mut table)?;
    Ok(table)
  }

  /// Recomputes the partials of every node into an existing table
  pub fn update_partials(
    &self,
    tree: &dyn PhyloTree,
    patterns: &dyn PatternSource,
    branch_rates: &dyn BranchRateModel,
    table: &mut PartialsTable,
  ) -> Result<(), Report> {
    let n_patterns = patterns.pattern_count();
    let n_states = patterns.state_count();
    let death = patterns.death_state();

    if table.dim() != (tree.node_count(), n_patterns, n_states) {
      return make_error!(
        "When computing partials: table has dimensions {:?}, but expected {:?}",
        table.dim(),
        (tree.node_count(), n_patterns, n_states)
      );
    }

    let taxa = leaf_taxa(tree, patterns).wrap_err("When computing partials")?;
    let order = post_order_traversal(tree).wrap_err("When computing partials")?;

    // Partials seen from the parent end of the branch above the current child
    let mut propagated = Array2::<f64>::zeros((n_patterns, n_states));

    for &node in &order {
      if tree.is_leaf(node) {
        let taxon = taxa[node];
        let mut partials = table.node_mut(node);
        partials.fill(0.0);
        for pattern in 0..n_patterns {
          for &state in patterns.states_for_code(patterns.code(taxon, pattern)) {
            partials[[pattern, state]] = 1.0;
          }
        }
        continue;
      }

      let mut product = Array2::<f64>::ones((n_patterns, n_states));
      for &child in tree.children(node) {
        let time = branch_rates.rate(child) * tree.branch_length(child);
        let survival = (-self.death_rate * time).exp();

        let child_partials = table.node(child);
        Zip::from(propagated.rows_mut())
          .and(child_partials.rows())
          .for_each(|mut out, below| {
            let dead_below = below[death];
            for state in 0..n_states {
              out[state] = if state == death {
                dead_below
              } else {
                survival * below[state] + (1.0 - survival) * dead_below
              };
            }
          });

        product *= &propagated;
      }

      table.node_mut(node).assign(&product);
    }

    Ok(())
  }
}
