use crate::observation::params::DolloParams;
use crate::tree::tree::PhyloTree;

/// Normalization of the gain process when a character is observed as soon as it survives in any tip.
///
/// `losses[node]` is the loss probability along the branch above `node`, and `order` lists children
/// before parents. `u0` is scratch space for the probability that a character present at a node
/// reaches no leaf.
pub fn any_tip_log_tree_weight(
  tree: &dyn PhyloTree,
  order: &[usize],
  losses: &[f64],
  params: &DolloParams,
  average_rate: f64,
  u0: &mut Vec<f64>,
) -> f64 {
  u0.clear();
  u0.resize(tree.node_count(), 0.0);

  let mut weight = 0.0;
  for &node in order {
    let survival = 1.0 - losses[node];
    if tree.is_leaf(node) {
      u0[node] = 0.0;
      weight += 1.0 - survival;
    } else {
      u0[node] = tree
        .children(node)
        .iter()
        .map(|&child| 1.0 - (1.0 - losses[child]) * (1.0 - u0[child]))
        .product();
      weight += (1.0 - u0[node]) * (1.0 - survival);
    }
  }

  -weight * params.lambda / (average_rate * params.mu)
}

/// Normalization of the gain process when every character originates on the lineage of one taxon
pub fn single_tip_log_tree_weight(params: &DolloParams, average_rate: f64) -> f64 {
  -params.lambda / (average_rate * params.mu)
}

/// Contribution of the gain process to the log-likelihood of `total_weight` observed characters.
///
/// With the gain rate integrated out, `gamma_norm` is `-ln Γ(total_weight + 1)`. Without observations the
/// integrated term vanishes, while the direct term is the log-probability of gaining no observable character.
pub fn gain_rate_term(log_tree_weight: f64, params: &DolloParams, total_weight: u64, gamma_norm: f64) -> f64 {
  #[allow(clippy::cast_precision_loss)]
  let n = total_weight as f64;

  if params.integrate_gain_rate {
    if total_weight == 0 {
      return 0.0;
    }
    // Expected number of observable gains per unit gain rate
    let r = -log_tree_weight * params.mu / params.lambda;
    -(gamma_norm + n.ln() + r.ln() * n)
  } else if total_weight == 0 {
    // ln(lambda / mu) may be infinite here
    log_tree_weight
  } else {
    log_tree_weight + (params.lambda / params.mu).ln() * n
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::branch_rates::StrictClock;
  use crate::observation::survival::SurvivalModel;
  use crate::tree::examples::tests::{get_example_tree, get_two_leaf_tree};
  use crate::tree::post_order::post_order_traversal;
  use approx::{assert_abs_diff_eq, assert_ulps_eq};
  use eyre::Report;
  use rstest::rstest;
  use statrs::function::gamma::ln_gamma;

  fn params(mu: f64, lambda: f64, integrate_gain_rate: bool) -> DolloParams {
    DolloParams {
      mu,
      lambda,
      integrate_gain_rate,
    }
  }

  fn losses(tree: &dyn PhyloTree, mu: f64) -> Vec<f64> {
    let clock = StrictClock::default();
    let mut losses = vec![];
    SurvivalModel::new(tree, &clock, mu).loss_probabilities_into(1.0, &mut losses);
    losses
  }

  #[rstest]
  fn weighs_two_leaf_tree() -> Result<(), Report> {
    // (A:1,B:1):1
    let tree = get_two_leaf_tree()?;
    let order = post_order_traversal(&tree)?;
    let mu = 0.4;
    let losses = losses(&tree, mu);
    let p = 1.0 - (-mu).exp();

    // tips contribute their loss, the root is reached by a character unless both tips lose it
    let weight = 2.0 * p + (1.0 - p * p);
    let actual = any_tip_log_tree_weight(&tree, &order, &losses, &params(mu, 2.0, false), 1.5, &mut vec![]);
    assert_abs_diff_eq!(actual, -weight * 2.0 / (1.5 * mu), epsilon = 1e-12);
    Ok(())
  }

  #[rstest]
  fn weighs_nested_tree() -> Result<(), Report> {
    // ((A:0.1,B:0.2)E:0.3,(C:0.4,D:0.5)F:0.6)G
    let tree = get_example_tree()?;
    let order = post_order_traversal(&tree)?;
    let mu = 1.3;
    let losses = losses(&tree, mu);
    let loss = |t: f64| 1.0 - (-mu * t).exp();

    let u0_e = loss(0.1) * loss(0.2);
    let u0_f = loss(0.4) * loss(0.5);
    let u0_g = (1.0 - (1.0 - loss(0.3)) * (1.0 - u0_e)) * (1.0 - (1.0 - loss(0.6)) * (1.0 - u0_f));
    let weight = loss(0.1)
      + loss(0.2)
      + loss(0.4)
      + loss(0.5)
      + (1.0 - u0_e) * loss(0.3)
      + (1.0 - u0_f) * loss(0.6)
      + (1.0 - u0_g);

    let actual = any_tip_log_tree_weight(&tree, &order, &losses, &params(mu, 1.0, false), 1.0, &mut vec![]);
    assert_abs_diff_eq!(actual, -weight / mu, epsilon = 1e-12);
    Ok(())
  }

  #[rstest]
  fn approaches_minus_one_without_losses() -> Result<(), Report> {
    // Almost every character survives to the tips, and the only loss counted is at the root
    let tree = get_example_tree()?;
    let order = post_order_traversal(&tree)?;
    let mu = 1e-11;
    let losses = losses(&tree, mu);
    let actual = any_tip_log_tree_weight(&tree, &order, &losses, &params(mu, mu, true), 1.0, &mut vec![]);
    assert_abs_diff_eq!(actual, -1.0, epsilon = 1e-9);
    Ok(())
  }

  #[rstest]
  fn weighs_single_tip_origin() {
    assert_ulps_eq!(single_tip_log_tree_weight(&params(0.5, 2.0, false), 4.0), -1.0);
  }

  #[rstest]
  fn adds_gain_rate_directly() {
    let term = gain_rate_term(-3.0, &params(0.5, 2.0, false), 10, 0.0);
    assert_abs_diff_eq!(term, -3.0 + 4.0_f64.ln() * 10.0, epsilon = 1e-12);
  }

  #[rstest]
  fn integrates_gain_rate_out() {
    let n = 7_u64;
    let gamma_norm = -ln_gamma(8.0);
    let term = gain_rate_term(-3.0, &params(0.5, 2.0, true), n, gamma_norm);
    let r: f64 = 3.0 * 0.5 / 2.0;
    assert_abs_diff_eq!(term, -(gamma_norm + 7.0_f64.ln() + r.ln() * 7.0), epsilon = 1e-12);
  }

  #[rstest]
  fn keeps_tree_weight_without_observations() {
    assert_ulps_eq!(gain_rate_term(-3.0, &params(0.5, 2.0, false), 0, 0.0), -3.0);
    assert_ulps_eq!(gain_rate_term(-3.0, &params(0.5, 0.0, false), 0, 0.0), -3.0);
  }

  #[rstest]
  fn ignores_integrated_gain_process_without_observations() {
    assert_eq!(gain_rate_term(-3.0, &params(0.5, 2.0, true), 0, 0.0), 0.0);
  }
}
