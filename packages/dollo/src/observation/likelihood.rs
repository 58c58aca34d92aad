use crate::alignment::patterns::{leaf_taxa, PatternSource};
use crate::models::branch_rates::BranchRateModel;
use crate::models::partials::{NodePartials, PartialsBackend};
use crate::models::site_model::SiteRateModel;
use crate::observation::cache::{ModelChanges, RecomputationCache, RecomputeCounts};
use crate::observation::inclusion::PatternInclusion;
use crate::observation::params::{DolloParams, ObservationProcessConfig};
use crate::observation::process::ObservationProcess;
use crate::observation::survival::SurvivalModel;
use crate::observation::tree_weight::gain_rate_term;
use crate::tree::post_order::post_order_traversal_into;
use crate::tree::tree::PhyloTree;
use crate::{make_error, make_internal_error};
use eyre::{Report, WrapErr};
use log::{debug, trace};
use ndarray::Array2;
use statrs::function::gamma::ln_gamma;

/// Collaborators consulted during one evaluation.
#[derive(Clone, Copy)]
pub struct EvaluationContext<'a> {
  pub tree: &'a dyn PhyloTree,
  pub site_model: &'a dyn SiteRateModel,
  pub branch_rates: &'a dyn BranchRateModel,
  pub partials: &'a dyn NodePartials,
}

/// Likelihood of presence/absence data under the stochastic Dollo process, conditioned on the
/// characters being observed.
///
/// Quantities which only depend on some of the inputs (traversal, inclusion mask, average rate,
/// tree weight) are cached and recomputed after [`requires_recalculation`](Self::requires_recalculation)
/// reports a change they depend on. [`store`](Self::store) and [`restore`](Self::restore) take
/// and bring back a snapshot around a proposal which may be rejected.
pub struct ObservationProcessLikelihood {
  process: ObservationProcess,
  params: DolloParams,

  node_count: usize,
  leaf_count: usize,
  pattern_count: usize,
  state_count: usize,

  weights: Vec<u32>,
  excluded: Vec<usize>,
  total_weight: u64,
  gamma_norm: f64,

  cache: RecomputationCache,
  post_order: Vec<usize>,
  inclusion: PatternInclusion,
  average_rate: f64,
  log_tree_weight: f64,

  stored: StoredState,

  losses: Vec<f64>,
  u0: Vec<f64>,
  node_partials: Vec<f64>,
  pattern_likelihoods: Vec<f64>,
}

#[derive(Clone, Debug)]
struct StoredState {
  params: DolloParams,
  post_order: Vec<usize>,
  post_order_known: bool,
  inclusion_known: bool,
  log_tree_weight: f64,
  weight_known: bool,
}

impl ObservationProcessLikelihood {
  pub fn new(
    config: ObservationProcessConfig,
    tree: &dyn PhyloTree,
    patterns: &dyn PatternSource,
  ) -> Result<Self, Report> {
    let ObservationProcessConfig { params, process } = config;

    params
      .validate()
      .wrap_err("When creating observation process likelihood")?;

    process
      .check_data(tree, patterns)
      .wrap_err_with(|| format!("When creating {process} observation process likelihood"))?;

    let taxa = leaf_taxa(tree, patterns).wrap_err("When creating observation process likelihood")?;
    let inclusion = PatternInclusion::new(tree, patterns, &taxa)?;

    let node_count = tree.node_count();
    let pattern_count = patterns.pattern_count();
    let state_count = patterns.state_count();
    let total_weight = patterns.total_weight();

    #[allow(clippy::cast_precision_loss)]
    let gamma_norm = -ln_gamma(total_weight as f64 + 1.0);

    debug!(
      "Created {process} observation process likelihood for {node_count} nodes and {pattern_count} patterns of total weight {total_weight}"
    );

    Ok(Self {
      process,
      params,
      node_count,
      leaf_count: tree.leaf_count(),
      pattern_count,
      state_count,
      weights: patterns.weights().to_vec(),
      excluded: patterns.excluded_patterns().to_vec(),
      total_weight,
      gamma_norm,
      cache: RecomputationCache::default(),
      post_order: vec![0; node_count],
      inclusion,
      average_rate: 0.0,
      log_tree_weight: 0.0,
      stored: StoredState {
        params,
        post_order: vec![0; node_count],
        post_order_known: false,
        inclusion_known: false,
        log_tree_weight: 0.0,
        weight_known: false,
      },
      losses: Vec::with_capacity(node_count),
      u0: Vec::with_capacity(node_count),
      node_partials: vec![0.0; pattern_count * state_count],
      pattern_likelihoods: vec![0.0; pattern_count],
    })
  }

  /// Total log-likelihood of the data.
  ///
  /// Returns negative infinity when the parameters make the data impossible.
  pub fn log_likelihood(&mut self, ctx: &EvaluationContext) -> Result<f64, Report> {
    self.check_context(ctx)?;

    self.ensure_inclusion(ctx.tree)?;
    let average_rate = self.average_rate(ctx.site_model)?;
    self.update_losses(ctx, average_rate);
    let log_tree_weight = self.ensure_log_tree_weight(ctx.tree, average_rate);

    let frequencies = ctx.site_model.frequencies();
    self.pattern_likelihoods.fill(0.0);

    for node in 0..self.node_count {
      let loss = self.losses[node];
      if loss == 0.0 {
        continue;
      }

      ctx
        .partials
        .node_partials(node, &mut self.node_partials)
        .wrap_err_with(|| format!("When reading partials of node {node}"))?;

      for (pattern, (likelihood, partials)) in self
        .pattern_likelihoods
        .iter_mut()
        .zip(self.node_partials.chunks_exact(self.state_count))
        .enumerate()
      {
        if self.inclusion.is_included(node, pattern) {
          let site_likelihood: f64 = partials.iter().zip(frequencies).map(|(p, f)| f * p).sum();
          *likelihood += site_likelihood * loss;
        }
      }
    }

    let excluded_likelihood: f64 = self.excluded.iter().map(|&pattern| self.pattern_likelihoods[pattern]).sum();
    let correction = 1.0 - excluded_likelihood;
    if correction <= 0.0 || correction.is_nan() {
      debug!("Ascertainment correction is not positive ({correction}): unobservable patterns take up all probability");
      return Ok(f64::NEG_INFINITY);
    }

    let mut log_likelihood = self.gamma_norm;
    for (pattern, (&likelihood, &weight)) in self.pattern_likelihoods.iter().zip(&self.weights).enumerate() {
      if weight == 0 {
        continue;
      }

      let corrected = likelihood / correction;
      if corrected <= 0.0 || corrected.is_nan() {
        trace!("Pattern {pattern} has likelihood {likelihood}, the data is impossible under current parameters");
        return Ok(f64::NEG_INFINITY);
      }

      log_likelihood += corrected.ln() * f64::from(weight);
    }

    log_likelihood += gain_rate_term(log_tree_weight, &self.params, self.total_weight, self.gamma_norm);

    trace!("Log-likelihood: {log_likelihood} (log tree weight: {log_tree_weight}, correction: {correction})");
    Ok(log_likelihood)
  }

  /// Log of the normalization of the gain process, recomputed if stale.
  pub fn log_tree_weight(&mut self, ctx: &EvaluationContext) -> Result<f64, Report> {
    if !self.cache.weight_known() {
      self.check_tree(ctx.tree)?;
      self.check_branch_rates(ctx.branch_rates)?;
      self.ensure_post_order(ctx.tree)?;
      let average_rate = self.average_rate(ctx.site_model)?;
      self.update_losses(ctx, average_rate);
      self.ensure_log_tree_weight(ctx.tree, average_rate);
    }
    Ok(self.log_tree_weight)
  }

  /// Rate of the site model averaged over its categories, recomputed if stale.
  pub fn average_rate(&mut self, site_model: &dyn SiteRateModel) -> Result<f64, Report> {
    if !self.cache.average_rate_known() {
      let average_rate = site_model.average_rate();
      if !average_rate.is_finite() || average_rate <= 0.0 {
        return make_error!("Average rate of the site model must be positive and finite, but found {average_rate}");
      }
      self.average_rate = average_rate;
      self.cache.average_rate_computed();
      debug!("Recomputed average rate: {average_rate}");
    }
    Ok(self.average_rate)
  }

  /// Marks stale whatever depends on the changed inputs. Returns whether the likelihood needs to be evaluated again.
  pub fn requires_recalculation(&mut self, changes: &ModelChanges) -> bool {
    trace!("Model changes: {changes}");
    self.cache.invalidate(changes);
    !changes.is_empty()
  }

  /// Takes a snapshot of the state, to be brought back by [`restore`](Self::restore).
  pub fn store(&mut self) {
    self.inclusion.store();
    self.stored.params = self.params;
    self.stored.post_order.copy_from_slice(&self.post_order);
    self.stored.post_order_known = self.cache.post_order_known();
    self.stored.inclusion_known = self.cache.inclusion_known();
    self.stored.log_tree_weight = self.log_tree_weight;
    self.stored.weight_known = self.cache.weight_known();
  }

  /// Brings back the state saved by the last [`store`](Self::store). The average rate is recomputed on next use.
  pub fn restore(&mut self) {
    self.inclusion.restore();
    std::mem::swap(&mut self.post_order, &mut self.stored.post_order);
    self.params = self.stored.params;
    self.log_tree_weight = self.stored.log_tree_weight;
    self
      .cache
      .restore(self.stored.post_order_known, self.stored.inclusion_known, self.stored.weight_known);
    self.cache.invalidate_average_rate();
  }

  pub fn params(&self) -> &DolloParams {
    &self.params
  }

  pub fn process(&self) -> &ObservationProcess {
    &self.process
  }

  pub fn mu(&self) -> f64 {
    self.params.mu
  }

  pub fn lambda(&self) -> f64 {
    self.params.lambda
  }

  pub fn integrate_gain_rate(&self) -> bool {
    self.params.integrate_gain_rate
  }

  pub fn set_mu(&mut self, mu: f64) -> Result<(), Report> {
    self.set_params(DolloParams { mu, ..self.params }).wrap_err("When setting loss rate")?;
    self.cache.invalidate(&ModelChanges {
      mu: true,
      ..ModelChanges::default()
    });
    Ok(())
  }

  pub fn set_lambda(&mut self, lambda: f64) -> Result<(), Report> {
    self
      .set_params(DolloParams { lambda, ..self.params })
      .wrap_err("When setting gain rate")?;
    self.cache.invalidate(&ModelChanges {
      lambda: true,
      ..ModelChanges::default()
    });
    Ok(())
  }

  pub fn set_integrate_gain_rate(&mut self, integrate_gain_rate: bool) -> Result<(), Report> {
    self
      .set_params(DolloParams {
        integrate_gain_rate,
        ..self.params
      })
      .wrap_err("When switching gain rate integration")
  }

  fn set_params(&mut self, params: DolloParams) -> Result<(), Report> {
    params.validate()?;
    self.params = params;
    Ok(())
  }

  /// Node × pattern inclusion mask as of the last recomputation
  pub fn inclusion_mask(&self) -> &Array2<bool> {
    self.inclusion.mask()
  }

  /// Post-order traversal as of the last rebuild
  pub fn post_order(&self) -> &[usize] {
    &self.post_order
  }

  /// Per-pattern likelihoods of the last evaluation, before ascertainment correction
  pub fn pattern_likelihoods(&self) -> &[f64] {
    &self.pattern_likelihoods
  }

  pub fn gamma_norm(&self) -> f64 {
    self.gamma_norm
  }

  pub fn recompute_counts(&self) -> RecomputeCounts {
    self.cache.counts()
  }

  fn update_losses(&mut self, ctx: &EvaluationContext, average_rate: f64) {
    SurvivalModel::new(ctx.tree, ctx.branch_rates, self.params.mu).loss_probabilities_into(average_rate, &mut self.losses);
  }

  /// Expects the post order and the losses to be current
  fn ensure_log_tree_weight(&mut self, tree: &dyn PhyloTree, average_rate: f64) -> f64 {
    if !self.cache.weight_known() {
      self.log_tree_weight = self.process.log_tree_weight(
        tree,
        &self.post_order,
        &self.losses,
        &self.params,
        average_rate,
        &mut self.u0,
      );
      self.cache.weight_computed();
      debug!("Recomputed log tree weight: {}", self.log_tree_weight);
    }
    self.log_tree_weight
  }

  fn ensure_post_order(&mut self, tree: &dyn PhyloTree) -> Result<(), Report> {
    if !self.cache.post_order_known() {
      post_order_traversal_into(tree, &mut self.post_order).wrap_err("When updating post-order traversal")?;
      self.cache.post_order_computed();
      debug!("Rebuilt post-order traversal of {} nodes", self.post_order.len());
    }
    Ok(())
  }

  fn ensure_inclusion(&mut self, tree: &dyn PhyloTree) -> Result<(), Report> {
    self.ensure_post_order(tree)?;
    if !self.cache.inclusion_known() {
      self
        .inclusion
        .recompute(tree, &self.post_order)
        .wrap_err("When updating pattern inclusion")?;
      self.cache.inclusion_computed();
      debug!("Recomputed pattern inclusion mask");
    }
    Ok(())
  }

  fn check_tree(&self, tree: &dyn PhyloTree) -> Result<(), Report> {
    if tree.node_count() != self.node_count || tree.leaf_count() != self.leaf_count {
      return make_error!(
        "Expected a tree of {} nodes of which {} leaves, but found {} nodes of which {} leaves",
        self.node_count,
        self.leaf_count,
        tree.node_count(),
        tree.leaf_count()
      );
    }
    Ok(())
  }

  fn check_branch_rates(&self, branch_rates: &dyn BranchRateModel) -> Result<(), Report> {
    match branch_rates.branch_count() {
      Some(n_branches) if n_branches != self.node_count => make_error!(
        "Expected a branch rate for each of {} nodes, but found {n_branches}",
        self.node_count
      ),
      _ => Ok(()),
    }
  }

  fn check_context(&self, ctx: &EvaluationContext) -> Result<(), Report> {
    let partials = ctx.partials;

    if partials.backend() != PartialsBackend::Cpu {
      return make_internal_error!(
        "Observation process likelihood cannot read partials from the '{}' backend",
        partials.backend()
      );
    }

    self.check_tree(ctx.tree)?;
    self.check_branch_rates(ctx.branch_rates)?;

    if partials.node_count() != self.node_count
      || partials.pattern_count() != self.pattern_count
      || partials.state_count() != self.state_count
    {
      return make_error!(
        "Expected partials for {} nodes, {} patterns and {} states, but found {} nodes, {} patterns and {} states",
        self.node_count,
        self.pattern_count,
        self.state_count,
        partials.node_count(),
        partials.pattern_count(),
        partials.state_count()
      );
    }

    let n_frequencies = ctx.site_model.frequencies().len();
    if n_frequencies != self.state_count {
      return make_error!(
        "Expected {} state frequencies, but the site model has {n_frequencies}",
        self.state_count
      );
    }

    Ok(())
  }
}
