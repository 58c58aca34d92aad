use getset::CopyGetters;
use std::fmt::{Display, Formatter};

/// What happened to the tree since the last evaluation
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum TreeChange {
  #[default]
  Unchanged,
  BranchLengths,
  Topology,
}

/// Change signals delivered by the inference framework between evaluations.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelChanges {
  pub mu: bool,
  pub lambda: bool,
  pub site_model: bool,
  pub branch_rates: bool,
  pub tree: TreeChange,
}

impl ModelChanges {
  pub fn everything() -> Self {
    Self {
      mu: true,
      lambda: true,
      site_model: true,
      branch_rates: true,
      tree: TreeChange::Topology,
    }
  }

  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }
}

impl Display for ModelChanges {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    let Self {
      mu,
      lambda,
      site_model,
      branch_rates,
      tree,
    } = self;
    write!(
      f,
      "mu: {mu}, lambda: {lambda}, site model: {site_model}, branch rates: {branch_rates}, tree: {tree:?}"
    )
  }
}

/// How many times each cached quantity was recomputed
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct RecomputeCounts {
  pub post_order: usize,
  pub average_rate: usize,
  pub inclusion: usize,
  pub weight: usize,
}

/// Validity flags of the quantities cached between evaluations.
///
/// A quantity is recomputed once on the first read after it was invalidated. Reads never invalidate.
#[derive(Copy, Clone, Debug, Default, CopyGetters)]
#[getset(get_copy = "pub")]
pub struct RecomputationCache {
  post_order_known: bool,
  average_rate_known: bool,
  inclusion_known: bool,
  weight_known: bool,
  counts: RecomputeCounts,
}

impl RecomputationCache {
  /// Marks stale every quantity which depends on something that changed.
  pub fn invalidate(&mut self, changes: &ModelChanges) {
    let ModelChanges {
      mu,
      lambda,
      site_model,
      branch_rates,
      tree,
    } = *changes;

    let topology = tree == TreeChange::Topology;
    let tree_changed = tree != TreeChange::Unchanged;

    if topology {
      self.post_order_known = false;
      self.inclusion_known = false;
    }

    if mu {
      self.average_rate_known = false;
      self.inclusion_known = false;
    }

    if site_model {
      self.average_rate_known = false;
    }

    if tree_changed || mu || lambda || site_model || branch_rates {
      self.weight_known = false;
    }
  }

  pub fn invalidate_all(&mut self) {
    self.invalidate(&ModelChanges::everything());
  }

  pub fn invalidate_average_rate(&mut self) {
    self.average_rate_known = false;
  }

  /// Brings back validity flags saved together with the cached values they describe
  pub fn restore(&mut self, post_order_known: bool, inclusion_known: bool, weight_known: bool) {
    self.post_order_known = post_order_known;
    self.inclusion_known = inclusion_known;
    self.weight_known = weight_known;
  }

  pub fn post_order_computed(&mut self) {
    self.post_order_known = true;
    self.counts.post_order += 1;
  }

  pub fn average_rate_computed(&mut self) {
    self.average_rate_known = true;
    self.counts.average_rate += 1;
  }

  pub fn inclusion_computed(&mut self) {
    self.inclusion_known = true;
    self.counts.inclusion += 1;
  }

  pub fn weight_computed(&mut self) {
    self.weight_known = true;
    self.counts.weight += 1;
  }
}
