use crate::make_error;
use eyre::Report;
use smart_default::SmartDefault;

/// Rate multiplier of the branch above a node
pub trait BranchRateModel {
  fn rate(&self, node: usize) -> f64;

  /// Number of branches with their own rate, if rates are stored per branch
  fn branch_count(&self) -> Option<usize> {
    None
  }
}

/// Every branch evolves at the same rate.
#[derive(Copy, Clone, Debug, SmartDefault)]
pub struct StrictClock {
  #[default = 1.0]
  rate: f64,
}

impl StrictClock {
  pub fn new(rate: f64) -> Result<Self, Report> {
    if !rate.is_finite() || rate < 0.0 {
      return make_error!("When creating strict clock: rate must be finite and non-negative, but found {rate}");
    }
    Ok(Self { rate })
  }
}

impl BranchRateModel for StrictClock {
  #[inline]
  fn rate(&self, _node: usize) -> f64 {
    self.rate
  }
}

/// Independent rate per branch, indexed by the node below the branch.
#[derive(Clone, Debug)]
pub struct PerBranchRates {
  rates: Vec<f64>,
}

impl PerBranchRates {
  pub fn new(rates: Vec<f64>) -> Result<Self, Report> {
    if let Some((node, rate)) = rates.iter().enumerate().find(|(_, r)| !r.is_finite() || **r < 0.0) {
      return make_error!("When creating branch rates: rate of node {node} must be finite and non-negative, but found {rate}");
    }
    Ok(Self { rates })
  }

  pub fn len(&self) -> usize {
    self.rates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.rates.is_empty()
  }

  pub fn set_rate(&mut self, node: usize, rate: f64) -> Result<(), Report> {
    if !rate.is_finite() || rate < 0.0 {
      return make_error!("When setting rate of node {node}: rate must be finite and non-negative, but found {rate}");
    }
    match self.rates.get_mut(node) {
      Some(slot) => {
        *slot = rate;
        Ok(())
      }
      None => make_error!("When setting rate of node {node}: there are only {} branches", self.rates.len()),
    }
  }
}

impl BranchRateModel for PerBranchRates {
  #[inline]
  fn rate(&self, node: usize) -> f64 {
    self.rates[node]
  }

  fn branch_count(&self) -> Option<usize> {
    Some(self.rates.len())
  }
}
