use crate::make_error;
use eyre::Report;
use ndarray::{Array3, ArrayView2, ArrayViewMut2, Axis};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::fmt::{Display, Formatter};

/// Where partial likelihoods live.
#[derive(Copy, Clone, Debug, PartialEq, Eq, SmartDefault, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartialsBackend {
  /// Host memory, readable node by node
  #[default]
  Cpu,

  /// Device buffers, not readable from the host
  Accelerated,
}

impl Display for PartialsBackend {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      PartialsBackend::Cpu => write!(f, "cpu"),
      PartialsBackend::Accelerated => write!(f, "accelerated"),
    }
  }
}

/// Conditional likelihoods of the data below each node, given the state at the node.
pub trait NodePartials {
  fn node_count(&self) -> usize;

  fn pattern_count(&self) -> usize;

  fn state_count(&self) -> usize;

  /// Writes the partials of `node` into `out`, pattern-major: `out[pattern * state_count + state]`.
  fn node_partials(&self, node: usize, out: &mut [f64]) -> Result<(), Report>;

  fn backend(&self) -> PartialsBackend {
    PartialsBackend::Cpu
  }
}

/// Node × pattern × state table of partial likelihoods kept in host memory.
#[derive(Clone, Debug)]
pub struct PartialsTable {
  partials: Array3<f64>,
  backend: PartialsBackend,
}

impl PartialsTable {
  pub fn zeros(node_count: usize, pattern_count: usize, state_count: usize) -> Self {
    Self::from_array(Array3::zeros((node_count, pattern_count, state_count)))
  }

  pub fn from_array(partials: Array3<f64>) -> Self {
    Self {
      partials,
      backend: PartialsBackend::Cpu,
    }
  }

  /// Tags the table with a different backend. Used to exercise backends which cannot be read from the host.
  #[must_use]
  pub fn with_backend(mut self, backend: PartialsBackend) -> Self {
    self.backend = backend;
    self
  }

  pub fn node(&self, node: usize) -> ArrayView2<f64> {
    self.partials.index_axis(Axis(0), node)
  }

  pub fn node_mut(&mut self, node: usize) -> ArrayViewMut2<f64> {
    self.partials.index_axis_mut(Axis(0), node)
  }

  pub fn dim(&self) -> (usize, usize, usize) {
    self.partials.dim()
  }
}

impl NodePartials for PartialsTable {
  fn node_count(&self) -> usize {
    self.partials.len_of(Axis(0))
  }

  fn pattern_count(&self) -> usize {
    self.partials.len_of(Axis(1))
  }

  fn state_count(&self) -> usize {
    self.partials.len_of(Axis(2))
  }

  fn node_partials(&self, node: usize, out: &mut [f64]) -> Result<(), Report> {
    let (n_nodes, n_patterns, n_states) = self.dim();
    if node >= n_nodes {
      return make_error!("When reading partials: node {node} not found, there are {n_nodes} nodes");
    }
    if out.len() != n_patterns * n_states {
      return make_error!(
        "When reading partials of node {node}: buffer has length {}, but expected {n_patterns} patterns × {n_states} states",
        out.len()
      );
    }
    for (dst, src) in out.iter_mut().zip(self.node(node).iter()) {
      *dst = *src;
    }
    Ok(())
  }

  fn backend(&self) -> PartialsBackend {
    self.backend
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::io::json::{json_read_str, json_write_str, JsonPretty};
  use ndarray::array;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn copies_node_partials_pattern_major() -> Result<(), Report> {
    let mut table = PartialsTable::zeros(2, 3, 2);
    table.node_mut(1).assign(&array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);

    let mut out = vec![0.0; 6];
    table.node_partials(1, &mut out)?;
    assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

    table.node_partials(0, &mut out)?;
    assert_eq!(out, vec![0.0; 6]);
    Ok(())
  }

  #[rstest]
  fn rejects_mismatched_buffer() {
    let table = PartialsTable::zeros(2, 3, 2);
    let mut out = vec![0.0; 5];
    assert!(table.node_partials(0, &mut out).is_err());
    assert!(table.node_partials(2, &mut [0.0; 6]).is_err());
  }

  #[rstest]
  fn reads_backend_names() -> Result<(), Report> {
    let backend: PartialsBackend = json_read_str(r#""accelerated""#)?;
    assert_eq!(backend, PartialsBackend::Accelerated);
    assert_eq!(json_write_str(&PartialsBackend::Cpu, JsonPretty(false))?, r#""cpu""#);
    assert_eq!(PartialsTable::zeros(1, 1, 2).backend(), PartialsBackend::Cpu);
    Ok(())
  }
}
