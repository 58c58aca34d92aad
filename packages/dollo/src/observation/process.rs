use crate::alignment::patterns::PatternSource;
use crate::make_error;
use crate::observation::params::DolloParams;
use crate::observation::tree_weight::{any_tip_log_tree_weight, single_tip_log_tree_weight};
use crate::tree::tree::PhyloTree;
use crate::utils::string::quote;
use eyre::Report;
use log::warn;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::fmt::{Display, Formatter};

/// How characters come to be observed, which determines the normalization of the gain process.
#[derive(Clone, Debug, PartialEq, Eq, SmartDefault, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ObservationProcess {
  /// A character is observed when it survives in at least one tip
  #[default]
  AnyTip,

  /// Every character originates on the lineage of one distinguished taxon
  SingleTip { taxon: String },
}

impl ObservationProcess {
  /// Checks that the process can be applied to the given tree and data.
  pub fn check_data(&self, tree: &dyn PhyloTree, patterns: &dyn PatternSource) -> Result<(), Report> {
    let ObservationProcess::SingleTip { taxon } = self else {
      return Ok(());
    };

    let Some(taxon_index) = patterns.taxon_index(taxon) else {
      return make_error!("Single-tip taxon {} not found in the alignment", quote(taxon));
    };

    if !(0..tree.leaf_count()).any(|leaf| tree.name(leaf) == Some(taxon.as_str())) {
      return make_error!("Single-tip taxon {} is not a leaf of the tree", quote(taxon));
    }

    let n_patterns = patterns.pattern_count();
    let n_lacking = (0..n_patterns)
      .filter(|&pattern| patterns.weights()[pattern] > 0 && patterns.may_be_absent(taxon_index, pattern))
      .count();
    if n_lacking > 0 {
      warn!(
        "Single-tip taxon {} may lack the character in {n_lacking} of {n_patterns} patterns, while every character is assumed to be present in it",
        quote(taxon)
      );
    }

    Ok(())
  }

  /// Log of the normalization of the gain process. See [`any_tip_log_tree_weight`] for the arguments.
  pub fn log_tree_weight(
    &self,
    tree: &dyn PhyloTree,
    order: &[usize],
    losses: &[f64],
    params: &DolloParams,
    average_rate: f64,
    u0: &mut Vec<f64>,
  ) -> f64 {
    match self {
      ObservationProcess::AnyTip => any_tip_log_tree_weight(tree, order, losses, params, average_rate, u0),
      ObservationProcess::SingleTip { .. } => single_tip_log_tree_weight(params, average_rate),
    }
  }
}

impl Display for ObservationProcess {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {
      ObservationProcess::AnyTip => write!(f, "any-tip"),
      ObservationProcess::SingleTip { taxon } => write!(f, "single-tip ({})", quote(taxon)),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::alignment::death_type::MutationDeathType;
  use crate::alignment::patterns::PatternMatrix;
  use crate::tree::examples::tests::get_two_leaf_tree;
  use crate::o;
  use crate::utils::error::report_to_string;
  use rstest::rstest;

  fn patterns() -> Result<PatternMatrix, Report> {
    PatternMatrix::from_sequences(MutationDeathType::binary('1', '0')?, &[("A", "110"), ("B", "011")])
  }

  #[rstest]
  fn accepts_any_data_for_any_tip() -> Result<(), Report> {
    ObservationProcess::AnyTip.check_data(&get_two_leaf_tree()?, &patterns()?)
  }

  #[rstest]
  fn accepts_known_single_tip_taxon() -> Result<(), Report> {
    let process = ObservationProcess::SingleTip { taxon: o!("B") };
    process.check_data(&get_two_leaf_tree()?, &patterns()?)
  }

  #[rstest]
  fn rejects_unknown_single_tip_taxon() -> Result<(), Report> {
    let process = ObservationProcess::SingleTip { taxon: o!("Z") };
    let message = report_to_string(&process.check_data(&get_two_leaf_tree()?, &patterns()?).unwrap_err());
    assert_eq!(message, "Single-tip taxon \"Z\" not found in the alignment");
    Ok(())
  }

  #[rstest]
  fn names_processes() {
    assert_eq!(ObservationProcess::AnyTip.to_string(), "any-tip");
    assert_eq!(
      ObservationProcess::SingleTip { taxon: o!("A") }.to_string(),
      "single-tip (\"A\")"
    );
  }
}
