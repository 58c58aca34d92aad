use crate::alignment::death_type::MutationDeathType;
use crate::make_error;
use crate::tree::tree::PhyloTree;
use crate::utils::string::quote;
use eyre::{Report, WrapErr};
use getset::Getters;
use indexmap::IndexMap;
use itertools::Itertools;
use ndarray::{Array2, Axis};

/// Read access to a compressed alignment: coded observations per (taxon, pattern), plus pattern
/// weights and ascertainment exclusions.
pub trait PatternSource {
  fn taxon_count(&self) -> usize;

  fn pattern_count(&self) -> usize;

  fn state_count(&self) -> usize;

  /// Number of alignment columns each unique pattern stands for
  fn weights(&self) -> &[u32];

  fn taxon_index(&self, name: &str) -> Option<usize>;

  fn code(&self, taxon: usize, pattern: usize) -> usize;

  fn states_for_code(&self, code: usize) -> &[usize];

  /// Patterns which cannot be observed and are conditioned away
  fn excluded_patterns(&self) -> &[usize];

  fn death_state(&self) -> usize;

  /// Whether the observation of `taxon` in `pattern` admits the death state
  fn may_be_absent(&self, taxon: usize, pattern: usize) -> bool {
    self
      .states_for_code(self.code(taxon, pattern))
      .contains(&self.death_state())
  }

  fn total_weight(&self) -> u64 {
    self.weights().iter().map(|&w| u64::from(w)).sum()
  }
}

/// Taxon-by-pattern table of codes of a [`MutationDeathType`].
#[derive(Clone, Debug, Getters)]
pub struct PatternMatrix {
  #[getset(get = "pub")]
  data_type: MutationDeathType,

  #[getset(get = "pub")]
  taxa: Vec<String>,

  #[getset(get = "pub")]
  codes: Array2<usize>,

  weights: Vec<u32>,
  excluded: Vec<usize>,
}

impl PatternMatrix {
  /// Builds the matrix from already compressed patterns: `codes` has one row per taxon and one column per pattern.
  pub fn from_patterns(
    data_type: MutationDeathType,
    taxa: Vec<String>,
    codes: Array2<usize>,
    weights: Vec<u32>,
  ) -> Result<Self, Report> {
    let (n_taxa, n_patterns) = codes.dim();

    if taxa.len() != n_taxa {
      return make_error!(
        "When creating pattern matrix: expected {n_taxa} taxon names, but found {}",
        taxa.len()
      );
    }

    if let Some(duplicate) = taxa.iter().duplicates().next() {
      return make_error!("When creating pattern matrix: duplicate taxon name {}", quote(duplicate));
    }

    if weights.len() != n_patterns {
      return make_error!(
        "When creating pattern matrix: expected {n_patterns} pattern weights, but found {}",
        weights.len()
      );
    }

    if let Some(((taxon, pattern), code)) = codes
      .indexed_iter()
      .find(|(_, &code)| code >= data_type.code_count())
    {
      return make_error!(
        "When creating pattern matrix: code {code} of taxon {} in pattern {pattern} is out of range",
        quote(&taxa[taxon])
      );
    }

    Ok(Self {
      data_type,
      taxa,
      codes,
      weights,
      excluded: vec![],
    })
  }

  /// Compresses aligned character sequences into unique patterns, weighted by the number of
  /// columns they occur in. Patterns keep the order of their first occurrence.
  pub fn from_sequences<S: AsRef<str>, T: AsRef<str>>(
    data_type: MutationDeathType,
    sequences: &[(S, T)],
  ) -> Result<Self, Report> {
    if sequences.is_empty() {
      return make_error!("When compressing alignment: no sequences provided");
    }

    let rows = sequences
      .iter()
      .map(|(name, seq)| {
        seq
          .as_ref()
          .chars()
          .map(|c| data_type.code_for_char(c))
          .collect::<Result<Vec<_>, Report>>()
          .wrap_err_with(|| format!("When reading sequence {}", quote(name.as_ref())))
      })
      .collect::<Result<Vec<_>, Report>>()?;

    let n_sites = rows[0].len();
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| row.len() != n_sites) {
      return make_error!(
        "When compressing alignment: sequence {} has length {}, but the first sequence has length {n_sites}",
        quote(sequences[i].0.as_ref()),
        row.len()
      );
    }

    let mut unique = IndexMap::<Vec<usize>, u32>::new();
    for site in 0..n_sites {
      let column = rows.iter().map(|row| row[site]).collect_vec();
      *unique.entry(column).or_default() += 1;
    }

    let n_taxa = rows.len();
    let mut codes = Array2::<usize>::zeros((n_taxa, unique.len()));
    for (pattern, column) in unique.keys().enumerate() {
      for (taxon, &code) in column.iter().enumerate() {
        codes[[taxon, pattern]] = code;
      }
    }

    let taxa = sequences.iter().map(|(name, _)| name.as_ref().to_owned()).collect_vec();
    let weights = unique.into_values().collect_vec();
    Self::from_patterns(data_type, taxa, codes, weights)
  }

  /// Marks patterns as unobservable. The correction term of the likelihood conditions them away.
  pub fn set_excluded_patterns(&mut self, patterns: impl IntoIterator<Item = usize>) -> Result<(), Report> {
    let n_patterns = self.weights.len();
    let excluded = patterns.into_iter().sorted().dedup().collect_vec();
    if let Some(pattern) = excluded.iter().find(|&&p| p >= n_patterns) {
      return make_error!(
        "When excluding patterns: pattern {pattern} is out of range, there are {n_patterns} patterns"
      );
    }
    self.excluded = excluded;
    Ok(())
  }

  /// Appends an unobservable pattern with zero weight and returns its index.
  pub fn add_ascertainment_pattern(&mut self, column: &[usize]) -> Result<usize, Report> {
    let n_taxa = self.taxa.len();
    if column.len() != n_taxa {
      return make_error!(
        "When adding ascertainment pattern: expected {n_taxa} codes, but found {}",
        column.len()
      );
    }
    if let Some(code) = column.iter().find(|&&code| code >= self.data_type.code_count()) {
      return make_error!("When adding ascertainment pattern: code {code} is out of range");
    }

    self
      .codes
      .push_column(ndarray::ArrayView1::from(column))
      .wrap_err("When adding ascertainment pattern")?;

    let pattern = self.weights.len();
    self.weights.push(0);
    self.excluded.push(pattern);
    Ok(pattern)
  }

  /// Appends the pattern in which the character is absent from every taxon.
  pub fn add_all_absent_pattern(&mut self) -> Result<usize, Report> {
    let column = vec![self.data_type.death_code(); self.taxa.len()];
    self.add_ascertainment_pattern(&column)
  }

  pub fn column(&self, pattern: usize) -> Vec<usize> {
    self.codes.index_axis(Axis(1), pattern).to_vec()
  }
}

impl PatternSource for PatternMatrix {
  fn taxon_count(&self) -> usize {
    self.taxa.len()
  }

  fn pattern_count(&self) -> usize {
    self.weights.len()
  }

  fn state_count(&self) -> usize {
    self.data_type.state_count()
  }

  fn weights(&self) -> &[u32] {
    &self.weights
  }

  fn taxon_index(&self, name: &str) -> Option<usize> {
    self.taxa.iter().position(|taxon| taxon == name)
  }

  fn code(&self, taxon: usize, pattern: usize) -> usize {
    self.codes[[taxon, pattern]]
  }

  fn states_for_code(&self, code: usize) -> &[usize] {
    self.data_type.states_for_code(code)
  }

  fn excluded_patterns(&self) -> &[usize] {
    &self.excluded
  }

  fn death_state(&self) -> usize {
    self.data_type.death_state()
  }
}

/// Finds the taxon observed at every leaf of the tree, matching leaf names to taxon names.
pub fn leaf_taxa(tree: &dyn PhyloTree, patterns: &dyn PatternSource) -> Result<Vec<usize>, Report> {
  if tree.leaf_count() != patterns.taxon_count() {
    return make_error!(
      "When matching tree leaves to taxa: the tree has {} leaves, but the alignment has {} taxa",
      tree.leaf_count(),
      patterns.taxon_count()
    );
  }

  (0..tree.leaf_count())
    .map(|leaf| {
      let Some(name) = tree.name(leaf) else {
        return make_error!("When matching tree leaves to taxa: leaf {leaf} has no name");
      };
      match patterns.taxon_index(name) {
        Some(taxon) => Ok(taxon),
        None => make_error!("When matching tree leaves to taxa: taxon {} not found in the alignment", quote(name)),
      }
    })
    .collect()
}
