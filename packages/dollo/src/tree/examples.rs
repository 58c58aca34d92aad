#[cfg(test)]
pub mod tests {
  use crate::tree::tree::ParentTree;
  use eyre::Report;

  /// `(A:1,B:1):1`
  pub fn get_two_leaf_tree() -> Result<ParentTree, Report> {
    ParentTree::from_leaf_names(vec![Some(2), Some(2), None], vec![1.0, 1.0, 1.0], &["A", "B"])
  }

  /// `((A:0.1,B:0.2)E:0.3,(C:0.4,D:0.5)F:0.6)G:0.0`
  #[rustfmt::skip]
  pub fn get_example_tree() -> Result<ParentTree, Report> {
    ParentTree::from_parents(
      vec![Some(4), Some(4), Some(5), Some(5), Some(6), Some(6), None],
      vec![0.1,     0.2,     0.4,     0.5,     0.3,     0.6,     0.0],
      vec![
        Some("A".to_owned()),
        Some("B".to_owned()),
        Some("C".to_owned()),
        Some("D".to_owned()),
        Some("E".to_owned()),
        Some("F".to_owned()),
        Some("G".to_owned()),
      ],
    )
  }

  /// `(((A:0.2,B:0.3):0.1,C:0.7,D:0.4):0.5,E:1.1)` with a polytomy below the root.
  ///
  /// Internal keys are deliberately not in post order: the root is key 5.
  #[rustfmt::skip]
  pub fn get_example_polytomy_tree() -> Result<ParentTree, Report> {
    ParentTree::from_leaf_names(
      vec![Some(7), Some(7), Some(6), Some(6), Some(5), None,    Some(5), Some(6)],
      vec![0.2,     0.3,     0.7,     0.4,     1.1,     0.0,     0.5,     0.1],
      &["A", "B", "C", "D", "E"],
    )
  }
}
