use crate::make_error;
use crate::utils::string::quote;
use eyre::Report;
use getset::CopyGetters;
use itertools::Itertools;

pub const GAP_CHAR: char = '-';
pub const MISSING_CHAR: char = '?';

/// Character coding in which one dedicated state means "the character is absent" and every other
/// state means "present".
///
/// Codes are indices into the code map. Each code decodes to a set of states, where ambiguous
/// codes map to more than one state.
#[derive(Clone, Debug, CopyGetters)]
pub struct MutationDeathType {
  #[getset(get_copy = "pub")]
  state_count: usize,

  #[getset(get_copy = "pub")]
  death_state: usize,

  /// Code of the character which means "absent"
  #[getset(get_copy = "pub")]
  death_code: usize,

  code_map: Vec<char>,
  state_sets: Vec<Vec<usize>>,
}

impl MutationDeathType {
  /// Two-state coding: `extant` is state 0, `death` is state 1, gaps and missing data are either.
  pub fn binary(extant: char, death: char) -> Result<Self, Report> {
    let code_map = vec![extant, death, GAP_CHAR, MISSING_CHAR];
    if !code_map.iter().all_unique() {
      return make_error!(
        "When creating binary mutation-death coding: characters must be distinct, but found {}",
        code_map.iter().map(quote).join(", ")
      );
    }

    Ok(Self {
      state_count: 2,
      death_state: 1,
      death_code: 1,
      code_map,
      state_sets: vec![vec![0], vec![1], vec![0, 1], vec![0, 1]],
    })
  }

  /// Extends a base coding of `base_state_count` states with an additional death state.
  ///
  /// The death character becomes code 0 and decodes to the new last state. Base codes keep their
  /// order and follow it.
  pub fn extending(base_codes: &[(char, Vec<usize>)], base_state_count: usize, death: char) -> Result<Self, Report> {
    if base_codes.iter().any(|(c, _)| *c == death) {
      return make_error!(
        "When extending coding with death character {}: it is already a valid code in {}",
        quote(death),
        base_codes.iter().map(|(c, _)| c).join("")
      );
    }

    if !base_codes.iter().map(|(c, _)| c).all_unique() {
      return make_error!("When extending coding with death character {}: base codes are not unique", quote(death));
    }

    if let Some((c, states)) = base_codes
      .iter()
      .find(|(_, states)| states.is_empty() || states.iter().any(|&s| s >= base_state_count))
    {
      return make_error!(
        "When extending coding with death character {}: code {} maps to states {states:?}, but the base coding has {base_state_count} states",
        quote(death),
        quote(c)
      );
    }

    let state_count = base_state_count + 1;
    let death_state = state_count - 1;

    let code_map = std::iter::once(death)
      .chain(base_codes.iter().map(|(c, _)| *c))
      .collect_vec();

    let state_sets = std::iter::once(vec![death_state])
      .chain(base_codes.iter().map(|(_, states)| states.clone()))
      .collect_vec();

    Ok(Self {
      state_count,
      death_state,
      death_code: 0,
      code_map,
      state_sets,
    })
  }

  pub fn code_count(&self) -> usize {
    self.code_map.len()
  }

  pub fn code_for_char(&self, c: char) -> Result<usize, Report> {
    match self.code_map.iter().position(|&x| x == c) {
      Some(code) => Ok(code),
      None => make_error!(
        "Unknown character {}. Known characters are: {}",
        quote(c),
        self.code_map.iter().join("")
      ),
    }
  }

  pub fn char_for_code(&self, code: usize) -> Option<char> {
    self.code_map.get(code).copied()
  }

  pub fn states_for_code(&self, code: usize) -> &[usize] {
    &self.state_sets[code]
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::utils::error::report_to_string;
  use pretty_assertions::assert_eq;
  use rstest::rstest;

  #[rstest]
  fn decodes_binary_characters() -> Result<(), Report> {
    let coding = MutationDeathType::binary('1', '0')?;
    assert_eq!(coding.state_count(), 2);
    assert_eq!(coding.death_state(), 1);
    assert_eq!(coding.states_for_code(coding.code_for_char('1')?), &[0]);
    assert_eq!(coding.states_for_code(coding.code_for_char('0')?), &[1]);
    assert_eq!(coding.states_for_code(coding.code_for_char('-')?), &[0, 1]);
    assert_eq!(coding.states_for_code(coding.code_for_char('?')?), &[0, 1]);
    assert_eq!(coding.death_code(), 1);
    Ok(())
  }

  #[rstest]
  fn rejects_unknown_characters() -> Result<(), Report> {
    let coding = MutationDeathType::binary('1', '0')?;
    let message = report_to_string(&coding.code_for_char('X').unwrap_err());
    assert!(message.contains("Unknown character \"X\""), "{message}");
    Ok(())
  }

  #[rstest]
  fn rejects_clashing_binary_characters() {
    assert!(MutationDeathType::binary('1', '1').is_err());
    assert!(MutationDeathType::binary('-', '0').is_err());
  }

  #[rstest]
  fn extends_base_coding_with_death_state() -> Result<(), Report> {
    let base = vec![('A', vec![0]), ('B', vec![1]), ('C', vec![2]), ('?', vec![0, 1, 2])];
    let coding = MutationDeathType::extending(&base, 3, '0')?;
    assert_eq!(coding.state_count(), 4);
    assert_eq!(coding.death_state(), 3);
    assert_eq!(coding.code_count(), 5);
    assert_eq!(coding.code_for_char('0')?, 0);
    assert_eq!(coding.states_for_code(0), &[3]);
    assert_eq!(coding.states_for_code(coding.code_for_char('B')?), &[1]);
    assert_eq!(coding.states_for_code(coding.code_for_char('?')?), &[0, 1, 2]);
    assert_eq!(coding.char_for_code(1), Some('A'));
    assert_eq!(coding.death_code(), 0);
    Ok(())
  }

  #[rstest]
  fn rejects_death_character_present_in_base_coding() {
    let base = vec![('0', vec![0]), ('1', vec![1])];
    let message = report_to_string(&MutationDeathType::extending(&base, 2, '0').unwrap_err());
    assert!(message.contains("already a valid code"), "{message}");
  }

  #[rstest]
  fn rejects_base_codes_outside_of_state_range() {
    let base = vec![('A', vec![0]), ('B', vec![2])];
    assert!(MutationDeathType::extending(&base, 2, '0').is_err());
  }
}
