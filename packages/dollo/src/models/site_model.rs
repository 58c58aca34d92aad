use crate::make_error;
use eyre::Report;
use smart_default::SmartDefault;

const SUM_TOLERANCE: f64 = 1e-8;

/// Across-site rate heterogeneity and equilibrium state frequencies.
pub trait SiteRateModel {
  fn category_count(&self) -> usize;

  fn category_proportions(&self) -> &[f64];

  fn category_rates(&self) -> &[f64];

  /// Equilibrium frequency of each state, in the order of the data type's states
  fn frequencies(&self) -> &[f64];

  /// Rate averaged over categories, weighted by their proportions
  fn average_rate(&self) -> f64 {
    self
      .category_proportions()
      .iter()
      .zip(self.category_rates())
      .map(|(p, r)| p * r)
      .sum()
  }
}

#[derive(Clone, Debug, SmartDefault)]
pub struct SiteModelParams {
  #[default(vec![0.5, 0.5])]
  pub frequencies: Vec<f64>,

  #[default(vec![1.0])]
  pub rates: Vec<f64>,

  #[default(vec![1.0])]
  pub proportions: Vec<f64>,
}

#[derive(Clone, Debug)]
pub struct SiteModel {
  frequencies: Vec<f64>,
  rates: Vec<f64>,
  proportions: Vec<f64>,
}

impl SiteModel {
  pub fn new(
    SiteModelParams {
      frequencies,
      rates,
      proportions,
    }: SiteModelParams,
  ) -> Result<Self, Report> {
    if frequencies.is_empty() {
      return make_error!("When creating site model: frequencies must not be empty");
    }

    if frequencies.iter().any(|f| !f.is_finite() || *f < 0.0) {
      return make_error!("When creating site model: frequencies must be finite and non-negative, but found {frequencies:?}");
    }

    let frequency_sum: f64 = frequencies.iter().sum();
    if (frequency_sum - 1.0).abs() > SUM_TOLERANCE {
      return make_error!("When creating site model: frequencies must sum to 1, but they sum to {frequency_sum}");
    }

    if rates.is_empty() || rates.len() != proportions.len() {
      return make_error!(
        "When creating site model: expected one proportion per rate category, but found {} rates and {} proportions",
        rates.len(),
        proportions.len()
      );
    }

    if rates.iter().chain(&proportions).any(|x| !x.is_finite() || *x < 0.0) {
      return make_error!(
        "When creating site model: rates and proportions must be finite and non-negative, but found rates {rates:?} and proportions {proportions:?}"
      );
    }

    let proportion_sum: f64 = proportions.iter().sum();
    if (proportion_sum - 1.0).abs() > SUM_TOLERANCE {
      return make_error!("When creating site model: category proportions must sum to 1, but they sum to {proportion_sum}");
    }

    Ok(Self {
      frequencies,
      rates,
      proportions,
    })
  }

  /// Single rate category with rate 1
  pub fn constant(frequencies: Vec<f64>) -> Result<Self, Report> {
    Self::new(SiteModelParams {
      frequencies,
      ..SiteModelParams::default()
    })
  }

  pub fn set_frequencies(&mut self, frequencies: Vec<f64>) -> Result<(), Report> {
    if frequencies.len() != self.frequencies.len() {
      return make_error!(
        "When setting frequencies: expected {} values, but found {}",
        self.frequencies.len(),
        frequencies.len()
      );
    }
    *self = Self::new(SiteModelParams {
      frequencies,
      rates: self.rates.clone(),
      proportions: self.proportions.clone(),
    })?;
    Ok(())
  }

  pub fn set_rates(&mut self, rates: Vec<f64>) -> Result<(), Report> {
    *self = Self::new(SiteModelParams {
      frequencies: self.frequencies.clone(),
      rates,
      proportions: self.proportions.clone(),
    })?;
    Ok(())
  }
}

impl SiteRateModel for SiteModel {
  fn category_count(&self) -> usize {
    self.rates.len()
  }

  fn category_proportions(&self) -> &[f64] {
    &self.proportions
  }

  fn category_rates(&self) -> &[f64] {
    &self.rates
  }

  fn frequencies(&self) -> &[f64] {
    &self.frequencies
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_ulps_eq;
  use rstest::rstest;

  #[rstest]
  fn averages_rates_over_categories() -> Result<(), Report> {
    let model = SiteModel::new(SiteModelParams {
      frequencies: vec![0.3, 0.7],
      rates: vec![0.5, 1.5, 3.0],
      proportions: vec![0.5, 0.25, 0.25],
    })?;
    assert_eq!(model.category_count(), 3);
    assert_ulps_eq!(model.average_rate(), 1.375);
    Ok(())
  }

  #[rstest]
  fn constant_model_has_unit_average_rate() -> Result<(), Report> {
    let model = SiteModel::constant(vec![1.0, 0.0])?;
    assert_ulps_eq!(model.average_rate(), 1.0);
    assert_eq!(model.frequencies(), &[1.0, 0.0]);
    Ok(())
  }

  #[rstest]
  #[case(vec![0.5, 0.6], vec![1.0], vec![1.0])]
  #[case(vec![-0.5, 1.5], vec![1.0], vec![1.0])]
  #[case(vec![], vec![1.0], vec![1.0])]
  #[case(vec![0.5, 0.5], vec![1.0, 2.0], vec![1.0])]
  #[case(vec![0.5, 0.5], vec![1.0, 2.0], vec![0.7, 0.7])]
  #[case(vec![0.5, 0.5], vec![f64::NAN], vec![1.0])]
  fn rejects_invalid_parameters(#[case] frequencies: Vec<f64>, #[case] rates: Vec<f64>, #[case] proportions: Vec<f64>) {
    let result = SiteModel::new(SiteModelParams {
      frequencies,
      rates,
      proportions,
    });
    assert!(result.is_err());
  }

  #[rstest]
  fn keeps_model_unchanged_on_failed_update() -> Result<(), Report> {
    let mut model = SiteModel::constant(vec![0.5, 0.5])?;
    assert!(model.set_frequencies(vec![0.2, 0.2]).is_err());
    assert!(model.set_frequencies(vec![1.0]).is_err());
    assert_eq!(model.frequencies(), &[0.5, 0.5]);
    model.set_rates(vec![2.0])?;
    assert_ulps_eq!(model.average_rate(), 2.0);
    Ok(())
  }
}
