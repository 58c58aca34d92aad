use crate::io::json::{json_read_file, json_read_str};
use crate::make_error;
use crate::observation::process::ObservationProcess;
use eyre::{Report, WrapErr};
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;
use std::path::Path;

fn default_lambda() -> f64 {
  1.0
}

/// Rates of the stochastic Dollo process.
#[derive(Copy, Clone, Debug, PartialEq, SmartDefault, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DolloParams {
  /// Per-lineage loss rate
  #[default = 1.0]
  pub mu: f64,

  /// Rate of character gain
  #[default = 1.0]
  #[serde(default = "default_lambda", alias = "lam")]
  pub lambda: f64,

  /// Whether the gain rate is integrated out instead of entering the likelihood directly
  #[serde(default)]
  pub integrate_gain_rate: bool,
}

impl DolloParams {
  pub fn validate(&self) -> Result<(), Report> {
    let Self {
      mu,
      lambda,
      integrate_gain_rate,
    } = *self;

    if !mu.is_finite() || mu < 0.0 {
      return make_error!("Loss rate 'mu' must be finite and non-negative, but found {mu}");
    }

    if !lambda.is_finite() || lambda < 0.0 {
      return make_error!("Gain rate 'lambda' must be finite and non-negative, but found {lambda}");
    }

    if mu == 0.0 {
      return make_error!("Loss rate 'mu' must be positive, but found {mu}: the tree weight is undefined without losses");
    }

    if integrate_gain_rate && lambda == 0.0 {
      return make_error!("Gain rate 'lambda' must be positive when the gain rate is integrated out, but found {lambda}");
    }

    Ok(())
  }
}

/// Everything needed to set up an observation-process likelihood.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationProcessConfig {
  #[serde(flatten)]
  pub params: DolloParams,

  #[serde(default)]
  pub process: ObservationProcess,
}

impl ObservationProcessConfig {
  pub fn from_json_str(s: impl AsRef<str>) -> Result<Self, Report> {
    let config: Self = json_read_str(s).wrap_err("When reading observation process configuration")?;
    config
      .params
      .validate()
      .wrap_err("When validating observation process configuration")?;
    Ok(config)
  }

  pub fn from_json_file(filepath: impl AsRef<Path>) -> Result<Self, Report> {
    let config: Self = json_read_file(filepath).wrap_err("When reading observation process configuration")?;
    config
      .params
      .validate()
      .wrap_err("When validating observation process configuration")?;
    Ok(config)
  }
}
