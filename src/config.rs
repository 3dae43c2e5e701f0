use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Constants of the scheduling formulation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Upper bound (units) on what a machine can produce of one part in a week once it is
    /// scheduled. Too small a value silently caps production.
    pub big_m: f64,
    /// Regular working hours per machine and week before overtime starts
    pub regular_hours: f64,
    /// Contractual overtime hours per machine and week, anything above is excess overtime
    pub overtime_cap: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            big_m: 10000.0,
            regular_hours: 120.0,
            overtime_cap: 48.0,
        }
    }
}

/// Hours in a week
const WEEK_HOURS: f64 = 168.0;

fn invalid(key: &str, reason: impl Into<String>) -> Error {
    Error::Config {
        key: key.to_string(),
        reason: reason.into(),
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.big_m.is_finite() || self.big_m < 1.0 {
            return Err(invalid("big_m", format!("{} is not a finite value >= 1", self.big_m)));
        }
        if !(0.0..=WEEK_HOURS).contains(&self.regular_hours) {
            return Err(invalid(
                "regular_hours",
                format!("{} is outside [0, {}]", self.regular_hours, WEEK_HOURS),
            ));
        }
        if !(0.0..=WEEK_HOURS).contains(&self.overtime_cap) {
            return Err(invalid(
                "overtime_cap",
                format!("{} is outside [0, {}]", self.overtime_cap, WEEK_HOURS),
            ));
        }
        Ok(())
    }

    /// Warns when big-M is too small to let one machine cover the largest weekly demand
    pub fn check_big_m(&self, peak_demand: f64) {
        if self.big_m < peak_demand {
            warn!(
                "big_m = {} is below the peak weekly demand {}; the scheduling gate will cap production",
                self.big_m, peak_demand
            );
        }
    }
}

/// Options handed to the solver backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Wall clock limit in seconds
    pub time_limit: Option<f64>,
    /// Relative MIP gap at which the solver may stop
    pub mip_gap: Option<f64>,
    /// Let the solver write its own log to the console
    pub verbose: bool,
    /// Slack on a solved priority level, scaled by `max(1, |optimum|)`, granted to a later level
    /// that is infeasible at the exact optimum
    pub objective_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        SolverConfig {
            time_limit: None,
            mip_gap: None,
            verbose: false,
            objective_tolerance: 1e-6,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(limit) = self.time_limit {
            if !limit.is_finite() || limit <= 0.0 {
                return Err(invalid("time_limit", format!("{} is not a positive duration", limit)));
            }
        }
        if let Some(gap) = self.mip_gap {
            if !(0.0..=1.0).contains(&gap) {
                return Err(invalid("mip_gap", format!("{} is outside [0, 1]", gap)));
            }
        }
        if !self.objective_tolerance.is_finite() || self.objective_tolerance < 0.0 {
            return Err(invalid(
                "objective_tolerance",
                format!("{} is not a non-negative value", self.objective_tolerance),
            ));
        }
        Ok(())
    }
}

/// Everything configurable about a run, as read from a JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub model: ModelConfig,
    pub solver: SolverConfig,
}

impl RunConfig {
    pub fn from_file(path: &Path) -> Result<RunConfig> {
        let file = std::fs::File::open(path).map_err(|e| Error::access(path, e))?;
        let reader = std::io::BufReader::new(file);
        let config: RunConfig =
            serde_json::from_reader(reader).map_err(|e| invalid(&path.display().to_string(), e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.solver.validate()
    }
}
