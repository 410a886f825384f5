use crate::{DynamicAttrsUpdate, Observation};
use chrono::NaiveDate;

pub const DEFAULT_MIN_PERCENT_OBSERVED: f64 = 85.0;
pub const DEFAULT_MAX_PERCENT_INVALID: f64 = 5.0;

/// Data-quality gate an observation must pass to count as a valid wet
/// observation. Both bounds are strict.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityPolicy {
    pub min_percent_observed: f64,
    pub max_percent_invalid: f64,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            min_percent_observed: DEFAULT_MIN_PERCENT_OBSERVED,
            max_percent_invalid: DEFAULT_MAX_PERCENT_INVALID,
        }
    }
}

impl QualityPolicy {
    pub fn is_valid(&self, observation: &Observation) -> bool {
        observation.percent_observed > self.min_percent_observed
            && observation.percent_invalid < self.max_percent_invalid
    }

    pub fn filter<'a>(&self, observations: &'a [Observation]) -> Vec<&'a Observation> {
        observations
            .iter()
            .filter(|observation| self.is_valid(observation))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeseriesSummary {
    NoObservations,
    /// Observations exist in the window but none passes the quality gate.
    NoValidObservations,
    Observed {
        last_obs_date: NaiveDate,
        last_valid_obs_date: NaiveDate,
        last_valid_obs: f64,
    },
}

impl TimeseriesSummary {
    pub fn into_update(self, run_date: NaiveDate) -> DynamicAttrsUpdate {
        match self {
            TimeseriesSummary::NoObservations | TimeseriesSummary::NoValidObservations => {
                DynamicAttrsUpdate::refresh_only(run_date)
            }
            TimeseriesSummary::Observed {
                last_obs_date,
                last_valid_obs_date,
                last_valid_obs,
            } => DynamicAttrsUpdate {
                last_obs_date: Some(last_obs_date),
                last_valid_obs_date: Some(last_valid_obs_date),
                last_valid_obs: Some(last_valid_obs),
                last_attrs_update_date: run_date,
            },
        }
    }
}

/// Reduces a time series to its most recent observation and most recent
/// valid observation. Rows sharing the latest date resolve to the one that
/// comes last in the input.
pub fn summarize_timeseries(
    observations: &[Observation],
    policy: &QualityPolicy,
) -> TimeseriesSummary {
    let Some(last_obs) = latest(observations.iter()) else {
        return TimeseriesSummary::NoObservations;
    };

    let valid = policy.filter(observations);
    let Some(last_valid) = latest(valid.into_iter()) else {
        return TimeseriesSummary::NoValidObservations;
    };

    TimeseriesSummary::Observed {
        last_obs_date: last_obs.date,
        last_valid_obs_date: last_valid.date,
        last_valid_obs: last_valid.percent_wet,
    }
}

fn latest<'a>(observations: impl Iterator<Item = &'a Observation>) -> Option<&'a Observation> {
    observations.max_by_key(|observation| observation.date)
}
