use chrono::NaiveDate;

pub mod artifacts;
pub mod partition;
pub mod timeseries;

pub use partition::partition_uids;
pub use timeseries::{summarize_timeseries, QualityPolicy, TimeseriesSummary};

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// First day of the satellite record used as the lower bound of every
/// observation window.
pub fn default_history_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1984, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// A waterbody polygon as persisted in the historical extent table.
#[derive(Debug, Clone, PartialEq)]
pub struct WaterbodyRecord {
    pub uid: String,
    pub wb_id: Option<i64>,
    pub area_m2: Option<f64>,
    pub length_m: Option<f64>,
    pub perim_m: Option<f64>,
    /// WKT, carried through untouched.
    pub geometry: Option<String>,
    pub last_obs_date: Option<NaiveDate>,
    pub last_valid_obs_date: Option<NaiveDate>,
    pub last_valid_obs: Option<f64>,
    pub last_attrs_update_date: Option<NaiveDate>,
}

impl WaterbodyRecord {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            wb_id: None,
            area_m2: None,
            length_m: None,
            perim_m: None,
            geometry: None,
            last_obs_date: None,
            last_valid_obs_date: None,
            last_valid_obs: None,
            last_attrs_update_date: None,
        }
    }
}

/// Raw per-date pixel counts for one waterbody, as written by ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRow {
    pub obs_id: String,
    pub uid: String,
    pub date: NaiveDate,
    pub px_total: i64,
    pub px_wet: i64,
    pub area_wet_m2: f64,
    pub px_dry: i64,
    pub area_dry_m2: f64,
    pub px_invalid: i64,
    pub area_invalid_m2: f64,
    pub task_id: String,
}

impl ObservationRow {
    pub fn to_observation(&self) -> Observation {
        Observation::from_pixel_counts(
            self.date,
            self.px_total,
            self.px_wet,
            self.px_dry,
            self.px_invalid,
        )
    }
}

/// One dated point of a waterbody time series, expressed as percentages of
/// the polygon's total pixel count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    pub date: NaiveDate,
    pub percent_wet: f64,
    pub percent_observed: f64,
    pub percent_invalid: f64,
}

impl Observation {
    pub fn from_pixel_counts(
        date: NaiveDate,
        px_total: i64,
        px_wet: i64,
        px_dry: i64,
        px_invalid: i64,
    ) -> Self {
        if px_total <= 0 {
            return Self {
                date,
                percent_wet: 0.0,
                percent_observed: 0.0,
                percent_invalid: 0.0,
            };
        }

        let total = px_total as f64;
        Self {
            date,
            percent_wet: px_wet as f64 / total * 100.0,
            percent_observed: (px_wet + px_dry) as f64 / total * 100.0,
            percent_invalid: px_invalid as f64 / total * 100.0,
        }
    }
}

/// Partial update of the dynamic attributes. `None` fields keep whatever
/// value the row already holds; the refresh date is always written.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicAttrsUpdate {
    pub last_obs_date: Option<NaiveDate>,
    pub last_valid_obs_date: Option<NaiveDate>,
    pub last_valid_obs: Option<f64>,
    pub last_attrs_update_date: NaiveDate,
}

impl DynamicAttrsUpdate {
    pub fn refresh_only(run_date: NaiveDate) -> Self {
        Self {
            last_obs_date: None,
            last_valid_obs_date: None,
            last_valid_obs: None,
            last_attrs_update_date: run_date,
        }
    }

    pub fn is_refresh_only(&self) -> bool {
        self.last_obs_date.is_none()
            && self.last_valid_obs_date.is_none()
            && self.last_valid_obs.is_none()
    }
}
