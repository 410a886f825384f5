use crate::{DynamicAttrsConfig, DynamicAttrsError, RecomputeError};
use chrono::NaiveDate;
use std::path::PathBuf;
use tracing::{error, info};
use wb_core::artifacts::append_failed_uids;
use wb_core::{summarize_timeseries, TimeseriesSummary};
use wb_storage::WaterbodyStorage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrsOutcome {
    /// All four attributes were written.
    Updated,
    /// No observations in the window; only the refresh date was written.
    NoObservations,
    /// Observations exist but none passed the quality gate; only the
    /// refresh date was written.
    NoValidObservations,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecomputeReport {
    pub processed: usize,
    pub updated: usize,
    pub no_observations: usize,
    pub no_valid_observations: usize,
    pub failed_uids: Vec<String>,
    pub failed_uids_path: Option<PathBuf>,
}

impl RecomputeReport {
    pub fn succeeded(&self) -> usize {
        self.processed - self.failed_uids.len()
    }

    fn record(&mut self, uid: &str, result: Result<AttrsOutcome, RecomputeError>) {
        self.processed += 1;
        match result {
            Ok(AttrsOutcome::Updated) => self.updated += 1,
            Ok(AttrsOutcome::NoObservations) => self.no_observations += 1,
            Ok(AttrsOutcome::NoValidObservations) => self.no_valid_observations += 1,
            Err(err) => {
                error!(event = "waterbody_failed", uid = %uid, error = %err);
                self.failed_uids.push(uid.to_string());
            }
        }
    }
}

pub struct DynamicAttrsEngine {
    config: DynamicAttrsConfig,
}

impl DynamicAttrsEngine {
    pub fn new(config: DynamicAttrsConfig) -> Self {
        Self { config }
    }

    /// Recomputes the dynamic attributes of every uid in order. A failing
    /// uid is logged and collected; it never stops the rest of the batch.
    /// When anything failed the uids are appended to the `failed_uids`
    /// artifact; only a failure to write that artifact aborts the call.
    pub fn recompute<S>(
        &self,
        store: &S,
        uids: &[String],
        run_date: NaiveDate,
    ) -> Result<RecomputeReport, DynamicAttrsError>
    where
        S: WaterbodyStorage + ?Sized,
    {
        let mut report = RecomputeReport::default();
        let total = uids.len();

        for (index, uid) in uids.iter().enumerate() {
            info!(
                event = "waterbody_start",
                uid = %uid,
                position = index + 1,
                total = total
            );
            let result = self.recompute_waterbody(store, uid, run_date);
            report.record(uid, result);
        }

        if !report.failed_uids.is_empty() {
            let path = append_failed_uids(&self.config.output_dir, &report.failed_uids)?;
            info!(
                event = "failed_uids_written",
                path = %path.display(),
                count = report.failed_uids.len()
            );
            report.failed_uids_path = Some(path);
        }

        info!(
            event = "recompute_summary",
            processed = report.processed,
            succeeded = report.succeeded(),
            failed = report.failed_uids.len(),
            updated = report.updated,
            no_observations = report.no_observations,
            no_valid_observations = report.no_valid_observations
        );

        Ok(report)
    }

    pub fn recompute_waterbody<S>(
        &self,
        store: &S,
        uid: &str,
        run_date: NaiveDate,
    ) -> Result<AttrsOutcome, RecomputeError>
    where
        S: WaterbodyStorage + ?Sized,
    {
        if !store.waterbody_exists(uid)? {
            return Err(RecomputeError::UnknownWaterbody(uid.to_string()));
        }

        let observations = store.observations_between(uid, self.config.history_start, run_date)?;
        let summary = summarize_timeseries(&observations, &self.config.quality);

        let outcome = match summary {
            TimeseriesSummary::NoObservations => {
                info!(
                    event = "no_observations",
                    uid = %uid,
                    start = %self.config.history_start,
                    end = %run_date
                );
                AttrsOutcome::NoObservations
            }
            TimeseriesSummary::NoValidObservations => {
                info!(
                    event = "no_valid_observations",
                    uid = %uid,
                    observations = observations.len(),
                    start = %self.config.history_start,
                    end = %run_date
                );
                AttrsOutcome::NoValidObservations
            }
            TimeseriesSummary::Observed { .. } => {
                info!(event = "last_valid_obs_update", uid = %uid);
                AttrsOutcome::Updated
            }
        };

        store.update_dynamic_attrs(uid, &summary.into_update(run_date))?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use wb_core::{ObservationRow, WaterbodyRecord};
    use wb_storage::WaterbodyStore;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn run_date() -> NaiveDate {
        date(2024, 3, 1)
    }

    fn row(
        obs_id: &str,
        uid: &str,
        date: NaiveDate,
        wet: i64,
        observed: i64,
        invalid: i64,
    ) -> ObservationRow {
        ObservationRow {
            obs_id: obs_id.to_string(),
            uid: uid.to_string(),
            date,
            px_total: 100,
            px_wet: wet,
            area_wet_m2: wet as f64 * 100.0,
            px_dry: observed - wet,
            area_dry_m2: (observed - wet) as f64 * 100.0,
            px_invalid: invalid,
            area_invalid_m2: invalid as f64 * 100.0,
            task_id: "task-1".to_string(),
        }
    }

    fn engine_in(dir: &std::path::Path) -> DynamicAttrsEngine {
        DynamicAttrsEngine::new(DynamicAttrsConfig {
            output_dir: dir.to_path_buf(),
            ..DynamicAttrsConfig::default()
        })
    }

    fn seeded_store() -> WaterbodyStore {
        let db = WaterbodyStore::open_in_memory().expect("open db");
        let mut prior = WaterbodyRecord::new("wb-empty");
        prior.last_obs_date = Some(date(2001, 1, 1));
        prior.last_valid_obs_date = Some(date(2000, 12, 1));
        prior.last_valid_obs = Some(17.0);
        db.upsert_waterbody(&prior).expect("insert prior");
        db.upsert_waterbody(&WaterbodyRecord::new("wb-mixed"))
            .expect("insert mixed");
        db.upsert_waterbody(&WaterbodyRecord::new("wb-cloudy"))
            .expect("insert cloudy");

        db.insert_observation(&row("m1", "wb-mixed", date(2023, 6, 1), 50, 90, 2))
            .expect("m1");
        db.insert_observation(&row("m2", "wb-mixed", date(2023, 6, 17), 80, 86, 10))
            .expect("m2");
        db.insert_observation(&row("c1", "wb-cloudy", date(2023, 6, 1), 5, 40, 60))
            .expect("c1");
        db
    }

    #[test]
    fn normal_branch_writes_all_attributes() {
        let db = seeded_store();
        let dir = tempdir().expect("tempdir");

        let outcome = engine_in(dir.path())
            .recompute_waterbody(&db, "wb-mixed", run_date())
            .expect("recompute");
        assert_eq!(outcome, AttrsOutcome::Updated);

        let record = db.waterbody("wb-mixed").expect("load").expect("present");
        assert_eq!(record.last_obs_date, Some(date(2023, 6, 17)));
        assert_eq!(record.last_valid_obs_date, Some(date(2023, 6, 1)));
        assert_eq!(record.last_valid_obs, Some(50.0));
        assert_eq!(record.last_attrs_update_date, Some(run_date()));
    }

    #[test]
    fn empty_series_only_refreshes_update_date() {
        let db = seeded_store();
        let dir = tempdir().expect("tempdir");

        let outcome = engine_in(dir.path())
            .recompute_waterbody(&db, "wb-empty", run_date())
            .expect("recompute");
        assert_eq!(outcome, AttrsOutcome::NoObservations);

        let record = db.waterbody("wb-empty").expect("load").expect("present");
        assert_eq!(record.last_obs_date, Some(date(2001, 1, 1)));
        assert_eq!(record.last_valid_obs_date, Some(date(2000, 12, 1)));
        assert_eq!(record.last_valid_obs, Some(17.0));
        assert_eq!(record.last_attrs_update_date, Some(run_date()));
    }

    #[test]
    fn low_quality_series_only_refreshes_update_date() {
        let db = seeded_store();
        let dir = tempdir().expect("tempdir");

        let outcome = engine_in(dir.path())
            .recompute_waterbody(&db, "wb-cloudy", run_date())
            .expect("recompute");
        assert_eq!(outcome, AttrsOutcome::NoValidObservations);

        let record = db.waterbody("wb-cloudy").expect("load").expect("present");
        assert_eq!(record.last_obs_date, None);
        assert_eq!(record.last_valid_obs, None);
        assert_eq!(record.last_attrs_update_date, Some(run_date()));
    }

    #[test]
    fn observations_after_run_date_are_ignored() {
        let db = seeded_store();
        db.insert_observation(&row("m3", "wb-mixed", date(2024, 5, 1), 70, 99, 0))
            .expect("future obs");
        let dir = tempdir().expect("tempdir");

        engine_in(dir.path())
            .recompute_waterbody(&db, "wb-mixed", run_date())
            .expect("recompute");
        let record = db.waterbody("wb-mixed").expect("load").expect("present");
        assert_eq!(record.last_obs_date, Some(date(2023, 6, 17)));
        assert_eq!(record.last_valid_obs, Some(50.0));
    }

    #[test]
    fn unknown_uid_is_recorded_and_batch_continues() {
        let db = seeded_store();
        let dir = tempdir().expect("tempdir");
        let uids = vec!["ghost".to_string(), "wb-mixed".to_string()];

        let report = engine_in(dir.path())
            .recompute(&db, &uids, run_date())
            .expect("run");
        assert_eq!(report.processed, 2);
        assert_eq!(report.updated, 1);
        assert_eq!(report.failed_uids, vec!["ghost".to_string()]);

        let path = report.failed_uids_path.expect("artifact written");
        assert_eq!(fs::read_to_string(path).expect("read"), "[\"ghost\"]\n");
    }

    #[test]
    fn clean_run_writes_no_failure_artifact() {
        let db = seeded_store();
        let dir = tempdir().expect("tempdir");
        let uids = db.waterbody_uids().expect("uids");

        let report = engine_in(dir.path())
            .recompute(&db, &uids, run_date())
            .expect("run");
        assert_eq!(report.processed, 3);
        assert_eq!(report.succeeded(), 3);
        assert_eq!(report.updated, 1);
        assert_eq!(report.no_observations, 1);
        assert_eq!(report.no_valid_observations, 1);
        assert!(report.failed_uids_path.is_none());
        assert!(!dir.path().join("failed_uids").exists());
    }

    #[test]
    fn rerun_on_unchanged_observations_is_idempotent() {
        let db = seeded_store();
        let dir = tempdir().expect("tempdir");
        let engine = engine_in(dir.path());
        let uids = db.waterbody_uids().expect("uids");

        engine.recompute(&db, &uids, run_date()).expect("first");
        let first = uids
            .iter()
            .map(|uid| db.waterbody(uid).expect("load").expect("present"))
            .collect::<Vec<_>>();

        let later = date(2024, 3, 8);
        engine.recompute(&db, &uids, later).expect("second");
        for before in first {
            let after = db.waterbody(&before.uid).expect("load").expect("present");
            assert_eq!(after.last_obs_date, before.last_obs_date);
            assert_eq!(after.last_valid_obs_date, before.last_valid_obs_date);
            assert_eq!(after.last_valid_obs, before.last_valid_obs);
            assert_eq!(after.last_attrs_update_date, Some(later));
        }
    }
}
