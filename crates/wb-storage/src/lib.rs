use chrono::NaiveDate;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use thiserror::Error;
use wb_core::artifacts::file_exists;
use wb_core::{DynamicAttrsUpdate, Observation, ObservationRow, WaterbodyRecord, DATE_FORMAT};

pub const WATERBODIES_SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("date parse error: {0}")]
    Date(String),
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
    #[error("waterbody {0} does not exist in the historical extent table")]
    UnknownWaterbody(String),
    #[error("database {} does not exist", .0.display())]
    MissingDatabase(PathBuf),
}

/// Read/update contract the dynamic attribute jobs need from storage.
pub trait WaterbodyStorage {
    /// All waterbody uids, ordered by uid.
    fn waterbody_uids(&self) -> Result<Vec<String>, StorageError>;

    fn waterbody_exists(&self, uid: &str) -> Result<bool, StorageError>;

    /// Observations dated within `[start, end]`, oldest first.
    fn observations_between(
        &self,
        uid: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, StorageError>;

    /// Point update of the dynamic attributes. Fails with
    /// [`StorageError::UnknownWaterbody`] when no row matches `uid`.
    fn update_dynamic_attrs(
        &self,
        uid: &str,
        update: &DynamicAttrsUpdate,
    ) -> Result<(), StorageError>;
}

#[derive(Debug)]
pub struct WaterbodyStore {
    conn: Connection,
}

impl WaterbodyStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Opens a database that must already exist; never creates the file.
    pub fn open_existing(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if !file_exists(path) {
            return Err(StorageError::MissingDatabase(path.to_path_buf()));
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        Ok(self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?)
    }

    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > WATERBODIES_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: WATERBODIES_SCHEMA_VERSION,
            });
        }

        if current < 1 {
            let sql = include_str!("../migrations/0001_waterbodies_schema.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute("PRAGMA user_version = 1", [])
                .map(|_| ())?;
        }

        Ok(())
    }

    /// Inserts a waterbody or refreshes its static attributes. Dynamic
    /// attributes are only taken from `record` on first insert.
    pub fn upsert_waterbody(&self, record: &WaterbodyRecord) -> Result<(), StorageError> {
        self.conn.execute(
            "
            INSERT INTO waterbodies_historical_extent (
                uid,
                wb_id,
                area_m2,
                length_m,
                perim_m,
                geometry,
                last_obs_date,
                last_valid_obs_date,
                last_valid_obs,
                last_attrs_update_date
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(uid) DO UPDATE SET
                wb_id=excluded.wb_id,
                area_m2=excluded.area_m2,
                length_m=excluded.length_m,
                perim_m=excluded.perim_m,
                geometry=excluded.geometry
            ",
            params![
                record.uid,
                record.wb_id,
                record.area_m2,
                record.length_m,
                record.perim_m,
                record.geometry,
                record.last_obs_date.map(format_date),
                record.last_valid_obs_date.map(format_date),
                record.last_valid_obs,
                record.last_attrs_update_date.map(format_date),
            ],
        )?;

        Ok(())
    }

    /// Appends an observation. Returns `false` when `obs_id` already exists;
    /// stored observations are never rewritten.
    pub fn insert_observation(&self, row: &ObservationRow) -> Result<bool, StorageError> {
        let changes = self.conn.execute(
            "
            INSERT OR IGNORE INTO waterbodies_observations (
                obs_id,
                uid,
                px_total,
                px_wet,
                area_wet_m2,
                px_dry,
                area_dry_m2,
                px_invalid,
                area_invalid_m2,
                date,
                task_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ",
            params![
                row.obs_id,
                row.uid,
                row.px_total,
                row.px_wet,
                row.area_wet_m2,
                row.px_dry,
                row.area_dry_m2,
                row.px_invalid,
                row.area_invalid_m2,
                format_date(row.date),
                row.task_id,
            ],
        )?;

        Ok(changes > 0)
    }

    pub fn waterbody(&self, uid: &str) -> Result<Option<WaterbodyRecord>, StorageError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT uid, wb_id, area_m2, length_m, perim_m, geometry,
                       last_obs_date, last_valid_obs_date, last_valid_obs, last_attrs_update_date
                FROM waterbodies_historical_extent
                WHERE uid = ?1
                ",
                [uid],
                |row| {
                    Ok((
                        WaterbodyRecord {
                            uid: row.get(0)?,
                            wb_id: row.get(1)?,
                            area_m2: row.get(2)?,
                            length_m: row.get(3)?,
                            perim_m: row.get(4)?,
                            geometry: row.get(5)?,
                            last_obs_date: None,
                            last_valid_obs_date: None,
                            last_valid_obs: row.get(8)?,
                            last_attrs_update_date: None,
                        },
                        row.get::<_, Option<String>>(6)?,
                        row.get::<_, Option<String>>(7)?,
                        row.get::<_, Option<String>>(9)?,
                    ))
                },
            )
            .optional()?;

        let Some((mut record, last_obs_date, last_valid_obs_date, last_attrs_update_date)) = row
        else {
            return Ok(None);
        };

        record.last_obs_date = last_obs_date.map(parse_date).transpose()?;
        record.last_valid_obs_date = last_valid_obs_date.map(parse_date).transpose()?;
        record.last_attrs_update_date = last_attrs_update_date.map(parse_date).transpose()?;
        Ok(Some(record))
    }

    pub fn observation_count(&self, uid: &str) -> Result<usize, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM waterbodies_observations WHERE uid = ?1",
            [uid],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .query_row(
                "
                SELECT 1
                FROM sqlite_master
                WHERE type='table' AND name = ?1
                LIMIT 1
                ",
                [table_name],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(exists)
    }
}

impl WaterbodyStorage for WaterbodyStore {
    fn waterbody_uids(&self) -> Result<Vec<String>, StorageError> {
        let mut statement = self
            .conn
            .prepare("SELECT uid FROM waterbodies_historical_extent ORDER BY uid ASC")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;

        let mut uids = Vec::new();
        for row in rows {
            uids.push(row?);
        }
        Ok(uids)
    }

    fn waterbody_exists(&self, uid: &str) -> Result<bool, StorageError> {
        let exists = self
            .conn
            .query_row(
                "SELECT 1 FROM waterbodies_historical_extent WHERE uid = ?1 LIMIT 1",
                [uid],
                |_| Ok(()),
            )
            .optional()?
            .is_some();
        Ok(exists)
    }

    fn observations_between(
        &self,
        uid: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Observation>, StorageError> {
        let mut statement = self.conn.prepare(
            "
            SELECT date, px_total, px_wet, px_dry, px_invalid
            FROM waterbodies_observations
            WHERE uid = ?1 AND date >= ?2 AND date <= ?3
            ORDER BY date ASC, obs_id ASC
            ",
        )?;

        let rows = statement.query_map(
            params![uid, format_date(start), format_date(end)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )?;

        let mut observations = Vec::new();
        for row in rows {
            let (date, px_total, px_wet, px_dry, px_invalid) = row?;
            observations.push(Observation::from_pixel_counts(
                parse_date(date)?,
                px_total,
                px_wet,
                px_dry,
                px_invalid,
            ));
        }
        Ok(observations)
    }

    fn update_dynamic_attrs(
        &self,
        uid: &str,
        update: &DynamicAttrsUpdate,
    ) -> Result<(), StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        let changes = tx.execute(
            "
            UPDATE waterbodies_historical_extent SET
                last_attrs_update_date = ?2,
                last_obs_date = COALESCE(?3, last_obs_date),
                last_valid_obs_date = COALESCE(?4, last_valid_obs_date),
                last_valid_obs = COALESCE(?5, last_valid_obs)
            WHERE uid = ?1
            ",
            params![
                uid,
                format_date(update.last_attrs_update_date),
                update.last_obs_date.map(format_date),
                update.last_valid_obs_date.map(format_date),
                update.last_valid_obs,
            ],
        )?;

        if changes == 0 {
            return Err(StorageError::UnknownWaterbody(uid.to_string()));
        }

        tx.commit()?;
        Ok(())
    }
}

fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn parse_date(value: String) -> Result<NaiveDate, StorageError> {
    NaiveDate::parse_from_str(&value, DATE_FORMAT)
        .map_err(|err| StorageError::Date(format!("{value}: {err}")))
}
