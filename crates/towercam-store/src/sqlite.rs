//! SQLite-backed freshness record.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::time::Duration;

use crate::backend::{check_source, FreshnessStore, StoreError, StoreResult};
use crate::record::{FreshnessRecord, Observation, Source, SourceValue};

const RECORD_ID: i64 = 1;

/// SQLite store holding the single freshness row.
///
/// The connection sits behind a mutex so request handlers can share one
/// store; each public method holds the lock for exactly one statement or
/// transaction.
pub struct SqliteFreshnessStore {
    conn: Mutex<Connection>,
}

impl SqliteFreshnessStore {
    /// Open (or create) the store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    /// Create an in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create the table and its singleton row if they don't exist.
    fn init_schema(&self) -> StoreResult<()> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS towercam (
                id INTEGER PRIMARY KEY,
                last_weather_success INTEGER,
                last_weather_attempt INTEGER,
                temperature REAL NOT NULL DEFAULT 0.0,
                wind_speed INTEGER NOT NULL DEFAULT 0,
                last_image_success INTEGER,
                last_image_attempt INTEGER,
                image_checksum TEXT NOT NULL DEFAULT '',
                merge_generation INTEGER NOT NULL DEFAULT 0,
                composite_generation INTEGER NOT NULL DEFAULT 0
            );

            INSERT OR IGNORE INTO towercam (id) VALUES (1);
            "#,
        )?;
        Ok(())
    }

    fn read_record(conn: &Connection) -> StoreResult<FreshnessRecord> {
        let row = conn
            .query_row(
                r#"
                SELECT last_weather_success, last_weather_attempt, temperature, wind_speed,
                       last_image_success, last_image_attempt, image_checksum,
                       merge_generation, composite_generation
                FROM towercam WHERE id = ?1
                "#,
                params![RECORD_ID],
                |row| {
                    Ok((
                        row.get::<_, Option<i64>>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                        row.get::<_, Option<i64>>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, i64>(7)?,
                        row.get::<_, i64>(8)?,
                    ))
                },
            )
            .optional()?
            .ok_or(StoreError::MissingRow)?;

        let (
            weather_success,
            weather_attempt,
            temperature,
            wind_speed,
            image_success,
            image_attempt,
            image_checksum,
            merge_generation,
            composite_generation,
        ) = row;

        Ok(FreshnessRecord {
            last_weather_success: to_datetime("last_weather_success", weather_success)?,
            last_weather_attempt: to_datetime("last_weather_attempt", weather_attempt)?,
            temperature,
            wind_speed,
            last_image_success: to_datetime("last_image_success", image_success)?,
            last_image_attempt: to_datetime("last_image_attempt", image_attempt)?,
            image_checksum,
            merge_generation,
            composite_generation,
        })
    }

    fn stamp_attempt(conn: &Connection, source: Source, now: DateTime<Utc>) -> StoreResult<()> {
        let sql = match source {
            Source::Weather => {
                "UPDATE towercam SET last_weather_attempt = MAX(COALESCE(last_weather_attempt, ?1), ?1) WHERE id = ?2"
            }
            Source::Image => {
                "UPDATE towercam SET last_image_attempt = MAX(COALESCE(last_image_attempt, ?1), ?1) WHERE id = ?2"
            }
        };
        let changed = conn.execute(sql, params![now.timestamp(), RECORD_ID])?;
        if changed == 0 {
            return Err(StoreError::MissingRow);
        }
        Ok(())
    }

    fn merge(conn: &Connection, observation: &Observation) -> StoreResult<bool> {
        let observed_at = observation.observed_at.timestamp();
        let changed = match &observation.value {
            SourceValue::Weather {
                temperature,
                wind_speed,
            } => conn.execute(
                r#"
                UPDATE towercam
                SET last_weather_success = ?1, temperature = ?2, wind_speed = ?3,
                    merge_generation = merge_generation + 1
                WHERE id = ?4 AND (last_weather_success IS NULL OR last_weather_success < ?1)
                "#,
                params![observed_at, temperature, wind_speed, RECORD_ID],
            )?,
            SourceValue::Image { checksum } => conn.execute(
                r#"
                UPDATE towercam
                SET last_image_success = ?1, image_checksum = ?2,
                    merge_generation = merge_generation + 1
                WHERE id = ?3 AND (last_image_success IS NULL OR last_image_success < ?1)
                "#,
                params![observed_at, checksum, RECORD_ID],
            )?,
        };
        Ok(changed > 0)
    }
}

impl FreshnessStore for SqliteFreshnessStore {
    fn get_record(&self) -> StoreResult<FreshnessRecord> {
        let conn = self.conn.lock();
        Self::read_record(&conn)
    }

    fn update_attempt(&self, source: Source, now: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.conn.lock();
        Self::stamp_attempt(&conn, source, now)
    }

    fn merge_success(&self, observation: &Observation) -> StoreResult<bool> {
        let conn = self.conn.lock();
        let merged = Self::merge(&conn, observation)?;
        if !merged {
            tracing::debug!(
                source = %observation.source(),
                observed_at = %observation.observed_at,
                "Observation not newer than stored value, skipping merge"
            );
        }
        Ok(merged)
    }

    fn mark_composite_built(&self, generation: i64) -> StoreResult<()> {
        let changed = self.conn.lock().execute(
            "UPDATE towercam SET composite_generation = MAX(composite_generation, ?1) WHERE id = ?2",
            params![generation, RECORD_ID],
        )?;
        if changed == 0 {
            return Err(StoreError::MissingRow);
        }
        Ok(())
    }

    fn commit_attempt(
        &self,
        source: Source,
        now: DateTime<Utc>,
        observation: Option<&Observation>,
    ) -> StoreResult<bool> {
        check_source(source, observation)?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        Self::stamp_attempt(&tx, source, now)?;
        let merged = match observation {
            Some(obs) => Self::merge(&tx, obs)?,
            None => false,
        };
        tx.commit()?;
        Ok(merged)
    }
}

fn to_datetime(column: &'static str, value: Option<i64>) -> StoreResult<Option<DateTime<Utc>>> {
    value
        .map(|secs| {
            DateTime::from_timestamp(secs, 0).ok_or(StoreError::InvalidTimestamp {
                column,
                value: secs,
            })
        })
        .transpose()
}
