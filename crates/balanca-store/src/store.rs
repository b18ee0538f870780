//! Main store implementation.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{HeartRateRecord, Profile, WeightMeasurement};
use crate::schema;

/// Render a timestamp the way the schema stores it.
fn format_timestamp(ts: OffsetDateTime) -> Result<String> {
    ts.format(&Rfc3339)
        .map_err(|e| Error::InvalidTimestamp(e.to_string()))
}

/// Parse a stored timestamp.
fn parse_timestamp(raw: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|_| Error::InvalidTimestamp(raw.to_string()))
}

/// SQLite-based store for measurement data.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("opening database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self { conn })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    // === Profile operations ===

    /// Create or update a profile.
    pub fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.conn.execute(
            "INSERT INTO profiles (user_id, display_name, height_m) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET
                display_name = COALESCE(?2, display_name),
                height_m = COALESCE(?3, height_m)",
            rusqlite::params![profile.user_id, profile.display_name, profile.height_m],
        )?;
        Ok(())
    }

    /// Get a profile by user id.
    pub fn get_profile(&self, user_id: &str) -> Result<Option<Profile>> {
        let mut stmt = self
            .conn
            .prepare("SELECT user_id, display_name, height_m FROM profiles WHERE user_id = ?")?;

        let profile = stmt
            .query_row([user_id], |row| {
                Ok(Profile {
                    user_id: row.get(0)?,
                    display_name: row.get(1)?,
                    height_m: row.get(2)?,
                })
            })
            .optional()?;

        Ok(profile)
    }
}

// Weight measurement operations
impl Store {
    /// Insert a weight measurement, returning the row id.
    pub fn insert_weight(&self, m: &WeightMeasurement) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO weight_measurements (user_id, peso_kg, gordura_corporal_percent,
             massa_muscular_kg, agua_corporal_percent, osso_kg, metabolismo_basal_kcal,
             idade_metabolica, gordura_visceral, imc, device_type, device_name,
             measurement_date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            rusqlite::params![
                m.user_id,
                m.peso_kg,
                m.gordura_corporal_percent,
                m.massa_muscular_kg,
                m.agua_corporal_percent,
                m.osso_kg,
                m.metabolismo_basal_kcal,
                m.idade_metabolica,
                m.gordura_visceral,
                m.imc,
                m.device_type,
                m.device_name,
                format_timestamp(m.measurement_date)?,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// List a user's weight measurements, newest first.
    pub fn list_weights(&self, user_id: &str, limit: u32) -> Result<Vec<WeightMeasurement>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, peso_kg, gordura_corporal_percent, massa_muscular_kg,
                    agua_corporal_percent, osso_kg, metabolismo_basal_kcal, idade_metabolica,
                    gordura_visceral, imc, device_type, device_name, measurement_date
             FROM weight_measurements WHERE user_id = ?1
             ORDER BY measurement_date DESC LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![user_id, limit], |row| {
                Ok((row_to_weight(row)?, row.get::<_, String>(13)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut m, raw_ts)| {
                m.measurement_date = parse_timestamp(&raw_ts)?;
                Ok(m)
            })
            .collect()
    }

    /// The most recent weight measurement for a user.
    pub fn latest_weight(&self, user_id: &str) -> Result<Option<WeightMeasurement>> {
        Ok(self.list_weights(user_id, 1)?.into_iter().next())
    }

    /// Count a user's weight measurements.
    pub fn count_weights(&self, user_id: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM weight_measurements WHERE user_id = ?",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

// Heart-rate operations
impl Store {
    /// Insert a heart-rate reading, returning the row id.
    pub fn insert_heart_rate(&self, record: &HeartRateRecord) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO heart_rate_data (user_id, heart_rate_bpm, heart_rate_variability,
             device_type, device_name, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                record.user_id,
                record.heart_rate_bpm,
                record.heart_rate_variability,
                record.device_type,
                record.device_name,
                format_timestamp(record.recorded_at)?,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    /// List a user's heart-rate readings, newest first.
    pub fn list_heart_rates(&self, user_id: &str, limit: u32) -> Result<Vec<HeartRateRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, user_id, heart_rate_bpm, heart_rate_variability, device_type,
                    device_name, recorded_at
             FROM heart_rate_data WHERE user_id = ?1
             ORDER BY recorded_at DESC LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(rusqlite::params![user_id, limit], |row| {
                Ok((
                    HeartRateRecord {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        heart_rate_bpm: row.get::<_, i64>(2)? as u16,
                        heart_rate_variability: row.get(3)?,
                        device_type: row.get(4)?,
                        device_name: row.get(5)?,
                        recorded_at: OffsetDateTime::UNIX_EPOCH,
                    },
                    row.get::<_, String>(6)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(mut record, raw_ts)| {
                record.recorded_at = parse_timestamp(&raw_ts)?;
                Ok(record)
            })
            .collect()
    }

    /// Count a user's heart-rate readings.
    pub fn count_heart_rates(&self, user_id: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM heart_rate_data WHERE user_id = ?",
            [user_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

fn row_to_weight(row: &rusqlite::Row<'_>) -> rusqlite::Result<WeightMeasurement> {
    Ok(WeightMeasurement {
        id: row.get(0)?,
        user_id: row.get(1)?,
        peso_kg: row.get(2)?,
        gordura_corporal_percent: row.get(3)?,
        massa_muscular_kg: row.get(4)?,
        agua_corporal_percent: row.get(5)?,
        osso_kg: row.get(6)?,
        metabolismo_basal_kcal: row.get(7)?,
        idade_metabolica: row.get(8)?,
        gordura_visceral: row.get(9)?,
        imc: row.get(10)?,
        device_type: row.get(11)?,
        device_name: row.get(12)?,
        // Overwritten by the caller from the raw column text.
        measurement_date: OffsetDateTime::UNIX_EPOCH,
    })
}
