use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row, ToSql};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use super::schema::{generate_create_table, generate_indexes, ALL_TABLES};
use super::{CommitOutcome, PilotCommit, WorldSeed, WorldStore};
use crate::error::StoreError;
use crate::model::{Connection as SystemLink, Pilot, Sector, SectorId, SectorType, System, SystemId};

/// Idle connections kept for reuse
const POOL_SIZE: usize = 8;

const SECTOR_COLUMNS: &str = "id, system_id, sector_number, sector_type";

/// World store backed by a SQLite database file.
///
/// Each call checks a connection out of a small pool, so calls for
/// different pilots never queue behind each other in this process.
pub struct SqliteStore {
    path: PathBuf,
    busy_timeout: Duration,
    idle: Mutex<Vec<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database and make sure every table exists
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        let store = Self {
            path: path.to_path_buf(),
            busy_timeout,
            idle: Mutex::new(Vec::new()),
        };

        store.create_tables()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn create_tables(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            for schema in ALL_TABLES {
                conn.execute(&generate_create_table(schema), [])?;
                for index_sql in generate_indexes(schema) {
                    conn.execute(&index_sql, [])?;
                }
            }
            Ok(())
        })
    }

    fn open_connection(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;
        Ok(conn)
    }

    /// Run `f` on a pooled connection, opening a new one when none is idle
    fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let reused = self
            .idle
            .lock()
            .map_err(|_| StoreError::Unavailable("connection pool lock poisoned".to_string()))?
            .pop();

        let mut conn = match reused {
            Some(conn) => conn,
            None => self.open_connection()?,
        };

        let result = f(&mut conn);

        if let Ok(mut idle) = self.idle.lock() {
            if idle.len() < POOL_SIZE {
                idle.push(conn);
            }
        }

        result
    }

    /// Insert a validated world in one transaction, parents before children.
    /// Rows may reference systems and sectors that are already stored.
    pub fn import(&self, seed: &WorldSeed) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let known_systems = collect_ids(&tx, "SELECT id FROM systems")?;
            let known_sectors = collect_ids(&tx, "SELECT id FROM sectors")?;
            seed.validate_onto(&known_systems, &known_sectors)?;

            {
                let mut stmt = tx.prepare_cached(
                    "INSERT INTO systems (id, name, metadata) VALUES (?1, ?2, ?3)",
                )?;
                for system in &seed.systems {
                    let metadata = Value::Object(system.metadata.clone()).to_string();
                    stmt.execute(params![system.id, system.name, metadata])?;
                }

                let mut stmt = tx.prepare_cached(&format!(
                    "INSERT INTO sectors ({}) VALUES (?1, ?2, ?3, ?4)",
                    SECTOR_COLUMNS
                ))?;
                for sector in &seed.sectors {
                    stmt.execute(params![
                        sector.id,
                        sector.system_id,
                        sector.sector_number,
                        sector.sector_type
                    ])?;
                }

                let mut stmt = tx.prepare_cached(
                    "INSERT INTO system_connections (system_id, connected_system_id) VALUES (?1, ?2)",
                )?;
                for link in &seed.connections {
                    stmt.execute(params![link.system_id, link.connected_system_id])?;
                }

                let mut stmt = tx.prepare_cached(
                    "INSERT INTO pilots (username, current_sector_id, turns, is_admin, pilot_level, version)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for pilot in &seed.pilots {
                    stmt.execute(params![
                        pilot.username,
                        pilot.current_sector_id,
                        pilot.turns,
                        pilot.is_admin,
                        pilot.pilot_level,
                        stored_version(pilot.version)?
                    ])?;
                }
            }

            tx.commit()?;
            Ok(())
        })?;

        log::info!("Imported {} records into {:?}", seed.record_count(), self.path);
        Ok(seed.record_count())
    }

    /// Let SQLite refresh its query planner statistics
    pub fn optimize(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| {
            conn.execute_batch("PRAGMA optimize;")?;
            Ok(())
        })
    }
}

impl FromSql for SectorType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        SectorType::parse(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown sector type {}", text).into()))
    }
}

impl ToSql for SectorType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

fn collect_ids(conn: &Connection, sql: &str) -> Result<HashSet<i64>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<HashSet<i64>>>()?;
    Ok(ids)
}

/// Versions are `u64` in memory and `INTEGER` (i64) on disk
fn stored_version(version: u64) -> Result<i64, StoreError> {
    i64::try_from(version).map_err(|_| {
        StoreError::InvalidData(format!("version {} does not fit the pilots table", version))
    })
}

fn version_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let version: i64 = row.get(idx)?;
    u64::try_from(version).map_err(|_| rusqlite::Error::IntegralValueOutOfRange(idx, version))
}

fn sector_from_row(row: &Row<'_>) -> rusqlite::Result<Sector> {
    Ok(Sector {
        id: row.get(0)?,
        system_id: row.get(1)?,
        sector_number: row.get(2)?,
        sector_type: row.get(3)?,
    })
}

fn system_row(row: &Row<'_>) -> rusqlite::Result<(SystemId, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn system_from_parts(id: SystemId, name: String, metadata: &str) -> Result<System, StoreError> {
    let metadata: Map<String, Value> = serde_json::from_str(metadata).map_err(|e| {
        StoreError::InvalidData(format!("system {} has malformed metadata: {}", id, e))
    })?;
    Ok(System { id, name, metadata })
}

impl WorldStore for SqliteStore {
    fn list_systems(&self) -> Result<Vec<System>, StoreError> {
        let rows = self.with_conn(|conn| {
            let mut stmt =
                conn.prepare_cached("SELECT id, name, metadata FROM systems ORDER BY id")?;
            let rows = stmt
                .query_map([], system_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(id, name, metadata)| system_from_parts(id, name, &metadata))
            .collect()
    }

    fn list_connections(&self) -> Result<Vec<SystemLink>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT system_id, connected_system_id FROM system_connections
                 ORDER BY system_id, connected_system_id",
            )?;
            let links = stmt
                .query_map([], |row| Ok(SystemLink::new(row.get(0)?, row.get(1)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(links)
        })
    }

    fn list_wormhole_sectors(&self) -> Result<Vec<Sector>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM sectors WHERE sector_type = ?1 ORDER BY system_id, id",
                SECTOR_COLUMNS
            ))?;
            let sectors = stmt
                .query_map([SectorType::Wormhole], sector_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(sectors)
        })
    }

    fn system(&self, id: SystemId) -> Result<Option<System>, StoreError> {
        let row = self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, metadata FROM systems WHERE id = ?1",
                    [id],
                    system_row,
                )
                .optional()?;
            Ok(row)
        })?;

        row.map(|(id, name, metadata)| system_from_parts(id, name, &metadata))
            .transpose()
    }

    fn sector(&self, id: SectorId) -> Result<Option<Sector>, StoreError> {
        self.with_conn(|conn| {
            let sector = conn
                .query_row(
                    &format!("SELECT {} FROM sectors WHERE id = ?1", SECTOR_COLUMNS),
                    [id],
                    sector_from_row,
                )
                .optional()?;
            Ok(sector)
        })
    }

    fn sector_by_number(
        &self,
        system_id: SystemId,
        sector_number: i64,
    ) -> Result<Option<Sector>, StoreError> {
        self.with_conn(|conn| {
            let sector = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM sectors WHERE system_id = ?1 AND sector_number = ?2",
                        SECTOR_COLUMNS
                    ),
                    [system_id, sector_number],
                    sector_from_row,
                )
                .optional()?;
            Ok(sector)
        })
    }

    fn load_pilot(&self, username: &str) -> Result<Option<Pilot>, StoreError> {
        self.with_conn(|conn| {
            let pilot = conn
                .query_row(
                    "SELECT username, current_sector_id, turns, is_admin, pilot_level, version
                     FROM pilots WHERE username = ?1",
                    [username],
                    |row| {
                        Ok(Pilot {
                            username: row.get(0)?,
                            current_sector_id: row.get(1)?,
                            turns: row.get(2)?,
                            is_admin: row.get(3)?,
                            pilot_level: row.get(4)?,
                            version: version_from_row(row, 5)?,
                        })
                    },
                )
                .optional()?;
            Ok(pilot)
        })
    }

    fn commit_pilot(&self, commit: &PilotCommit) -> Result<CommitOutcome, StoreError> {
        let expected_version = stored_version(commit.expected_version)?;
        let changed = self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE pilots
                 SET current_sector_id = ?1, turns = turns - ?2, version = version + 1
                 WHERE username = ?3 AND version = ?4 AND (?2 = 0 OR turns >= ?2)",
                params![
                    commit.sector_id,
                    commit.turns_charge,
                    commit.username,
                    expected_version
                ],
            )?;
            Ok(changed)
        })?;

        Ok(if changed == 1 {
            CommitOutcome::Applied {
                version: commit.expected_version + 1,
            }
        } else {
            CommitOutcome::Conflict
        })
    }
}
