//! World provisioning: typed rows loaded from a directory of JSONL files or built in code

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::schema::{PILOTS, SECTORS, SYSTEMS, SYSTEM_CONNECTIONS};
use crate::error::StoreError;
use crate::model::{
    Connection, Pilot, Sector, SectorId, SectorType, System, SystemId, RESERVED_METADATA_KEYS,
};

/// Everything needed to populate an empty world store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldSeed {
    pub systems: Vec<System>,
    pub sectors: Vec<Sector>,
    pub connections: Vec<Connection>,
    pub pilots: Vec<Pilot>,
}

impl WorldSeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `systems.jsonl`, `sectors.jsonl`, `system_connections.jsonl` and
    /// `pilots.jsonl` from a directory. Missing files are skipped.
    pub fn from_jsonl_dir(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("World directory not found: {:?}", dir);
        }

        Ok(Self {
            systems: read_jsonl(&dir.join(SYSTEMS.source_file))?,
            sectors: read_jsonl(&dir.join(SECTORS.source_file))?,
            connections: read_jsonl(&dir.join(SYSTEM_CONNECTIONS.source_file))?,
            pilots: read_jsonl(&dir.join(PILOTS.source_file))?,
        })
    }

    pub fn system(mut self, id: SystemId, name: &str) -> Self {
        self.systems.push(System::new(id, name));
        self
    }

    pub fn sector(
        mut self,
        id: SectorId,
        system_id: SystemId,
        sector_number: i64,
        sector_type: SectorType,
    ) -> Self {
        self.sectors.push(Sector {
            id,
            system_id,
            sector_number,
            sector_type,
        });
        self
    }

    /// One-directional connection row
    pub fn connect(mut self, from: SystemId, to: SystemId) -> Self {
        self.connections.push(Connection::new(from, to));
        self
    }

    /// Both connection rows
    pub fn link(self, a: SystemId, b: SystemId) -> Self {
        self.connect(a, b).connect(b, a)
    }

    pub fn pilot(mut self, pilot: Pilot) -> Self {
        self.pilots.push(pilot);
        self
    }

    pub fn record_count(&self) -> u64 {
        (self.systems.len() + self.sectors.len() + self.connections.len() + self.pilots.len())
            as u64
    }

    /// Check keys and references the way the SQLite schema would.
    ///
    /// Wormhole multiplicity is not checked here.
    pub fn validate(&self) -> Result<(), StoreError> {
        self.validate_onto(&HashSet::new(), &HashSet::new())
    }

    /// Like [`WorldSeed::validate`], for a seed added to a store that
    /// already holds `known_systems` and `known_sectors`
    pub fn validate_onto(
        &self,
        known_systems: &HashSet<SystemId>,
        known_sectors: &HashSet<SectorId>,
    ) -> Result<(), StoreError> {
        let mut system_ids = known_systems.clone();
        for system in &self.systems {
            if !system_ids.insert(system.id) {
                return Err(invalid(format!("duplicate system id {}", system.id)));
            }
            let reserved = RESERVED_METADATA_KEYS
                .iter()
                .find(|key| system.metadata.contains_key(**key));
            if let Some(key) = reserved {
                return Err(invalid(format!(
                    "system {} metadata uses reserved key {}",
                    system.id, key
                )));
            }
        }

        let mut sector_ids = known_sectors.clone();
        let mut sector_numbers = HashSet::new();
        for sector in &self.sectors {
            if !sector_ids.insert(sector.id) {
                return Err(invalid(format!("duplicate sector id {}", sector.id)));
            }
            if !system_ids.contains(&sector.system_id) {
                return Err(invalid(format!(
                    "sector {} belongs to unknown system {}",
                    sector.id, sector.system_id
                )));
            }
            if !sector_numbers.insert((sector.system_id, sector.sector_number)) {
                return Err(invalid(format!(
                    "sector number {} used twice in system {}",
                    sector.sector_number, sector.system_id
                )));
            }
        }

        let mut connections = HashSet::new();
        for connection in &self.connections {
            for id in [connection.system_id, connection.connected_system_id] {
                if !system_ids.contains(&id) {
                    return Err(invalid(format!("connection references unknown system {}", id)));
                }
            }
            if !connections.insert(*connection) {
                return Err(invalid(format!(
                    "duplicate connection {} -> {}",
                    connection.system_id, connection.connected_system_id
                )));
            }
        }

        let mut usernames = HashSet::new();
        for pilot in &self.pilots {
            if !Pilot::is_valid_username(&pilot.username) {
                return Err(invalid(format!(
                    "pilot username {:?} is not URL-safe",
                    pilot.username
                )));
            }
            if !usernames.insert(pilot.username.as_str()) {
                return Err(invalid(format!("duplicate pilot {}", pilot.username)));
            }
            if !sector_ids.contains(&pilot.current_sector_id) {
                return Err(invalid(format!(
                    "pilot {} is stationed in unknown sector {}",
                    pilot.username, pilot.current_sector_id
                )));
            }
            if pilot.turns < 0 {
                return Err(invalid(format!("pilot {} has negative turns", pilot.username)));
            }
            if i64::try_from(pilot.version).is_err() {
                return Err(invalid(format!("pilot {} version is out of range", pilot.username)));
            }
        }

        Ok(())
    }
}

fn invalid(message: String) -> StoreError {
    StoreError::InvalidData(message)
}

/// Deserialize one record per non-empty line
fn read_jsonl<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        log::warn!("{:?}: skipped (file not found)", path);
        return Ok(Vec::new());
    }

    let file = File::open(path).with_context(|| format!("Failed to open: {:?}", path))?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read line")?;
        if line.trim().is_empty() {
            continue;
        }

        let record = serde_json::from_str(&line)
            .with_context(|| format!("Failed to parse record at {}:{}", path.display(), idx + 1))?;
        records.push(record);
    }

    log::debug!("{:?}: {} records", path, records.len());
    Ok(records)
}
