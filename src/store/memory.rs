use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{CommitOutcome, PilotCommit, WorldSeed, WorldStore};
use crate::error::StoreError;
use crate::model::{Connection, Pilot, Sector, SectorId, System, SystemId};

#[derive(Debug, Default)]
struct WorldTables {
    systems: BTreeMap<SystemId, System>,
    sectors: BTreeMap<SectorId, Sector>,
    connections: Vec<Connection>,
}

/// World store kept entirely in process memory.
///
/// Pilot records live in their own map; its mutex is held only for the
/// duration of a single load or compare-and-set.
#[derive(Debug, Default)]
pub struct MemoryStore {
    world: RwLock<WorldTables>,
    pilots: Mutex<HashMap<String, Pilot>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: &WorldSeed) -> Result<Self, StoreError> {
        let store = Self::new();
        store.import(seed)?;
        Ok(store)
    }

    /// Add a validated world on top of the current contents
    pub fn import(&self, seed: &WorldSeed) -> Result<u64, StoreError> {
        let mut world = self.world_mut()?;
        let mut pilots = self.pilots()?;

        let known_systems: HashSet<_> = world.systems.keys().copied().collect();
        let known_sectors: HashSet<_> = world.sectors.keys().copied().collect();
        seed.validate_onto(&known_systems, &known_sectors)?;

        for sector in &seed.sectors {
            let taken = world.sectors.values().any(|s| {
                s.system_id == sector.system_id && s.sector_number == sector.sector_number
            });
            if taken {
                return Err(StoreError::InvalidData(format!(
                    "sector number {} already used in system {}",
                    sector.sector_number, sector.system_id
                )));
            }
        }
        for pilot in &seed.pilots {
            if pilots.contains_key(&pilot.username) {
                return Err(StoreError::InvalidData(format!(
                    "pilot {} already exists",
                    pilot.username
                )));
            }
        }

        for system in &seed.systems {
            world.systems.insert(system.id, system.clone());
        }
        for sector in &seed.sectors {
            world.sectors.insert(sector.id, sector.clone());
        }
        world.connections.extend(seed.connections.iter().copied());
        for pilot in &seed.pilots {
            pilots.insert(pilot.username.clone(), pilot.clone());
        }

        Ok(seed.record_count())
    }

    fn world(&self) -> Result<RwLockReadGuard<'_, WorldTables>, StoreError> {
        self.world
            .read()
            .map_err(|_| StoreError::Unavailable("world tables lock poisoned".to_string()))
    }

    fn world_mut(&self) -> Result<RwLockWriteGuard<'_, WorldTables>, StoreError> {
        self.world
            .write()
            .map_err(|_| StoreError::Unavailable("world tables lock poisoned".to_string()))
    }

    fn pilots(&self) -> Result<MutexGuard<'_, HashMap<String, Pilot>>, StoreError> {
        self.pilots
            .lock()
            .map_err(|_| StoreError::Unavailable("pilot table lock poisoned".to_string()))
    }
}

impl WorldStore for MemoryStore {
    fn list_systems(&self) -> Result<Vec<System>, StoreError> {
        Ok(self.world()?.systems.values().cloned().collect())
    }

    fn list_connections(&self) -> Result<Vec<Connection>, StoreError> {
        Ok(self.world()?.connections.clone())
    }

    fn list_wormhole_sectors(&self) -> Result<Vec<Sector>, StoreError> {
        Ok(self
            .world()?
            .sectors
            .values()
            .filter(|s| s.is_wormhole())
            .cloned()
            .collect())
    }

    fn system(&self, id: SystemId) -> Result<Option<System>, StoreError> {
        Ok(self.world()?.systems.get(&id).cloned())
    }

    fn sector(&self, id: SectorId) -> Result<Option<Sector>, StoreError> {
        Ok(self.world()?.sectors.get(&id).cloned())
    }

    fn sector_by_number(
        &self,
        system_id: SystemId,
        sector_number: i64,
    ) -> Result<Option<Sector>, StoreError> {
        Ok(self
            .world()?
            .sectors
            .values()
            .find(|s| s.system_id == system_id && s.sector_number == sector_number)
            .cloned())
    }

    fn load_pilot(&self, username: &str) -> Result<Option<Pilot>, StoreError> {
        Ok(self.pilots()?.get(username).cloned())
    }

    fn commit_pilot(&self, commit: &PilotCommit) -> Result<CommitOutcome, StoreError> {
        if !self.world()?.sectors.contains_key(&commit.sector_id) {
            return Err(StoreError::InvalidData(format!(
                "sector {} does not exist",
                commit.sector_id
            )));
        }

        let mut pilots = self.pilots()?;
        let Some(pilot) = pilots.get_mut(&commit.username) else {
            return Ok(CommitOutcome::Conflict);
        };

        if pilot.version != commit.expected_version
            || (commit.turns_charge > 0 && pilot.turns < commit.turns_charge)
        {
            return Ok(CommitOutcome::Conflict);
        }

        pilot.current_sector_id = commit.sector_id;
        pilot.turns -= commit.turns_charge;
        pilot.version += 1;

        Ok(CommitOutcome::Applied {
            version: pilot.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SectorType;

    fn store() -> MemoryStore {
        let seed = WorldSeed::new()
            .system(1, "Sol")
            .sector(1, 1, 1, SectorType::Ordinary)
            .sector(2, 1, 2, SectorType::Ordinary)
            .sector(3, 1, 7, SectorType::Wormhole)
            .pilot(Pilot::new("nova", 1).with_turns(5));
        MemoryStore::from_seed(&seed).unwrap()
    }

    fn commit(version: u64, sector_id: SectorId, turns_charge: i64) -> PilotCommit {
        PilotCommit {
            username: "nova".to_string(),
            expected_version: version,
            sector_id,
            turns_charge,
        }
    }

    #[test]
    fn test_lookups() {
        let store = store();
        assert_eq!(store.list_systems().unwrap().len(), 1);
        assert_eq!(store.list_wormhole_sectors().unwrap()[0].id, 3);
        assert_eq!(store.sector_by_number(1, 2).unwrap().unwrap().id, 2);
        assert!(store.sector_by_number(1, 99).unwrap().is_none());
        assert!(store.load_pilot("nobody").unwrap().is_none());
    }

    #[test]
    fn test_commit_bumps_version_and_charges() {
        let store = store();
        assert_eq!(
            store.commit_pilot(&commit(0, 2, 2)).unwrap(),
            CommitOutcome::Applied { version: 1 }
        );

        let pilot = store.load_pilot("nova").unwrap().unwrap();
        assert_eq!(pilot.current_sector_id, 2);
        assert_eq!(pilot.turns, 3);
        assert_eq!(pilot.version, 1);
    }

    #[test]
    fn test_stale_version_conflicts() {
        let store = store();
        store.commit_pilot(&commit(0, 2, 0)).unwrap();

        assert_eq!(
            store.commit_pilot(&commit(0, 3, 0)).unwrap(),
            CommitOutcome::Conflict
        );
        assert_eq!(store.load_pilot("nova").unwrap().unwrap().current_sector_id, 2);
    }

    #[test]
    fn test_import_refuses_existing_pilot() {
        let store = store();
        let again = WorldSeed::new()
            .system(2, "Vega")
            .sector(10, 2, 1, SectorType::Ordinary)
            .pilot(Pilot::new("nova", 10));
        assert!(store.import(&again).is_err());
        assert!(store.system(2).unwrap().is_none());
    }

    #[test]
    fn test_import_extends_existing_world() {
        let store = store();
        let addition = WorldSeed::new()
            .system(2, "Vega")
            .sector(10, 2, 42, SectorType::Wormhole)
            .link(1, 2)
            .pilot(Pilot::new("scout", 3));
        assert_eq!(store.import(&addition).unwrap(), 5);
        assert_eq!(store.list_connections().unwrap().len(), 2);

        let reused_id = WorldSeed::new().sector(3, 2, 1, SectorType::Ordinary);
        assert!(store.import(&reused_id).is_err());
        let reused_number = WorldSeed::new().sector(11, 2, 42, SectorType::Ordinary);
        assert!(store.import(&reused_number).is_err());
    }
}
