//! World store abstraction and its two implementations.
//!
//! The engine reads systems, sectors and connections through [`WorldStore`]
//! and mutates pilots only through [`WorldStore::commit_pilot`], a single
//! conditional update keyed by username and record version.

pub mod memory;
pub mod schema;
pub mod seed;
pub mod sqlite;

pub use memory::MemoryStore;
pub use seed::WorldSeed;
pub use sqlite::SqliteStore;

use crate::error::StoreError;
use crate::model::{Connection, Pilot, Sector, SectorId, System, SystemId};

/// Position change for one pilot, applied only if the record is unchanged
#[derive(Debug, Clone, PartialEq)]
pub struct PilotCommit {
    pub username: String,
    /// Version observed when the pilot was loaded
    pub expected_version: u64,
    pub sector_id: SectorId,
    /// Turns removed in the same update; zero leaves turns untouched
    pub turns_charge: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Applied { version: u64 },
    /// The stored version no longer matches `expected_version`
    Conflict,
}

pub trait WorldStore: Send + Sync {
    fn list_systems(&self) -> Result<Vec<System>, StoreError>;

    fn list_connections(&self) -> Result<Vec<Connection>, StoreError>;

    /// Every sector of type wormhole, across all systems
    fn list_wormhole_sectors(&self) -> Result<Vec<Sector>, StoreError>;

    fn system(&self, id: SystemId) -> Result<Option<System>, StoreError>;

    fn sector(&self, id: SectorId) -> Result<Option<Sector>, StoreError>;

    fn sector_by_number(
        &self,
        system_id: SystemId,
        sector_number: i64,
    ) -> Result<Option<Sector>, StoreError>;

    fn load_pilot(&self, username: &str) -> Result<Option<Pilot>, StoreError>;

    fn commit_pilot(&self, commit: &PilotCommit) -> Result<CommitOutcome, StoreError>;
}
