//! Records shared by the world store, the universe graph and the navigation engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

pub type SystemId = i64;
pub type SectorId = i64;

/// Field names a system listing writes itself; metadata may not use them
pub const RESERVED_METADATA_KEYS: &[&str] = &["id", "name", "connections", "wormholeSector"];

/// A node of the galaxy graph.
///
/// Everything besides `id` and `name` (coordinates, colours, art hints) is
/// carried in `metadata` and never interpreted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct System {
    pub id: SystemId,
    pub name: String,
    #[serde(flatten)]
    pub metadata: Map<String, Value>,
}

impl System {
    pub fn new(id: SystemId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            metadata: Map::new(),
        }
    }

    /// Attach an opaque metadata field
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectorType {
    Ordinary,
    Wormhole,
}

impl SectorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectorType::Ordinary => "ordinary",
            SectorType::Wormhole => "wormhole",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ordinary" => Some(SectorType::Ordinary),
            "wormhole" => Some(SectorType::Wormhole),
            _ => None,
        }
    }
}

impl fmt::Display for SectorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A location inside exactly one system. `sector_number` is unique per system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub id: SectorId,
    pub system_id: SystemId,
    pub sector_number: i64,
    pub sector_type: SectorType,
}

impl Sector {
    pub fn is_wormhole(&self) -> bool {
        self.sector_type == SectorType::Wormhole
    }
}

/// A directed connection row. Symmetric links are stored as two rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub system_id: SystemId,
    pub connected_system_id: SystemId,
}

impl Connection {
    pub fn new(system_id: SystemId, connected_system_id: SystemId) -> Self {
        Self {
            system_id,
            connected_system_id,
        }
    }

    pub fn reversed(&self) -> Self {
        Self::new(self.connected_system_id, self.system_id)
    }
}

fn default_pilot_level() -> i64 {
    1
}

/// A pilot's mutable game state.
///
/// `version` increases by one on every committed transition and is the
/// optimistic-concurrency guard for the pilot record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pilot {
    pub username: String,
    pub current_sector_id: SectorId,
    #[serde(default)]
    pub turns: i64,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default = "default_pilot_level")]
    pub pilot_level: i64,
    #[serde(default)]
    pub version: u64,
}

impl Pilot {
    pub fn new(username: impl Into<String>, current_sector_id: SectorId) -> Self {
        Self {
            username: username.into(),
            current_sector_id,
            turns: 0,
            is_admin: false,
            pilot_level: default_pilot_level(),
            version: 0,
        }
    }

    pub fn with_turns(mut self, turns: i64) -> Self {
        self.turns = turns;
        self
    }

    pub fn with_level(mut self, pilot_level: i64) -> Self {
        self.pilot_level = pilot_level;
        self
    }

    pub fn admin(mut self) -> Self {
        self.is_admin = true;
        self
    }

    /// Usernames appear verbatim in `/player/{username}` paths, so they are
    /// limited to unreserved URL characters.
    pub fn is_valid_username(username: &str) -> bool {
        !username.is_empty()
            && username
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~'))
    }
}

/// A pilot record joined with its current sector and system
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PilotView {
    pub username: String,
    pub current_sector_id: SectorId,
    pub current_sector_number: i64,
    pub current_sector_type: SectorType,
    pub current_system_id: SystemId,
    pub current_system_name: String,
    pub turns: i64,
    pub is_admin: bool,
    pub pilot_level: i64,
}

impl PilotView {
    pub fn new(pilot: &Pilot, sector: &Sector, system: &System) -> Self {
        Self {
            username: pilot.username.clone(),
            current_sector_id: sector.id,
            current_sector_number: sector.sector_number,
            current_sector_type: sector.sector_type,
            current_system_id: system.id,
            current_system_name: system.name.clone(),
            turns: pilot.turns,
            is_admin: pilot.is_admin,
            pilot_level: pilot.pilot_level,
        }
    }
}
