//! Read model of the galaxy: systems, their outgoing connections and wormholes.
//!
//! Built once from [`WorldStore`] reads and then queried without touching the
//! store again. Connections are directed rows: `are_connected(a, b)` looks at
//! the `a -> b` row only, and [`UniverseGraph::integrity_report`] points out
//! rows whose reverse is missing.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{NavError, NavResult, StoreError};
use crate::model::{Connection, Sector, System, SystemId, RESERVED_METADATA_KEYS};
use crate::store::WorldStore;

/// One row of the universe listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemEntry {
    #[serde(flatten)]
    pub system: System,
    pub connections: Vec<SystemId>,
    /// Present only when the system has exactly one wormhole sector
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wormhole_sector: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct UniverseGraph {
    systems: BTreeMap<SystemId, System>,
    connections: BTreeMap<SystemId, BTreeSet<SystemId>>,
    wormholes: BTreeMap<SystemId, Vec<Sector>>,
}

impl UniverseGraph {
    pub fn load<S: WorldStore + ?Sized>(store: &S) -> Result<Self, StoreError> {
        let systems = store.list_systems()?;
        let connections = store.list_connections()?;
        let wormholes = store.list_wormhole_sectors()?;

        let graph = Self::from_parts(systems, connections, wormholes);
        log::debug!(
            "Loaded universe graph: {} systems, {} connections",
            graph.systems.len(),
            graph.connection_count()
        );
        Ok(graph)
    }

    pub fn from_parts(
        systems: Vec<System>,
        connections: Vec<Connection>,
        wormhole_sectors: Vec<Sector>,
    ) -> Self {
        let systems: BTreeMap<_, _> = systems.into_iter().map(|s| (s.id, s)).collect();

        let mut outgoing: BTreeMap<SystemId, BTreeSet<SystemId>> = BTreeMap::new();
        for link in connections {
            outgoing
                .entry(link.system_id)
                .or_default()
                .insert(link.connected_system_id);
        }

        let mut wormholes: BTreeMap<SystemId, Vec<Sector>> = BTreeMap::new();
        for sector in wormhole_sectors.into_iter().filter(Sector::is_wormhole) {
            wormholes.entry(sector.system_id).or_default().push(sector);
        }

        Self {
            systems,
            connections: outgoing,
            wormholes,
        }
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn contains(&self, id: SystemId) -> bool {
        self.systems.contains_key(&id)
    }

    pub fn system(&self, id: SystemId) -> Option<&System> {
        self.systems.get(&id)
    }

    fn connection_count(&self) -> usize {
        self.connections.values().map(BTreeSet::len).sum()
    }

    /// Every system exactly once, ordered by id
    pub fn list_systems(&self) -> Vec<SystemEntry> {
        self.systems
            .values()
            .map(|system| {
                let connections = self
                    .connections
                    .get(&system.id)
                    .map(|targets| targets.iter().copied().collect())
                    .unwrap_or_default();

                let wormhole_sector = match self.wormholes.get(&system.id).map(Vec::as_slice) {
                    Some([only]) => Some(only.sector_number),
                    _ => None,
                };

                // Listing fields win over stored metadata
                let mut system = system.clone();
                for key in RESERVED_METADATA_KEYS {
                    system.metadata.remove(*key);
                }

                SystemEntry {
                    system,
                    connections,
                    wormhole_sector,
                }
            })
            .collect()
    }

    /// True iff a connection row `from -> to` exists
    pub fn are_connected(&self, from: SystemId, to: SystemId) -> bool {
        self.connections
            .get(&from)
            .is_some_and(|targets| targets.contains(&to))
    }

    /// The unique wormhole sector of a system.
    ///
    /// Zero or several wormholes is reported as an integrity fault; the
    /// engine never picks one of many.
    pub fn wormhole_sector_of(&self, system_id: SystemId) -> NavResult<&Sector> {
        match self.wormholes.get(&system_id).map(Vec::as_slice) {
            Some([only]) => Ok(only),
            Some(many) if many.len() > 1 => {
                let numbers: Vec<_> = many.iter().map(|s| s.sector_number).collect();
                Err(NavError::IntegrityFault(format!(
                    "system {} has {} wormhole sectors {:?}",
                    system_id,
                    many.len(),
                    numbers
                )))
            }
            _ => Err(NavError::IntegrityFault(format!(
                "system {} has no wormhole sector",
                system_id
            ))),
        }
    }

    pub fn integrity_report(&self) -> IntegrityReport {
        let mut report = IntegrityReport::default();

        for (&from, targets) in &self.connections {
            for &to in targets {
                if !self.contains(from) || !self.contains(to) {
                    report.dangling_connections.push(Connection::new(from, to));
                } else if !self.are_connected(to, from) {
                    report.one_way_connections.push(Connection::new(from, to));
                }
            }
        }

        for &id in self.systems.keys() {
            match self.wormholes.get(&id).map(Vec::len).unwrap_or(0) {
                0 => report.missing_wormholes.push(id),
                1 => {}
                _ => {
                    let numbers = self.wormholes[&id].iter().map(|s| s.sector_number).collect();
                    report.duplicate_wormholes.push((id, numbers));
                }
            }
        }

        report
    }
}

/// World-data anomalies the engine would trip over
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrityReport {
    /// Rows `a -> b` without the matching `b -> a`
    pub one_way_connections: Vec<Connection>,
    /// Rows naming a system that does not exist
    pub dangling_connections: Vec<Connection>,
    pub missing_wormholes: Vec<SystemId>,
    /// System id with the sector numbers of all its wormholes
    pub duplicate_wormholes: Vec<(SystemId, Vec<i64>)>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.one_way_connections.is_empty()
            && self.dangling_connections.is_empty()
            && self.missing_wormholes.is_empty()
            && self.duplicate_wormholes.is_empty()
    }
}

impl fmt::Display for IntegrityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            return writeln!(f, "No integrity problems found");
        }

        for link in &self.one_way_connections {
            writeln!(
                f,
                "one-way connection: {} -> {} (no reverse row)",
                link.system_id, link.connected_system_id
            )?;
        }
        for link in &self.dangling_connections {
            writeln!(
                f,
                "dangling connection: {} -> {}",
                link.system_id, link.connected_system_id
            )?;
        }
        for id in &self.missing_wormholes {
            writeln!(f, "system {} has no wormhole sector", id)?;
        }
        for (id, numbers) in &self.duplicate_wormholes {
            writeln!(f, "system {} has several wormhole sectors: {:?}", id, numbers)?;
        }
        Ok(())
    }
}
