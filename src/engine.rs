//! Navigation engine: validates and commits Move and Warp transitions.
//!
//! Every transition follows the same shape: lease the pilot, validate the
//! request against the lease and the universe graph, then commit through the
//! lease. A stale lease is retried a bounded number of times; any other
//! failure aborts with the pilot record untouched.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use crate::config::{EngineConfig, TurnPolicy, DEFAULT_EXEMPT_LEVEL};
use crate::error::{ErrorKind, NavError, NavResult};
use crate::model::{Pilot, PilotView, Sector, SectorId, SystemId};
use crate::session::{Commit, PilotLease, PilotSessions};
use crate::store::WorldStore;
use crate::universe::{SystemEntry, UniverseGraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Move,
    Warp,
}

impl Transition {
    fn as_str(&self) -> &'static str {
        match self {
            Transition::Move => "move",
            Transition::Warp => "warp",
        }
    }
}

/// Where a pilot is after a successful transition
#[derive(Debug, Clone, PartialEq)]
pub struct Arrival {
    pub system_id: SystemId,
    pub sector_id: SectorId,
    pub sector_number: i64,
    pub turns: i64,
    /// False when the pilot already was at the target and nothing was committed
    pub moved: bool,
}

impl Arrival {
    fn stayed(sector: &Sector, pilot: &Pilot) -> Self {
        Self {
            system_id: sector.system_id,
            sector_id: sector.id,
            sector_number: sector.sector_number,
            turns: pilot.turns,
            moved: false,
        }
    }
}

enum Attempt<T> {
    Done(T),
    /// The lease went stale before the commit
    Retry,
}

struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    fn start(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    fn check(&self, stage: &str) -> NavResult<()> {
        if self.started.elapsed() > self.limit {
            return Err(NavError::Timeout(format!(
                "{} did not finish within {:?}",
                stage, self.limit
            )));
        }
        Ok(())
    }
}

pub struct Navigator<S: ?Sized> {
    store: Arc<S>,
    sessions: PilotSessions<S>,
    config: EngineConfig,
    universe: RwLock<Option<Arc<UniverseGraph>>>,
}

impl<S: WorldStore + ?Sized> Navigator<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            sessions: PilotSessions::new(Arc::clone(&store)),
            store,
            config,
            universe: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The universe graph, from cache when caching is enabled
    pub fn universe(&self) -> NavResult<Arc<UniverseGraph>> {
        if self.config.cache_universe {
            let cached = self.universe.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(graph) = cached.as_ref() {
                return Ok(Arc::clone(graph));
            }
        }

        let graph = Arc::new(UniverseGraph::load(&*self.store)?);
        if self.config.cache_universe {
            let mut cached = self.universe.write().unwrap_or_else(PoisonError::into_inner);
            *cached = Some(Arc::clone(&graph));
        }
        Ok(graph)
    }

    /// Drop the cached graph after world data changed
    pub fn invalidate_universe(&self) {
        *self.universe.write().unwrap_or_else(PoisonError::into_inner) = None;
        log::debug!("Universe graph invalidated");
    }

    /// Pilot-independent listing; touches no pilot record
    pub fn list_systems(&self) -> NavResult<Vec<SystemEntry>> {
        self.universe()
            .map(|graph| graph.list_systems())
            .inspect_err(|err| log::warn!("Listing systems failed: {}", err))
    }

    pub fn pilot_view(&self, username: &str) -> NavResult<PilotView> {
        let pilot = self
            .store
            .load_pilot(username)?
            .ok_or_else(|| NavError::NotFound(format!("pilot {} does not exist", username)))?;
        let sector = self.current_sector(&pilot)?;
        let system = self.store.system(sector.system_id)?.ok_or_else(|| {
            NavError::IntegrityFault(format!(
                "sector {} belongs to unknown system {}",
                sector.id, sector.system_id
            ))
        })?;

        Ok(PilotView::new(&pilot, &sector, &system))
    }

    /// Reposition a pilot inside its current system
    pub fn move_pilot(&self, username: &str, target_sector_number: i64) -> NavResult<Arrival> {
        let arrival = self.run(Transition::Move, username, |deadline| {
            let lease = self.sessions.load_for_update(username)?;
            let current = self.current_sector(lease.pilot())?;
            let target = self
                .store
                .sector_by_number(current.system_id, target_sector_number)?
                .ok_or_else(|| {
                    NavError::InvalidTarget(format!(
                        "sector {} does not exist in system {}",
                        target_sector_number, current.system_id
                    ))
                })?;
            deadline.check("move validation")?;

            if target.id == current.id {
                return Ok(Attempt::Done(Arrival::stayed(&target, lease.pilot())));
            }

            let charge = self.turn_charge(lease.pilot(), Transition::Move)?;
            self.commit(lease, &target, charge)
        })?;

        if arrival.moved {
            log::info!(
                "Pilot {} moved to sector {} in system {}",
                username,
                arrival.sector_number,
                arrival.system_id
            );
        }
        Ok(arrival)
    }

    /// Travel to another system, landing on its wormhole sector
    pub fn warp_pilot(&self, username: &str, target_system_id: SystemId) -> NavResult<Arrival> {
        let arrival = self.run(Transition::Warp, username, |deadline| {
            let universe = self.universe()?;
            let lease = self.sessions.load_for_update(username)?;
            let pilot = lease.pilot();
            let current = self.current_sector(pilot)?;
            deadline.check("warp validation")?;

            if !universe.contains(target_system_id) {
                return Err(NavError::InvalidTarget(format!(
                    "system {} does not exist",
                    target_system_id
                )));
            }

            // Already parked on the target wormhole; anomalies are reported below
            if current.system_id == target_system_id {
                if let Ok(wormhole) = universe.wormhole_sector_of(target_system_id) {
                    if wormhole.id == current.id {
                        return Ok(Attempt::Done(Arrival::stayed(wormhole, pilot)));
                    }
                }
            }

            if !pilot.is_admin && !universe.are_connected(current.system_id, target_system_id) {
                return Err(NavError::InvalidTarget(format!(
                    "systems {} and {} are not connected",
                    current.system_id, target_system_id
                )));
            }

            // Admins skip reachability, never the wormhole invariant
            let wormhole = universe.wormhole_sector_of(target_system_id)?;
            let charge = self.turn_charge(pilot, Transition::Warp)?;
            self.commit(lease, wormhole, charge)
        })?;

        if arrival.moved {
            log::info!(
                "Pilot {} warped to system {} (sector {})",
                username,
                arrival.system_id,
                arrival.sector_number
            );
        }
        Ok(arrival)
    }

    fn current_sector(&self, pilot: &Pilot) -> NavResult<Sector> {
        self.store.sector(pilot.current_sector_id)?.ok_or_else(|| {
            NavError::IntegrityFault(format!(
                "pilot {} is stationed in unknown sector {}",
                pilot.username, pilot.current_sector_id
            ))
        })
    }

    fn commit(
        &self,
        lease: PilotLease,
        target: &Sector,
        charge: i64,
    ) -> NavResult<Attempt<Arrival>> {
        Ok(match self.sessions.commit(lease, target.id, charge)? {
            Commit::Applied(pilot) => Attempt::Done(Arrival {
                system_id: target.system_id,
                sector_id: target.id,
                sector_number: target.sector_number,
                turns: pilot.turns,
                moved: true,
            }),
            Commit::Conflict => Attempt::Retry,
        })
    }

    /// Turns to charge for a transition under the configured policy
    fn turn_charge(&self, pilot: &Pilot, transition: Transition) -> NavResult<i64> {
        match &self.config.turn_policy {
            TurnPolicy::Unmetered => {
                if pilot.turns <= 0 && pilot.pilot_level < DEFAULT_EXEMPT_LEVEL && !pilot.is_admin {
                    log::debug!(
                        "Pilot {} has no turns left; {} allowed while turns are unmetered",
                        pilot.username,
                        transition.as_str()
                    );
                }
                Ok(0)
            }
            TurnPolicy::Metered {
                move_cost,
                warp_cost,
                exempt_level,
            } => {
                if pilot.is_admin || pilot.pilot_level >= *exempt_level {
                    return Ok(0);
                }

                let cost = match transition {
                    Transition::Move => *move_cost,
                    Transition::Warp => *warp_cost,
                }
                .max(0);

                if pilot.turns < cost {
                    return Err(NavError::InsufficientTurns {
                        required: cost,
                        available: pilot.turns,
                    });
                }
                Ok(cost)
            }
        }
    }

    fn run<T>(
        &self,
        transition: Transition,
        username: &str,
        attempt: impl FnMut(&Deadline) -> NavResult<Attempt<T>>,
    ) -> NavResult<T> {
        self.run_attempts(username, attempt)
            .inspect_err(|err| log_failure(transition, username, err))
    }

    fn run_attempts<T>(
        &self,
        username: &str,
        mut attempt: impl FnMut(&Deadline) -> NavResult<Attempt<T>>,
    ) -> NavResult<T> {
        let deadline = Deadline::start(self.config.request_timeout());
        let attempts = self.config.max_conflict_retries + 1;

        for n in 1..=attempts {
            match attempt(&deadline)? {
                Attempt::Done(value) => return Ok(value),
                Attempt::Retry => {
                    log::debug!("Pilot {} changed during attempt {}/{}", username, n, attempts);
                    deadline.check("conflict retry")?;
                }
            }
        }

        Err(NavError::Conflict {
            username: username.to_string(),
            attempts,
        })
    }
}

fn log_failure(transition: Transition, username: &str, err: &NavError) {
    let op = transition.as_str();
    match err.kind() {
        ErrorKind::IntegrityFault => {
            log::error!("{} for pilot {} aborted on bad world data: {}", op, username, err)
        }
        ErrorKind::NotFound | ErrorKind::InvalidTarget | ErrorKind::InsufficientTurns => {
            log::info!("{} for pilot {} rejected: {}", op, username, err)
        }
        ErrorKind::Conflict | ErrorKind::Timeout | ErrorKind::StoreUnavailable => {
            log::warn!("{} for pilot {} failed, retryable: {}", op, username, err)
        }
    }
}
