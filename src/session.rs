//! The only path through which pilot records are read for update and written.

use std::sync::Arc;

use crate::error::{NavError, NavResult};
use crate::model::{Pilot, SectorId};
use crate::store::{CommitOutcome, PilotCommit, WorldStore};

/// Proof of the pilot version a transition was validated against.
///
/// Consumed by [`PilotSessions::commit`]; a lease can be committed at most once.
#[derive(Debug)]
pub struct PilotLease {
    pilot: Pilot,
}

impl PilotLease {
    pub fn pilot(&self) -> &Pilot {
        &self.pilot
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Commit {
    /// The pilot record as stored after the update
    Applied(Pilot),
    /// Someone else committed first; the lease is stale
    Conflict,
}

pub struct PilotSessions<S: ?Sized> {
    store: Arc<S>,
}

impl<S: WorldStore + ?Sized> PilotSessions<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn load_for_update(&self, username: &str) -> NavResult<PilotLease> {
        let pilot = self
            .store
            .load_pilot(username)?
            .ok_or_else(|| NavError::NotFound(format!("pilot {} does not exist", username)))?;

        Ok(PilotLease { pilot })
    }

    /// Move the leased pilot to `sector_id` and charge `turns_charge` turns,
    /// both in one conditional update.
    pub fn commit(
        &self,
        lease: PilotLease,
        sector_id: SectorId,
        turns_charge: i64,
    ) -> NavResult<Commit> {
        let PilotLease { mut pilot } = lease;
        let request = PilotCommit {
            username: pilot.username.clone(),
            expected_version: pilot.version,
            sector_id,
            turns_charge,
        };

        match self.store.commit_pilot(&request)? {
            CommitOutcome::Applied { version } => {
                pilot.current_sector_id = sector_id;
                pilot.turns -= turns_charge;
                pilot.version = version;
                Ok(Commit::Applied(pilot))
            }
            CommitOutcome::Conflict => {
                log::debug!(
                    "Stale lease for pilot {} at version {}",
                    request.username,
                    request.expected_version
                );
                Ok(Commit::Conflict)
            }
        }
    }
}

impl<S: ?Sized> Clone for PilotSessions<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::model::SectorType;
    use crate::store::{MemoryStore, WorldSeed};

    fn sessions() -> PilotSessions<MemoryStore> {
        let seed = WorldSeed::new()
            .system(1, "Sol")
            .sector(1, 1, 1, SectorType::Ordinary)
            .sector(2, 1, 2, SectorType::Ordinary)
            .sector(3, 1, 3, SectorType::Ordinary)
            .pilot(Pilot::new("nova", 1).with_turns(4));
        PilotSessions::new(Arc::new(MemoryStore::from_seed(&seed).unwrap()))
    }

    #[test]
    fn test_unknown_pilot_is_not_found() {
        let err = sessions().load_for_update("ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_commit_returns_new_snapshot() {
        let sessions = sessions();
        let lease = sessions.load_for_update("nova").unwrap();
        assert_eq!(lease.pilot().current_sector_id, 1);

        let Commit::Applied(pilot) = sessions.commit(lease, 2, 1).unwrap() else {
            panic!("expected the commit to apply");
        };
        assert_eq!(pilot.current_sector_id, 2);
        assert_eq!(pilot.turns, 3);
        assert_eq!(pilot.version, 1);
    }

    #[test]
    fn test_interleaved_leases_conflict() {
        let sessions = sessions();
        let first = sessions.load_for_update("nova").unwrap();
        let second = sessions.load_for_update("nova").unwrap();

        assert!(matches!(
            sessions.commit(first, 2, 0).unwrap(),
            Commit::Applied(_)
        ));
        assert_eq!(sessions.commit(second, 3, 0).unwrap(), Commit::Conflict);

        let stored = sessions.load_for_update("nova").unwrap();
        assert_eq!(stored.pilot().current_sector_id, 2);
    }
}
