//! End-to-end tests: a world imported from JSONL into SQLite, navigated
//! through the engine and the request router.
//!
//! Run with:
//! ```sh
//! cargo test --test integration_test
//! ```

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rusqlite::Connection;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

use galaxy_nav::api::dispatch;
use galaxy_nav::model::Connection as SystemLink;
use galaxy_nav::{
    EngineConfig, ErrorKind, Navigator, SqliteStore, TurnPolicy, WorldSeed, WorldStore,
};

// =============================================================================
// Test Configuration
// =============================================================================

/// Concurrent movers in the race test
const MOVERS: usize = 8;

/// Random seed for reproducible target picks
const RANDOM_SEED: u64 = 42;

const SYSTEMS_JSONL: &str = r#"{"id": 1, "name": "Sol", "x": 0.0, "y": 0.0}
{"id": 2, "name": "Vega", "x": 25.3, "y": -4.1}
{"id": 3, "name": "Rigel", "x": -860.0, "y": 12.5}
{"id": 4, "name": "Deneb", "x": 1400.0, "y": 300.0}
{"id": 5, "name": "Altair", "x": 16.7, "y": 8.8}
"#;

const SECTORS_JSONL: &str = r#"{"id": 1, "system_id": 1, "sector_number": 1, "sector_type": "ordinary"}
{"id": 2, "system_id": 1, "sector_number": 2, "sector_type": "ordinary"}
{"id": 3, "system_id": 1, "sector_number": 7, "sector_type": "wormhole"}
{"id": 10, "system_id": 2, "sector_number": 42, "sector_type": "wormhole"}
{"id": 11, "system_id": 2, "sector_number": 5, "sector_type": "ordinary"}
{"id": 20, "system_id": 3, "sector_number": 3, "sector_type": "wormhole"}
{"id": 30, "system_id": 4, "sector_number": 8, "sector_type": "wormhole"}
{"id": 31, "system_id": 4, "sector_number": 9, "sector_type": "wormhole"}
{"id": 40, "system_id": 5, "sector_number": 1, "sector_type": "ordinary"}
"#;

const CONNECTIONS_JSONL: &str = r#"{"system_id": 1, "connected_system_id": 2}
{"system_id": 2, "connected_system_id": 1}
{"system_id": 1, "connected_system_id": 4}
{"system_id": 4, "connected_system_id": 1}
{"system_id": 1, "connected_system_id": 5}
"#;

const PILOTS_JSONL: &str = r#"{"username": "nova", "current_sector_id": 1, "turns": 10}
{"username": "root", "current_sector_id": 1, "is_admin": true}
{"username": "swarm", "current_sector_id": 1, "turns": 100, "pilot_level": 4}
"#;

// =============================================================================
// Shared World Files
// =============================================================================

/// JSONL world directory - written once and imported by every test
static WORLD_DIR: Lazy<TempDir> = Lazy::new(|| {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    for (name, content) in [
        ("systems.jsonl", SYSTEMS_JSONL),
        ("sectors.jsonl", SECTORS_JSONL),
        ("system_connections.jsonl", CONNECTIONS_JSONL),
        ("pilots.jsonl", PILOTS_JSONL),
    ] {
        fs::write(dir.path().join(name), content).expect("Failed to write world file");
    }
    dir
});

/// A freshly imported database, removed when dropped
struct TestWorld {
    _dir: TempDir,
    db_path: PathBuf,
    store: Arc<SqliteStore>,
}

impl TestWorld {
    fn new() -> Self {
        Self::with_busy_timeout(Duration::from_secs(2))
    }

    fn with_busy_timeout(busy_timeout: Duration) -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let db_path = dir.path().join("universe.db");
        let store = SqliteStore::open(&db_path, busy_timeout).expect("Failed to open store");

        let seed = WorldSeed::from_jsonl_dir(WORLD_DIR.path()).expect("Failed to read world");
        store.import(&seed).expect("Failed to import world");

        Self {
            _dir: dir,
            db_path,
            store: Arc::new(store),
        }
    }

    fn navigator(&self) -> Navigator<SqliteStore> {
        self.navigator_with(EngineConfig::default())
    }

    fn navigator_with(&self, config: EngineConfig) -> Navigator<SqliteStore> {
        Navigator::new(Arc::clone(&self.store), config)
    }

    fn sector_of(&self, username: &str) -> i64 {
        self.store
            .load_pilot(username)
            .unwrap()
            .unwrap()
            .current_sector_id
    }

    fn path(&self) -> &Path {
        &self.db_path
    }
}

fn warp_body(username: &str, system: i64) -> String {
    json!({"username": username, "targetSystemId": system}).to_string()
}

// =============================================================================
// Import
// =============================================================================

#[test]
fn test_import_from_jsonl() {
    let world = TestWorld::new();
    let store = &world.store;

    assert_eq!(store.list_systems().unwrap().len(), 5);
    assert_eq!(store.list_wormhole_sectors().unwrap().len(), 5);
    assert!(store
        .list_connections()
        .unwrap()
        .contains(&SystemLink::new(1, 5)));

    let root = store.load_pilot("root").unwrap().unwrap();
    assert!(root.is_admin);
    assert_eq!(root.turns, 0);
    assert_eq!(root.pilot_level, 1);
    assert_eq!(root.version, 0);
}

#[test]
fn test_reimport_is_refused() {
    let world = TestWorld::new();
    let seed = WorldSeed::from_jsonl_dir(WORLD_DIR.path()).unwrap();
    assert!(world.store.import(&seed).is_err());
    assert_eq!(world.store.list_systems().unwrap().len(), 5);
}

// =============================================================================
// Navigation Scenarios
// =============================================================================

#[test]
fn test_warp_lands_on_wormhole() {
    let world = TestWorld::new();
    let nav = world.navigator();

    let response = dispatch(&nav, "POST", "/api/warp", Some(&warp_body("nova", 2)));
    assert_eq!(response.status, 200);
    assert_eq!(
        response.body,
        json!({"success": true, "currentSystem": 2, "currentSector": 42})
    );

    let pilot = dispatch(&nav, "GET", "/api/player/nova", None);
    assert_eq!(pilot.status, 200);
    assert_eq!(pilot.body["current_sector_number"], 42);
    assert_eq!(pilot.body["current_system_id"], 2);
    assert_eq!(pilot.body["current_system_name"], "Vega");
}

#[test]
fn test_unconnected_warp_leaves_pilot_in_place() {
    let world = TestWorld::new();
    let nav = world.navigator();

    let response = dispatch(&nav, "POST", "/warp", Some(&warp_body("nova", 3)));
    assert_eq!(response.status, 400);
    assert_eq!(response.body["kind"], "invalid_target");
    assert_eq!(world.sector_of("nova"), 1);
}

#[test]
fn test_double_wormhole_is_integrity_fault() {
    let world = TestWorld::new();
    let nav = world.navigator();

    for username in ["nova", "root"] {
        let response = dispatch(&nav, "POST", "/warp", Some(&warp_body(username, 4)));
        assert_eq!(response.status, 500);
        assert_eq!(response.body["kind"], "integrity_fault");
        assert_eq!(world.sector_of(username), 1);
    }
}

#[test]
fn test_admin_warp_ignores_connections() {
    let world = TestWorld::new();
    let nav = world.navigator();

    let arrival = nav.warp_pilot("root", 3).unwrap();
    assert_eq!(arrival.sector_number, 3);
    assert_eq!(world.sector_of("root"), 20);
}

#[test]
fn test_move_and_repeat() {
    let world = TestWorld::new();
    let nav = world.navigator();

    assert!(nav.move_pilot("nova", 2).unwrap().moved);
    let version = world.store.load_pilot("nova").unwrap().unwrap().version;

    let again = nav.move_pilot("nova", 2).unwrap();
    assert!(!again.moved);
    assert_eq!(world.store.load_pilot("nova").unwrap().unwrap().version, version);

    let err = nav.move_pilot("nova", 42).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTarget);
    assert_eq!(world.sector_of("nova"), 2);
}

#[test]
fn test_unknown_pilot() {
    let world = TestWorld::new();
    let nav = world.navigator();

    let response = dispatch(&nav, "GET", "/player/ghost", None);
    assert_eq!(response.status, 404);
    assert_eq!(response.body["kind"], "not_found");
}

#[test]
fn test_position_survives_reopen() {
    let world = TestWorld::new();
    world.navigator().warp_pilot("nova", 2).unwrap();

    let reopened = SqliteStore::open(world.path(), Duration::from_secs(1)).unwrap();
    let nav = Navigator::new(Arc::new(reopened), EngineConfig::default());
    assert_eq!(nav.pilot_view("nova").unwrap().current_sector_number, 42);
}

#[test]
fn test_metered_turns_are_charged_atomically() {
    let world = TestWorld::new();
    let nav = world.navigator_with(EngineConfig {
        turn_policy: TurnPolicy::Metered {
            move_cost: 2,
            warp_cost: 6,
            exempt_level: 99,
        },
        ..EngineConfig::default()
    });

    assert_eq!(nav.warp_pilot("nova", 2).unwrap().turns, 4);
    let err = nav.warp_pilot("nova", 1).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InsufficientTurns);

    let pilot = world.store.load_pilot("nova").unwrap().unwrap();
    assert_eq!(pilot.current_sector_id, 10);
    assert_eq!(pilot.turns, 4);
}

// =============================================================================
// Universe Listing and Integrity
// =============================================================================

#[test]
fn test_systems_listing() {
    let world = TestWorld::new();
    let nav = world.navigator();

    let response = dispatch(&nav, "GET", "/systems", None);
    assert_eq!(response.status, 200);

    let systems = response.body.as_array().unwrap();
    let ids: Vec<_> = systems.iter().map(|s| s["id"].as_i64().unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    assert_eq!(systems[1]["x"], 25.3);
    assert_eq!(systems[0]["connections"], json!([2, 4, 5]));
    assert_eq!(systems[0]["wormholeSector"], 7);
    assert!(systems[3].get("wormholeSector").is_none());
    assert!(systems[4].get("wormholeSector").is_none());
}

#[test]
fn test_integrity_report() {
    let world = TestWorld::new();
    let report = world.navigator().universe().unwrap().integrity_report();

    assert_eq!(report.one_way_connections, vec![SystemLink::new(1, 5)]);
    assert!(report.dangling_connections.is_empty());
    assert_eq!(report.missing_wormholes, vec![5]);
    assert_eq!(report.duplicate_wormholes, vec![(4, vec![8, 9])]);
}

// =============================================================================
// Concurrency
// =============================================================================

#[test]
fn test_concurrent_moves_end_on_a_requested_sector() {
    let world = TestWorld::new();
    let nav = Arc::new(world.navigator_with(EngineConfig {
        max_conflict_retries: 10,
        ..EngineConfig::default()
    }));

    let mut rng = rand::rngs::StdRng::seed_from_u64(RANDOM_SEED);
    let targets: Vec<i64> = (0..MOVERS)
        .map(|_| *[1, 2, 7].choose(&mut rng).unwrap())
        .collect();

    let handles: Vec<_> = targets
        .iter()
        .map(|&number| {
            let nav = Arc::clone(&nav);
            thread::spawn(move || nav.move_pilot("swarm", number))
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(arrival) => committed += u64::from(arrival.moved),
            Err(err) => assert!(err.is_retryable(), "unexpected failure: {}", err),
        }
    }

    let pilot = world.store.load_pilot("swarm").unwrap().unwrap();
    let view = nav.pilot_view("swarm").unwrap();
    assert!(targets.contains(&view.current_sector_number));
    assert_eq!(pilot.version, committed);
    assert_eq!(pilot.turns, 100);
}

#[test]
fn test_locked_database_times_out() {
    let world = TestWorld::with_busy_timeout(Duration::from_millis(50));
    let nav = world.navigator();

    let blocker = Connection::open(world.path()).unwrap();
    blocker.execute_batch("BEGIN IMMEDIATE;").unwrap();

    let err = nav.move_pilot("nova", 2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(err.is_retryable());

    blocker.execute_batch("ROLLBACK;").unwrap();
    assert_eq!(world.sector_of("nova"), 1);
    assert!(nav.move_pilot("nova", 2).unwrap().moved);
}

// =============================================================================
// Demo Files
// =============================================================================

#[test]
fn test_demo_files_load() {
    let demos = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos");

    let config = EngineConfig::load(Some(demos.join("metered.json").as_path())).unwrap();
    assert!(matches!(
        config.turn_policy,
        TurnPolicy::Metered {
            move_cost: 1,
            warp_cost: 5,
            exempt_level: 99
        }
    ));
    assert_eq!(config.busy_timeout_ms, 2_000);

    let seed = WorldSeed::from_jsonl_dir(&demos.join("world")).unwrap();
    assert!(seed.validate().is_ok());
    assert_eq!(seed.connections.len(), 6);
}
