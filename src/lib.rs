pub mod api;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod session;
pub mod store;
pub mod universe;

pub use cli::{Cli, Commands};
pub use config::{EngineConfig, TurnPolicy};
pub use engine::{Arrival, Navigator};
pub use error::{ErrorKind, NavError, NavResult, StoreError};
pub use store::{MemoryStore, SqliteStore, WorldSeed, WorldStore};
pub use universe::{IntegrityReport, SystemEntry, UniverseGraph};
