//! Discovery, parsing and destructive-rebuild orchestration for the
//! session store (C6–C8, C10): the [`SyncEngine`] drives discovery and
//! parsing against [`chronicle_providers`]' registry and commits results
//! through [`chronicle_storage::Storage`]; [`Watcher`] and [`SessionMonitor`]
//! sit on top of it to react to filesystem changes between scheduled
//! passes.

mod config;
mod discovery;
mod engine;
mod monitor;
mod skip_cache;
mod watcher;

pub use config::{Config, ProviderOverride};
pub use engine::{SyncEngine, SyncSummary};
pub use monitor::{MonitorEvent, SessionMonitor};
pub use watcher::{all_roots, ChangeEvent, ChangeKind, Watcher};
