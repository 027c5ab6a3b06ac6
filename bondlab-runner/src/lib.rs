//! BondLab Runner — sync orchestration on top of `bondlab-core`.
//!
//! This crate provides:
//! - TOML configuration with defaults for every section
//! - The sync run: per-endpoint executors on a bounded worker pool,
//!   transform, merge and idempotent upsert
//! - Run summaries and a JSONL run log
//! - Session seeding from the environment and an external login command

pub mod config;
pub mod login;
pub mod run_log;
pub mod store;
pub mod summary;
pub mod sync;

pub use config::{ConfigError, RunSettings, SessionConfig, SyncConfig, UpstreamConfig};
pub use login::{parse_cookie_lines, CommandRefresher, EnvSeed};
pub use run_log::{JsonlRunLog, NullRunLog, RunLog};
pub use store::{content_hash, BondStore, JsonSnapshotStore, MemoryStore, StoreError, UpsertStats};
pub use summary::{EndpointOutcome, EndpointReport, RunCounters, RunStatus, SyncSummary};
pub use sync::{SyncDeps, SyncError, Syncer};
