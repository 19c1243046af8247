//! Veles chain core
//!
//! The deterministic state-transition core of the ledger: given an ordered
//! stream of authority-verified operations and block boundaries, it mutates
//! account, asset, worker-request, subscription and market-escrow state so
//! that every node replaying the same stream reaches byte-identical state.
//!
//! # Architecture
//!
//! - **Single writer**: blocks apply strictly sequentially against a working
//!   clone, swapped in atomically; readers share a lock and never see a
//!   partial block
//! - **Versioned rules**: every evaluator and maintenance pass receives the
//!   parameter bundle selected for the block's height from the hardfork
//!   schedule
//! - **All-or-nothing blocks**: any operation failure rejects the whole
//!   block; maintenance failures are fatal
//!
//! # Invariants
//!
//! - Per-symbol conservation: balances only move, except explicit emission
//! - Deterministic replay: same blocks, same state digest
//! - Events are emitted in the exact order of the state changes they report

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

pub mod battery;
pub mod chain;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod events;
pub mod freeze;
pub mod maintenance;
pub mod market;
pub mod metrics;
pub mod reputation;
pub mod schedule;
pub mod state;
pub mod storage;
pub mod subscription;
pub mod worker;

// Re-exports
pub use chain::{AppliedBlock, BlockInput, Chain};
pub use config::Config;
pub use error::{Error, Result};
pub use events::ChainEvent;
pub use schedule::{ChainParams, HardforkSchedule};
pub use state::{Genesis, GenesisAccount, State};
pub use storage::Storage;
