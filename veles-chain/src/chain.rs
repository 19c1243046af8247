//! Chain orchestration layer
//!
//! Ties the schedule, state, evaluators, maintenance and storage together
//! into the block application path. Execution is strictly sequential: one
//! block at a time, operations in transaction order, then the maintenance
//! pass, then the conservation check.
//!
//! Block application is all-or-nothing. Operations run against a working
//! clone of the state; any operation error discards the clone and the block
//! is rejected with no effect. Readers take the shared lock and never observe
//! a partially-applied block — the writer holds the exclusive lock only for
//! the final swap.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::evaluator::{apply_operation, OpContext};
use crate::events::ChainEvent;
use crate::maintenance;
use crate::metrics::Metrics;
use crate::schedule::HardforkSchedule;
use crate::state::{Genesis, State};
use crate::storage::Storage;
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;
use veles_protocol::{Operation, TimePointSec};

/// One block of inbound, authority-verified operations
#[derive(Debug, Clone)]
pub struct BlockInput {
    /// Height; must be exactly head + 1
    pub number: u64,
    /// Block timestamp; must not move backwards
    pub timestamp: TimePointSec,
    /// Operations in transaction order
    pub operations: Vec<Operation>,
}

/// Result of applying one block
#[derive(Debug, Clone)]
pub struct AppliedBlock {
    /// Height applied
    pub number: u64,
    /// Canonical state digest after the block
    pub digest: [u8; 32],
    /// Outbound events in emission order
    pub events: Vec<ChainEvent>,
}

/// The chain core
pub struct Chain {
    state: RwLock<State>,
    schedule: HardforkSchedule,
    storage: Option<Arc<Storage>>,
    config: Config,
    metrics: Metrics,
}

impl Chain {
    /// Create a fresh in-memory chain from a genesis description
    pub fn new(config: Config, schedule: HardforkSchedule, genesis: &Genesis) -> Result<Self> {
        let state = State::genesis(genesis, TimePointSec::ZERO)?;
        Ok(Self {
            state: RwLock::new(state),
            schedule,
            storage: None,
            config,
            metrics: Metrics::new().map_err(|e| Error::Config(e.to_string()))?,
        })
    }

    /// Open a chain backed by persistent storage, resuming from the stored
    /// state if any exists
    pub fn open(config: Config, schedule: HardforkSchedule, genesis: &Genesis) -> Result<Self> {
        let storage = Arc::new(Storage::open(&config)?);
        let state = match storage.load_state()? {
            Some(state) => {
                tracing::info!(
                    head = state.globals.head_block_number,
                    "Resuming from stored state"
                );
                state
            }
            None => {
                let mut state = State::genesis(genesis, TimePointSec::ZERO)?;
                storage.commit(&mut state, 0)?;
                state
            }
        };
        Ok(Self {
            state: RwLock::new(state),
            schedule,
            storage: Some(storage),
            config,
            metrics: Metrics::new().map_err(|e| Error::Config(e.to_string()))?,
        })
    }

    /// Shared read access for query plugins; never blocks the writer for
    /// longer than the final swap
    pub fn state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Hardfork schedule in force
    pub fn schedule(&self) -> &HardforkSchedule {
        &self.schedule
    }

    /// Apply one block.
    ///
    /// Operation errors reject the whole block and leave state untouched.
    /// Maintenance and conservation errors are fatal ([`Error::is_fatal`]);
    /// the caller must halt rather than continue past them.
    pub fn apply_block(&self, block: &BlockInput) -> Result<AppliedBlock> {
        let timer = std::time::Instant::now();

        let mut work = {
            let state = self.state.read();
            let head = state.globals.head_block_number;
            if block.number != head + 1 {
                return Err(Error::InvalidState(format!(
                    "Block {} cannot follow head {}",
                    block.number, head
                )));
            }
            if block.timestamp < state.globals.time {
                return Err(Error::InvalidState(format!(
                    "Block time {} precedes head time {}",
                    block.timestamp, state.globals.time
                )));
            }
            state.clone()
        };

        let params = self.schedule.params_at(block.number);
        let ctx = OpContext {
            now: block.timestamp,
            block_num: block.number,
            clear_old_worker_votes: self.config.clear_old_worker_votes,
        };

        let mut events = Vec::new();
        for op in &block.operations {
            apply_operation(&mut work, &params, &ctx, op, &mut events)?;
        }

        maintenance::run(
            &mut work,
            &params,
            block.number,
            block.timestamp,
            self.config.clear_old_worker_votes,
            &mut events,
        )?;

        work.globals.head_block_number = block.number;
        work.globals.time = block.timestamp;
        work.touch_globals();

        if self.config.verify_conservation {
            work.check_conservation()?;
        }
        let digest = work.digest()?;

        if let Some(storage) = &self.storage {
            storage.commit(&mut work, events.len() as u64)?;
        } else {
            work.drain_dirty();
        }

        *self.state.write() = work;

        self.metrics.blocks_applied.inc();
        self.metrics
            .operations_applied
            .inc_by(block.operations.len() as u64);
        self.metrics.events_emitted.inc_by(events.len() as u64);
        self.metrics
            .apply_duration
            .observe(timer.elapsed().as_secs_f64());

        tracing::debug!(
            number = block.number,
            operations = block.operations.len(),
            events = events.len(),
            "Block applied"
        );

        Ok(AppliedBlock {
            number: block.number,
            digest,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BalanceKind, GenesisAccount};
    use veles_protocol::operations as ops;
    use veles_protocol::{AccountName, Asset, VLS};

    fn name(s: &str) -> AccountName {
        AccountName::new(s).unwrap()
    }

    fn test_chain() -> Chain {
        let genesis = Genesis {
            accounts: vec![
                GenesisAccount {
                    name: name("alice"),
                    liquid: 1_000_000,
                    debt: 0,
                    vesting: 500_000,
                },
                GenesisAccount {
                    name: name("bob"),
                    liquid: 1_000_000,
                    debt: 0,
                    vesting: 500_000,
                },
            ],
        };
        Chain::new(
            Config::default(),
            HardforkSchedule::all_from_genesis(),
            &genesis,
        )
        .unwrap()
    }

    fn transfer(amount: i64) -> Operation {
        Operation::Transfer(ops::Transfer {
            from: name("alice"),
            to: name("bob"),
            amount: Asset::new(amount, VLS),
            memo: String::new(),
        })
    }

    #[test]
    fn test_apply_block_advances_head() {
        let chain = test_chain();
        let applied = chain
            .apply_block(&BlockInput {
                number: 1,
                timestamp: TimePointSec(3),
                operations: vec![transfer(1_000)],
            })
            .unwrap();
        assert_eq!(applied.number, 1);
        assert_eq!(chain.state().globals.head_block_number, 1);
        assert_eq!(chain.metrics().blocks_applied.get(), 1);
    }

    #[test]
    fn test_block_numbers_must_be_sequential() {
        let chain = test_chain();
        let err = chain
            .apply_block(&BlockInput {
                number: 5,
                timestamp: TimePointSec(3),
                operations: vec![],
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_failed_operation_rolls_back_whole_block() {
        let chain = test_chain();
        let before = chain.state().digest().unwrap();
        // First transfer is fine, second overdraws: the whole block must
        // leave no trace of either.
        let err = chain
            .apply_block(&BlockInput {
                number: 1,
                timestamp: TimePointSec(3),
                operations: vec![transfer(1_000), transfer(i64::MAX / 2)],
            })
            .unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
        assert_eq!(chain.state().globals.head_block_number, 0);
        assert_eq!(chain.state().digest().unwrap(), before);
        assert_eq!(
            chain
                .state()
                .account(&name("bob"))
                .unwrap()
                .balance(VLS, BalanceKind::Liquid)
                .amount,
            1_000_000
        );
    }

    #[test]
    fn test_identical_streams_reach_identical_digests() {
        let run = || {
            let chain = test_chain();
            let mut digest = [0u8; 32];
            for number in 1..=5u64 {
                let applied = chain
                    .apply_block(&BlockInput {
                        number,
                        timestamp: TimePointSec(number as i64 * 3),
                        operations: vec![transfer(1_000 * number as i64)],
                    })
                    .unwrap();
                digest = applied.digest;
            }
            digest
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_emission_accrues_to_pool() {
        let chain = test_chain();
        for number in 1..=4u64 {
            chain
                .apply_block(&BlockInput {
                    number,
                    timestamp: TimePointSec(number as i64 * 3),
                    operations: vec![],
                })
                .unwrap();
        }
        // Worker emission activates at height 2 under the genesis schedule,
        // so blocks 2..=4 each emit one increment.
        let per_block = chain.schedule().params_at(4).worker_emission_per_block;
        let state = chain.state();
        assert_eq!(
            state
                .account(&name("workers"))
                .unwrap()
                .balance(VLS, BalanceKind::Liquid),
            per_block.checked_mul(3).unwrap()
        );
        state.check_conservation().unwrap();
    }
}
