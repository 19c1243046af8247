//! Storage layer using RocksDB
//!
//! # Column Families
//!
//! One per object table, uniquely keyed by the bincode encoding of the
//! natural key, plus:
//!
//! - `globals` - chain-wide properties (single key)
//! - `blocks` - per-block records (key: big-endian height)
//!
//! Each applied block commits as a single atomic WriteBatch built from the
//! state's dirty set, so a crash never leaves a half-applied block. The
//! ordered secondary indices named in the state module are derived in memory
//! when the state is loaded; only primary tables are persisted.

use crate::config::Config;
use crate::error::{Error, Result};
use crate::state::{
    Account, CommentVote, FrozenAuthority, GlobalProperties, LimitOrder, PaidSubscriber,
    PaidSubscription, Post, SavingsWithdraw, State, WorkerRequest, WorkerRequestVote,
};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use veles_protocol::TimePointSec;

const CF_ACCOUNTS: &str = "accounts";
const CF_POSTS: &str = "posts";
const CF_COMMENT_VOTES: &str = "comment_votes";
const CF_WORKER_REQUESTS: &str = "worker_requests";
const CF_WORKER_VOTES: &str = "worker_votes";
const CF_SUBSCRIPTIONS: &str = "subscriptions";
const CF_SUBSCRIBERS: &str = "subscribers";
const CF_ORDERS: &str = "orders";
const CF_SAVINGS: &str = "savings_withdraws";
const CF_FROZEN: &str = "frozen_authorities";
const CF_GLOBALS: &str = "globals";
const CF_BLOCKS: &str = "blocks";

const ALL_CFS: [&str; 12] = [
    CF_ACCOUNTS,
    CF_POSTS,
    CF_COMMENT_VOTES,
    CF_WORKER_REQUESTS,
    CF_WORKER_VOTES,
    CF_SUBSCRIPTIONS,
    CF_SUBSCRIBERS,
    CF_ORDERS,
    CF_SAVINGS,
    CF_FROZEN,
    CF_GLOBALS,
    CF_BLOCKS,
];

const GLOBALS_KEY: &[u8] = b"globals";

/// Per-block record written with the block's object changes
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BlockRecord {
    /// Height
    pub number: u64,
    /// Block timestamp
    pub time: TimePointSec,
    /// Outbound events the block emitted
    pub event_count: u64,
}

/// Storage wrapper for RocksDB
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open or create the database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;
        std::fs::create_dir_all(path)?;

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);
        db_opts.set_max_write_buffer_number(config.rocksdb.max_write_buffer_number);
        db_opts.set_max_background_jobs(config.rocksdb.max_background_jobs);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = %path.display(), "Opened RocksDB");
        Ok(Self { db })
    }

    fn cf_handle(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| Error::Storage(format!("Column family {name} not found")))
    }

    fn batch_table<K, V>(
        &self,
        batch: &mut WriteBatch,
        cf_name: &str,
        table: &BTreeMap<K, V>,
        dirty: &std::collections::BTreeSet<K>,
    ) -> Result<()>
    where
        K: Serialize + Ord,
        V: Serialize,
    {
        let cf = self.cf_handle(cf_name)?;
        for key in dirty {
            let key_bytes = bincode::serialize(key)?;
            match table.get(key) {
                Some(value) => batch.put_cf(cf, key_bytes, bincode::serialize(value)?),
                None => batch.delete_cf(cf, key_bytes),
            }
        }
        Ok(())
    }

    /// Commit one block's changes atomically, draining the state's dirty set
    pub fn commit(&self, state: &mut State, event_count: u64) -> Result<()> {
        let dirty = state.drain_dirty();
        let (
            accounts,
            posts,
            comment_votes,
            worker_requests,
            worker_votes,
            subscriptions,
            subscribers,
            orders,
            savings_withdraws,
            frozen_authorities,
        ) = state.raw_tables();

        let mut batch = WriteBatch::default();
        self.batch_table(&mut batch, CF_ACCOUNTS, accounts, &dirty.accounts)?;
        self.batch_table(&mut batch, CF_POSTS, posts, &dirty.posts)?;
        self.batch_table(&mut batch, CF_COMMENT_VOTES, comment_votes, &dirty.comment_votes)?;
        self.batch_table(
            &mut batch,
            CF_WORKER_REQUESTS,
            worker_requests,
            &dirty.worker_requests,
        )?;
        self.batch_table(&mut batch, CF_WORKER_VOTES, worker_votes, &dirty.worker_votes)?;
        self.batch_table(&mut batch, CF_SUBSCRIPTIONS, subscriptions, &dirty.subscriptions)?;
        self.batch_table(&mut batch, CF_SUBSCRIBERS, subscribers, &dirty.subscribers)?;
        self.batch_table(&mut batch, CF_ORDERS, orders, &dirty.orders)?;
        self.batch_table(&mut batch, CF_SAVINGS, savings_withdraws, &dirty.savings_withdraws)?;
        self.batch_table(&mut batch, CF_FROZEN, frozen_authorities, &dirty.frozen_authorities)?;

        if dirty.globals {
            let cf = self.cf_handle(CF_GLOBALS)?;
            batch.put_cf(cf, GLOBALS_KEY, bincode::serialize(&state.globals)?);
        }

        let record = BlockRecord {
            number: state.globals.head_block_number,
            time: state.globals.time,
            event_count,
        };
        let cf_blocks = self.cf_handle(CF_BLOCKS)?;
        batch.put_cf(
            cf_blocks,
            record.number.to_be_bytes(),
            bincode::serialize(&record)?,
        );

        self.db.write(batch)?;
        Ok(())
    }

    fn load_table<K, V>(&self, cf_name: &str) -> Result<BTreeMap<K, V>>
    where
        K: DeserializeOwned + Ord,
        V: DeserializeOwned,
    {
        let cf = self.cf_handle(cf_name)?;
        let mut table = BTreeMap::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            table.insert(bincode::deserialize(&key)?, bincode::deserialize(&value)?);
        }
        Ok(table)
    }

    /// Load the full state, or `None` if nothing has been committed yet
    pub fn load_state(&self) -> Result<Option<State>> {
        let cf = self.cf_handle(CF_GLOBALS)?;
        let Some(globals_bytes) = self.db.get_cf(cf, GLOBALS_KEY)? else {
            return Ok(None);
        };
        let globals: GlobalProperties = bincode::deserialize(&globals_bytes)?;

        let accounts: BTreeMap<_, Account> = self.load_table(CF_ACCOUNTS)?;
        let posts: BTreeMap<_, Post> = self.load_table(CF_POSTS)?;
        let comment_votes: BTreeMap<_, CommentVote> = self.load_table(CF_COMMENT_VOTES)?;
        let worker_requests: BTreeMap<_, WorkerRequest> = self.load_table(CF_WORKER_REQUESTS)?;
        let worker_votes: BTreeMap<_, WorkerRequestVote> = self.load_table(CF_WORKER_VOTES)?;
        let subscriptions: BTreeMap<_, PaidSubscription> = self.load_table(CF_SUBSCRIPTIONS)?;
        let subscribers: BTreeMap<_, PaidSubscriber> = self.load_table(CF_SUBSCRIBERS)?;
        let orders: BTreeMap<_, LimitOrder> = self.load_table(CF_ORDERS)?;
        let savings_withdraws: BTreeMap<_, SavingsWithdraw> = self.load_table(CF_SAVINGS)?;
        let frozen_authorities: BTreeMap<_, FrozenAuthority> = self.load_table(CF_FROZEN)?;

        Ok(Some(State::from_tables(
            globals,
            accounts,
            posts,
            comment_votes,
            worker_requests,
            worker_votes,
            subscriptions,
            subscribers,
            orders,
            savings_withdraws,
            frozen_authorities,
        )))
    }

    /// Read one block record
    pub fn block_record(&self, number: u64) -> Result<BlockRecord> {
        let cf = self.cf_handle(CF_BLOCKS)?;
        let value = self
            .db
            .get_cf(cf, number.to_be_bytes())?
            .ok_or_else(|| Error::MissingObject {
                kind: "block",
                key: number.to_string(),
            })?;
        Ok(bincode::deserialize(&value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{BalanceKind, Genesis, GenesisAccount};
    use tempfile::TempDir;
    use veles_protocol::{AccountName, Asset, VLS};

    fn name(s: &str) -> AccountName {
        AccountName::new(s).unwrap()
    }

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (config, temp_dir)
    }

    fn test_state() -> State {
        State::genesis(
            &Genesis {
                accounts: vec![GenesisAccount {
                    name: name("alice"),
                    liquid: 1_000_000,
                    debt: 0,
                    vesting: 0,
                }],
            },
            TimePointSec(0),
        )
        .unwrap()
    }

    #[test]
    fn test_open_and_empty_load() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();
        assert!(storage.load_state().unwrap().is_none());
    }

    #[test]
    fn test_commit_and_reload_round_trip() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let mut state = test_state();
        storage.commit(&mut state, 0).unwrap();

        let loaded = storage.load_state().unwrap().unwrap();
        assert_eq!(loaded.digest().unwrap(), state.digest().unwrap());
        assert_eq!(
            loaded
                .account(&name("alice"))
                .unwrap()
                .balance(VLS, BalanceKind::Liquid)
                .amount,
            1_000_000
        );
    }

    #[test]
    fn test_commit_persists_only_dirty_changes() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let mut state = test_state();
        storage.commit(&mut state, 0).unwrap();

        state
            .adjust_balance(&name("alice"), BalanceKind::Liquid, Asset::new(-500, VLS))
            .unwrap();
        state.globals.head_block_number = 1;
        state.globals.time = TimePointSec(3);
        state.touch_globals();
        storage.commit(&mut state, 2).unwrap();

        let loaded = storage.load_state().unwrap().unwrap();
        assert_eq!(loaded.globals.head_block_number, 1);
        assert_eq!(
            loaded
                .account(&name("alice"))
                .unwrap()
                .balance(VLS, BalanceKind::Liquid)
                .amount,
            999_500
        );

        let record = storage.block_record(1).unwrap();
        assert_eq!(record.event_count, 2);
        assert_eq!(record.time, TimePointSec(3));
    }

    #[test]
    fn test_deletes_propagate() {
        let (config, _temp) = test_config();
        let storage = Storage::open(&config).unwrap();

        let mut state = test_state();
        let key = (name("alice"), 7u32);
        state.put_savings_withdraw(crate::state::SavingsWithdraw {
            from: name("alice"),
            request_id: 7,
            to: name("alice"),
            amount: Asset::new(100, VLS),
            memo: String::new(),
            complete: TimePointSec(500),
        });
        storage.commit(&mut state, 0).unwrap();

        state.remove_savings_withdraw(&key);
        storage.commit(&mut state, 0).unwrap();

        let loaded = storage.load_state().unwrap().unwrap();
        assert!(loaded.find_savings_withdraw(&key).is_none());
    }
}
