//! Chain state object model
//!
//! Every entity lives in a uniquely-keyed primary table (BTreeMap, so
//! iteration order is deterministic) with ordered secondary indices derived
//! alongside: worker requests by vote-end time, subscribers by next-payment
//! time, savings withdrawals by completion time, orders by expiration.
//!
//! Mutation goes through typed `put_*`/`remove_*` methods that keep the
//! indices and the dirty set (consumed by the storage layer once per block)
//! in sync. Callers fetch a clone, compute the new value, and write it back —
//! there is no in-place closure mutation.
//!
//! # Invariants
//!
//! - Per-symbol conservation: account categories + subscriber prepaid +
//!   in-flight savings withdrawals == tracked total supply
//! - No balance category ever goes negative
//! - `active_subscribers` on a subscription equals its active subscriber
//!   records

use crate::battery::{BatteryKind, BatteryState};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use veles_protocol::{AccountName, Asset, Symbol, TimePointSec, VBD, VLS};

/// Fee sink for pay-to-skip-limit charges
pub const NULL_ACCOUNT: &str = "null";
/// Worker pool account, funded by emission and request-creation fees
pub const WORKER_POOL_ACCOUNT: &str = "workers";

/// True for accounts the freeze sweep must never touch
pub fn is_system_account(name: &AccountName) -> bool {
    name.as_str() == NULL_ACCOUNT || name.as_str() == WORKER_POOL_ACCOUNT
}

/// Post key: `(author, permlink)`
pub type PostKey = (AccountName, String);
/// Subscriber key: `(author, oid, subscriber)`
pub type SubscriberKey = (AccountName, String, AccountName);
/// Subscription key: `(author, oid)`
pub type SubscriptionKey = (AccountName, String);
/// Order key: `(owner, order_id)`
pub type OrderKey = (AccountName, u32);
/// Savings withdrawal key: `(from, request_id)`
pub type WithdrawKey = (AccountName, u32);

/// Balance category within one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceKind {
    /// Main transferable balance
    Liquid,
    /// Savings, withdrawable with a delay
    Savings,
    /// Tip balance (core symbol only)
    Tip,
    /// Vesting, non-transferable stake (core symbol only)
    Vesting,
    /// Market escrow backing open orders
    Escrow,
}

/// Per-symbol balance categories of one account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// Main transferable amount
    pub liquid: i64,
    /// Savings amount
    pub savings: i64,
    /// Tip amount
    pub tip: i64,
    /// Vesting amount
    pub vesting: i64,
    /// Market escrow amount
    pub escrow: i64,
}

impl Balances {
    fn get(&self, kind: BalanceKind) -> i64 {
        match kind {
            BalanceKind::Liquid => self.liquid,
            BalanceKind::Savings => self.savings,
            BalanceKind::Tip => self.tip,
            BalanceKind::Vesting => self.vesting,
            BalanceKind::Escrow => self.escrow,
        }
    }

    fn get_mut(&mut self, kind: BalanceKind) -> &mut i64 {
        match kind {
            BalanceKind::Liquid => &mut self.liquid,
            BalanceKind::Savings => &mut self.savings,
            BalanceKind::Tip => &mut self.tip,
            BalanceKind::Vesting => &mut self.vesting,
            BalanceKind::Escrow => &mut self.escrow,
        }
    }

    /// Sum of every category
    pub fn total(&self) -> i64 {
        self.liquid + self.savings + self.tip + self.vesting + self.escrow
    }
}

/// One account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account name
    pub name: AccountName,
    /// Creation time
    pub created: TimePointSec,
    /// Posting authority key
    pub posting_key: String,
    /// Active authority key
    pub active_key: String,
    /// Owner authority key
    pub owner_key: String,
    /// Memo key
    pub memo_key: String,
    /// Balance categories per symbol
    pub balances: BTreeMap<Symbol, Balances>,
    /// Stake-weighted reputation score
    pub reputation: i64,
    /// Set by the inactivity sweep; cleared by an authority update
    pub frozen: bool,
    /// Version at which this account proved its keys by unfreezing; the
    /// sweep never touches a proved account again
    pub proved_hardfork: u32,
    /// Battery state per metered action kind, created lazily
    pub batteries: BTreeMap<BatteryKind, BatteryState>,
    /// Vesting withdrawal installment, raw core units
    pub vesting_withdraw_rate: i64,
    /// Total scheduled for withdrawal
    pub to_withdraw: i64,
    /// Withdrawn so far under the current schedule
    pub withdrawn: i64,
    /// Next installment due time; sentinel when no schedule
    pub next_vesting_withdrawal: TimePointSec,
}

impl Account {
    fn new(name: AccountName, created: TimePointSec, memo_key: String) -> Self {
        Self {
            name,
            created,
            posting_key: String::new(),
            active_key: String::new(),
            owner_key: String::new(),
            memo_key,
            balances: BTreeMap::new(),
            reputation: 0,
            frozen: false,
            proved_hardfork: 0,
            batteries: BTreeMap::new(),
            vesting_withdraw_rate: 0,
            to_withdraw: 0,
            withdrawn: 0,
            next_vesting_withdrawal: TimePointSec::MAX,
        }
    }

    /// Balance of one category
    pub fn balance(&self, symbol: Symbol, kind: BalanceKind) -> Asset {
        Asset::new(
            self.balances.get(&symbol).map_or(0, |b| b.get(kind)),
            symbol,
        )
    }
}

/// A post or comment; worker requests attach to root posts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    /// Author
    pub author: AccountName,
    /// Permlink, unique per author
    pub permlink: String,
    /// Parent post; absent for a root post
    pub parent: Option<PostKey>,
    /// Creation time
    pub created: TimePointSec,
    /// Last edit time
    pub last_update: TimePointSec,
    /// Whether a worker request currently references this post
    pub has_worker_request: bool,
}

impl Post {
    /// Root posts have no parent
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A vote on a post, keyed `(post, voter)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentVote {
    /// Weight in basis points
    pub weight: i16,
    /// Stake-weighted magnitude at vote time
    pub rshares: i64,
    /// Last change time
    pub last_update: TimePointSec,
}

/// Worker request lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WorkerRequestState {
    /// Open for voting
    Created,
    /// Approved, receiving payout installments
    Payment,
    /// Fully paid (terminal)
    PaymentComplete,
    /// Closed by its author before payment (terminal)
    ClosedByAuthor,
    /// Voted stake never reached the minimum (terminal)
    ClosedByExpiration,
    /// Rated payment fell below the requested minimum (terminal)
    ClosedByVoters,
}

impl WorkerRequestState {
    /// True once no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerRequestState::Created | WorkerRequestState::Payment)
    }
}

/// An on-chain funding request tied to a root post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Root post the request is tied to
    pub post: PostKey,
    /// Payout recipient
    pub worker: AccountName,
    /// Lifecycle state
    pub state: WorkerRequestState,
    /// Creation time
    pub created: TimePointSec,
    /// Minimum acceptable payment
    pub required_amount_min: Asset,
    /// Maximum requested payment
    pub required_amount_max: Asset,
    /// Pay to the worker's vesting balance
    pub vest_reward: bool,
    /// Voting duration, seconds
    pub duration: u32,
    /// Tally time; sentinel once tallied or closed
    pub vote_end_time: TimePointSec,
    /// Σ stake × percent across votes
    pub stake_rshares: i64,
    /// Σ stake across votes
    pub stake_total: i64,
    /// Outstanding payout
    pub remaining_payment: Asset,
}

/// One stake-weighted vote on a worker request, keyed `(post, voter)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequestVote {
    /// Weight in basis points, negative against funding
    pub vote_percent: i16,
    /// stake × percent at vote time
    pub rshares: i64,
    /// Voter vesting at vote time
    pub stake: i64,
}

/// A recurring-billing offer, keyed `(author, oid)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaidSubscription {
    /// Offering account
    pub author: AccountName,
    /// Offer id
    pub oid: String,
    /// Cost per execution
    pub cost: Asset,
    /// Bill against tip balances
    pub tip_cost: bool,
    /// Subscribers may hold prepaid balances
    pub allow_prepaid: bool,
    /// Seconds between executions
    pub interval: u32,
    /// Executions per subscription; 0 = single payment at subscribe time
    pub executions: u32,
    /// Creation time
    pub created: TimePointSec,
    /// Total subscriber records referencing this offer
    pub subscribers: u32,
    /// Subscriber records with `active = true`
    pub active_subscribers: u32,
}

/// Why a subscriber record went inactive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InactiveReason {
    /// Still active
    None,
    /// A billing debit could not be covered
    PaymentFailure,
    /// All executions performed
    ExecutionsDone,
    /// The author changed non-prepaid subscription terms
    SubscriptionUpdate,
}

/// One subscriber of an offer, keyed `(author, oid, subscriber)`.
///
/// Records are retained after deactivation for audit and query use; only the
/// cancel and offer-delete evaluators remove them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaidSubscriber {
    /// Subscriber account
    pub subscriber: AccountName,
    /// Offer author
    pub author: AccountName,
    /// Offer id
    pub oid: String,
    /// Cost per execution, copied at subscribe/refresh time
    pub cost: Asset,
    /// Bill against tip balances
    pub tip_cost: bool,
    /// Seconds between executions
    pub interval: u32,
    /// Executions per subscription
    pub executions: u32,
    /// Executions still owed; decrements toward zero unless infinite
    pub executions_left: u32,
    /// Funds held by the engine for future executions
    pub prepaid: Asset,
    /// Next billing time; epoch-zero when inactive
    pub next_payment: TimePointSec,
    /// First subscribe time
    pub subscribed: TimePointSec,
    /// Terminal false once deactivated
    pub active: bool,
    /// Reason for deactivation
    pub inactive_reason: InactiveReason,
}

/// An open limit order; the sell amount is held in market escrow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrder {
    /// Owner
    pub owner: AccountName,
    /// Order id, unique per owner among open orders
    pub order_id: u32,
    /// Creation time
    pub created: TimePointSec,
    /// Escrow is released when this passes
    pub expiration: TimePointSec,
    /// Escrowed sell amount
    pub amount_to_sell: Asset,
    /// Minimum acceptable proceeds
    pub min_to_receive: Asset,
}

/// An in-flight savings withdrawal, keyed `(from, request_id)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavingsWithdraw {
    /// Savings owner
    pub from: AccountName,
    /// Request id
    pub request_id: u32,
    /// Liquid recipient
    pub to: AccountName,
    /// Amount held in flight
    pub amount: Asset,
    /// Free-form memo
    pub memo: String,
    /// Completion time
    pub complete: TimePointSec,
}

/// Authority snapshot captured when an account is frozen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrozenAuthority {
    /// Posting key at freeze time
    pub posting_key: String,
    /// Active key at freeze time
    pub active_key: String,
    /// Owner key at freeze time
    pub owner_key: String,
    /// Memo key at freeze time
    pub memo_key: String,
}

/// Chain-wide properties
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalProperties {
    /// Last applied block
    pub head_block_number: u64,
    /// Time of the last applied block
    pub time: TimePointSec,
    /// Tracked total supply per symbol; changes only via emission/burn
    pub total_supply: BTreeMap<Symbol, i64>,
    /// Core-symbol vesting across all accounts
    pub total_vesting: i64,
    /// Requests in `Payment` state per symbol
    pub open_worker_requests: BTreeMap<Symbol, u32>,
}

/// Keys touched since the last storage commit
#[derive(Debug, Clone, Default)]
pub struct DirtySet {
    /// Touched accounts
    pub accounts: BTreeSet<AccountName>,
    /// Touched posts
    pub posts: BTreeSet<PostKey>,
    /// Touched comment votes
    pub comment_votes: BTreeSet<(PostKey, AccountName)>,
    /// Touched worker requests
    pub worker_requests: BTreeSet<PostKey>,
    /// Touched worker votes
    pub worker_votes: BTreeSet<(PostKey, AccountName)>,
    /// Touched subscriptions
    pub subscriptions: BTreeSet<SubscriptionKey>,
    /// Touched subscriber records
    pub subscribers: BTreeSet<SubscriberKey>,
    /// Touched orders
    pub orders: BTreeSet<OrderKey>,
    /// Touched savings withdrawals
    pub savings_withdraws: BTreeSet<WithdrawKey>,
    /// Touched freeze snapshots
    pub frozen_authorities: BTreeSet<AccountName>,
    /// Whether global properties changed
    pub globals: bool,
}

/// Genesis balance grant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisAccount {
    /// Account name
    pub name: AccountName,
    /// Initial liquid VLS
    pub liquid: i64,
    /// Initial liquid VBD
    pub debt: i64,
    /// Initial vesting VLS
    pub vesting: i64,
}

/// Initial chain state description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Genesis {
    /// Initial accounts beyond the system ones
    pub accounts: Vec<GenesisAccount>,
}

/// The full mutable chain state
#[derive(Debug, Clone, Default)]
pub struct State {
    /// Chain-wide properties
    pub globals: GlobalProperties,

    accounts: BTreeMap<AccountName, Account>,
    posts: BTreeMap<PostKey, Post>,
    comment_votes: BTreeMap<(PostKey, AccountName), CommentVote>,
    worker_requests: BTreeMap<PostKey, WorkerRequest>,
    worker_votes: BTreeMap<(PostKey, AccountName), WorkerRequestVote>,
    subscriptions: BTreeMap<SubscriptionKey, PaidSubscription>,
    subscribers: BTreeMap<SubscriberKey, PaidSubscriber>,
    orders: BTreeMap<OrderKey, LimitOrder>,
    savings_withdraws: BTreeMap<WithdrawKey, SavingsWithdraw>,
    frozen_authorities: BTreeMap<AccountName, FrozenAuthority>,

    // Derived orderings, rebuilt on load
    wr_by_vote_end: BTreeSet<(TimePointSec, PostKey)>,
    sub_by_next_payment: BTreeSet<(TimePointSec, SubscriberKey)>,
    orders_by_expiration: BTreeSet<(TimePointSec, OrderKey)>,
    savings_by_complete: BTreeSet<(TimePointSec, WithdrawKey)>,

    dirty: DirtySet,
}

impl State {
    /// Build the genesis state: system accounts plus the listed grants, with
    /// tracked supply equal to the granted amounts (the one implicit emission)
    pub fn genesis(genesis: &Genesis, time: TimePointSec) -> Result<State> {
        let mut state = State::default();
        state.globals.time = time;

        for name in [NULL_ACCOUNT, WORKER_POOL_ACCOUNT] {
            let name = AccountName::new(name)?;
            state
                .accounts
                .insert(name.clone(), Account::new(name, time, String::new()));
        }

        for grant in &genesis.accounts {
            if state.accounts.contains_key(&grant.name) {
                return Err(Error::DuplicateObject {
                    kind: "account",
                    key: grant.name.to_string(),
                });
            }
            let mut account = Account::new(grant.name.clone(), time, String::new());
            let mut vls = Balances::default();
            vls.liquid = grant.liquid;
            vls.vesting = grant.vesting;
            account.balances.insert(VLS, vls);
            if grant.debt > 0 {
                let mut vbd = Balances::default();
                vbd.liquid = grant.debt;
                account.balances.insert(VBD, vbd);
            }
            *state.globals.total_supply.entry(VLS).or_insert(0) += grant.liquid + grant.vesting;
            *state.globals.total_supply.entry(VBD).or_insert(0) += grant.debt;
            state.globals.total_vesting += grant.vesting;
            state.accounts.insert(grant.name.clone(), account);
        }

        state.dirty = DirtySet::default();
        state.mark_all_dirty();
        Ok(state)
    }

    fn mark_all_dirty(&mut self) {
        self.dirty.accounts = self.accounts.keys().cloned().collect();
        self.dirty.globals = true;
    }

    /// Take and reset the dirty set
    pub fn drain_dirty(&mut self) -> DirtySet {
        std::mem::take(&mut self.dirty)
    }

    // Accounts

    /// Get an account
    pub fn account(&self, name: &AccountName) -> Result<&Account> {
        self.accounts.get(name).ok_or_else(|| Error::MissingObject {
            kind: "account",
            key: name.to_string(),
        })
    }

    /// Get an account if it exists
    pub fn find_account(&self, name: &AccountName) -> Option<&Account> {
        self.accounts.get(name)
    }

    /// Replace an account
    pub fn put_account(&mut self, account: Account) {
        self.dirty.accounts.insert(account.name.clone());
        self.accounts.insert(account.name.clone(), account);
    }

    /// Create a new account; fails if the name is taken
    pub fn create_account(
        &mut self,
        name: AccountName,
        created: TimePointSec,
        memo_key: String,
    ) -> Result<()> {
        if self.accounts.contains_key(&name) {
            return Err(Error::DuplicateObject {
                kind: "account",
                key: name.to_string(),
            });
        }
        self.put_account(Account::new(name, created, memo_key));
        Ok(())
    }

    /// Accounts in name order
    pub fn accounts(&self) -> impl Iterator<Item = &Account> {
        self.accounts.values()
    }

    /// Move `delta` into (positive) or out of (negative) one balance
    /// category; debits that would go negative fail with
    /// `InsufficientBalance`.
    pub fn adjust_balance(
        &mut self,
        name: &AccountName,
        kind: BalanceKind,
        delta: Asset,
    ) -> Result<()> {
        let account = self.accounts.get_mut(name).ok_or_else(|| Error::MissingObject {
            kind: "account",
            key: name.to_string(),
        })?;
        let balances = account.balances.entry(delta.symbol).or_default();
        let slot = balances.get_mut(kind);
        let next = slot
            .checked_add(delta.amount)
            .ok_or(veles_protocol::Error::Overflow("balance adjust"))?;
        if next < 0 {
            return Err(Error::InsufficientBalance {
                account: name.clone(),
                required: Asset::new(-delta.amount, delta.symbol),
                available: Asset::new(*slot, delta.symbol),
            });
        }
        *slot = next;
        if kind == BalanceKind::Vesting && delta.symbol == VLS {
            self.globals.total_vesting += delta.amount;
            self.dirty.globals = true;
        }
        self.dirty.accounts.insert(name.clone());
        Ok(())
    }

    /// Raise (or lower, for burns) the tracked supply of a symbol.
    /// Emission and burn are the only legitimate callers.
    pub fn adjust_supply(&mut self, delta: Asset) {
        *self.globals.total_supply.entry(delta.symbol).or_insert(0) += delta.amount;
        self.dirty.globals = true;
    }

    /// Mark globals dirty after direct mutation
    pub fn touch_globals(&mut self) {
        self.dirty.globals = true;
    }

    // Posts

    /// Get a post
    pub fn post(&self, key: &PostKey) -> Result<&Post> {
        self.posts.get(key).ok_or_else(|| Error::MissingObject {
            kind: "post",
            key: format!("{}/{}", key.0, key.1),
        })
    }

    /// Get a post if it exists
    pub fn find_post(&self, key: &PostKey) -> Option<&Post> {
        self.posts.get(key)
    }

    /// Replace a post
    pub fn put_post(&mut self, post: Post) {
        let key = (post.author.clone(), post.permlink.clone());
        self.dirty.posts.insert(key.clone());
        self.posts.insert(key, post);
    }

    // Comment votes

    /// Get a comment vote if it exists
    pub fn find_comment_vote(&self, post: &PostKey, voter: &AccountName) -> Option<&CommentVote> {
        self.comment_votes.get(&(post.clone(), voter.clone()))
    }

    /// Replace a comment vote
    pub fn put_comment_vote(&mut self, post: PostKey, voter: AccountName, vote: CommentVote) {
        let key = (post, voter);
        self.dirty.comment_votes.insert(key.clone());
        self.comment_votes.insert(key, vote);
    }

    // Worker requests

    /// Get a worker request
    pub fn worker_request(&self, post: &PostKey) -> Result<&WorkerRequest> {
        self.worker_requests
            .get(post)
            .ok_or_else(|| Error::MissingObject {
                kind: "worker request",
                key: format!("{}/{}", post.0, post.1),
            })
    }

    /// Get a worker request if it exists
    pub fn find_worker_request(&self, post: &PostKey) -> Option<&WorkerRequest> {
        self.worker_requests.get(post)
    }

    /// Insert or replace a worker request, maintaining the vote-end index
    pub fn put_worker_request(&mut self, request: WorkerRequest) {
        let key = request.post.clone();
        if let Some(old) = self.worker_requests.get(&key) {
            self.wr_by_vote_end.remove(&(old.vote_end_time, key.clone()));
        }
        self.wr_by_vote_end.insert((request.vote_end_time, key.clone()));
        self.dirty.worker_requests.insert(key.clone());
        self.worker_requests.insert(key, request);
    }

    /// Delete a worker request
    pub fn remove_worker_request(&mut self, post: &PostKey) {
        if let Some(old) = self.worker_requests.remove(post) {
            self.wr_by_vote_end.remove(&(old.vote_end_time, post.clone()));
        }
        self.dirty.worker_requests.insert(post.clone());
    }

    /// Requests whose vote-end time has arrived, in time order
    pub fn worker_requests_due(&self, now: TimePointSec) -> Vec<PostKey> {
        self.wr_by_vote_end
            .iter()
            .take_while(|(t, _)| *t <= now)
            .map(|(_, k)| k.clone())
            .collect()
    }

    /// Requests in `Payment` state, in key order
    pub fn worker_requests_paying(&self) -> Vec<PostKey> {
        self.worker_requests
            .iter()
            .filter(|(_, r)| r.state == WorkerRequestState::Payment)
            .map(|(k, _)| k.clone())
            .collect()
    }

    // Worker request votes

    /// Get a worker request vote if it exists
    pub fn find_worker_vote(
        &self,
        post: &PostKey,
        voter: &AccountName,
    ) -> Option<&WorkerRequestVote> {
        self.worker_votes.get(&(post.clone(), voter.clone()))
    }

    /// Insert or replace a worker request vote
    pub fn put_worker_vote(&mut self, post: PostKey, voter: AccountName, vote: WorkerRequestVote) {
        let key = (post, voter);
        self.dirty.worker_votes.insert(key.clone());
        self.worker_votes.insert(key, vote);
    }

    /// Delete one worker request vote
    pub fn remove_worker_vote(&mut self, post: &PostKey, voter: &AccountName) {
        let key = (post.clone(), voter.clone());
        self.worker_votes.remove(&key);
        self.dirty.worker_votes.insert(key);
    }

    /// Votes on one request, in voter order
    pub fn worker_votes_for(&self, post: &PostKey) -> Vec<(AccountName, WorkerRequestVote)> {
        self.worker_votes
            .range((post.clone(), name_floor())..)
            .take_while(|((p, _), _)| p == post)
            .map(|((_, voter), vote)| (voter.clone(), vote.clone()))
            .collect()
    }

    /// Whether any votes exist for a request
    pub fn worker_request_has_votes(&self, post: &PostKey) -> bool {
        self.worker_votes
            .range((post.clone(), name_floor())..)
            .take_while(|((p, _), _)| p == post)
            .next()
            .is_some()
    }

    /// Delete every vote on one request
    pub fn purge_worker_votes(&mut self, post: &PostKey) {
        let keys: Vec<_> = self
            .worker_votes
            .range((post.clone(), name_floor())..)
            .take_while(|((p, _), _)| p == post)
            .map(|(k, _)| k.clone())
            .collect();
        for key in keys {
            self.worker_votes.remove(&key);
            self.dirty.worker_votes.insert(key);
        }
    }

    // Subscriptions

    /// Get a subscription offer
    pub fn subscription(&self, key: &SubscriptionKey) -> Result<&PaidSubscription> {
        self.subscriptions
            .get(key)
            .ok_or_else(|| Error::MissingObject {
                kind: "paid subscription",
                key: format!("{}:{}", key.0, key.1),
            })
    }

    /// Get a subscription offer if it exists
    pub fn find_subscription(&self, key: &SubscriptionKey) -> Option<&PaidSubscription> {
        self.subscriptions.get(key)
    }

    /// Insert or replace a subscription offer
    pub fn put_subscription(&mut self, subscription: PaidSubscription) {
        let key = (subscription.author.clone(), subscription.oid.clone());
        self.dirty.subscriptions.insert(key.clone());
        self.subscriptions.insert(key, subscription);
    }

    /// Delete a subscription offer
    pub fn remove_subscription(&mut self, key: &SubscriptionKey) {
        self.subscriptions.remove(key);
        self.dirty.subscriptions.insert(key.clone());
    }

    // Subscribers

    /// Get a subscriber record
    pub fn subscriber(&self, key: &SubscriberKey) -> Result<&PaidSubscriber> {
        self.subscribers
            .get(key)
            .ok_or_else(|| Error::MissingObject {
                kind: "paid subscriber",
                key: format!("{}:{}:{}", key.0, key.1, key.2),
            })
    }

    /// Get a subscriber record if it exists
    pub fn find_subscriber(&self, key: &SubscriberKey) -> Option<&PaidSubscriber> {
        self.subscribers.get(key)
    }

    /// Insert or replace a subscriber record, maintaining the next-payment
    /// index
    pub fn put_subscriber(&mut self, record: PaidSubscriber) {
        let key = (
            record.author.clone(),
            record.oid.clone(),
            record.subscriber.clone(),
        );
        if let Some(old) = self.subscribers.get(&key) {
            self.sub_by_next_payment
                .remove(&(old.next_payment, key.clone()));
        }
        self.sub_by_next_payment.insert((record.next_payment, key.clone()));
        self.dirty.subscribers.insert(key.clone());
        self.subscribers.insert(key, record);
    }

    /// Delete a subscriber record
    pub fn remove_subscriber(&mut self, key: &SubscriberKey) {
        if let Some(old) = self.subscribers.remove(key) {
            self.sub_by_next_payment
                .remove(&(old.next_payment, key.clone()));
        }
        self.dirty.subscribers.insert(key.clone());
    }

    /// Subscriber records of one offer, in subscriber order
    pub fn subscribers_of(&self, key: &SubscriptionKey) -> Vec<SubscriberKey> {
        self.subscribers
            .range((key.0.clone(), key.1.clone(), name_floor())..)
            .take_while(|((a, o, _), _)| a == &key.0 && o == &key.1)
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Records due for billing at `now`, ascending next-payment order.
    /// Epoch-zero entries are inactive and skipped.
    pub fn subscribers_due(&self, now: TimePointSec) -> Vec<SubscriberKey> {
        self.sub_by_next_payment
            .iter()
            .skip_while(|(t, _)| *t == TimePointSec::ZERO)
            .take_while(|(t, _)| *t <= now)
            .map(|(_, k)| k.clone())
            .collect()
    }

    // Orders

    /// Get an order
    pub fn order(&self, key: &OrderKey) -> Result<&LimitOrder> {
        self.orders.get(key).ok_or_else(|| Error::MissingObject {
            kind: "limit order",
            key: format!("{}:{}", key.0, key.1),
        })
    }

    /// Get an order if it exists
    pub fn find_order(&self, key: &OrderKey) -> Option<&LimitOrder> {
        self.orders.get(key)
    }

    /// Insert or replace an order, maintaining the expiration index
    pub fn put_order(&mut self, order: LimitOrder) {
        let key = (order.owner.clone(), order.order_id);
        if let Some(old) = self.orders.get(&key) {
            self.orders_by_expiration.remove(&(old.expiration, key.clone()));
        }
        self.orders_by_expiration.insert((order.expiration, key.clone()));
        self.dirty.orders.insert(key.clone());
        self.orders.insert(key, order);
    }

    /// Delete an order
    pub fn remove_order(&mut self, key: &OrderKey) {
        if let Some(old) = self.orders.remove(key) {
            self.orders_by_expiration.remove(&(old.expiration, key.clone()));
        }
        self.dirty.orders.insert(key.clone());
    }

    /// Orders expired at `now`, ascending expiration order
    pub fn orders_expired(&self, now: TimePointSec) -> Vec<OrderKey> {
        self.orders_by_expiration
            .iter()
            .take_while(|(t, _)| *t <= now)
            .map(|(_, k)| k.clone())
            .collect()
    }

    // Savings withdrawals

    /// Get a savings withdrawal
    pub fn savings_withdraw(&self, key: &WithdrawKey) -> Result<&SavingsWithdraw> {
        self.savings_withdraws
            .get(key)
            .ok_or_else(|| Error::MissingObject {
                kind: "savings withdrawal",
                key: format!("{}:{}", key.0, key.1),
            })
    }

    /// Get a savings withdrawal if it exists
    pub fn find_savings_withdraw(&self, key: &WithdrawKey) -> Option<&SavingsWithdraw> {
        self.savings_withdraws.get(key)
    }

    /// Insert or replace a savings withdrawal, maintaining the completion
    /// index
    pub fn put_savings_withdraw(&mut self, withdraw: SavingsWithdraw) {
        let key = (withdraw.from.clone(), withdraw.request_id);
        if let Some(old) = self.savings_withdraws.get(&key) {
            self.savings_by_complete.remove(&(old.complete, key.clone()));
        }
        self.savings_by_complete.insert((withdraw.complete, key.clone()));
        self.dirty.savings_withdraws.insert(key.clone());
        self.savings_withdraws.insert(key, withdraw);
    }

    /// Delete a savings withdrawal
    pub fn remove_savings_withdraw(&mut self, key: &WithdrawKey) {
        if let Some(old) = self.savings_withdraws.remove(key) {
            self.savings_by_complete.remove(&(old.complete, key.clone()));
        }
        self.dirty.savings_withdraws.insert(key.clone());
    }

    /// Withdrawals complete at `now`, ascending completion order
    pub fn savings_due(&self, now: TimePointSec) -> Vec<WithdrawKey> {
        self.savings_by_complete
            .iter()
            .take_while(|(t, _)| *t <= now)
            .map(|(_, k)| k.clone())
            .collect()
    }

    // Freeze snapshots

    /// Get a freeze snapshot if it exists
    pub fn find_frozen_authority(&self, name: &AccountName) -> Option<&FrozenAuthority> {
        self.frozen_authorities.get(name)
    }

    /// Store a freeze snapshot
    pub fn put_frozen_authority(&mut self, name: AccountName, snapshot: FrozenAuthority) {
        self.dirty.frozen_authorities.insert(name.clone());
        self.frozen_authorities.insert(name, snapshot);
    }

    /// Delete a freeze snapshot
    pub fn remove_frozen_authority(&mut self, name: &AccountName) {
        self.frozen_authorities.remove(name);
        self.dirty.frozen_authorities.insert(name.clone());
    }

    // Invariants

    /// Verify the per-symbol conservation law.
    ///
    /// Sums every balance category across accounts plus funds held in flight
    /// (subscriber prepaid, pending savings withdrawals) and compares against
    /// the tracked supply.
    pub fn check_conservation(&self) -> Result<()> {
        let mut sums: BTreeMap<Symbol, i64> = BTreeMap::new();
        for account in self.accounts.values() {
            for (symbol, balances) in &account.balances {
                *sums.entry(*symbol).or_insert(0) += balances.total();
            }
        }
        for record in self.subscribers.values() {
            *sums.entry(record.prepaid.symbol).or_insert(0) += record.prepaid.amount;
        }
        for withdraw in self.savings_withdraws.values() {
            *sums.entry(withdraw.amount.symbol).or_insert(0) += withdraw.amount.amount;
        }

        for (symbol, &supply) in &self.globals.total_supply {
            let sum = sums.get(symbol).copied().unwrap_or(0);
            if sum != supply {
                return Err(Error::InvariantViolation(format!(
                    "Supply of {symbol} does not balance: tracked {supply}, summed {sum}"
                )));
            }
        }
        for (symbol, &sum) in &sums {
            if sum != 0 && !self.globals.total_supply.contains_key(symbol) {
                return Err(Error::InvariantViolation(format!(
                    "Untracked supply of {symbol}: {sum}"
                )));
            }
        }
        Ok(())
    }

    /// Canonical digest of the full state.
    ///
    /// BTreeMap serialization is key-ordered, so two nodes that applied the
    /// same blocks produce byte-identical digests.
    pub fn digest(&self) -> Result<[u8; 32]> {
        let mut hasher = Sha256::new();
        hasher.update(bincode::serialize(&self.globals)?);
        hasher.update(bincode::serialize(&self.accounts)?);
        hasher.update(bincode::serialize(&self.posts)?);
        hasher.update(bincode::serialize(&self.comment_votes)?);
        hasher.update(bincode::serialize(&self.worker_requests)?);
        hasher.update(bincode::serialize(&self.worker_votes)?);
        hasher.update(bincode::serialize(&self.subscriptions)?);
        hasher.update(bincode::serialize(&self.subscribers)?);
        hasher.update(bincode::serialize(&self.orders)?);
        hasher.update(bincode::serialize(&self.savings_withdraws)?);
        hasher.update(bincode::serialize(&self.frozen_authorities)?);
        Ok(hasher.finalize().into())
    }

    /// Rebuild the derived orderings from the primary tables (after load)
    pub fn rebuild_indices(&mut self) {
        self.wr_by_vote_end = self
            .worker_requests
            .iter()
            .map(|(k, r)| (r.vote_end_time, k.clone()))
            .collect();
        self.sub_by_next_payment = self
            .subscribers
            .iter()
            .map(|(k, r)| (r.next_payment, k.clone()))
            .collect();
        self.orders_by_expiration = self
            .orders
            .iter()
            .map(|(k, o)| (o.expiration, k.clone()))
            .collect();
        self.savings_by_complete = self
            .savings_withdraws
            .iter()
            .map(|(k, w)| (w.complete, k.clone()))
            .collect();
    }
}

// Storage support: the persistence layer reads whole tables and re-inserts
// loaded objects without touching the dirty set.
impl State {
    pub(crate) fn raw_tables(
        &self,
    ) -> (
        &BTreeMap<AccountName, Account>,
        &BTreeMap<PostKey, Post>,
        &BTreeMap<(PostKey, AccountName), CommentVote>,
        &BTreeMap<PostKey, WorkerRequest>,
        &BTreeMap<(PostKey, AccountName), WorkerRequestVote>,
        &BTreeMap<SubscriptionKey, PaidSubscription>,
        &BTreeMap<SubscriberKey, PaidSubscriber>,
        &BTreeMap<OrderKey, LimitOrder>,
        &BTreeMap<WithdrawKey, SavingsWithdraw>,
        &BTreeMap<AccountName, FrozenAuthority>,
    ) {
        (
            &self.accounts,
            &self.posts,
            &self.comment_votes,
            &self.worker_requests,
            &self.worker_votes,
            &self.subscriptions,
            &self.subscribers,
            &self.orders,
            &self.savings_withdraws,
            &self.frozen_authorities,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_tables(
        globals: GlobalProperties,
        accounts: BTreeMap<AccountName, Account>,
        posts: BTreeMap<PostKey, Post>,
        comment_votes: BTreeMap<(PostKey, AccountName), CommentVote>,
        worker_requests: BTreeMap<PostKey, WorkerRequest>,
        worker_votes: BTreeMap<(PostKey, AccountName), WorkerRequestVote>,
        subscriptions: BTreeMap<SubscriptionKey, PaidSubscription>,
        subscribers: BTreeMap<SubscriberKey, PaidSubscriber>,
        orders: BTreeMap<OrderKey, LimitOrder>,
        savings_withdraws: BTreeMap<WithdrawKey, SavingsWithdraw>,
        frozen_authorities: BTreeMap<AccountName, FrozenAuthority>,
    ) -> State {
        let mut state = State {
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
            ..State::default()
        };
        state.rebuild_indices();
        state
    }
}

fn name_floor() -> AccountName {
    AccountName::floor()
}
