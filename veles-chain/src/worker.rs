//! Worker funding requests
//!
//! A request attaches to a root post, collects stake-weighted votes until its
//! `vote_end_time`, and is then tallied by the maintenance pass: below the
//! minimum-stake threshold it expires; with a rated payment below the
//! requested minimum the voters close it; otherwise it enters `Payment` and
//! the periodic payout pass drains the worker pool into it until complete.
//!
//! Every transition emits a worker-state event for read-side consumers.

use crate::error::{Error, Result};
use crate::evaluator::OpContext;
use crate::events::ChainEvent;
use crate::schedule::{ChainParams, HARDFORK_WORKER_REQUESTS};
use crate::state::{
    BalanceKind, PostKey, State, WorkerRequest, WorkerRequestState, WorkerRequestVote,
    WORKER_POOL_ACCOUNT,
};
use std::collections::BTreeMap;
use veles_protocol::operations as ops;
use veles_protocol::{AccountName, Asset, Symbol, TimePointSec, PERCENT_100, VLS};

fn require_enabled(params: &ChainParams) -> Result<()> {
    if !params.worker_requests_enabled {
        return Err(Error::NotActivated("worker requests", HARDFORK_WORKER_REQUESTS));
    }
    Ok(())
}

fn pool_account() -> AccountName {
    AccountName::new(WORKER_POOL_ACCOUNT).expect("static name")
}

fn push_state_event(events: &mut Vec<ChainEvent>, post: &PostKey, state: WorkerRequestState) {
    events.push(ChainEvent::WorkerState {
        author: post.0.clone(),
        permlink: post.1.clone(),
        state,
    });
}

/// Submit a new request, or edit one that has not yet been voted on
pub fn apply_worker_request(
    state: &mut State,
    params: &ChainParams,
    ctx: &OpContext,
    op: &ops::WorkerRequest,
) -> Result<()> {
    require_enabled(params)?;

    let post_key = (op.author.clone(), op.permlink.clone());
    let post = state.post(&post_key)?.clone();
    state.account(&op.worker)?;

    if let Some(existing) = state.find_worker_request(&post_key) {
        if existing.state >= WorkerRequestState::Payment {
            return Err(Error::InvalidState("Cannot modify approved request".into()));
        }
        if state.worker_request_has_votes(&post_key) {
            return Err(Error::InvalidState("Cannot edit request with votes".into()));
        }
        let mut request = existing.clone();
        request.worker = op.worker.clone();
        request.required_amount_min = op.required_amount_min;
        request.required_amount_max = op.required_amount_max;
        request.vest_reward = op.vest_reward;
        request.duration = op.duration;
        request.vote_end_time = request.created.plus_secs(op.duration as i64);
        state.put_worker_request(request);
        return Ok(());
    }

    if !post.is_root() {
        return Err(Error::InvalidState(
            "Worker requests can only be attached to root posts".into(),
        ));
    }

    let fee = params.worker_request_creation_fee;
    if !fee.is_zero() {
        state.adjust_balance(
            &op.author,
            BalanceKind::Liquid,
            Asset::new(-fee.amount, fee.symbol),
        )?;
        state.adjust_balance(&pool_account(), BalanceKind::Liquid, fee)?;
    }

    state.put_worker_request(WorkerRequest {
        post: post_key.clone(),
        worker: op.worker.clone(),
        state: WorkerRequestState::Created,
        created: ctx.now,
        required_amount_min: op.required_amount_min,
        required_amount_max: op.required_amount_max,
        vest_reward: op.vest_reward,
        duration: op.duration,
        vote_end_time: ctx.now.plus_secs(op.duration as i64),
        stake_rshares: 0,
        stake_total: 0,
        remaining_payment: Asset::zero(op.required_amount_max.symbol),
    });

    let mut post = post;
    post.has_worker_request = true;
    state.put_post(post);
    Ok(())
}

/// Author-close a request before it starts paying
pub fn apply_worker_request_delete(
    state: &mut State,
    params: &ChainParams,
    ctx: &OpContext,
    op: &ops::WorkerRequestDelete,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    require_enabled(params)?;

    let post_key = (op.author.clone(), op.permlink.clone());
    let request = state.worker_request(&post_key)?.clone();

    if request.state.is_terminal() {
        return Err(Error::InvalidState("Request already closed".into()));
    }
    if request.state == WorkerRequestState::Payment {
        return Err(Error::InvalidState("Request paying, cannot delete".into()));
    }

    let mut post = state.post(&post_key)?.clone();
    post.has_worker_request = false;
    state.put_post(post);

    close_worker_request(
        state,
        request,
        WorkerRequestState::ClosedByAuthor,
        ctx.clear_old_worker_votes,
        events,
    );
    Ok(())
}

/// Cast, change, or remove (weight 0) a stake-weighted vote on a request
pub fn apply_worker_request_vote(
    state: &mut State,
    params: &ChainParams,
    op: &ops::WorkerRequestVote,
) -> Result<()> {
    require_enabled(params)?;

    let stake = state
        .account(&op.voter)?
        .balance(VLS, BalanceKind::Vesting)
        .amount;
    if stake < 1 {
        return Err(Error::InsufficientBalance {
            account: op.voter.clone(),
            required: Asset::new(1, VLS),
            available: Asset::new(stake, VLS),
        });
    }

    let post_key = (op.author.clone(), op.permlink.clone());
    let mut request = state.worker_request(&post_key)?.clone();

    if request.state.is_terminal() {
        return Err(Error::InvalidState("Request closed, cannot vote".into()));
    }
    if request.state == WorkerRequestState::Payment {
        return Err(Error::InvalidState("Request already paying".into()));
    }

    let existing = state.find_worker_vote(&post_key, &op.voter).cloned();

    if op.vote_percent == 0 {
        let prior = existing
            .ok_or_else(|| Error::InvalidState("No vote to remove".into()))?;
        request.stake_rshares -= prior.rshares;
        request.stake_total -= prior.stake;
        state.put_worker_request(request);
        state.remove_worker_vote(&post_key, &op.voter);
        return Ok(());
    }

    let rshares = ((stake as i128) * (op.vote_percent as i128) / (PERCENT_100 as i128)) as i64;

    let (old_rshares, old_stake) = match &existing {
        Some(prior) => {
            if prior.vote_percent == op.vote_percent {
                return Err(Error::InvalidState(
                    "Vote with this percent already exists".into(),
                ));
            }
            (prior.rshares, prior.stake)
        }
        None => (0, 0),
    };

    state.put_worker_vote(
        post_key.clone(),
        op.voter.clone(),
        WorkerRequestVote {
            vote_percent: op.vote_percent,
            rshares,
            stake,
        },
    );

    request.stake_rshares += rshares - old_rshares;
    request.stake_total += stake - old_stake;
    state.put_worker_request(request);
    Ok(())
}

/// Close a request into a terminal state.
///
/// A request its author closes before anyone voted is deleted outright;
/// otherwise the terminal record is retained. Vote records are purged when
/// the node is configured to do so.
fn close_worker_request(
    state: &mut State,
    mut request: WorkerRequest,
    closed_state: WorkerRequestState,
    clear_votes: bool,
    events: &mut Vec<ChainEvent>,
) {
    let post_key = request.post.clone();
    let has_votes = state.worker_request_has_votes(&post_key);

    if clear_votes {
        state.purge_worker_votes(&post_key);
    }

    if closed_state == WorkerRequestState::ClosedByAuthor && !has_votes {
        state.remove_worker_request(&post_key);
    } else {
        request.state = closed_state;
        request.vote_end_time = TimePointSec::MAX;
        state.put_worker_request(request);
    }

    push_state_event(events, &post_key, closed_state);
}

/// Maintenance: tally every request whose voting period ended
pub fn process_worker_votes(
    state: &mut State,
    params: &ChainParams,
    now: TimePointSec,
    clear_votes: bool,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    if !params.worker_requests_enabled {
        return Ok(());
    }

    for post_key in state.worker_requests_due(now) {
        let mut request = state.worker_request(&post_key)?.clone();
        if request.state != WorkerRequestState::Created {
            continue;
        }

        let min_stake = ((state.globals.total_vesting as i128)
            * (params.worker_request_approve_min_percent as i128)
            / (PERCENT_100 as i128)) as i64;

        if request.stake_total <= 0 || request.stake_total < min_stake {
            tracing::debug!(
                post = %format!("{}/{}", post_key.0, post_key.1),
                stake = request.stake_total,
                min_stake,
                "Worker request expired below stake threshold"
            );
            close_worker_request(
                state,
                request,
                WorkerRequestState::ClosedByExpiration,
                clear_votes,
                events,
            );
            continue;
        }

        let calculated = ((request.required_amount_max.amount as i128)
            * (request.stake_rshares as i128)
            / (request.stake_total as i128)) as i64;
        let symbol = request.required_amount_max.symbol;

        if calculated < request.required_amount_min.amount {
            request.remaining_payment = Asset::new(calculated.max(0), symbol);
            close_worker_request(
                state,
                request,
                WorkerRequestState::ClosedByVoters,
                clear_votes,
                events,
            );
            continue;
        }

        request.state = WorkerRequestState::Payment;
        request.remaining_payment = Asset::new(calculated, symbol);
        request.vote_end_time = TimePointSec::MAX;
        state.put_worker_request(request);
        *state
            .globals
            .open_worker_requests
            .entry(symbol)
            .or_insert(0) += 1;
        state.touch_globals();

        push_state_event(events, &post_key, WorkerRequestState::Payment);
    }
    Ok(())
}

/// Maintenance: pay open requests from the pool every cashout interval.
///
/// The pool's balance per symbol is split evenly across that symbol's open
/// requests each cycle; a request whose share rounds to zero is deferred to
/// the next cycle, never closed.
pub fn process_worker_cashout(
    state: &mut State,
    params: &ChainParams,
    block_num: u64,
    clear_votes: bool,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    if !params.worker_requests_enabled
        || params.worker_cashout_interval == 0
        || block_num % params.worker_cashout_interval != 0
    {
        return Ok(());
    }

    let paying = state.worker_requests_paying();
    if paying.is_empty() {
        return Ok(());
    }

    let pool = pool_account();
    let mut max_payment: BTreeMap<Symbol, i64> = BTreeMap::new();
    for (symbol, &count) in &state.globals.open_worker_requests {
        if count == 0 {
            continue;
        }
        let balance = state.account(&pool)?.balance(*symbol, BalanceKind::Liquid);
        max_payment.insert(*symbol, balance.amount / count as i64);
    }

    for post_key in paying {
        let mut request = state.worker_request(&post_key)?.clone();
        let symbol = request.remaining_payment.symbol;
        let share = max_payment.get(&symbol).copied().unwrap_or(0);
        let payment = request.remaining_payment.amount.min(share);
        if payment <= 0 {
            continue;
        }

        let payment = Asset::new(payment, symbol);
        state.adjust_balance(&pool, BalanceKind::Liquid, Asset::new(-payment.amount, symbol))?;
        let kind = if request.vest_reward {
            BalanceKind::Vesting
        } else {
            BalanceKind::Liquid
        };
        state.adjust_balance(&request.worker, kind, payment)?;

        events.push(ChainEvent::WorkerReward {
            worker: request.worker.clone(),
            author: post_key.0.clone(),
            permlink: post_key.1.clone(),
            reward: payment,
            vest_reward: request.vest_reward,
        });

        request.remaining_payment = request.remaining_payment.checked_sub(&payment)?;
        if request.remaining_payment.is_zero() {
            request.state = WorkerRequestState::PaymentComplete;
            if clear_votes {
                state.purge_worker_votes(&post_key);
            }
            let count = state
                .globals
                .open_worker_requests
                .get_mut(&symbol)
                .ok_or_else(|| {
                    Error::InvariantViolation(format!(
                        "Open worker request counter missing for {symbol}"
                    ))
                })?;
            *count -= 1;
            state.touch_globals();
            state.put_worker_request(request);
            push_state_event(events, &post_key, WorkerRequestState::PaymentComplete);
        } else {
            state.put_worker_request(request);
        }
    }
    Ok(())
}
