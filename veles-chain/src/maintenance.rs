//! Block-boundary maintenance
//!
//! Runs once per block after every operation has been applied, in a fixed
//! order: pool emission, worker-vote tally, worker payout, subscription
//! billing, savings fulfilment, vesting withdrawals, order expiry, freeze
//! sweep. Any error here is fatal to replay — skipping a step would silently
//! diverge nodes.

use crate::error::Result;
use crate::events::ChainEvent;
use crate::schedule::ChainParams;
use crate::state::{BalanceKind, State, WORKER_POOL_ACCOUNT};
use crate::{freeze, market, subscription, worker};
use veles_protocol::{AccountName, Asset, TimePointSec, VLS};

/// Run the full maintenance pass for one block
pub fn run(
    state: &mut State,
    params: &ChainParams,
    block_num: u64,
    now: TimePointSec,
    clear_old_worker_votes: bool,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    process_emission(state, params)?;
    worker::process_worker_votes(state, params, now, clear_old_worker_votes, events)?;
    worker::process_worker_cashout(state, params, block_num, clear_old_worker_votes, events)?;
    subscription::process_paid_subscribers(state, params, now, events)?;
    process_savings_withdraws(state, now, events)?;
    process_vesting_withdrawals(state, params, now, events)?;
    market::expire_orders(state, now, events)?;
    freeze::sweep(state, params, events)?;
    Ok(())
}

/// Schedule-driven emission into the worker pool; the only per-block change
/// to tracked supply
fn process_emission(state: &mut State, params: &ChainParams) -> Result<()> {
    let emission = params.worker_emission_per_block;
    if !params.worker_requests_enabled || emission.is_zero() {
        return Ok(());
    }
    let pool = AccountName::new(WORKER_POOL_ACCOUNT)?;
    state.adjust_balance(&pool, BalanceKind::Liquid, emission)?;
    state.adjust_supply(emission);
    Ok(())
}

/// Complete savings withdrawals whose delay has elapsed
fn process_savings_withdraws(
    state: &mut State,
    now: TimePointSec,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    for key in state.savings_due(now) {
        let withdraw = state.savings_withdraw(&key)?.clone();
        state.adjust_balance(&withdraw.to, BalanceKind::Liquid, withdraw.amount)?;
        state.remove_savings_withdraw(&key);
        events.push(ChainEvent::FillSavingsWithdraw {
            from: withdraw.from,
            to: withdraw.to,
            request_id: withdraw.request_id,
            amount: withdraw.amount,
        });
    }
    Ok(())
}

/// Convert one due installment per account from vesting back to liquid
fn process_vesting_withdrawals(
    state: &mut State,
    params: &ChainParams,
    now: TimePointSec,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    let due: Vec<AccountName> = state
        .accounts()
        .filter(|a| a.next_vesting_withdrawal <= now)
        .map(|a| a.name.clone())
        .collect();

    for name in due {
        let mut account = state.account(&name)?.clone();
        let vesting = account.balance(VLS, BalanceKind::Vesting).amount;
        let remaining = account.to_withdraw - account.withdrawn;
        let installment = account.vesting_withdraw_rate.min(remaining).min(vesting);

        if installment <= 0 {
            account.vesting_withdraw_rate = 0;
            account.to_withdraw = 0;
            account.withdrawn = 0;
            account.next_vesting_withdrawal = TimePointSec::MAX;
            state.put_account(account);
            continue;
        }

        account.withdrawn += installment;
        let finished = account.withdrawn >= account.to_withdraw;
        let next = if finished {
            TimePointSec::MAX
        } else {
            // Cadence advances from the previous due time, not from `now`
            account
                .next_vesting_withdrawal
                .plus_secs(params.vesting_withdraw_interval_seconds as i64)
        };
        account.next_vesting_withdrawal = next;
        if finished {
            account.vesting_withdraw_rate = 0;
            account.to_withdraw = 0;
            account.withdrawn = 0;
        }
        state.put_account(account);

        let amount = Asset::new(installment, VLS);
        state.adjust_balance(&name, BalanceKind::Vesting, Asset::new(-installment, VLS))?;
        state.adjust_balance(&name, BalanceKind::Liquid, amount)?;

        events.push(ChainEvent::FillVestingWithdraw {
            account: name,
            withdrawn: amount,
            next_withdrawal: next,
        });
    }
    Ok(())
}
