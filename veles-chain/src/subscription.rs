//! Paid subscriptions
//!
//! Authors declare recurring-billing offers; subscribers fund them with an
//! up-front transfer whose remainder is held by the engine as prepaid
//! balance. The billing maintenance pass walks subscriber records in
//! next-payment order: it spends prepaid first, debits any shortfall from the
//! subscriber, credits the author, and deactivates records that run out of
//! executions or funds. Deactivated records are retained for audit and query
//! use; only cancel and offer-delete remove them.

use crate::error::{Error, Result};
use crate::evaluator::OpContext;
use crate::events::ChainEvent;
use crate::schedule::{ChainParams, HARDFORK_SUBSCRIPTIONS};
use crate::state::{BalanceKind, InactiveReason, PaidSubscriber, PaidSubscription, State};
use veles_protocol::operations as ops;
use veles_protocol::{AccountName, Asset, TimePointSec};

fn require_enabled(params: &ChainParams) -> Result<()> {
    if !params.subscriptions_enabled {
        return Err(Error::NotActivated("paid subscriptions", HARDFORK_SUBSCRIPTIONS));
    }
    Ok(())
}

/// Debit a subscriber for a billing charge. Returns false (untouched state)
/// when the balance falls short — the billing pass deactivates instead of
/// failing.
fn try_claim_funds(
    state: &mut State,
    account: &AccountName,
    amount: Asset,
    from_tip: bool,
) -> Result<bool> {
    let kind = if from_tip { BalanceKind::Tip } else { BalanceKind::Liquid };
    let available = state.account(account)?.balance(amount.symbol, kind);
    if available < amount {
        return Ok(false);
    }
    state.adjust_balance(account, kind, Asset::new(-amount.amount, amount.symbol))?;
    Ok(true)
}

fn claim_funds(state: &mut State, account: &AccountName, amount: Asset, from_tip: bool) -> Result<()> {
    if !try_claim_funds(state, account, amount, from_tip)? {
        let kind = if from_tip { BalanceKind::Tip } else { BalanceKind::Liquid };
        return Err(Error::InsufficientBalance {
            account: account.clone(),
            required: amount,
            available: state.account(account)?.balance(amount.symbol, kind),
        });
    }
    Ok(())
}

fn pay_funds(state: &mut State, account: &AccountName, amount: Asset, to_tip: bool) -> Result<()> {
    let kind = if to_tip { BalanceKind::Tip } else { BalanceKind::Liquid };
    state.adjust_balance(account, kind, amount)
}

fn refund_prepaid(
    state: &mut State,
    record: &PaidSubscriber,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    if record.prepaid.is_zero() {
        return Ok(());
    }
    pay_funds(state, &record.subscriber, record.prepaid, record.tip_cost)?;
    events.push(ChainEvent::SubscriptionPrepaidReturn {
        subscriber: record.subscriber.clone(),
        author: record.author.clone(),
        oid: record.oid.clone(),
        amount: record.prepaid,
        to_tip: record.tip_cost,
    });
    Ok(())
}

fn deactivate(
    state: &mut State,
    mut record: PaidSubscriber,
    reason: InactiveReason,
) -> Result<()> {
    record.active = false;
    record.inactive_reason = reason;
    record.next_payment = TimePointSec::ZERO;
    let parent_key = (record.author.clone(), record.oid.clone());
    state.put_subscriber(record);

    let mut parent = state.subscription(&parent_key)?.clone();
    parent.active_subscribers -= 1;
    state.put_subscription(parent);
    Ok(())
}

/// Declare a new subscription offer
pub fn apply_subscription_create(
    state: &mut State,
    params: &ChainParams,
    ctx: &OpContext,
    op: &ops::PaidSubscriptionCreate,
) -> Result<()> {
    require_enabled(params)?;

    let key = (op.author.clone(), op.oid.clone());
    if state.find_subscription(&key).is_some() {
        return Err(Error::DuplicateObject {
            kind: "paid subscription",
            key: format!("{}:{}", op.author, op.oid),
        });
    }

    state.put_subscription(PaidSubscription {
        author: op.author.clone(),
        oid: op.oid.clone(),
        cost: op.cost,
        tip_cost: op.tip_cost,
        allow_prepaid: op.allow_prepaid,
        interval: op.interval,
        executions: op.executions,
        created: ctx.now,
        subscribers: 0,
        active_subscribers: 0,
    });
    Ok(())
}

/// Change offer terms.
///
/// Non-prepaid offers cannot change anything but the cost, and doing so
/// deactivates every active subscriber (they must re-subscribe under the new
/// terms). Prepaid offers refresh each subscriber lazily on the next
/// transfer.
pub fn apply_subscription_update(
    state: &mut State,
    params: &ChainParams,
    op: &ops::PaidSubscriptionUpdate,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    require_enabled(params)?;

    let key = (op.author.clone(), op.oid.clone());
    let offer = state.subscription(&key)?.clone();

    if offer.executions == 0 {
        if op.executions != 0 {
            return Err(Error::InvalidState(
                "Cannot set executions on a single-execution subscription".into(),
            ));
        }
    } else if op.executions == 0 {
        return Err(Error::InvalidState(
            "Cannot make a subscription single-execution".into(),
        ));
    }

    let mut inactivated = 0u32;

    if !offer.allow_prepaid {
        if op.tip_cost != offer.tip_cost
            || op.interval != offer.interval
            || op.executions != offer.executions
        {
            return Err(Error::InvalidState(
                "Non-prepaid subscriptions can only change their cost".into(),
            ));
        }

        for sub_key in state.subscribers_of(&key) {
            let mut record = state.subscriber(&sub_key)?.clone();
            if record.active {
                events.push(ChainEvent::SubscriptionInactive {
                    subscriber: record.subscriber.clone(),
                    author: record.author.clone(),
                    oid: record.oid.clone(),
                    reason: InactiveReason::SubscriptionUpdate,
                });
                record.active = false;
                record.inactive_reason = InactiveReason::SubscriptionUpdate;
                record.next_payment = TimePointSec::ZERO;
                inactivated += 1;
            }
            if op.cost.symbol != record.cost.symbol {
                record.prepaid = Asset::zero(op.cost.symbol);
            }
            record.cost = op.cost;
            state.put_subscriber(record);
        }
    }

    let mut offer = offer;
    offer.cost = op.cost;
    offer.tip_cost = op.tip_cost;
    offer.interval = op.interval;
    offer.executions = op.executions;
    offer.active_subscribers -= inactivated;
    state.put_subscription(offer);
    Ok(())
}

/// Withdraw an offer entirely, refunding prepaid balances and removing every
/// subscriber record
pub fn apply_subscription_delete(
    state: &mut State,
    params: &ChainParams,
    op: &ops::PaidSubscriptionDelete,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    require_enabled(params)?;

    let key = (op.author.clone(), op.oid.clone());
    state.subscription(&key)?;

    for sub_key in state.subscribers_of(&key) {
        let record = state.subscriber(&sub_key)?.clone();
        refund_prepaid(state, &record, events)?;
        state.remove_subscriber(&sub_key);
    }
    state.remove_subscription(&key);
    Ok(())
}

/// Subscribe for the first time, prolong an inactive subscription, or top up
/// prepaid funds
pub fn apply_subscription_transfer(
    state: &mut State,
    params: &ChainParams,
    ctx: &OpContext,
    op: &ops::PaidSubscriptionTransfer,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    require_enabled(params)?;

    let offer_key = (op.to.clone(), op.oid.clone());
    let offer = state.subscription(&offer_key)?.clone();

    if offer.tip_cost != op.from_tip {
        return Err(Error::InvalidState(if offer.tip_cost {
            "This subscription is paid from the tip balance".into()
        } else {
            "This subscription is paid from the liquid balance".into()
        }));
    }
    if op.amount.symbol != offer.cost.symbol {
        return Err(Error::InvalidState("Wrong token for this subscription".into()));
    }
    if op.amount < offer.cost {
        return Err(Error::InvalidState("Amount is below the subscription cost".into()));
    }
    if offer.executions != 0 && !offer.allow_prepaid && op.amount != offer.cost {
        return Err(Error::InvalidState(
            "This subscription forbids prepayment; pay exactly the cost".into(),
        ));
    }

    claim_funds(state, &op.from, op.amount, op.from_tip)?;

    let sub_key = (op.to.clone(), op.oid.clone(), op.from.clone());
    let existing = state.find_subscriber(&sub_key).cloned();

    let Some(mut record) = existing else {
        // First subscription: the first execution is paid immediately, the
        // remainder becomes prepaid balance held by the engine.
        let pay_now = if offer.executions == 0 { op.amount } else { offer.cost };
        pay_funds(state, &op.to, pay_now, op.from_tip)?;
        let to_prepaid = op.amount.checked_sub(&pay_now)?;

        let next_payment = if offer.executions > 0 {
            ctx.now.plus_secs(offer.interval as i64)
        } else {
            TimePointSec::ZERO
        };
        state.put_subscriber(PaidSubscriber {
            subscriber: op.from.clone(),
            author: op.to.clone(),
            oid: op.oid.clone(),
            cost: offer.cost,
            tip_cost: offer.tip_cost,
            interval: offer.interval,
            executions: offer.executions,
            executions_left: offer.executions,
            prepaid: to_prepaid,
            next_payment,
            subscribed: ctx.now,
            active: true,
            inactive_reason: InactiveReason::None,
        });

        let rest = if offer.executions == 0 {
            op.amount.checked_sub(&offer.cost)?
        } else {
            Asset::zero(op.amount.symbol)
        };
        events.push(ChainEvent::SubscriptionPayment {
            subscriber: op.from.clone(),
            author: op.to.clone(),
            oid: op.oid.clone(),
            prepaid: Asset::zero(op.amount.symbol),
            amount: offer.cost,
            rest,
            from_tip: op.from_tip,
        });

        let mut offer = offer;
        offer.subscribers += 1;
        offer.active_subscribers += 1;
        state.put_subscription(offer);
        return Ok(());
    };

    if record.active && offer.executions == 0 {
        return Err(Error::InvalidState(
            "A single-execution subscription needs no prolonging".into(),
        ));
    }

    if !offer.allow_prepaid {
        if record.active {
            return Err(Error::InvalidState(
                "This subscription forbids prepayment and is already active".into(),
            ));
        }
        // Re-subscribe under pay-per-term rules: the full amount goes to the
        // author now.
        pay_funds(state, &op.to, op.amount, op.from_tip)?;
        events.push(ChainEvent::SubscriptionPayment {
            subscriber: op.from.clone(),
            author: op.to.clone(),
            oid: op.oid.clone(),
            prepaid: Asset::zero(op.amount.symbol),
            amount: offer.cost,
            rest: op.amount.checked_sub(&offer.cost)?,
            from_tip: op.from_tip,
        });
    } else {
        // Top-up: everything lands in the prepaid balance
        events.push(ChainEvent::SubscriptionPayment {
            subscriber: op.from.clone(),
            author: op.to.clone(),
            oid: op.oid.clone(),
            prepaid: op.amount,
            amount: Asset::zero(op.amount.symbol),
            rest: Asset::zero(op.amount.symbol),
            from_tip: op.from_tip,
        });
    }

    if !record.active {
        let mut offer_obj = state.subscription(&offer_key)?.clone();
        offer_obj.active_subscribers += 1;
        state.put_subscription(offer_obj);
    }

    // A prepaid balance left in a symbol the author no longer charges in is
    // returned rather than silently converted.
    if record.prepaid.amount > 0 && record.prepaid.symbol != offer.cost.symbol {
        refund_prepaid(state, &record, events)?;
        record.prepaid = Asset::zero(offer.cost.symbol);
    }

    if !record.active {
        record.active = true;
        record.inactive_reason = InactiveReason::None;
        record.interval = offer.interval;
        record.executions = offer.executions;
        record.next_payment = if offer.executions > 0 {
            ctx.now.plus_secs(offer.interval as i64)
        } else {
            TimePointSec::ZERO
        };
    }
    if offer.allow_prepaid {
        record.cost = offer.cost;
        record.tip_cost = offer.tip_cost;
        record.interval = offer.interval;
        record.executions = offer.executions;
        if record.prepaid.symbol != offer.cost.symbol {
            record.prepaid = Asset::zero(offer.cost.symbol);
        }
        record.prepaid = record.prepaid.checked_add(&op.amount)?;
    }
    record.executions_left = record.executions;
    state.put_subscriber(record);
    Ok(())
}

/// Cancel a subscription, refunding prepaid funds and removing the record
pub fn apply_subscription_cancel(
    state: &mut State,
    params: &ChainParams,
    op: &ops::PaidSubscriptionCancel,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    require_enabled(params)?;

    let sub_key = (op.author.clone(), op.oid.clone(), op.subscriber.clone());
    let record = state.subscriber(&sub_key)?.clone();

    refund_prepaid(state, &record, events)?;

    let offer_key = (op.author.clone(), op.oid.clone());
    let mut offer = state.subscription(&offer_key)?.clone();
    offer.subscribers -= 1;
    if record.active {
        offer.active_subscribers -= 1;
    }
    state.put_subscription(offer);
    state.remove_subscriber(&sub_key);
    Ok(())
}

/// Maintenance: bill every subscriber record due at `now`.
///
/// Idempotent under replay: each processed record either advances past `now`
/// or parks at epoch zero, so a second pass with the same `now` finds nothing.
pub fn process_paid_subscribers(
    state: &mut State,
    params: &ChainParams,
    now: TimePointSec,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    if !params.subscriptions_enabled {
        return Ok(());
    }

    for sub_key in state.subscribers_due(now) {
        let record = state.subscriber(&sub_key)?.clone();

        if record.executions_left == 0 {
            deactivate(state, record, InactiveReason::ExecutionsDone)?;
            continue;
        }

        let prepaid_part = record.cost.min(&record.prepaid)?;
        let mut shortfall = Asset::zero(record.cost.symbol);
        if prepaid_part < record.cost {
            shortfall = record.cost.checked_sub(&prepaid_part)?;
            if !try_claim_funds(state, &record.subscriber, shortfall, record.tip_cost)? {
                tracing::debug!(
                    subscriber = %record.subscriber,
                    author = %record.author,
                    oid = %record.oid,
                    "Subscription payment failed, deactivating"
                );
                events.push(ChainEvent::SubscriptionPaymentFailure {
                    subscriber: record.subscriber.clone(),
                    author: record.author.clone(),
                    oid: record.oid.clone(),
                });
                deactivate(state, record, InactiveReason::PaymentFailure)?;
                continue;
            }
        }

        // On the final execution any leftover prepaid is folded into the
        // payment instead of stranding with the engine.
        let mut rest = Asset::zero(record.cost.symbol);
        if record.executions_left == 1 && record.prepaid > prepaid_part {
            rest = record.prepaid.checked_sub(&prepaid_part)?;
        }

        let total = prepaid_part.checked_add(&shortfall)?.checked_add(&rest)?;
        pay_funds(state, &record.author, total, record.tip_cost)?;

        events.push(ChainEvent::SubscriptionPayment {
            subscriber: record.subscriber.clone(),
            author: record.author.clone(),
            oid: record.oid.clone(),
            prepaid: prepaid_part,
            amount: shortfall,
            rest,
            from_tip: record.tip_cost,
        });

        let mut record = record;
        record.prepaid = record
            .prepaid
            .checked_sub(&prepaid_part.checked_add(&rest)?)?;
        record.executions_left -= 1;
        record.next_payment = record.next_payment.plus_secs(record.interval as i64);
        state.put_subscriber(record);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Genesis, GenesisAccount};
    use veles_protocol::VLS;

    fn name(s: &str) -> AccountName {
        AccountName::new(s).unwrap()
    }

    fn ctx(now: i64) -> OpContext {
        OpContext {
            now: TimePointSec(now),
            block_num: 1,
            clear_old_worker_votes: true,
        }
    }

    fn setup() -> (State, ChainParams) {
        let state = State::genesis(
            &Genesis {
                accounts: vec![
                    GenesisAccount {
                        name: name("author"),
                        liquid: 0,
                        debt: 0,
                        vesting: 0,
                    },
                    GenesisAccount {
                        name: name("reader"),
                        liquid: 1_000_000,
                        debt: 0,
                        vesting: 0,
                    },
                ],
            },
            TimePointSec(0),
        )
        .unwrap();
        (state, ChainParams::for_version(HARDFORK_SUBSCRIPTIONS))
    }

    const COST: i64 = 100_000;
    const DAY: u32 = 86_400;

    fn create_op(executions: u32, allow_prepaid: bool) -> ops::PaidSubscriptionCreate {
        ops::PaidSubscriptionCreate {
            author: name("author"),
            oid: "gold".into(),
            cost: Asset::new(COST, VLS),
            tip_cost: false,
            allow_prepaid,
            interval: DAY,
            executions,
        }
    }

    fn transfer_op(amount: i64) -> ops::PaidSubscriptionTransfer {
        ops::PaidSubscriptionTransfer {
            from: name("reader"),
            to: name("author"),
            oid: "gold".into(),
            amount: Asset::new(amount, VLS),
            from_tip: false,
        }
    }

    fn liquid(state: &State, who: &str) -> i64 {
        state
            .account(&name(who))
            .unwrap()
            .balance(VLS, BalanceKind::Liquid)
            .amount
    }

    #[test]
    fn test_first_subscribe_pays_first_execution() {
        let (mut state, params) = setup();
        let mut events = Vec::new();
        apply_subscription_create(&mut state, &params, &ctx(0), &create_op(3, true)).unwrap();
        apply_subscription_transfer(&mut state, &params, &ctx(0), &transfer_op(COST * 2), &mut events)
            .unwrap();

        assert_eq!(liquid(&state, "author"), COST);
        assert_eq!(liquid(&state, "reader"), 1_000_000 - COST * 2);

        let sub_key = (name("author"), "gold".to_string(), name("reader"));
        let record = state.subscriber(&sub_key).unwrap();
        assert_eq!(record.prepaid, Asset::new(COST, VLS));
        assert_eq!(record.executions_left, 3);
        assert_eq!(record.next_payment, TimePointSec(DAY as i64));
        assert!(record.active);

        let offer = state.subscription(&(name("author"), "gold".into())).unwrap();
        assert_eq!(offer.subscribers, 1);
        assert_eq!(offer.active_subscribers, 1);
        state.check_conservation().unwrap();
    }

    #[test]
    fn test_billing_prefers_prepaid_then_debits() {
        let (mut state, params) = setup();
        let mut events = Vec::new();
        apply_subscription_create(&mut state, &params, &ctx(0), &create_op(3, true)).unwrap();
        apply_subscription_transfer(&mut state, &params, &ctx(0), &transfer_op(COST * 2), &mut events)
            .unwrap();

        // First billing: fully covered by prepaid
        events.clear();
        process_paid_subscribers(&mut state, &params, TimePointSec(DAY as i64), &mut events)
            .unwrap();
        assert_eq!(liquid(&state, "author"), COST * 2);
        let sub_key = (name("author"), "gold".to_string(), name("reader"));
        let record = state.subscriber(&sub_key).unwrap();
        assert!(record.prepaid.is_zero());
        assert_eq!(record.executions_left, 2);
        assert!(matches!(
            events[0],
            ChainEvent::SubscriptionPayment { ref prepaid, ref amount, .. }
                if prepaid.amount == COST && amount.is_zero()
        ));

        // Second billing: prepaid exhausted, debits the subscriber
        events.clear();
        process_paid_subscribers(&mut state, &params, TimePointSec(2 * DAY as i64), &mut events)
            .unwrap();
        assert_eq!(liquid(&state, "author"), COST * 3);
        assert_eq!(liquid(&state, "reader"), 1_000_000 - COST * 3);
        state.check_conservation().unwrap();
    }

    #[test]
    fn test_billing_failure_deactivates() {
        let (mut state, params) = setup();
        let mut events = Vec::new();
        apply_subscription_create(&mut state, &params, &ctx(0), &create_op(3, true)).unwrap();
        apply_subscription_transfer(&mut state, &params, &ctx(0), &transfer_op(COST), &mut events)
            .unwrap();

        // Drain the reader so the first billing cannot cover the cost
        state
            .adjust_balance(
                &name("reader"),
                BalanceKind::Liquid,
                Asset::new(-liquid(&state, "reader"), VLS),
            )
            .unwrap();
        state
            .adjust_balance(&name("author"), BalanceKind::Liquid, Asset::new(900_000, VLS))
            .unwrap();

        events.clear();
        let author_before = liquid(&state, "author");
        process_paid_subscribers(&mut state, &params, TimePointSec(DAY as i64), &mut events)
            .unwrap();

        assert_eq!(liquid(&state, "author"), author_before);
        let sub_key = (name("author"), "gold".to_string(), name("reader"));
        let record = state.subscriber(&sub_key).unwrap();
        assert!(!record.active);
        assert_eq!(record.inactive_reason, InactiveReason::PaymentFailure);
        assert_eq!(record.next_payment, TimePointSec::ZERO);
        assert!(events
            .iter()
            .any(|e| matches!(e, ChainEvent::SubscriptionPaymentFailure { .. })));
        assert_eq!(
            state
                .subscription(&(name("author"), "gold".into()))
                .unwrap()
                .active_subscribers,
            0
        );
        state.check_conservation().unwrap();
    }

    #[test]
    fn test_final_execution_folds_rest() {
        let (mut state, params) = setup();
        let mut events = Vec::new();
        apply_subscription_create(&mut state, &params, &ctx(0), &create_op(1, true)).unwrap();
        // cost + 1.5 cost prepaid; single execution left
        apply_subscription_transfer(
            &mut state,
            &params,
            &ctx(0),
            &transfer_op(COST + COST + COST / 2),
            &mut events,
        )
        .unwrap();

        events.clear();
        process_paid_subscribers(&mut state, &params, TimePointSec(DAY as i64), &mut events)
            .unwrap();

        // Final execution: cost from prepaid, plus the half-cost remainder
        assert_eq!(liquid(&state, "author"), COST + COST + COST / 2);
        let sub_key = (name("author"), "gold".to_string(), name("reader"));
        let record = state.subscriber(&sub_key).unwrap();
        assert!(record.prepaid.is_zero());
        assert_eq!(record.executions_left, 0);
        assert!(matches!(
            events[0],
            ChainEvent::SubscriptionPayment { ref rest, .. } if rest.amount == COST / 2
        ));

        // Next due pass retires the record
        process_paid_subscribers(
            &mut state,
            &params,
            TimePointSec(2 * DAY as i64),
            &mut events,
        )
        .unwrap();
        let record = state.subscriber(&sub_key).unwrap();
        assert!(!record.active);
        assert_eq!(record.inactive_reason, InactiveReason::ExecutionsDone);
        state.check_conservation().unwrap();
    }

    #[test]
    fn test_billing_idempotent_under_replay() {
        let (mut state, params) = setup();
        let mut events = Vec::new();
        apply_subscription_create(&mut state, &params, &ctx(0), &create_op(3, true)).unwrap();
        apply_subscription_transfer(&mut state, &params, &ctx(0), &transfer_op(COST * 3), &mut events)
            .unwrap();

        process_paid_subscribers(&mut state, &params, TimePointSec(DAY as i64), &mut events)
            .unwrap();
        let digest = state.digest().unwrap();

        let mut replay_events = Vec::new();
        process_paid_subscribers(&mut state, &params, TimePointSec(DAY as i64), &mut replay_events)
            .unwrap();
        assert_eq!(state.digest().unwrap(), digest);
        assert!(replay_events.is_empty());
    }

    #[test]
    fn test_cancel_refunds_prepaid() {
        let (mut state, params) = setup();
        let mut events = Vec::new();
        apply_subscription_create(&mut state, &params, &ctx(0), &create_op(3, true)).unwrap();
        apply_subscription_transfer(&mut state, &params, &ctx(0), &transfer_op(COST * 3), &mut events)
            .unwrap();

        events.clear();
        apply_subscription_cancel(
            &mut state,
            &params,
            &ops::PaidSubscriptionCancel {
                subscriber: name("reader"),
                author: name("author"),
                oid: "gold".into(),
            },
            &mut events,
        )
        .unwrap();

        // First execution went to the author; the 2-cost prepaid came back
        assert_eq!(liquid(&state, "reader"), 1_000_000 - COST);
        let sub_key = (name("author"), "gold".to_string(), name("reader"));
        assert!(state.find_subscriber(&sub_key).is_none());
        let offer = state.subscription(&(name("author"), "gold".into())).unwrap();
        assert_eq!(offer.subscribers, 0);
        assert!(events
            .iter()
            .any(|e| matches!(e, ChainEvent::SubscriptionPrepaidReturn { .. })));
        state.check_conservation().unwrap();
    }

    #[test]
    fn test_update_non_prepaid_deactivates_subscribers() {
        let (mut state, params) = setup();
        let mut events = Vec::new();
        apply_subscription_create(&mut state, &params, &ctx(0), &create_op(3, false)).unwrap();
        apply_subscription_transfer(&mut state, &params, &ctx(0), &transfer_op(COST), &mut events)
            .unwrap();

        // Term changes beyond cost are rejected for non-prepaid offers
        let mut bad = ops::PaidSubscriptionUpdate {
            author: name("author"),
            oid: "gold".into(),
            cost: Asset::new(COST, VLS),
            tip_cost: false,
            interval: DAY * 2,
            executions: 3,
        };
        assert!(apply_subscription_update(&mut state, &params, &bad, &mut events).is_err());

        bad.interval = DAY;
        bad.cost = Asset::new(COST * 2, VLS);
        events.clear();
        apply_subscription_update(&mut state, &params, &bad, &mut events).unwrap();

        let sub_key = (name("author"), "gold".to_string(), name("reader"));
        let record = state.subscriber(&sub_key).unwrap();
        assert!(!record.active);
        assert_eq!(record.inactive_reason, InactiveReason::SubscriptionUpdate);
        assert_eq!(record.cost, Asset::new(COST * 2, VLS));
        assert!(events
            .iter()
            .any(|e| matches!(e, ChainEvent::SubscriptionInactive { .. })));
        assert_eq!(
            state
                .subscription(&(name("author"), "gold".into()))
                .unwrap()
                .active_subscribers,
            0
        );
    }

    #[test]
    fn test_delete_refunds_and_removes() {
        let (mut state, params) = setup();
        let mut events = Vec::new();
        apply_subscription_create(&mut state, &params, &ctx(0), &create_op(3, true)).unwrap();
        apply_subscription_transfer(&mut state, &params, &ctx(0), &transfer_op(COST * 2), &mut events)
            .unwrap();

        apply_subscription_delete(
            &mut state,
            &params,
            &ops::PaidSubscriptionDelete {
                author: name("author"),
                oid: "gold".into(),
            },
            &mut events,
        )
        .unwrap();

        assert!(state.find_subscription(&(name("author"), "gold".into())).is_none());
        let sub_key = (name("author"), "gold".to_string(), name("reader"));
        assert!(state.find_subscriber(&sub_key).is_none());
        assert_eq!(liquid(&state, "reader"), 1_000_000 - COST);
        state.check_conservation().unwrap();
    }

    #[test]
    fn test_not_activated_before_hardfork() {
        let (mut state, _) = setup();
        let v3 = ChainParams::for_version(3);
        let err =
            apply_subscription_create(&mut state, &v3, &ctx(0), &create_op(3, true)).unwrap_err();
        assert!(matches!(err, Error::NotActivated(_, _)));
    }
}
