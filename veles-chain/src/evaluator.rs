//! Operation evaluators
//!
//! One evaluator per operation kind, reached through a single dispatch over
//! the closed sum type. Evaluators validate preconditions against current
//! state, consult the parameter bundle selected for this block, and mutate
//! the state tables. Any error aborts the whole block (the caller discards
//! the working state), so evaluators never need to undo partial work as long
//! as they validate before the first mutation of a multi-step change.

use crate::battery::{charge, BatteryKind};
use crate::error::{Error, Result};
use crate::events::ChainEvent;
use crate::schedule::ChainParams;
use crate::state::{BalanceKind, CommentVote, Post, SavingsWithdraw, State, NULL_ACCOUNT};
use crate::{freeze, market, reputation, subscription, worker};
use veles_protocol::operations as ops;
use veles_protocol::{AccountName, Asset, Operation, TimePointSec, PERCENT_100, VLS};

/// Per-block evaluation context
#[derive(Debug, Clone)]
pub struct OpContext {
    /// Block timestamp
    pub now: TimePointSec,
    /// Block height
    pub block_num: u64,
    /// Node config: purge worker votes when a request closes
    pub clear_old_worker_votes: bool,
}

/// Apply one operation. Errors abort the containing block.
pub fn apply_operation(
    state: &mut State,
    params: &ChainParams,
    ctx: &OpContext,
    op: &Operation,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    op.validate()?;

    let signer = state.account(op.signer())?;
    if signer.frozen && !matches!(op, Operation::AccountUpdate(_)) {
        return Err(Error::InvalidState(format!(
            "Account {} is frozen; only an authority update is accepted",
            op.signer()
        )));
    }

    match op {
        Operation::AccountCreate(op) => apply_account_create(state, params, ctx, op),
        Operation::AccountUpdate(op) => apply_account_update(state, params, op, events),
        Operation::Transfer(op) => apply_transfer(state, op),
        Operation::TransferToVesting(op) => apply_transfer_to_vesting(state, op),
        Operation::WithdrawVesting(op) => apply_withdraw_vesting(state, params, ctx, op),
        Operation::TransferToSavings(op) => apply_transfer_to_savings(state, op),
        Operation::TransferFromSavings(op) => apply_transfer_from_savings(state, params, ctx, op),
        Operation::CancelTransferFromSavings(op) => apply_cancel_transfer_from_savings(state, op),
        Operation::TransferToTip(op) => apply_transfer_to_tip(state, op),
        Operation::Comment(op) => apply_comment(state, params, ctx, op, events),
        Operation::Vote(op) => apply_vote(state, params, ctx, op, events),
        Operation::WorkerRequest(op) => worker::apply_worker_request(state, params, ctx, op),
        Operation::WorkerRequestDelete(op) => {
            worker::apply_worker_request_delete(state, params, ctx, op, events)
        }
        Operation::WorkerRequestVote(op) => {
            worker::apply_worker_request_vote(state, params, op)
        }
        Operation::PaidSubscriptionCreate(op) => {
            subscription::apply_subscription_create(state, params, ctx, op)
        }
        Operation::PaidSubscriptionUpdate(op) => {
            subscription::apply_subscription_update(state, params, op, events)
        }
        Operation::PaidSubscriptionDelete(op) => {
            subscription::apply_subscription_delete(state, params, op, events)
        }
        Operation::PaidSubscriptionTransfer(op) => {
            subscription::apply_subscription_transfer(state, params, ctx, op, events)
        }
        Operation::PaidSubscriptionCancel(op) => {
            subscription::apply_subscription_cancel(state, params, op, events)
        }
        Operation::LimitOrderCreate(op) => market::apply_order_create(state, ctx, op, events),
        Operation::LimitOrderCancel(op) => market::apply_order_cancel(state, op, events),
    }
}

/// Persist a battery charge: store the new battery state on the account and
/// collect the fee, if any, from its tip balance into the null account.
pub(crate) fn settle_battery(
    state: &mut State,
    name: &AccountName,
    kind: BatteryKind,
    outcome: crate::battery::BatteryCharge,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    if let Some(fee) = outcome.fee {
        let available = state.account(name)?.balance(fee.symbol, BalanceKind::Tip);
        if available < fee {
            return Err(Error::InsufficientBalance {
                account: name.clone(),
                required: fee,
                available,
            });
        }
        state.adjust_balance(name, BalanceKind::Tip, Asset::new(-fee.amount, fee.symbol))?;
        let null = AccountName::new(NULL_ACCOUNT)?;
        state.adjust_balance(&null, BalanceKind::Tip, fee)?;
        events.push(ChainEvent::UnlimitCost {
            account: name.clone(),
            fee,
            kind,
        });
    }

    let mut account = state.account(name)?.clone();
    account.batteries.insert(kind, outcome.state);
    state.put_account(account);
    Ok(())
}

fn apply_account_create(
    state: &mut State,
    params: &ChainParams,
    ctx: &OpContext,
    op: &ops::AccountCreate,
) -> Result<()> {
    if op.fee.amount < params.account_creation_fee.amount {
        return Err(Error::InvalidState(format!(
            "Account creation fee {} is below the required {}",
            op.fee, params.account_creation_fee
        )));
    }
    state.adjust_balance(
        &op.creator,
        BalanceKind::Liquid,
        Asset::new(-op.fee.amount, op.fee.symbol),
    )?;
    state.create_account(op.new_account_name.clone(), ctx.now, op.memo_key.clone())?;
    state.adjust_balance(&op.new_account_name, BalanceKind::Vesting, op.fee)?;
    Ok(())
}

fn apply_account_update(
    state: &mut State,
    params: &ChainParams,
    op: &ops::AccountUpdate,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    if state.account(&op.account)?.frozen {
        freeze::unfreeze(state, &op.account, params.unfreeze_fee, params.version, events)?;
    }

    let mut account = state.account(&op.account)?.clone();
    if let Some(key) = &op.posting_key {
        account.posting_key = key.clone();
    }
    if let Some(key) = &op.active_key {
        account.active_key = key.clone();
    }
    if let Some(key) = &op.owner_key {
        account.owner_key = key.clone();
    }
    if let Some(key) = &op.memo_key {
        account.memo_key = key.clone();
    }
    state.put_account(account);
    Ok(())
}

fn apply_transfer(state: &mut State, op: &ops::Transfer) -> Result<()> {
    state.account(&op.to)?;
    state.adjust_balance(
        &op.from,
        BalanceKind::Liquid,
        Asset::new(-op.amount.amount, op.amount.symbol),
    )?;
    state.adjust_balance(&op.to, BalanceKind::Liquid, op.amount)?;
    Ok(())
}

fn apply_transfer_to_vesting(state: &mut State, op: &ops::TransferToVesting) -> Result<()> {
    state.account(&op.to)?;
    state.adjust_balance(
        &op.from,
        BalanceKind::Liquid,
        Asset::new(-op.amount.amount, op.amount.symbol),
    )?;
    state.adjust_balance(&op.to, BalanceKind::Vesting, op.amount)?;
    Ok(())
}

fn apply_withdraw_vesting(
    state: &mut State,
    params: &ChainParams,
    ctx: &OpContext,
    op: &ops::WithdrawVesting,
) -> Result<()> {
    let mut account = state.account(&op.account)?.clone();

    if op.amount.is_zero() {
        account.vesting_withdraw_rate = 0;
        account.to_withdraw = 0;
        account.withdrawn = 0;
        account.next_vesting_withdrawal = TimePointSec::MAX;
        state.put_account(account);
        return Ok(());
    }

    let vesting = account.balance(VLS, BalanceKind::Vesting);
    if vesting.amount < op.amount.amount {
        return Err(Error::InsufficientBalance {
            account: op.account.clone(),
            required: op.amount,
            available: vesting,
        });
    }

    let rate = (op.amount.amount / params.vesting_withdraw_intervals as i64).max(1);
    account.vesting_withdraw_rate = rate;
    account.to_withdraw = op.amount.amount;
    account.withdrawn = 0;
    account.next_vesting_withdrawal =
        ctx.now.plus_secs(params.vesting_withdraw_interval_seconds as i64);
    state.put_account(account);
    Ok(())
}

fn apply_transfer_to_savings(state: &mut State, op: &ops::TransferToSavings) -> Result<()> {
    state.account(&op.to)?;
    state.adjust_balance(
        &op.from,
        BalanceKind::Liquid,
        Asset::new(-op.amount.amount, op.amount.symbol),
    )?;
    state.adjust_balance(&op.to, BalanceKind::Savings, op.amount)?;
    Ok(())
}

fn apply_transfer_from_savings(
    state: &mut State,
    params: &ChainParams,
    ctx: &OpContext,
    op: &ops::TransferFromSavings,
) -> Result<()> {
    state.account(&op.to)?;
    let key = (op.from.clone(), op.request_id);
    if state.find_savings_withdraw(&key).is_some() {
        return Err(Error::DuplicateObject {
            kind: "savings withdrawal",
            key: format!("{}:{}", op.from, op.request_id),
        });
    }
    state.adjust_balance(
        &op.from,
        BalanceKind::Savings,
        Asset::new(-op.amount.amount, op.amount.symbol),
    )?;
    state.put_savings_withdraw(SavingsWithdraw {
        from: op.from.clone(),
        request_id: op.request_id,
        to: op.to.clone(),
        amount: op.amount,
        memo: op.memo.clone(),
        complete: ctx.now.plus_secs(params.savings_withdraw_time_seconds as i64),
    });
    Ok(())
}

fn apply_cancel_transfer_from_savings(
    state: &mut State,
    op: &ops::CancelTransferFromSavings,
) -> Result<()> {
    let key = (op.from.clone(), op.request_id);
    let withdraw = state.savings_withdraw(&key)?.clone();
    state.adjust_balance(&op.from, BalanceKind::Savings, withdraw.amount)?;
    state.remove_savings_withdraw(&key);
    Ok(())
}

fn apply_transfer_to_tip(state: &mut State, op: &ops::TransferToTip) -> Result<()> {
    state.account(&op.to)?;
    state.adjust_balance(
        &op.from,
        BalanceKind::Liquid,
        Asset::new(-op.amount.amount, op.amount.symbol),
    )?;
    state.adjust_balance(&op.to, BalanceKind::Tip, op.amount)?;
    Ok(())
}

fn apply_comment(
    state: &mut State,
    params: &ChainParams,
    ctx: &OpContext,
    op: &ops::Comment,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    let key = (op.author.clone(), op.permlink.clone());

    if state.find_post(&key).is_some() {
        // Edits are not metered
        let mut post = state.post(&key)?.clone();
        post.last_update = ctx.now;
        state.put_post(post);
        return Ok(());
    }

    let parent = match &op.parent {
        Some(parent_key) => {
            state.post(parent_key)?;
            Some(parent_key.clone())
        }
        None => None,
    };

    let kind = if parent.is_none() {
        BatteryKind::Post
    } else {
        BatteryKind::Comment
    };
    let battery = state.account(&op.author)?.batteries.get(&kind).copied();
    let outcome = charge(params, kind, battery.as_ref(), ctx.now, false)?;
    settle_battery(state, &op.author, kind, outcome, events)?;

    state.put_post(Post {
        author: op.author.clone(),
        permlink: op.permlink.clone(),
        parent,
        created: ctx.now,
        last_update: ctx.now,
        has_worker_request: false,
    });
    Ok(())
}

fn apply_vote(
    state: &mut State,
    params: &ChainParams,
    ctx: &OpContext,
    op: &ops::Vote,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    let post_key = (op.author.clone(), op.permlink.clone());
    state.post(&post_key)?;

    let existing = state.find_comment_vote(&post_key, &op.voter).cloned();
    if let Some(prior) = &existing {
        if prior.weight == op.weight {
            return Err(Error::InvalidState(
                "Vote with this weight already exists".into(),
            ));
        }
    } else if op.weight == 0 {
        return Err(Error::InvalidState("No vote to remove".into()));
    }

    let battery = state
        .account(&op.voter)?
        .batteries
        .get(&BatteryKind::Vote)
        .copied();
    let outcome = charge(params, BatteryKind::Vote, battery.as_ref(), ctx.now, op.weight < 0)?;
    settle_battery(state, &op.voter, BatteryKind::Vote, outcome, events)?;

    if let Some(prior) = &existing {
        reputation::unvote_reputation(state, &op.voter, &op.author, prior.rshares, op.weight, events)?;
    }

    let stake = state.account(&op.voter)?.balance(VLS, BalanceKind::Vesting).amount;
    let rshares = ((stake as i128) * (op.weight as i128) / (PERCENT_100 as i128)) as i64;

    if op.weight != 0 {
        reputation::vote_reputation(state, &op.voter, &op.author, rshares, op.weight, events)?;
    }

    state.put_comment_vote(
        post_key,
        op.voter.clone(),
        CommentVote {
            weight: op.weight,
            rshares,
            last_update: ctx.now,
        },
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::HARDFORK_PAY_TO_SKIP;
    use crate::state::{Genesis, GenesisAccount};

    fn name(s: &str) -> AccountName {
        AccountName::new(s).unwrap()
    }

    fn setup() -> (State, ChainParams, OpContext) {
        let state = State::genesis(
            &Genesis {
                accounts: vec![
                    GenesisAccount {
                        name: name("alice"),
                        liquid: 1_000_000,
                        debt: 500_000,
                        vesting: 1_000_000,
                    },
                    GenesisAccount {
                        name: name("bob"),
                        liquid: 1_000_000,
                        debt: 0,
                        vesting: 64_000,
                    },
                ],
            },
            TimePointSec(1_000),
        )
        .unwrap();
        let params = ChainParams::for_version(HARDFORK_PAY_TO_SKIP);
        let ctx = OpContext {
            now: TimePointSec(2_000),
            block_num: 10,
            clear_old_worker_votes: true,
        };
        (state, params, ctx)
    }

    #[test]
    fn test_transfer_moves_liquid() {
        let (mut state, params, ctx) = setup();
        let op = Operation::Transfer(ops::Transfer {
            from: name("alice"),
            to: name("bob"),
            amount: Asset::new(250_000, VLS),
            memo: "rent".into(),
        });
        apply_operation(&mut state, &params, &ctx, &op, &mut Vec::new()).unwrap();
        assert_eq!(
            state.account(&name("alice")).unwrap().balance(VLS, BalanceKind::Liquid).amount,
            750_000
        );
        assert_eq!(
            state.account(&name("bob")).unwrap().balance(VLS, BalanceKind::Liquid).amount,
            1_250_000
        );
        state.check_conservation().unwrap();
    }

    #[test]
    fn test_transfer_insufficient_balance() {
        let (mut state, params, ctx) = setup();
        let op = Operation::Transfer(ops::Transfer {
            from: name("bob"),
            to: name("alice"),
            amount: Asset::new(2_000_000, VLS),
            memo: String::new(),
        });
        let err = apply_operation(&mut state, &params, &ctx, &op, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::InsufficientBalance { .. }));
    }

    #[test]
    fn test_account_create_grants_vesting() {
        let (mut state, params, ctx) = setup();
        let op = Operation::AccountCreate(ops::AccountCreate {
            creator: name("alice"),
            new_account_name: name("carol"),
            fee: params.account_creation_fee,
            memo_key: "CAROL-MEMO".into(),
        });
        apply_operation(&mut state, &params, &ctx, &op, &mut Vec::new()).unwrap();
        let carol = state.account(&name("carol")).unwrap();
        assert_eq!(
            carol.balance(VLS, BalanceKind::Vesting),
            params.account_creation_fee
        );
        assert_eq!(carol.created, ctx.now);
        state.check_conservation().unwrap();
    }

    #[test]
    fn test_savings_round_trip() {
        let (mut state, params, ctx) = setup();
        let deposit = Operation::TransferToSavings(ops::TransferToSavings {
            from: name("alice"),
            to: name("alice"),
            amount: Asset::new(100_000, VLS),
            memo: String::new(),
        });
        apply_operation(&mut state, &params, &ctx, &deposit, &mut Vec::new()).unwrap();

        let withdraw = Operation::TransferFromSavings(ops::TransferFromSavings {
            from: name("alice"),
            request_id: 1,
            to: name("alice"),
            amount: Asset::new(100_000, VLS),
            memo: String::new(),
        });
        apply_operation(&mut state, &params, &ctx, &withdraw, &mut Vec::new()).unwrap();
        // Funds are in flight, not in any category
        let alice = state.account(&name("alice")).unwrap();
        assert_eq!(alice.balance(VLS, BalanceKind::Savings).amount, 0);
        state.check_conservation().unwrap();

        // Duplicate request ids are rejected
        let err =
            apply_operation(&mut state, &params, &ctx, &withdraw, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, Error::DuplicateObject { .. }));

        let cancel = Operation::CancelTransferFromSavings(ops::CancelTransferFromSavings {
            from: name("alice"),
            request_id: 1,
        });
        apply_operation(&mut state, &params, &ctx, &cancel, &mut Vec::new()).unwrap();
        assert_eq!(
            state.account(&name("alice")).unwrap().balance(VLS, BalanceKind::Savings).amount,
            100_000
        );
        state.check_conservation().unwrap();
    }

    #[test]
    fn test_vote_updates_reputation_and_battery() {
        let (mut state, params, ctx) = setup();
        let post = Operation::Comment(ops::Comment {
            parent: None,
            author: name("alice"),
            permlink: "hello".into(),
            body: "hi".into(),
            json_metadata: "{}".into(),
        });
        apply_operation(&mut state, &params, &ctx, &post, &mut Vec::new()).unwrap();

        let mut events = Vec::new();
        let vote = Operation::Vote(ops::Vote {
            voter: name("bob"),
            author: name("alice"),
            permlink: "hello".into(),
            weight: PERCENT_100,
        });
        apply_operation(&mut state, &params, &ctx, &vote, &mut events).unwrap();

        // rshares = bob's vesting at full weight; delta = rshares >> 6
        assert_eq!(state.account(&name("alice")).unwrap().reputation, 64_000 >> 6);
        assert!(state
            .account(&name("bob"))
            .unwrap()
            .batteries
            .contains_key(&BatteryKind::Vote));
        assert!(events
            .iter()
            .any(|e| matches!(e, ChainEvent::AccountReputation { .. })));

        // Same weight again is rejected
        let err = apply_operation(&mut state, &params, &ctx, &vote, &mut events).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_frozen_account_only_updates_authority() {
        let (mut state, params, ctx) = setup();
        let mut events = Vec::new();
        freeze::freeze(&mut state, &name("bob"), &mut events).unwrap();

        let transfer = Operation::Transfer(ops::Transfer {
            from: name("bob"),
            to: name("alice"),
            amount: Asset::new(1_000, VLS),
            memo: String::new(),
        });
        let err = apply_operation(&mut state, &params, &ctx, &transfer, &mut events).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        let update = Operation::AccountUpdate(ops::AccountUpdate {
            account: name("bob"),
            posting_key: Some("NEW-POSTING".into()),
            active_key: None,
            owner_key: None,
            memo_key: None,
        });
        apply_operation(&mut state, &params, &ctx, &update, &mut events).unwrap();
        let bob = state.account(&name("bob")).unwrap();
        assert!(!bob.frozen);
        assert_eq!(bob.posting_key, "NEW-POSTING");
    }
}
