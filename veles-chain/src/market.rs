//! Limit-order escrow
//!
//! Orders move liquid funds into the market-escrow balance category and emit
//! create/delete events for the read side. Matching happens in an external
//! priced exchange; this core only guards the escrow: cancel and expiry
//! release it back to the liquid balance.

use crate::error::{Error, Result};
use crate::evaluator::OpContext;
use crate::events::ChainEvent;
use crate::state::{BalanceKind, LimitOrder, State};
use veles_protocol::operations as ops;
use veles_protocol::{Asset, TimePointSec};

/// Place an order, escrowing the sell amount
pub fn apply_order_create(
    state: &mut State,
    ctx: &OpContext,
    op: &ops::LimitOrderCreate,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    if op.expiration <= ctx.now {
        return Err(Error::InvalidState("Order expiration is in the past".into()));
    }
    let key = (op.owner.clone(), op.order_id);
    if state.find_order(&key).is_some() {
        return Err(Error::DuplicateObject {
            kind: "limit order",
            key: format!("{}:{}", op.owner, op.order_id),
        });
    }

    state.adjust_balance(
        &op.owner,
        BalanceKind::Liquid,
        Asset::new(-op.amount_to_sell.amount, op.amount_to_sell.symbol),
    )?;
    state.adjust_balance(&op.owner, BalanceKind::Escrow, op.amount_to_sell)?;

    state.put_order(LimitOrder {
        owner: op.owner.clone(),
        order_id: op.order_id,
        created: ctx.now,
        expiration: op.expiration,
        amount_to_sell: op.amount_to_sell,
        min_to_receive: op.min_to_receive,
    });

    events.push(ChainEvent::OrderCreated {
        owner: op.owner.clone(),
        order_id: op.order_id,
        amount_to_sell: op.amount_to_sell,
        min_to_receive: op.min_to_receive,
    });
    Ok(())
}

fn release(state: &mut State, order: &LimitOrder, events: &mut Vec<ChainEvent>) -> Result<()> {
    state.adjust_balance(
        &order.owner,
        BalanceKind::Escrow,
        Asset::new(-order.amount_to_sell.amount, order.amount_to_sell.symbol),
    )?;
    state.adjust_balance(&order.owner, BalanceKind::Liquid, order.amount_to_sell)?;
    state.remove_order(&(order.owner.clone(), order.order_id));

    events.push(ChainEvent::OrderDeleted {
        owner: order.owner.clone(),
        order_id: order.order_id,
        refunded: order.amount_to_sell,
    });
    Ok(())
}

/// Cancel an open order, releasing its escrow
pub fn apply_order_cancel(
    state: &mut State,
    op: &ops::LimitOrderCancel,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    let order = state.order(&(op.owner.clone(), op.order_id))?.clone();
    release(state, &order, events)
}

/// Maintenance: release every order whose expiration has passed
pub fn expire_orders(
    state: &mut State,
    now: TimePointSec,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    for key in state.orders_expired(now) {
        let order = state.order(&key)?.clone();
        tracing::debug!(owner = %order.owner, order_id = order.order_id, "Expiring limit order");
        release(state, &order, events)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Genesis, GenesisAccount};
    use veles_protocol::{AccountName, VBD, VLS};

    fn name(s: &str) -> AccountName {
        AccountName::new(s).unwrap()
    }

    fn setup() -> State {
        State::genesis(
            &Genesis {
                accounts: vec![GenesisAccount {
                    name: name("trader"),
                    liquid: 1_000_000,
                    debt: 0,
                    vesting: 0,
                }],
            },
            TimePointSec(0),
        )
        .unwrap()
    }

    fn ctx() -> OpContext {
        OpContext {
            now: TimePointSec(100),
            block_num: 1,
            clear_old_worker_votes: true,
        }
    }

    fn create_op(order_id: u32, expiration: i64) -> ops::LimitOrderCreate {
        ops::LimitOrderCreate {
            owner: name("trader"),
            order_id,
            amount_to_sell: Asset::new(300_000, VLS),
            min_to_receive: Asset::new(100_000, VBD),
            expiration: TimePointSec(expiration),
        }
    }

    #[test]
    fn test_create_escrows_funds() {
        let mut state = setup();
        let mut events = Vec::new();
        apply_order_create(&mut state, &ctx(), &create_op(1, 10_000), &mut events).unwrap();

        let trader = state.account(&name("trader")).unwrap();
        assert_eq!(trader.balance(VLS, BalanceKind::Liquid).amount, 700_000);
        assert_eq!(trader.balance(VLS, BalanceKind::Escrow).amount, 300_000);
        assert!(matches!(events[0], ChainEvent::OrderCreated { .. }));
        state.check_conservation().unwrap();

        // Duplicate order id is rejected
        let err =
            apply_order_create(&mut state, &ctx(), &create_op(1, 10_000), &mut events).unwrap_err();
        assert!(matches!(err, Error::DuplicateObject { .. }));
    }

    #[test]
    fn test_cancel_releases_escrow() {
        let mut state = setup();
        let mut events = Vec::new();
        apply_order_create(&mut state, &ctx(), &create_op(1, 10_000), &mut events).unwrap();
        apply_order_cancel(
            &mut state,
            &ops::LimitOrderCancel {
                owner: name("trader"),
                order_id: 1,
            },
            &mut events,
        )
        .unwrap();

        let trader = state.account(&name("trader")).unwrap();
        assert_eq!(trader.balance(VLS, BalanceKind::Liquid).amount, 1_000_000);
        assert_eq!(trader.balance(VLS, BalanceKind::Escrow).amount, 0);
        assert!(state.find_order(&(name("trader"), 1)).is_none());
        state.check_conservation().unwrap();
    }

    #[test]
    fn test_expiry_sweep() {
        let mut state = setup();
        let mut events = Vec::new();
        apply_order_create(&mut state, &ctx(), &create_op(1, 1_000), &mut events).unwrap();
        apply_order_create(&mut state, &ctx(), &create_op(2, 5_000), &mut events).unwrap();

        events.clear();
        expire_orders(&mut state, TimePointSec(1_000), &mut events).unwrap();
        assert!(state.find_order(&(name("trader"), 1)).is_none());
        assert!(state.find_order(&(name("trader"), 2)).is_some());
        assert_eq!(events.len(), 1);

        let trader = state.account(&name("trader")).unwrap();
        assert_eq!(trader.balance(VLS, BalanceKind::Escrow).amount, 300_000);
        state.check_conservation().unwrap();
    }
}
