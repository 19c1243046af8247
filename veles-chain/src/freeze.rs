//! Account freeze / inactivity classification
//!
//! A schedule-gated sweep classifies long-dormant dust accounts and freezes
//! them, snapshotting their authority keys. Unfreezing happens only through
//! an authority update (see the account-update evaluator), which restores the
//! snapshot and charges the configured fee.

use crate::error::{Error, Result};
use crate::events::ChainEvent;
use crate::schedule::ChainParams;
use crate::state::{is_system_account, Account, BalanceKind, FrozenAuthority, State};
use veles_protocol::{AccountName, Asset, VLS};

/// Pure classification: should this account be frozen under `params`?
pub fn is_inactive(params: &ChainParams, account: &Account) -> bool {
    if !params.freezing_enabled || is_system_account(&account.name) {
        return false;
    }
    // An account that already proved its keys once is never swept again
    if account.proved_hardfork > 0 {
        return false;
    }
    if account.created >= params.freeze_created_before {
        return false;
    }
    let liquid = account.balance(VLS, BalanceKind::Liquid);
    let vesting = account.balance(VLS, BalanceKind::Vesting);
    liquid.amount < params.freeze_liquid_threshold.amount
        && vesting.amount < params.freeze_vesting_threshold.amount
}

/// Freeze one account: snapshot its keys, clear them, set the flag
pub fn freeze(state: &mut State, name: &AccountName, events: &mut Vec<ChainEvent>) -> Result<()> {
    let mut account = state.account(name)?.clone();
    state.put_frozen_authority(
        name.clone(),
        FrozenAuthority {
            posting_key: account.posting_key.clone(),
            active_key: account.active_key.clone(),
            owner_key: account.owner_key.clone(),
            memo_key: account.memo_key.clone(),
        },
    );
    account.posting_key.clear();
    account.active_key.clear();
    account.owner_key.clear();
    account.memo_key.clear();
    account.frozen = true;
    state.put_account(account);

    events.push(ChainEvent::AccountFreeze {
        account: name.clone(),
        frozen: true,
        fee: Asset::zero(VLS),
    });
    Ok(())
}

/// Restore a frozen account's saved keys and clear the flag.
///
/// The caller (authority-update evaluator) decides when this runs; the sweep
/// itself never unfreezes.
pub fn unfreeze(
    state: &mut State,
    name: &AccountName,
    fee: Asset,
    version: u32,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    let snapshot = state
        .find_frozen_authority(name)
        .ok_or_else(|| Error::MissingObject {
            kind: "frozen authority",
            key: name.to_string(),
        })?
        .clone();

    let mut account = state.account(name)?.clone();
    account.posting_key = snapshot.posting_key;
    account.active_key = snapshot.active_key;
    account.owner_key = snapshot.owner_key;
    account.memo_key = snapshot.memo_key;
    account.frozen = false;
    account.proved_hardfork = version;
    state.put_account(account);
    state.remove_frozen_authority(name);

    if !fee.is_zero() {
        state.adjust_balance(name, BalanceKind::Liquid, Asset::new(-fee.amount, fee.symbol))?;
        let null = AccountName::new(crate::state::NULL_ACCOUNT)?;
        state.adjust_balance(&null, BalanceKind::Liquid, fee)?;
    }

    events.push(ChainEvent::AccountFreeze {
        account: name.clone(),
        frozen: false,
        fee,
    });
    Ok(())
}

/// Maintenance sweep: classify and freeze, deterministic name order
pub fn sweep(state: &mut State, params: &ChainParams, events: &mut Vec<ChainEvent>) -> Result<()> {
    if !params.freezing_enabled {
        return Ok(());
    }
    let candidates: Vec<AccountName> = state
        .accounts()
        .filter(|a| !a.frozen && is_inactive(params, a))
        .map(|a| a.name.clone())
        .collect();
    for name in candidates {
        tracing::debug!(account = %name, "Freezing inactive account");
        freeze(state, &name, events)?;
    }
    Ok(())
}
