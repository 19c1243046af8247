//! Metered-action batteries
//!
//! Each account carries one battery per metered action kind. Capacity is
//! measured in window-minutes: it regenerates one unit per elapsed whole
//! minute up to the window bound, and each action consumes
//! `window / actions_per_window` units. An action whose consumption cannot be
//! covered is either rejected or, once the pay-to-skip hardfork is live,
//! charged `unlimit_operation_cost` from the tip balance (plus a surcharge
//! for negative votes once that hardfork is live).
//!
//! [`charge`] is side-effect free: it returns the would-be battery state and
//! fee, and the evaluator persists them only if the operation succeeds.

use crate::error::{Error, Result};
use crate::schedule::ChainParams;
use serde::{Deserialize, Serialize};
use veles_protocol::{Asset, TimePointSec};

/// Metered action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BatteryKind {
    /// Root posts
    Post,
    /// Replies
    Comment,
    /// Post votes
    Vote,
}

impl BatteryKind {
    /// Human-readable action label for events and errors
    pub fn label(&self) -> &'static str {
        match self {
            BatteryKind::Post => "post",
            BatteryKind::Comment => "comment",
            BatteryKind::Vote => "vote",
        }
    }
}

/// Per-account, per-kind battery state. Created lazily on the first metered
/// action of that kind; never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryState {
    /// Time of the last metered action of this kind
    pub last_action: TimePointSec,
    /// Remaining capacity, window-minutes
    pub capacity: u16,
}

/// Outcome of [`charge`]
#[derive(Debug, Clone, PartialEq)]
pub struct BatteryCharge {
    /// State to persist if the action succeeds
    pub state: BatteryState,
    /// Fee to collect from the tip balance; `None` means the action is free
    pub fee: Option<Asset>,
}

fn window_of(params: &ChainParams, kind: BatteryKind) -> (u16, u16) {
    match kind {
        BatteryKind::Post => (params.posts_window, params.posts_per_window),
        BatteryKind::Comment => (params.comments_window, params.comments_per_window),
        BatteryKind::Vote => (params.votes_window, params.votes_per_window),
    }
}

/// Compute the cost of one metered action at `now`.
///
/// `negative_vote` selects the downvote surcharge where the schedule allows
/// it. Fails with `RateLimited` when the allowance is exhausted and no
/// pay-to-skip path is active.
pub fn charge(
    params: &ChainParams,
    kind: BatteryKind,
    current: Option<&BatteryState>,
    now: TimePointSec,
    negative_vote: bool,
) -> Result<BatteryCharge> {
    let (window, per_window) = window_of(params, kind);
    let consumption = window / per_window;

    // Lazily-created batteries start with a full window
    let (last_action, capacity) = match current {
        Some(st) => (st.last_action, st.capacity),
        None => (TimePointSec::ZERO, window),
    };

    let elapsed_minutes = if current.is_some() {
        now.secs_since(last_action) / 60
    } else {
        0
    };
    let regenerated = (window as i64).min(elapsed_minutes) as u16;
    let current_capacity = window.min(capacity.saturating_add(regenerated));

    if current_capacity + 1 <= consumption {
        if !params.pay_to_skip_limit {
            return Err(Error::RateLimited(format!(
                "Account may only {} {} times in {} minutes",
                kind.label(),
                per_window,
                window
            )));
        }
        let mut fee = params.unlimit_operation_cost;
        if negative_vote && params.downvote_surcharge {
            fee = fee.checked_add(&params.downvote_extra_cost)?;
        }
        return Ok(BatteryCharge {
            state: BatteryState {
                last_action: now,
                capacity: current_capacity,
            },
            fee: Some(fee),
        });
    }

    Ok(BatteryCharge {
        state: BatteryState {
            last_action: now,
            capacity: current_capacity - consumption,
        },
        fee: None,
    })
}
