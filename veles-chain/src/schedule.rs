//! Hardfork parameter schedule
//!
//! Protocol rules are versioned: each hardfork version activates at a fixed
//! block height and carries a complete parameter bundle. Evaluators and
//! maintenance passes receive the bundle for the block being applied and
//! branch on it — never on ambient state — so historical blocks replay under
//! the rules that were live at their height.
//!
//! Versions only ever add parameters or zero them at an activation boundary;
//! a parameter visible to an already-activated version is never changed.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use veles_protocol::{Asset, TimePointSec, VBD, VLS};

/// Hardfork version id
pub type HardforkId = u32;

/// Base rules: transfers, posts/votes with batteries, reputation, orders,
/// savings and vesting schedules
pub const HARDFORK_BASE: HardforkId = 1;
/// Worker funding requests and worker-pool emission
pub const HARDFORK_WORKER_REQUESTS: HardforkId = 2;
/// Pay-to-skip-limit fees and the account freeze sweep
pub const HARDFORK_PAY_TO_SKIP: HardforkId = 3;
/// Paid subscriptions and the downvote surcharge
pub const HARDFORK_SUBSCRIPTIONS: HardforkId = 4;

/// Latest defined version
pub const HARDFORK_LATEST: HardforkId = HARDFORK_SUBSCRIPTIONS;

/// One schedule entry: a version and the height it activates at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardforkEntry {
    /// Version activated
    pub id: HardforkId,
    /// First block height governed by this version
    pub activation_height: u64,
}

/// Ordered activation schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardforkSchedule {
    entries: Vec<HardforkEntry>,
}

impl HardforkSchedule {
    /// Build a schedule; entries must be strictly increasing in both id and
    /// height and start at version 1
    pub fn new(entries: Vec<HardforkEntry>) -> Result<Self> {
        if entries.first().map(|e| e.id) != Some(HARDFORK_BASE) {
            return Err(Error::Config("Schedule must start at version 1".into()));
        }
        for pair in entries.windows(2) {
            if pair[1].id != pair[0].id + 1 || pair[1].activation_height <= pair[0].activation_height
            {
                return Err(Error::Config(
                    "Schedule entries must increase in version and height".into(),
                ));
            }
        }
        if entries.last().map(|e| e.id) > Some(HARDFORK_LATEST) {
            return Err(Error::Config("Schedule names an unknown version".into()));
        }
        Ok(Self { entries })
    }

    /// Every version active from block 1 (tests, fresh networks)
    pub fn all_from_genesis() -> Self {
        Self {
            entries: (HARDFORK_BASE..=HARDFORK_LATEST)
                .map(|id| HardforkEntry {
                    id,
                    activation_height: id as u64,
                })
                .collect(),
        }
    }

    /// Highest version activated at `height`
    pub fn current_version(&self, height: u64) -> HardforkId {
        self.entries
            .iter()
            .take_while(|e| e.activation_height <= height)
            .map(|e| e.id)
            .last()
            .unwrap_or(0)
    }

    /// Whether `id` is active at `height`
    pub fn is_active(&self, id: HardforkId, height: u64) -> bool {
        self.current_version(height) >= id
    }

    /// Parameter bundle governing the block at `height`
    pub fn params_at(&self, height: u64) -> ChainParams {
        ChainParams::for_version(self.current_version(height))
    }
}

/// The complete rule bundle for one hardfork version.
///
/// Threaded by value into every evaluator and maintenance call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainParams {
    /// Version this bundle describes
    pub version: HardforkId,

    /// Post battery window, minutes
    pub posts_window: u16,
    /// Free posts per window
    pub posts_per_window: u16,
    /// Comment battery window, minutes
    pub comments_window: u16,
    /// Free comments per window
    pub comments_per_window: u16,
    /// Vote battery window, minutes
    pub votes_window: u16,
    /// Free votes per window
    pub votes_per_window: u16,

    /// Whether exhausted batteries may be paid past (v3+)
    pub pay_to_skip_limit: bool,
    /// Fee for one metered action past the limit, from the tip balance
    pub unlimit_operation_cost: Asset,
    /// Whether downvotes past the limit pay a surcharge (v4+)
    pub downvote_surcharge: bool,
    /// Surcharge added to the unlimit cost for negative votes
    pub downvote_extra_cost: Asset,

    /// Whether worker requests exist (v2+)
    pub worker_requests_enabled: bool,
    /// Fee charged on request creation, paid to the worker pool
    pub worker_request_creation_fee: Asset,
    /// Minimum voted stake as a fraction of total vesting, basis points
    pub worker_request_approve_min_percent: u16,
    /// Blocks between worker payout cycles
    pub worker_cashout_interval: u64,
    /// Per-block emission credited to the worker pool
    pub worker_emission_per_block: Asset,

    /// Whether the subscription billing engine runs (v4+)
    pub subscriptions_enabled: bool,

    /// Whether the freeze sweep runs (v3+)
    pub freezing_enabled: bool,
    /// Liquid balance below which an account counts toward freezing
    pub freeze_liquid_threshold: Asset,
    /// Vesting balance below which an account counts toward freezing
    pub freeze_vesting_threshold: Asset,
    /// Only accounts created before this time are swept
    pub freeze_created_before: TimePointSec,
    /// Fee charged when a frozen account unfreezes (zeroed at v3)
    pub unfreeze_fee: Asset,

    /// Fee debited from the creator of a new account, granted as vesting
    pub account_creation_fee: Asset,
    /// Number of vesting withdrawal installments
    pub vesting_withdraw_intervals: u32,
    /// Seconds between vesting withdrawal installments
    pub vesting_withdraw_interval_seconds: u32,
    /// Delay before a savings withdrawal completes, seconds
    pub savings_withdraw_time_seconds: u32,
}

impl ChainParams {
    /// Build the bundle for a version.
    ///
    /// Replay safety: the arms below accumulate — later versions change only
    /// what their hardfork introduced.
    pub fn for_version(version: HardforkId) -> ChainParams {
        let mut p = ChainParams {
            version,
            posts_window: 5,
            posts_per_window: 1,
            comments_window: 200,
            comments_per_window: 10,
            votes_window: 15,
            votes_per_window: 5,
            pay_to_skip_limit: false,
            unlimit_operation_cost: Asset::zero(VLS),
            downvote_surcharge: false,
            downvote_extra_cost: Asset::zero(VLS),
            worker_requests_enabled: false,
            worker_request_creation_fee: Asset::zero(VBD),
            worker_request_approve_min_percent: 0,
            worker_cashout_interval: 0,
            worker_emission_per_block: Asset::zero(VLS),
            subscriptions_enabled: false,
            freezing_enabled: false,
            freeze_liquid_threshold: Asset::zero(VLS),
            freeze_vesting_threshold: Asset::zero(VLS),
            freeze_created_before: TimePointSec::ZERO,
            unfreeze_fee: Asset::zero(VLS),
            account_creation_fee: Asset::new(1_000, VLS),
            vesting_withdraw_intervals: 13,
            vesting_withdraw_interval_seconds: 60 * 60 * 24 * 7,
            savings_withdraw_time_seconds: 60 * 60 * 24 * 3,
        };

        if version >= HARDFORK_WORKER_REQUESTS {
            p.worker_requests_enabled = true;
            p.worker_request_creation_fee = Asset::new(100_000, VBD);
            p.worker_request_approve_min_percent = 1_000; // 10%
            p.worker_cashout_interval = 200; // every 10 minutes at 3s blocks
            p.worker_emission_per_block = Asset::new(1_000, VLS);
        }

        if version >= HARDFORK_PAY_TO_SKIP {
            p.pay_to_skip_limit = true;
            p.unlimit_operation_cost = Asset::new(10_000, VLS);
            p.freezing_enabled = true;
            p.freeze_liquid_threshold = Asset::new(100_000, VLS);
            p.freeze_vesting_threshold = Asset::new(290_000, VLS);
            p.freeze_created_before = TimePointSec(1_600_000_000);
            p.unfreeze_fee = Asset::zero(VLS);
        }

        if version >= HARDFORK_SUBSCRIPTIONS {
            p.subscriptions_enabled = true;
            p.downvote_surcharge = true;
            p.downvote_extra_cost = Asset::new(5_000, VLS);
        }

        p
    }
}
