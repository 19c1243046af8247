//! Outbound event records
//!
//! Typed notifications for read-side consumers, appended in the exact order
//! the core performs the corresponding state changes and returned per applied
//! block. Each carries the minimal fields needed to reconstruct the
//! transition.

use crate::battery::BatteryKind;
use crate::state::{InactiveReason, WorkerRequestState};
use serde::{Deserialize, Serialize};
use veles_protocol::{AccountName, Asset, TimePointSec};

/// One ledger-visible notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ChainEvent {
    /// A worker request changed state
    WorkerState {
        /// Post author
        author: AccountName,
        /// Post permlink
        permlink: String,
        /// New state
        state: WorkerRequestState,
    },

    /// A worker payout installment was made
    WorkerReward {
        /// Payout recipient
        worker: AccountName,
        /// Post author
        author: AccountName,
        /// Post permlink
        permlink: String,
        /// Amount paid this cycle
        reward: Asset,
        /// Whether it was credited as vesting
        vest_reward: bool,
    },

    /// A subscription execution was billed
    SubscriptionPayment {
        /// Paying subscriber
        subscriber: AccountName,
        /// Offer author
        author: AccountName,
        /// Offer id
        oid: String,
        /// Portion covered from the prepaid balance
        prepaid: Asset,
        /// Portion debited from the subscriber now
        amount: Asset,
        /// Leftover prepaid folded into a final execution
        rest: Asset,
        /// Whether tip balances were used
        from_tip: bool,
    },

    /// A subscription debit could not be covered
    SubscriptionPaymentFailure {
        /// Subscriber whose balance fell short
        subscriber: AccountName,
        /// Offer author
        author: AccountName,
        /// Offer id
        oid: String,
    },

    /// A subscriber record went inactive
    SubscriptionInactive {
        /// Subscriber
        subscriber: AccountName,
        /// Offer author
        author: AccountName,
        /// Offer id
        oid: String,
        /// Why
        reason: InactiveReason,
    },

    /// A prepaid balance was returned to its subscriber
    SubscriptionPrepaidReturn {
        /// Subscriber refunded
        subscriber: AccountName,
        /// Offer author
        author: AccountName,
        /// Offer id
        oid: String,
        /// Amount returned
        amount: Asset,
        /// Returned to the tip balance
        to_tip: bool,
    },

    /// An author's reputation changed
    AccountReputation {
        /// Voting account
        voter: AccountName,
        /// Author affected
        author: AccountName,
        /// Score before
        reputation_before: i64,
        /// Score after
        reputation_after: i64,
        /// Vote weight that caused it
        weight: i16,
    },

    /// An author's reputation crossed into negative
    MinusReputation {
        /// Voting account
        voter: AccountName,
        /// Author affected
        author: AccountName,
        /// Score before
        reputation_before: i64,
        /// Score after
        reputation_after: i64,
        /// Vote weight that caused it
        weight: i16,
    },

    /// A metered action paid the skip-the-limit fee
    UnlimitCost {
        /// Paying account
        account: AccountName,
        /// Fee moved to the null account
        fee: Asset,
        /// Which action kind was metered
        kind: BatteryKind,
    },

    /// An account was frozen or unfrozen
    AccountFreeze {
        /// Account affected
        account: AccountName,
        /// New frozen flag
        frozen: bool,
        /// Fee charged on unfreeze (zero while the parameter is zeroed)
        fee: Asset,
    },

    /// A limit order entered the book
    OrderCreated {
        /// Owner
        owner: AccountName,
        /// Order id
        order_id: u32,
        /// Escrowed amount
        amount_to_sell: Asset,
        /// Minimum acceptable proceeds
        min_to_receive: Asset,
    },

    /// A limit order left the book (cancel or expiry), escrow released
    OrderDeleted {
        /// Owner
        owner: AccountName,
        /// Order id
        order_id: u32,
        /// Escrow returned to the liquid balance
        refunded: Asset,
    },

    /// A savings withdrawal completed
    FillSavingsWithdraw {
        /// Savings owner
        from: AccountName,
        /// Liquid recipient
        to: AccountName,
        /// Request id
        request_id: u32,
        /// Amount credited
        amount: Asset,
    },

    /// A vesting withdrawal installment converted to liquid
    FillVestingWithdraw {
        /// Account withdrawing
        account: AccountName,
        /// Amount converted this installment
        withdrawn: Asset,
        /// Next installment due time, sentinel when finished
        next_withdrawal: TimePointSec,
    },
}
