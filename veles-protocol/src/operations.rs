//! Signed operations
//!
//! The closed sum type of every operation the chain core evaluates, plus the
//! static (state-independent) validation each kind performs before it ever
//! reaches an evaluator. Adding an operation kind means extending
//! [`Operation`] and the dispatch in the chain core — there is no open
//! registration.

use crate::asset::{Asset, VBD, VLS};
use crate::error::{Error, Result};
use crate::types::{AccountName, TimePointSec, PERCENT_100};
use serde::{Deserialize, Serialize};

fn check(cond: bool, msg: impl Into<String>) -> Result<()> {
    if cond {
        Ok(())
    } else {
        Err(Error::InvalidValue(msg.into()))
    }
}

fn check_positive(amount: &Asset, what: &str) -> Result<()> {
    check(amount.amount > 0, format!("{what} must be positive"))
}

fn check_money_symbol(amount: &Asset, what: &str) -> Result<()> {
    check(
        amount.symbol == VLS || amount.symbol == VBD,
        format!("{what} must be VLS or VBD"),
    )
}

/// Create a new account; the fee is debited from the creator and credited to
/// the new account's vesting balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountCreate {
    /// Paying account
    pub creator: AccountName,
    /// Name of the account to create
    pub new_account_name: AccountName,
    /// Fee, converted to the new account's vesting
    pub fee: Asset,
    /// Initial memo key
    pub memo_key: String,
}

impl AccountCreate {
    fn validate(&self) -> Result<()> {
        check(self.fee.symbol == VLS, "Account creation fee must be VLS")?;
        check(self.fee.amount >= 0, "Account creation fee cannot be negative")
    }
}

/// Update account keys; on a frozen account this restores the frozen
/// authority snapshot first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountUpdate {
    /// Account being updated
    pub account: AccountName,
    /// New posting key, if changing
    pub posting_key: Option<String>,
    /// New active key, if changing
    pub active_key: Option<String>,
    /// New owner key, if changing
    pub owner_key: Option<String>,
    /// New memo key, if changing
    pub memo_key: Option<String>,
}

impl AccountUpdate {
    fn validate(&self) -> Result<()> {
        check(
            self.posting_key.is_some()
                || self.active_key.is_some()
                || self.owner_key.is_some()
                || self.memo_key.is_some(),
            "Account update must change something",
        )
    }
}

/// Move liquid funds between accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    /// Sender
    pub from: AccountName,
    /// Recipient
    pub to: AccountName,
    /// Amount (VLS or VBD)
    pub amount: Asset,
    /// Free-form memo
    pub memo: String,
}

impl Transfer {
    fn validate(&self) -> Result<()> {
        check_positive(&self.amount, "Transfer amount")?;
        check_money_symbol(&self.amount, "Transfer amount")?;
        check(self.from != self.to, "Cannot transfer to self")?;
        check(self.memo.len() <= 2048, "Memo too long")
    }
}

/// Convert liquid core tokens into the recipient's vesting balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferToVesting {
    /// Sender (liquid debit)
    pub from: AccountName,
    /// Recipient of the vesting credit
    pub to: AccountName,
    /// Amount, VLS only
    pub amount: Asset,
}

impl TransferToVesting {
    fn validate(&self) -> Result<()> {
        check_positive(&self.amount, "Vesting transfer amount")?;
        check(self.amount.symbol == VLS, "Vesting transfers must be VLS")
    }
}

/// Schedule conversion of vesting back to liquid in equal installments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawVesting {
    /// Account withdrawing
    pub account: AccountName,
    /// Total vesting amount to withdraw (VLS); zero cancels the schedule
    pub amount: Asset,
}

impl WithdrawVesting {
    fn validate(&self) -> Result<()> {
        check(self.amount.symbol == VLS, "Vesting withdrawal must be VLS")?;
        check(self.amount.amount >= 0, "Vesting withdrawal cannot be negative")
    }
}

/// Move liquid funds into the savings category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferToSavings {
    /// Sender (liquid debit)
    pub from: AccountName,
    /// Savings recipient
    pub to: AccountName,
    /// Amount (VLS or VBD)
    pub amount: Asset,
    /// Free-form memo
    pub memo: String,
}

impl TransferToSavings {
    fn validate(&self) -> Result<()> {
        check_positive(&self.amount, "Savings transfer amount")?;
        check_money_symbol(&self.amount, "Savings transfer amount")?;
        check(self.memo.len() <= 2048, "Memo too long")
    }
}

/// Begin a delayed withdrawal from savings; the funds arrive via the
/// maintenance pass after the configured delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferFromSavings {
    /// Savings owner
    pub from: AccountName,
    /// Request id, unique per owner among outstanding withdrawals
    pub request_id: u32,
    /// Liquid recipient once complete
    pub to: AccountName,
    /// Amount (VLS or VBD)
    pub amount: Asset,
    /// Free-form memo
    pub memo: String,
}

impl TransferFromSavings {
    fn validate(&self) -> Result<()> {
        check_positive(&self.amount, "Savings withdrawal amount")?;
        check_money_symbol(&self.amount, "Savings withdrawal amount")?;
        check(self.memo.len() <= 2048, "Memo too long")
    }
}

/// Cancel an outstanding savings withdrawal, returning the funds to savings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelTransferFromSavings {
    /// Savings owner
    pub from: AccountName,
    /// Request id of the withdrawal to cancel
    pub request_id: u32,
}

/// Move liquid core tokens into the recipient's tip balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferToTip {
    /// Sender (liquid debit)
    pub from: AccountName,
    /// Tip recipient
    pub to: AccountName,
    /// Amount, VLS only
    pub amount: Asset,
}

impl TransferToTip {
    fn validate(&self) -> Result<()> {
        check_positive(&self.amount, "Tip transfer amount")?;
        check(self.amount.symbol == VLS, "Tip balances are VLS only")
    }
}

/// Create or edit a post or comment (metered by the battery on creation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    /// Parent post, absent for a root post
    pub parent: Option<(AccountName, String)>,
    /// Author
    pub author: AccountName,
    /// Permanent link, unique per author
    pub permlink: String,
    /// Body text
    pub body: String,
    /// Client-defined metadata (JSON)
    pub json_metadata: String,
}

impl Comment {
    fn validate(&self) -> Result<()> {
        check(!self.permlink.is_empty() && self.permlink.len() <= 256, "Bad permlink")?;
        if let Some((_, parent_permlink)) = &self.parent {
            check(
                !parent_permlink.is_empty() && parent_permlink.len() <= 256,
                "Bad parent permlink",
            )?;
        }
        check(!self.body.is_empty(), "Body cannot be empty")?;
        if !self.json_metadata.is_empty() {
            check(
                serde_json::from_str::<serde_json::Value>(&self.json_metadata).is_ok(),
                "Metadata must be valid JSON",
            )?;
        }
        Ok(())
    }
}

/// Vote on a post or comment (metered by the battery; feeds reputation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    /// Voting account
    pub voter: AccountName,
    /// Post author
    pub author: AccountName,
    /// Post permlink
    pub permlink: String,
    /// Weight in basis points, negative for a downvote
    pub weight: i16,
}

impl Vote {
    fn validate(&self) -> Result<()> {
        check(
            self.weight >= -PERCENT_100 && self.weight <= PERCENT_100,
            "Vote weight out of range",
        )?;
        check(!self.permlink.is_empty(), "Bad permlink")
    }
}

/// Submit (or edit, while unvoted) a worker funding request on a root post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Post author (pays the creation fee)
    pub author: AccountName,
    /// Root post the request is tied to
    pub permlink: String,
    /// Account to receive the payout
    pub worker: AccountName,
    /// Minimum acceptable payment
    pub required_amount_min: Asset,
    /// Maximum requested payment
    pub required_amount_max: Asset,
    /// Pay out to the worker's vesting balance instead of liquid
    pub vest_reward: bool,
    /// Voting duration in seconds
    pub duration: u32,
}

/// Upper bound on worker request voting duration: 30 days
pub const WORKER_REQUEST_MAX_DURATION: u32 = 60 * 60 * 24 * 30;

impl WorkerRequest {
    fn validate(&self) -> Result<()> {
        check_positive(&self.required_amount_min, "Minimum amount")?;
        check_positive(&self.required_amount_max, "Maximum amount")?;
        check_money_symbol(&self.required_amount_max, "Requested amount")?;
        check(
            self.required_amount_min.symbol == self.required_amount_max.symbol,
            "Minimum and maximum amounts must share a symbol",
        )?;
        check(
            self.required_amount_min.amount <= self.required_amount_max.amount,
            "Minimum amount cannot exceed maximum",
        )?;
        if self.vest_reward {
            check(
                self.required_amount_max.symbol == VLS,
                "Vesting rewards must be VLS",
            )?;
        }
        check(
            self.duration <= WORKER_REQUEST_MAX_DURATION,
            "Voting duration too long",
        )
    }
}

/// Close a worker request as its author
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequestDelete {
    /// Post author
    pub author: AccountName,
    /// Root post the request is tied to
    pub permlink: String,
}

/// Stake-weighted vote on a worker request; weight 0 removes the vote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequestVote {
    /// Voting account
    pub voter: AccountName,
    /// Post author
    pub author: AccountName,
    /// Post permlink
    pub permlink: String,
    /// Weight in basis points, negative against funding
    pub vote_percent: i16,
}

impl WorkerRequestVote {
    fn validate(&self) -> Result<()> {
        check(
            self.vote_percent >= -PERCENT_100 && self.vote_percent <= PERCENT_100,
            "Vote percent out of range",
        )
    }
}

fn check_subscription_id(oid: &str) -> Result<()> {
    check(
        !oid.is_empty() && oid.len() <= 32 && oid.bytes().all(|b| b.is_ascii_graphic()),
        "Bad subscription id",
    )
}

fn check_subscription_terms(cost: &Asset, tip_cost: bool, interval: u32, executions: u32) -> Result<()> {
    check_positive(cost, "Subscription cost")?;
    check_money_symbol(cost, "Subscription cost")?;
    if tip_cost {
        check(cost.symbol == VLS, "Tip-funded subscriptions must cost VLS")?;
    }
    if executions > 0 {
        check(interval > 0, "Recurring subscriptions need an interval")?;
    }
    Ok(())
}

/// Declare a recurring-billing subscription offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaidSubscriptionCreate {
    /// Offering account
    pub author: AccountName,
    /// Offer id, unique per author
    pub oid: String,
    /// Cost per execution
    pub cost: Asset,
    /// Bill against tip balances instead of liquid
    pub tip_cost: bool,
    /// Allow subscribers to hold prepaid balances
    pub allow_prepaid: bool,
    /// Seconds between executions
    pub interval: u32,
    /// Executions per subscription; 0 means a single payment at subscribe time
    pub executions: u32,
}

impl PaidSubscriptionCreate {
    fn validate(&self) -> Result<()> {
        check_subscription_id(&self.oid)?;
        check_subscription_terms(&self.cost, self.tip_cost, self.interval, self.executions)
    }
}

/// Change the terms of a subscription offer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaidSubscriptionUpdate {
    /// Offering account
    pub author: AccountName,
    /// Offer id
    pub oid: String,
    /// New cost per execution
    pub cost: Asset,
    /// Bill against tip balances instead of liquid
    pub tip_cost: bool,
    /// Seconds between executions
    pub interval: u32,
    /// Executions per subscription
    pub executions: u32,
}

impl PaidSubscriptionUpdate {
    fn validate(&self) -> Result<()> {
        check_subscription_id(&self.oid)?;
        check_subscription_terms(&self.cost, self.tip_cost, self.interval, self.executions)
    }
}

/// Withdraw a subscription offer, refunding subscriber prepaid balances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaidSubscriptionDelete {
    /// Offering account
    pub author: AccountName,
    /// Offer id
    pub oid: String,
}

/// Subscribe, prolong, or top up prepaid funds on a subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaidSubscriptionTransfer {
    /// Subscriber (payer)
    pub from: AccountName,
    /// Subscription author
    pub to: AccountName,
    /// Offer id
    pub oid: String,
    /// Amount paid now (first execution plus optional prepaid)
    pub amount: Asset,
    /// Pay from the tip balance
    pub from_tip: bool,
}

impl PaidSubscriptionTransfer {
    fn validate(&self) -> Result<()> {
        check_subscription_id(&self.oid)?;
        check_positive(&self.amount, "Subscription payment")?;
        check_money_symbol(&self.amount, "Subscription payment")?;
        check(self.from != self.to, "Cannot subscribe to self")
    }
}

/// Cancel a subscription, refunding any prepaid balance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaidSubscriptionCancel {
    /// Subscriber
    pub subscriber: AccountName,
    /// Subscription author
    pub author: AccountName,
    /// Offer id
    pub oid: String,
}

/// Place a limit order, escrowing the sell amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderCreate {
    /// Order owner
    pub owner: AccountName,
    /// Order id, unique per owner among open orders
    pub order_id: u32,
    /// Amount moved into market escrow
    pub amount_to_sell: Asset,
    /// Minimum acceptable proceeds (fixes the price and the other symbol)
    pub min_to_receive: Asset,
    /// Expiration time; the escrow is released when it passes
    pub expiration: TimePointSec,
}

impl LimitOrderCreate {
    fn validate(&self) -> Result<()> {
        check_positive(&self.amount_to_sell, "Sell amount")?;
        check_positive(&self.min_to_receive, "Receive amount")?;
        check_money_symbol(&self.amount_to_sell, "Sell amount")?;
        check_money_symbol(&self.min_to_receive, "Receive amount")?;
        check(
            self.amount_to_sell.symbol != self.min_to_receive.symbol,
            "Cannot trade a symbol against itself",
        )
    }
}

/// Cancel an open limit order, releasing its escrow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitOrderCancel {
    /// Order owner
    pub owner: AccountName,
    /// Order id
    pub order_id: u32,
}

/// Every operation kind the chain core evaluates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Create an account
    AccountCreate(AccountCreate),
    /// Update account keys (unfreezes a frozen account)
    AccountUpdate(AccountUpdate),
    /// Liquid transfer
    Transfer(Transfer),
    /// Liquid to vesting
    TransferToVesting(TransferToVesting),
    /// Schedule vesting withdrawal
    WithdrawVesting(WithdrawVesting),
    /// Liquid to savings
    TransferToSavings(TransferToSavings),
    /// Delayed withdrawal from savings
    TransferFromSavings(TransferFromSavings),
    /// Cancel a savings withdrawal
    CancelTransferFromSavings(CancelTransferFromSavings),
    /// Liquid to tip balance
    TransferToTip(TransferToTip),
    /// Post or comment
    Comment(Comment),
    /// Vote on a post
    Vote(Vote),
    /// Worker funding request
    WorkerRequest(WorkerRequest),
    /// Author-close a worker request
    WorkerRequestDelete(WorkerRequestDelete),
    /// Vote on a worker request
    WorkerRequestVote(WorkerRequestVote),
    /// Create a subscription offer
    PaidSubscriptionCreate(PaidSubscriptionCreate),
    /// Update a subscription offer
    PaidSubscriptionUpdate(PaidSubscriptionUpdate),
    /// Delete a subscription offer
    PaidSubscriptionDelete(PaidSubscriptionDelete),
    /// Subscribe / prolong / top up
    PaidSubscriptionTransfer(PaidSubscriptionTransfer),
    /// Cancel a subscription
    PaidSubscriptionCancel(PaidSubscriptionCancel),
    /// Place a limit order
    LimitOrderCreate(LimitOrderCreate),
    /// Cancel a limit order
    LimitOrderCancel(LimitOrderCancel),
}

impl Operation {
    /// Static validation, independent of chain state
    pub fn validate(&self) -> Result<()> {
        match self {
            Operation::AccountCreate(op) => op.validate(),
            Operation::AccountUpdate(op) => op.validate(),
            Operation::Transfer(op) => op.validate(),
            Operation::TransferToVesting(op) => op.validate(),
            Operation::WithdrawVesting(op) => op.validate(),
            Operation::TransferToSavings(op) => op.validate(),
            Operation::TransferFromSavings(op) => op.validate(),
            Operation::CancelTransferFromSavings(_) => Ok(()),
            Operation::TransferToTip(op) => op.validate(),
            Operation::Comment(op) => op.validate(),
            Operation::Vote(op) => op.validate(),
            Operation::WorkerRequest(op) => op.validate(),
            Operation::WorkerRequestDelete(_) => Ok(()),
            Operation::WorkerRequestVote(op) => op.validate(),
            Operation::PaidSubscriptionCreate(op) => op.validate(),
            Operation::PaidSubscriptionUpdate(op) => op.validate(),
            Operation::PaidSubscriptionDelete(_) => Ok(()),
            Operation::PaidSubscriptionTransfer(op) => op.validate(),
            Operation::PaidSubscriptionCancel(_) => Ok(()),
            Operation::LimitOrderCreate(op) => op.validate(),
            Operation::LimitOrderCancel(_) => Ok(()),
        }
    }

    /// The account whose authority signs this operation
    pub fn signer(&self) -> &AccountName {
        match self {
            Operation::AccountCreate(op) => &op.creator,
            Operation::AccountUpdate(op) => &op.account,
            Operation::Transfer(op) => &op.from,
            Operation::TransferToVesting(op) => &op.from,
            Operation::WithdrawVesting(op) => &op.account,
            Operation::TransferToSavings(op) => &op.from,
            Operation::TransferFromSavings(op) => &op.from,
            Operation::CancelTransferFromSavings(op) => &op.from,
            Operation::TransferToTip(op) => &op.from,
            Operation::Comment(op) => &op.author,
            Operation::Vote(op) => &op.voter,
            Operation::WorkerRequest(op) => &op.author,
            Operation::WorkerRequestDelete(op) => &op.author,
            Operation::WorkerRequestVote(op) => &op.voter,
            Operation::PaidSubscriptionCreate(op) => &op.author,
            Operation::PaidSubscriptionUpdate(op) => &op.author,
            Operation::PaidSubscriptionDelete(op) => &op.author,
            Operation::PaidSubscriptionTransfer(op) => &op.from,
            Operation::PaidSubscriptionCancel(op) => &op.subscriber,
            Operation::LimitOrderCreate(op) => &op.owner,
            Operation::LimitOrderCancel(op) => &op.owner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::VBD;

    fn name(s: &str) -> AccountName {
        AccountName::new(s).unwrap()
    }

    #[test]
    fn test_transfer_validation() {
        let mut op = Transfer {
            from: name("alice"),
            to: name("bob"),
            amount: Asset::new(1_000, VLS),
            memo: String::new(),
        };
        assert!(op.validate().is_ok());

        op.amount = Asset::new(0, VLS);
        assert!(op.validate().is_err());

        op.amount = Asset::new(1_000, VLS);
        op.to = name("alice");
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_worker_request_validation() {
        let mut op = WorkerRequest {
            author: name("alice"),
            permlink: "roadmap".into(),
            worker: name("bob"),
            required_amount_min: Asset::new(500_000, VBD),
            required_amount_max: Asset::new(1_000_000, VBD),
            vest_reward: false,
            duration: 86_400,
        };
        assert!(op.validate().is_ok());

        op.required_amount_min = Asset::new(2_000_000, VBD);
        assert!(op.validate().is_err());

        op.required_amount_min = Asset::new(500_000, VLS);
        assert!(op.validate().is_err());

        op.required_amount_min = Asset::new(500_000, VBD);
        op.vest_reward = true;
        assert!(op.validate().is_err());

        op.vest_reward = false;
        op.duration = WORKER_REQUEST_MAX_DURATION + 1;
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_subscription_validation() {
        let mut op = PaidSubscriptionCreate {
            author: name("alice"),
            oid: "gold".into(),
            cost: Asset::new(100_000, VLS),
            tip_cost: false,
            allow_prepaid: true,
            interval: 86_400,
            executions: 12,
        };
        assert!(op.validate().is_ok());

        op.interval = 0;
        assert!(op.validate().is_err());

        op.interval = 86_400;
        op.tip_cost = true;
        op.cost = Asset::new(100_000, VBD);
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_order_validation() {
        let op = LimitOrderCreate {
            owner: name("alice"),
            order_id: 1,
            amount_to_sell: Asset::new(1_000, VLS),
            min_to_receive: Asset::new(1_000, VLS),
            expiration: TimePointSec(86_400),
        };
        assert!(op.validate().is_err());
    }

    #[test]
    fn test_dispatch_is_exhaustive() {
        let op = Operation::Vote(Vote {
            voter: name("alice"),
            author: name("bob"),
            permlink: "post".into(),
            weight: PERCENT_100,
        });
        assert!(op.validate().is_ok());
        assert_eq!(op.signer().as_str(), "alice");
    }
}
