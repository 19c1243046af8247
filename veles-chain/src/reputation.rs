//! Stake-weighted reputation accumulator
//!
//! Reputation moves only through post votes, under two gates: a voter with
//! negative reputation has no effect, and a downvote only lands when the
//! voter outranks the author. The delta shifts away the low six bits of
//! rshares (precision noise at vesting scale).

use crate::error::Result;
use crate::events::ChainEvent;
use crate::state::State;
use veles_protocol::AccountName;

fn push_minus_if_needed(
    events: &mut Vec<ChainEvent>,
    voter: &AccountName,
    author: &AccountName,
    before: i64,
    after: i64,
    weight: i16,
) {
    if before >= 0 && after < 0 {
        events.push(ChainEvent::MinusReputation {
            voter: voter.clone(),
            author: author.clone(),
            reputation_before: before,
            reputation_after: after,
            weight,
        });
    }
}

/// Apply a vote's reputation effect on the post author.
///
/// Returns without touching state when a rule gate blocks the effect.
pub fn vote_reputation(
    state: &mut State,
    voter: &AccountName,
    author: &AccountName,
    rshares: i64,
    weight: i16,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    let voter_reputation = state.account(voter)?.reputation;

    // Rule #1: negative-reputation voters cannot affect others
    if voter_reputation < 0 {
        return Ok(());
    }

    let mut author_account = state.account(author)?.clone();

    // Rule #2: a downvote requires more reputation than the author holds
    if rshares < 0 && voter_reputation <= author_account.reputation {
        return Ok(());
    }

    let delta = rshares >> 6;
    let before = author_account.reputation;
    let after = before + delta;
    author_account.reputation = after;
    state.put_account(author_account);

    events.push(ChainEvent::AccountReputation {
        voter: voter.clone(),
        author: author.clone(),
        reputation_before: before,
        reputation_after: after,
        weight,
    });
    push_minus_if_needed(events, voter, author, before, after, weight);
    Ok(())
}

/// Reverse a prior vote's reputation effect (unconditional, rule gates do
/// not re-apply on removal).
pub fn unvote_reputation(
    state: &mut State,
    voter: &AccountName,
    author: &AccountName,
    old_rshares: i64,
    weight: i16,
    events: &mut Vec<ChainEvent>,
) -> Result<()> {
    let delta = old_rshares >> 6;
    let mut author_account = state.account(author)?.clone();
    let before = author_account.reputation;
    let after = before - delta;
    author_account.reputation = after;
    state.put_account(author_account);

    push_minus_if_needed(events, voter, author, before, after, weight);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Genesis, GenesisAccount};
    use veles_protocol::TimePointSec;

    fn name(s: &str) -> AccountName {
        AccountName::new(s).unwrap()
    }

    fn state_with(names: &[&str]) -> State {
        State::genesis(
            &Genesis {
                accounts: names
                    .iter()
                    .map(|n| GenesisAccount {
                        name: name(n),
                        liquid: 1_000,
                        debt: 0,
                        vesting: 1_000,
                    })
                    .collect(),
            },
            TimePointSec(0),
        )
        .unwrap()
    }

    #[test]
    fn test_upvote_raises_reputation() {
        let mut state = state_with(&["alice", "bob"]);
        let mut events = Vec::new();
        vote_reputation(&mut state, &name("alice"), &name("bob"), 1 << 10, 100, &mut events)
            .unwrap();
        assert_eq!(state.account(&name("bob")).unwrap().reputation, 1 << 4);
        assert!(matches!(events[0], ChainEvent::AccountReputation { .. }));
    }

    #[test]
    fn test_negative_voter_has_no_effect() {
        let mut state = state_with(&["alice", "bob"]);
        let mut alice = state.account(&name("alice")).unwrap().clone();
        alice.reputation = -1;
        state.put_account(alice);

        let mut events = Vec::new();
        vote_reputation(&mut state, &name("alice"), &name("bob"), 1 << 10, 100, &mut events)
            .unwrap();
        assert_eq!(state.account(&name("bob")).unwrap().reputation, 0);
        assert!(events.is_empty());
    }

    #[test]
    fn test_downvote_requires_outranking() {
        let mut state = state_with(&["alice", "bob"]);
        let mut events = Vec::new();

        // Equal reputation: downvote blocked
        vote_reputation(&mut state, &name("alice"), &name("bob"), -(1 << 10), -100, &mut events)
            .unwrap();
        assert_eq!(state.account(&name("bob")).unwrap().reputation, 0);

        // Voter outranks author: downvote lands and emits the minus event
        let mut alice = state.account(&name("alice")).unwrap().clone();
        alice.reputation = 1_000;
        state.put_account(alice);
        vote_reputation(&mut state, &name("alice"), &name("bob"), -(1 << 10), -100, &mut events)
            .unwrap();
        assert_eq!(state.account(&name("bob")).unwrap().reputation, -(1 << 4));
        assert!(events
            .iter()
            .any(|e| matches!(e, ChainEvent::MinusReputation { .. })));
    }

    #[test]
    fn test_unvote_reverses() {
        let mut state = state_with(&["alice", "bob"]);
        let mut events = Vec::new();
        vote_reputation(&mut state, &name("alice"), &name("bob"), 1 << 10, 100, &mut events)
            .unwrap();
        unvote_reputation(&mut state, &name("alice"), &name("bob"), 1 << 10, 0, &mut events)
            .unwrap();
        assert_eq!(state.account(&name("bob")).unwrap().reputation, 0);
    }
}
