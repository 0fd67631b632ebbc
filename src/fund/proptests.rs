//! Property-based tests for the fund state machine
//!
//! Tests for:
//! - Conservation: total deposited equals the sum of depositor records, and
//!   released never exceeds deposited, for any call sequence
//! - Exactly-once voting: a repeated vote is rejected and changes nothing
//! - No lost updates: tallies equal the power of the accepted votes
//! - Lock gating: locked depositors never vote
//! - Pro-rata exactness: recovery shares sum to the balance
//! - Order independence: permuted deposits and votes reach the same books

use super::config::{Fraction, FundConfig};
use super::error::ErrorKind;
use super::identity::Identity;
use super::ledger::DepositLedger;
use super::release::pro_rata_shares;
use super::state::FundState;
use super::voting::VoteDecision;
use crate::serialization::to_cbor;
use proptest::prelude::*;
use std::collections::BTreeSet;

const PEOPLE: [&str; 5] = ["alice", "bob", "carol", "dave", "erin"];

fn person(index: u8) -> Identity {
    Identity::new(PEOPLE[index as usize % PEOPLE.len()])
}

fn proposer() -> Identity {
    Identity::new("proposer")
}

fn config(threshold_bps: u32, quorum_bps: u32, emergency_bps: u32) -> FundConfig {
    FundConfig {
        lock_duration: 10,
        threshold_fraction: Fraction::from_bps(threshold_bps).unwrap(),
        quorum_fraction: Fraction::from_bps(quorum_bps).unwrap(),
        emergency_threshold_fraction: Fraction::from_bps(emergency_bps).unwrap(),
        emergency_expiry_window: 50,
        ..FundConfig::new("proposer")
    }
}

#[derive(Debug, Clone)]
enum Op {
    Deposit(u8, u64),
    CreateMilestone(u64),
    Vote(u8, bool),
    VoteOn(u8, u64, bool),
    Declare(u8),
    Sign(u8),
    Advance(u64),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..5, 0u64..2_000).prop_map(|(who, amount)| Op::Deposit(who, amount)),
        2 => (0u64..1_500).prop_map(Op::CreateMilestone),
        4 => (0u8..5, any::<bool>()).prop_map(|(who, approve)| Op::Vote(who, approve)),
        1 => (0u8..5, 0u64..4, any::<bool>()).prop_map(|(who, id, approve)| Op::VoteOn(who, id, approve)),
        1 => (0u8..5).prop_map(Op::Declare),
        1 => (0u8..5).prop_map(Op::Sign),
        2 => (0u64..30).prop_map(Op::Advance),
    ]
}

/// The same deposits twice, once shuffled, plus every depositor in shuffled vote order.
fn arb_permuted_deposits() -> impl Strategy<Value = (Vec<(u8, u64)>, Vec<(u8, u64)>, Vec<u8>)> {
    prop::collection::vec((0u8..5, 1u64..800), 1..12).prop_flat_map(|deposits| {
        let voters: Vec<u8> = deposits
            .iter()
            .map(|(who, _)| *who)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        (
            Just(deposits.clone()),
            Just(deposits).prop_shuffle(),
            Just(voters).prop_shuffle(),
        )
    })
}

/// Deposit at t=0, open a milestone, then every depositor approves at t=10.
fn run_in_order(deposits: &[(u8, u64)], voters: &[u8]) -> FundState {
    let mut state = FundState::new(config(9_999, 10_000, 10_000)).unwrap();
    for (who, amount) in deposits {
        state.deposit(&person(*who), *amount, 0).unwrap();
    }
    state.create_milestone(&proposer(), 1, None, 0).unwrap();
    for who in voters {
        state.vote(&person(*who), 0, true, 10).unwrap();
    }
    state
}

/// Apply one op; errors are expected and ignored except for faults.
fn apply(state: &mut FundState, now: &mut u64, op: &Op) -> Result<(), TestCaseError> {
    let result = match op {
        Op::Deposit(who, amount) => state.deposit(&person(*who), *amount, *now).map(|_| ()),
        Op::CreateMilestone(amount) => state
            .create_milestone(&proposer(), *amount, None, *now)
            .map(|_| ()),
        Op::Vote(who, approve) => {
            let id = state.active_milestone().map_or(0, |m| m.id);
            state.vote(&person(*who), id, *approve, *now).map(|_| ())
        }
        Op::VoteOn(who, id, approve) => state.vote(&person(*who), *id, *approve, *now).map(|_| ()),
        Op::Declare(who) => state.declare_emergency(&person(*who), *now).map(|_| ()),
        Op::Sign(who) => state.sign_emergency(&person(*who), *now).map(|_| ()),
        Op::Advance(by) => {
            *now += by;
            Ok(())
        }
    };
    if let Err(err) = result {
        prop_assert!(!err.is_fatal(), "unexpected fault: {}", err);
    }
    Ok(())
}

proptest! {
    /// Property: Pool conservation
    /// After every call, the pool totals match the records and never go negative
    #[test]
    fn prop_pool_conservation(
        ops in prop::collection::vec(arb_op(), 1..80),
        threshold in 5_000u32..8_000,
        quorum in 1_000u32..9_000,
    ) {
        let mut state = FundState::new(config(threshold, quorum, 9_000)).unwrap();
        let mut now = 0u64;
        for op in &ops {
            apply(&mut state, &mut now, op)?;

            let pool = state.pool();
            let sum: u128 = state.depositors().map(|d| d.cumulative_amount as u128).sum();
            prop_assert_eq!(sum, pool.total_deposited as u128);
            prop_assert!(pool.total_released <= pool.total_deposited);
            prop_assert!(state.check_invariants().is_ok());
            prop_assert!(state.fault().is_none());
        }
    }

    /// Property: Rejected calls do not mutate state
    #[test]
    fn prop_rejected_calls_are_noops(
        ops in prop::collection::vec(arb_op(), 1..60),
    ) {
        let mut state = FundState::new(config(6_000, 5_000, 9_000)).unwrap();
        let mut now = 0u64;
        for op in &ops {
            let before = state.clone();
            let before_now = now;
            let failed = match op {
                Op::Deposit(who, amount) => state.deposit(&person(*who), *amount, now).is_err(),
                Op::CreateMilestone(amount) => {
                    state.create_milestone(&proposer(), *amount, None, now).is_err()
                }
                Op::Vote(who, approve) => {
                    let id = state.active_milestone().map_or(0, |m| m.id);
                    state.vote(&person(*who), id, *approve, now).is_err()
                }
                Op::VoteOn(who, id, approve) => state.vote(&person(*who), *id, *approve, now).is_err(),
                Op::Declare(who) => state.declare_emergency(&person(*who), now).is_err(),
                Op::Sign(who) => state.sign_emergency(&person(*who), now).is_err(),
                Op::Advance(by) => {
                    now += by;
                    false
                }
            };
            if failed {
                prop_assert_eq!(&state, &before);
                prop_assert_eq!(now, before_now);
            }
        }
    }

    /// Property: Exactly-once voting and no lost updates
    /// Each voter is counted once; tallies equal the power of accepted votes
    #[test]
    fn prop_votes_counted_exactly_once(
        deposits in prop::collection::vec(1u64..1_000, 5),
        votes in prop::collection::vec((0u8..5, any::<bool>()), 1..20),
    ) {
        // Total stake stays under 10_000, so a 99.99% threshold needs every
        // voter and any rejection fails the milestone.
        let mut state = FundState::new(config(9_999, 10_000, 10_000)).unwrap();
        for (i, amount) in deposits.iter().enumerate() {
            state.deposit(&person(i as u8), *amount, 0).unwrap();
        }
        state.create_milestone(&proposer(), 1, None, 0).unwrap();

        let mut approved = 0u64;
        let mut rejected = 0u64;
        let mut voted = BTreeSet::new();
        for (who, approve) in &votes {
            let before = state.milestone(0).unwrap().clone();
            match state.vote(&person(*who), 0, *approve, 10) {
                Ok(outcome) => {
                    prop_assert!(voted.insert(*who % 5));
                    if *approve { approved += outcome.receipt.power } else { rejected += outcome.receipt.power }
                }
                Err(err) => {
                    if voted.contains(&(*who % 5)) && before.status == super::milestone::MilestoneStatus::Active {
                        prop_assert_eq!(err.kind(), ErrorKind::DuplicateVote);
                    }
                    let after = state.milestone(0).unwrap();
                    prop_assert_eq!(after.approval_stake, before.approval_stake);
                    prop_assert_eq!(after.rejection_stake, before.rejection_stake);
                }
            }
        }
        let milestone = state.milestone(0).unwrap();
        prop_assert_eq!(milestone.approval_stake, approved);
        prop_assert_eq!(milestone.rejection_stake, rejected);
    }

    /// Property: Locked depositors have no voting power and cannot vote
    #[test]
    fn prop_locked_depositors_cannot_vote(
        deposit_at in 0u64..100,
        elapsed in 0u64..10,
        amount in 1u64..10_000,
    ) {
        let mut state = FundState::new(config(6_000, 5_000, 9_000)).unwrap();
        state.deposit(&Identity::new("funder"), 10_000, 0).unwrap();
        state.deposit(&person(0), amount, deposit_at).unwrap();
        state.create_milestone(&proposer(), 1, None, deposit_at).unwrap();

        let now = deposit_at + elapsed;
        prop_assert_eq!(state.voting_power(&person(0), now), 0);
        let err = state.vote(&person(0), 0, true, now).unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::NotEligible);
    }

    /// Property: Pro-rata shares are exact
    /// Shares sum to the balance, and every share except the last is the floored exact share
    #[test]
    fn prop_pro_rata_exact(
        deposits in prop::collection::vec(1u64..1_000_000, 1..12),
        released_permille in 0u64..=1_000,
    ) {
        let mut ledger = DepositLedger::new();
        for (i, amount) in deposits.iter().enumerate() {
            ledger.deposit(&Identity::new(format!("d{:02}", i)), *amount, 0, 1).unwrap();
        }
        let total = ledger.pool().total_deposited;
        let balance = total - total * released_permille / 1_000;

        let shares = pro_rata_shares(&ledger, balance).unwrap();
        prop_assert_eq!(shares.len(), deposits.len());
        let sum: u64 = shares.iter().map(|(_, s)| *s).sum();
        prop_assert_eq!(sum, balance);

        for ((_, share), depositor) in shares.iter().zip(ledger.depositors()).take(shares.len() - 1) {
            let exact = depositor.cumulative_amount as u128 * balance as u128 / total as u128;
            prop_assert_eq!(*share as u128, exact);
        }
    }

    /// Property: A passing vote always releases the exact milestone amount
    #[test]
    fn prop_pass_releases_exact_amount(
        stake in 1u64..100_000,
        amount_permille in 1u64..=1_000,
    ) {
        let mut state = FundState::new(config(6_000, 5_000, 9_000)).unwrap();
        state.deposit(&person(0), stake, 0).unwrap();
        let amount = (stake * amount_permille / 1_000).max(1);
        state.create_milestone(&proposer(), amount, None, 0).unwrap();

        let outcome = state.vote(&person(0), 0, true, 10).unwrap();
        prop_assert_eq!(outcome.receipt.decision, VoteDecision::Passed);
        prop_assert_eq!(outcome.payouts.len(), 1);
        prop_assert_eq!(outcome.payouts[0].amount, amount);
        prop_assert_eq!(state.pool_balance(), stake - amount);
    }

    /// Property: Serialization-order independence
    /// Any ordering of the same deposits and votes leaves identical books,
    /// tallies and payouts, and identical pro-rata shares
    #[test]
    fn prop_call_order_independent((deposits, shuffled, voters) in arb_permuted_deposits()) {
        let mut sorted_voters = voters.clone();
        sorted_voters.sort_unstable();

        let first = run_in_order(&deposits, &sorted_voters);
        let second = run_in_order(&shuffled, &voters);

        let first_books: Vec<_> = first.depositors().cloned().collect();
        let second_books: Vec<_> = second.depositors().cloned().collect();
        prop_assert_eq!(to_cbor(&first_books).unwrap(), to_cbor(&second_books).unwrap());
        prop_assert_eq!(first.pool(), second.pool());
        prop_assert_eq!(first.milestones(), second.milestones());
        prop_assert_eq!(first.payouts(), second.payouts());
        prop_assert_eq!(first.milestone_status(0), Some(super::milestone::MilestoneStatus::Released));

        let mut a = DepositLedger::new();
        let mut b = DepositLedger::new();
        for (who, amount) in &deposits {
            a.deposit(&person(*who), *amount, 0, 1).unwrap();
        }
        for (who, amount) in &shuffled {
            b.deposit(&person(*who), *amount, 0, 1).unwrap();
        }
        prop_assert_eq!(to_cbor(&a).unwrap(), to_cbor(&b).unwrap());
        let balance = a.pool().total_deposited / 2;
        prop_assert_eq!(pro_rata_shares(&a, balance).unwrap(), pro_rata_shares(&b, balance).unwrap());
    }
}
