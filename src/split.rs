//! Turns an expense amount into exact per-participant shares.
//!
//! Shares are computed in the smallest currency unit with integer arithmetic.
//! Units that cannot be divided evenly are handed out one at a time by
//! largest remainder, so the shares always add up to the original amount.
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::{
    error::{LedgerError, ResultLedger},
    money::Amount,
    schemas::{Member, MemberId, Participant},
};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Share {
    pub member: MemberId,
    pub amount: Amount,
}

/// Splits `amount` equally between `members`.
///
/// The first `amount % n` members (in the given order) get one extra unit.
pub fn split_equal(amount: Amount, members: &[Member]) -> ResultLedger<Vec<Share>> {
    let participants: Vec<Participant> = members
        .iter()
        .map(|m| Participant::new(m.id.clone()))
        .collect();
    split_weighted(amount, &participants)
}

/// Splits `amount` proportionally to each participant's weight.
///
/// Each participant first gets `floor(amount * weight / total_weight)`. The
/// leftover units go to the participants with the largest fractional
/// remainder, earlier participants first on ties.
pub fn split_weighted(amount: Amount, participants: &[Participant]) -> ResultLedger<Vec<Share>> {
    if amount.is_negative() {
        return Err(LedgerError::InvalidAmount(format!(
            "cannot split a negative amount ({amount})"
        )));
    }
    if participants.is_empty() {
        return Err(LedgerError::EmptySplit);
    }

    let mut seen = HashSet::new();
    for participant in participants {
        if participant.weight <= 0 {
            return Err(LedgerError::InvalidShare(format!(
                "weight of \"{}\" must be positive, got {}",
                participant.member, participant.weight
            )));
        }
        if !seen.insert(participant.member.as_str()) {
            return Err(LedgerError::InvalidShare(format!(
                "\"{}\" appears more than once",
                participant.member
            )));
        }
    }

    let total = i128::from(amount.units());
    let total_weight: i128 = participants.iter().map(|p| i128::from(p.weight)).sum();

    let mut units = Vec::with_capacity(participants.len());
    let mut remainders = Vec::with_capacity(participants.len());
    for (index, participant) in participants.iter().enumerate() {
        let scaled = total * i128::from(participant.weight);
        units.push(scaled / total_weight);
        remainders.push((scaled % total_weight, index));
    }

    let assigned: i128 = units.iter().sum();
    let leftover = usize::try_from(total - assigned).map_err(|_| {
        LedgerError::BalanceInconsistency("split produced more than the amount".to_string())
    })?;

    // Largest remainder first, then participant order.
    remainders.sort_by(|(rem_a, idx_a), (rem_b, idx_b)| rem_b.cmp(rem_a).then(idx_a.cmp(idx_b)));
    for &(_, index) in remainders.iter().take(leftover) {
        units[index] += 1;
    }

    participants
        .iter()
        .zip(units)
        .map(|(participant, units)| {
            let units = i64::try_from(units).map_err(|_| {
                LedgerError::InvalidAmount(format!("share of {amount} does not fit"))
            })?;
            Ok(Share {
                member: participant.member.clone(),
                amount: Amount::new(units),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(ids: &[&str]) -> Vec<Member> {
        ids.iter().map(|id| Member::new(*id, id.to_uppercase())).collect()
    }

    fn amounts(shares: &[Share]) -> Vec<i64> {
        shares.iter().map(|s| s.amount.units()).collect()
    }

    #[test]
    fn equal_split_gives_remainder_to_first_members() {
        let shares = split_equal(Amount::new(10000), &members(&["a", "b", "c"])).unwrap();
        assert_eq!(amounts(&shares), vec![3334, 3333, 3333]);

        let shares = split_equal(Amount::new(101), &members(&["a", "b", "c", "d"])).unwrap();
        assert_eq!(amounts(&shares), vec![26, 25, 25, 25]);

        let shares = split_equal(Amount::new(5), &members(&["a", "b", "c", "d", "e", "f", "g"])).unwrap();
        assert_eq!(amounts(&shares), vec![1, 1, 1, 1, 1, 0, 0]);
    }

    #[test]
    fn single_participant_takes_everything() {
        let shares = split_equal(Amount::new(999), &members(&["a"])).unwrap();
        assert_eq!(amounts(&shares), vec![999]);
    }

    #[test]
    fn weighted_split_uses_largest_remainder() {
        // 1000 * 1/6 = 166.67, 1000 * 2/6 = 333.33, 1000 * 3/6 = 500
        let participants = vec![
            Participant::weighted("a", 1),
            Participant::weighted("b", 2),
            Participant::weighted("c", 3),
        ];
        let shares = split_weighted(Amount::new(1000), &participants).unwrap();
        assert_eq!(amounts(&shares), vec![167, 333, 500]);
    }

    #[test]
    fn weighted_ties_fall_back_to_order() {
        let participants = vec![
            Participant::weighted("a", 2),
            Participant::weighted("b", 1),
            Participant::weighted("c", 2),
            Participant::weighted("d", 1),
        ];
        // 7 * 2/6 = 2.33, 7 * 1/6 = 1.17: the leftover unit goes to a, not c
        let shares = split_weighted(Amount::new(7), &participants).unwrap();
        assert_eq!(amounts(&shares), vec![3, 1, 2, 1]);
        assert_eq!(shares.iter().map(|s| s.amount).sum::<Amount>(), Amount::new(7));
    }

    #[test]
    fn huge_amounts_do_not_overflow() {
        let participants = vec![
            Participant::weighted("a", i64::MAX / 2),
            Participant::weighted("b", i64::MAX / 2),
            Participant::weighted("c", 1),
        ];
        let amount = Amount::new(i64::MAX - 1);
        let shares = split_weighted(amount, &participants).unwrap();
        assert_eq!(shares.iter().map(|s| s.amount).sum::<Amount>(), amount);
    }

    #[test]
    fn zero_participants_is_an_empty_split() {
        assert_eq!(split_weighted(Amount::new(100), &[]), Err(LedgerError::EmptySplit));
        assert_eq!(split_equal(Amount::new(100), &[]), Err(LedgerError::EmptySplit));
    }

    #[test]
    fn rejects_bad_weights() {
        for weight in [0, -3] {
            let err = split_weighted(
                Amount::new(100),
                &[Participant::new("a"), Participant::weighted("b", weight)],
            )
            .unwrap_err();
            assert!(matches!(err, LedgerError::InvalidShare(_)));
        }
    }

    #[test]
    fn rejects_duplicate_participants() {
        let err = split_weighted(
            Amount::new(100),
            &[Participant::new("a"), Participant::new("a")],
        )
        .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidShare(_)));
    }

    #[test]
    fn rejects_negative_amounts() {
        let err = split_equal(Amount::new(-1), &members(&["a"])).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }
}
