//! Turns a group's obligation matrix into the transfers that settle it.
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::{
    balance::BalanceMatrix,
    error::{LedgerError, ResultLedger},
    money::Amount,
    schemas::{Member, MemberId, SettlementTransfer},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PersonalBalance {
    pub id: MemberId,
    /// Positive when the group owes this member, negative when they owe it.
    pub balance: Amount,
}

/// Net position of every member, in member order.
///
/// Fails if the matrix mentions someone outside `members` or if the positions
/// do not cancel out.
pub fn net_positions(matrix: &BalanceMatrix, members: &[Member]) -> ResultLedger<Vec<PersonalBalance>> {
    if let Some(stranger) = matrix
        .parties()
        .into_iter()
        .find(|id| !members.iter().any(|m| m.id == *id))
    {
        return Err(LedgerError::BalanceInconsistency(format!(
            "balances mention \"{stranger}\" who is not in the group"
        )));
    }

    let positions = members
        .iter()
        .map(|m| {
            Ok(PersonalBalance {
                id: m.id.clone(),
                balance: matrix.net(&m.id)?,
            })
        })
        .collect::<ResultLedger<Vec<_>>>()?;

    let residual: i128 = positions
        .iter()
        .map(|p| i128::from(p.balance.units()))
        .sum();
    if residual != 0 {
        return Err(LedgerError::BalanceInconsistency(format!(
            "net positions sum to {residual} instead of zero"
        )));
    }
    Ok(positions)
}

// The exchanges that will be made if no simplification happens
fn get_naive_exchanges(matrix: &BalanceMatrix) -> Vec<SettlementTransfer> {
    matrix
        .entries()
        .into_iter()
        .map(|entry| SettlementTransfer {
            from: entry.debtor,
            to: entry.creditor,
            amount: entry.amount,
        })
        .collect()
}

type Party = (Amount, Reverse<usize>);

// Greedily matches the biggest debtor with the biggest creditor
fn get_simplified_exchanges(positions: &[PersonalBalance]) -> ResultLedger<Vec<SettlementTransfer>> {
    // Ties go to whoever comes first in member order.
    let mut payers: BinaryHeap<Party> = BinaryHeap::new();
    let mut receivers: BinaryHeap<Party> = BinaryHeap::new();
    for (order, person) in positions.iter().enumerate() {
        if person.balance.is_negative() {
            let debt = person.balance.checked_abs().ok_or_else(|| {
                LedgerError::BalanceInconsistency(format!("debt of \"{}\" is out of range", person.id))
            })?;
            payers.push((debt, Reverse(order)));
        } else if person.balance.is_positive() {
            receivers.push((person.balance, Reverse(order)));
        }
    }

    let mut exchanges = Vec::new();
    loop {
        let (payer, receiver) = match (payers.pop(), receivers.pop()) {
            (Some(payer), Some(receiver)) => (payer, receiver),
            (None, None) => break,
            (payer, receiver) => {
                let (left, Reverse(order)) = payer.or(receiver).unwrap_or((Amount::ZERO, Reverse(0)));
                return Err(LedgerError::BalanceInconsistency(format!(
                    "{left} left unsettled for \"{}\"",
                    positions[order].id
                )));
            }
        };
        let (debt, Reverse(payer_order)) = payer;
        let (credit, Reverse(receiver_order)) = receiver;

        let amount = debt.min(credit);
        exchanges.push(SettlementTransfer {
            from: positions[payer_order].id.clone(),
            to: positions[receiver_order].id.clone(),
            amount,
        });

        if debt > amount {
            payers.push((debt - amount, Reverse(payer_order)));
        }
        if credit > amount {
            receivers.push((credit - amount, Reverse(receiver_order)));
        }
    }
    Ok(exchanges)
}

/// Minimal list of transfers that brings every member's net position to zero.
///
/// `members` fixes the tie-break order and must cover every id in the matrix.
pub fn get_settlement_plan(matrix: &BalanceMatrix, members: &[Member]) -> ResultLedger<Vec<SettlementTransfer>> {
    let positions = net_positions(matrix, members)?;
    let simplified = get_simplified_exchanges(&positions)?;
    let naive = get_naive_exchanges(matrix);

    // We ensure the simplification didn't accidentally end up being
    // more complicated than the direct debts
    if naive.len() < simplified.len() {
        Ok(naive)
    } else {
        Ok(simplified)
    }
}
