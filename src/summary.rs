use serde::{Deserialize, Serialize};

use crate::{
    balance::GroupLedger,
    error::ResultLedger,
    money::Amount,
    schemas::{Category, GroupId, MemberId},
};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct MemberSummary {
    pub member: MemberId,
    pub name: String,
    /// Shared expenses this member paid for.
    pub paid: Amount,
    /// What this member still owes the others.
    pub owed: Amount,
    /// What the others still owe this member.
    pub receivable: Amount,
    pub net: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct GroupSummary {
    pub group: GroupId,
    pub name: String,
    pub category: Category,
    pub total_spent: Amount,
    pub members: Vec<MemberSummary>,
}

/// Per-member totals of a ledger, in member order.
pub fn member_summaries(ledger: &GroupLedger) -> ResultLedger<Vec<MemberSummary>> {
    let balances = ledger.balances();
    ledger
        .group()
        .members
        .iter()
        .map(|member| {
            let owed = balances.total_owed(&member.id)?;
            let receivable = balances.total_receivable(&member.id)?;
            Ok(MemberSummary {
                member: member.id.clone(),
                name: member.name.clone(),
                paid: ledger.total_paid(&member.id)?,
                owed,
                receivable,
                net: receivable - owed,
            })
        })
        .collect()
}

pub fn group_summary(ledger: &GroupLedger) -> ResultLedger<GroupSummary> {
    let group = ledger.group();
    Ok(GroupSummary {
        group: group.id.clone(),
        name: group.name.clone(),
        category: group.category,
        total_spent: group.total_spent()?,
        members: member_summaries(ledger)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        balance::LedgerEvent,
        schemas::{Expense, ExpenseKind, Group, Member, Participant},
    };

    fn ledger() -> GroupLedger {
        let mut ledger = GroupLedger::new(Group::new(
            "goa",
            "Trip to Goa",
            Category::Trip,
            Member::new("a", "Asha"),
        ))
        .unwrap();
        for (id, name) in [("b", "Bilal"), ("c", "Chen")] {
            ledger
                .apply(LedgerEvent::MemberAdded {
                    member: Member::new(id, name),
                })
                .unwrap();
        }
        ledger
    }

    fn record(ledger: &mut GroupLedger, id: &str, amount: i64, paid_by: &str, kind: ExpenseKind, to: &[&str]) {
        let expense = Expense {
            id: id.to_string(),
            description: id.to_string(),
            amount: Amount::new(amount),
            kind,
            paid_by: paid_by.to_string(),
            participants: to.iter().map(|m| Participant::new(*m)).collect(),
            created_by: paid_by.to_string(),
            created_at: Utc::now(),
        };
        ledger.apply(LedgerEvent::ExpenseRecorded { expense }).unwrap();
    }

    #[test]
    fn summary_reports_paid_owed_and_receivable() {
        let mut ledger = ledger();
        record(&mut ledger, "hotel", 10000, "a", ExpenseKind::Expense, &["a", "b", "c"]);
        record(&mut ledger, "taxi", 900, "b", ExpenseKind::Expense, &["a", "b", "c"]);

        let summary = group_summary(&ledger).unwrap();
        assert_eq!(summary.total_spent, Amount::new(10900));

        let a = &summary.members[0];
        assert_eq!(a.paid, Amount::new(10000));
        assert_eq!(a.owed, Amount::ZERO);
        assert_eq!(a.receivable, Amount::new(3033 + 3333));
        assert_eq!(a.net, Amount::new(6366));

        let b = &summary.members[1];
        assert_eq!(b.paid, Amount::new(900));
        assert_eq!(b.owed, Amount::new(3033));
        assert_eq!(b.receivable, Amount::new(300));

        let c = &summary.members[2];
        assert_eq!(c.paid, Amount::ZERO);
        assert_eq!(c.net, Amount::new(-3633));

        let total_net: Amount = summary.members.iter().map(|m| m.net).sum();
        assert_eq!(total_net, Amount::ZERO);
    }

    #[test]
    fn settlements_do_not_count_as_spending() {
        let mut ledger = ledger();
        record(&mut ledger, "dinner", 600, "a", ExpenseKind::Expense, &["a", "b"]);
        record(&mut ledger, "payback", 300, "b", ExpenseKind::Settlement, &["a"]);

        let summary = group_summary(&ledger).unwrap();
        assert_eq!(summary.total_spent, Amount::new(600));
        assert_eq!(summary.members[1].paid, Amount::ZERO);
        assert!(summary.members.iter().all(|m| m.net.is_zero()));
    }
}
