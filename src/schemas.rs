use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{LedgerError, ResultLedger},
    money::Amount,
};

pub type MemberId = String;
pub type GroupId = String;
pub type ExpenseId = String;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
}

impl Member {
    pub fn new(id: impl Into<MemberId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Home,
    Trip,
    Couple,
    Business,
    Entertainment,
    #[default]
    Other,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub category: Category,
    /// Current members, in the order they joined.
    pub members: Vec<Member>,
    /// Members removed after settling up. Old expenses still name them.
    #[serde(default)]
    pub former_members: Vec<Member>,
    #[serde(default)]
    pub expenses: Vec<Expense>,
}

impl Group {
    /// A new group always starts with its creator as the only member.
    pub fn new(
        id: impl Into<GroupId>,
        name: impl Into<String>,
        category: Category,
        creator: Member,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category,
            members: vec![creator],
            former_members: vec![],
            expenses: vec![],
        }
    }

    pub fn member(&self, id: &str) -> Option<&Member> {
        self.members.iter().find(|m| m.id == id)
    }

    pub fn is_member(&self, id: &str) -> bool {
        self.member(id).is_some()
    }

    /// Current members followed by former ones, for replaying old expenses.
    pub fn known_members(&self) -> Vec<Member> {
        self.members
            .iter()
            .chain(self.former_members.iter())
            .cloned()
            .collect()
    }

    /// Sum of the shared expenses. Settlements move money that was already
    /// counted and are left out.
    pub fn total_spent(&self) -> ResultLedger<Amount> {
        Amount::checked_sum(
            self.expenses
                .iter()
                .filter(|e| e.kind == ExpenseKind::Expense)
                .map(|e| e.amount),
        )
        .ok_or_else(|| {
            LedgerError::BalanceInconsistency(format!("total spent in group \"{}\" overflows", self.id))
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpenseKind {
    #[default]
    Expense,
    /// A payment from `paid_by` to the single participant.
    Settlement,
}

fn default_weight() -> i64 {
    1
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Participant {
    pub member: MemberId,
    #[serde(default = "default_weight")]
    pub weight: i64,
}

impl Participant {
    pub fn new(member: impl Into<MemberId>) -> Self {
        Self::weighted(member, 1)
    }

    pub fn weighted(member: impl Into<MemberId>, weight: i64) -> Self {
        Self {
            member: member.into(),
            weight,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Expense {
    pub id: ExpenseId,
    pub description: String,
    pub amount: Amount,
    #[serde(default)]
    pub kind: ExpenseKind,
    pub paid_by: MemberId,
    pub participants: Vec<Participant>,
    pub created_by: MemberId,
    pub created_at: DateTime<Utc>,
}

/// An expense as submitted by a caller, before it gets an id and timestamp.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ExpenseDraft {
    pub description: String,
    pub amount: Amount,
    pub paid_by: MemberId,
    /// Defaults to the payer.
    #[serde(default)]
    pub created_by: Option<MemberId>,
    /// `None` splits equally between every current member.
    #[serde(default)]
    pub participants: Option<Vec<Participant>>,
}

impl ExpenseDraft {
    pub fn equal(description: impl Into<String>, amount: Amount, paid_by: impl Into<MemberId>) -> Self {
        Self {
            description: description.into(),
            amount,
            paid_by: paid_by.into(),
            created_by: None,
            participants: None,
        }
    }

    pub fn with_participants(mut self, participants: Vec<Participant>) -> Self {
        self.participants = Some(participants);
        self
    }

    pub fn recorded_by(mut self, member: impl Into<MemberId>) -> Self {
        self.created_by = Some(member.into());
        self
    }

    /// Fills in the defaults against the current membership and stamps the
    /// expense.
    pub fn into_expense(self, id: ExpenseId, group: &Group, created_at: DateTime<Utc>) -> Expense {
        let participants = self.participants.unwrap_or_else(|| {
            group
                .members
                .iter()
                .map(|m| Participant::new(m.id.clone()))
                .collect()
        });
        Expense {
            id,
            description: self.description,
            amount: self.amount,
            kind: ExpenseKind::Expense,
            created_by: self.created_by.unwrap_or_else(|| self.paid_by.clone()),
            paid_by: self.paid_by,
            participants,
            created_at,
        }
    }
}

/// One stored direction of the obligation matrix: `debtor` owes `creditor`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Deserialize, Serialize)]
pub struct BalanceEntry {
    pub debtor: MemberId,
    pub creditor: MemberId,
    pub amount: Amount,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct SettlementTransfer {
    pub from: MemberId,
    pub to: MemberId,
    pub amount: Amount,
}

/// Everything the ledger needs to know about a group at one point in time.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GroupState {
    pub group: Group,
    pub balances: Vec<BalanceEntry>,
    pub version: i64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GroupListing {
    pub id: GroupId,
    pub name: String,
    pub category: Category,
    pub members: usize,
    pub total_spent: Amount,
}
