//! The pairwise obligation matrix of a group and the only code allowed to
//! change it.
//!
//! [`BalanceMatrix`] stores `owes(debtor, creditor)` for the direction that is
//! positive and nothing for the other one. Every update goes through
//! [`BalanceMatrix::apply_expense`], which validates the expense, splits it and
//! rewrites all the affected pairs in one step.
//!
//! [`GroupLedger`] bundles the matrix with its group and folds
//! [`LedgerEvent`]s into it, so that whoever owns a live subscription only has
//! to feed events in.
use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{
    error::{LedgerError, ResultLedger},
    money::Amount,
    schemas::{BalanceEntry, Expense, ExpenseKind, Group, GroupState, Member, MemberId},
    split::{split_weighted, Share},
};

/// Key of the matrix: `debtor` owes `creditor`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Debt {
    pub debtor: MemberId,
    pub creditor: MemberId,
}

/// New value of one member pair after an expense.
///
/// `amount` is zero when the pair ends up even, in which case the two ids
/// are in lexical order.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct PairChange {
    pub debtor: MemberId,
    pub creditor: MemberId,
    pub amount: Amount,
}

/// What applying a single expense does to the matrix.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BalanceDelta {
    pub shares: Vec<Share>,
    pub changes: Vec<PairChange>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BalanceMatrix {
    entries: BTreeMap<Debt, Amount>,
}

fn debt(debtor: &str, creditor: &str) -> Debt {
    Debt {
        debtor: debtor.to_string(),
        creditor: creditor.to_string(),
    }
}

fn unordered<'a>(a: &'a str, b: &'a str) -> (&'a str, &'a str) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

// Names the first member whose total owed or receivable leaves the `i64` range.
fn check_member_totals<'a>(entries: impl Iterator<Item = (&'a str, &'a str, Amount)>) -> Result<(), String> {
    let mut owed: HashMap<&str, Amount> = HashMap::new();
    let mut receivable: HashMap<&str, Amount> = HashMap::new();
    for (debtor, creditor, amount) in entries {
        let total = owed.entry(debtor).or_default();
        *total = total
            .checked_add(amount)
            .ok_or_else(|| format!("total owed by {debtor} overflows"))?;
        let total = receivable.entry(creditor).or_default();
        *total = total
            .checked_add(amount)
            .ok_or_else(|| format!("total owed to {creditor} overflows"))?;
    }
    Ok(())
}

fn require_member(members: &[Member], id: &str) -> ResultLedger<()> {
    if members.iter().any(|m| m.id == id) {
        Ok(())
    } else {
        Err(LedgerError::UnknownMember(id.to_string()))
    }
}

impl BalanceMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a matrix from stored entries.
    ///
    /// Stored entries must be positive and hold a single direction per pair,
    /// anything else means the store is corrupt.
    pub fn from_entries(entries: impl IntoIterator<Item = BalanceEntry>) -> ResultLedger<Self> {
        let mut matrix = Self::new();
        for entry in entries {
            if !entry.amount.is_positive() || entry.debtor == entry.creditor {
                return Err(LedgerError::BalanceInconsistency(format!(
                    "invalid stored entry {} -> {}: {}",
                    entry.debtor, entry.creditor, entry.amount
                )));
            }
            if matrix.entries.contains_key(&debt(&entry.creditor, &entry.debtor)) {
                return Err(LedgerError::BalanceInconsistency(format!(
                    "{} and {} owe each other at the same time",
                    entry.debtor, entry.creditor
                )));
            }
            let key = debt(&entry.debtor, &entry.creditor);
            if matrix.entries.insert(key, entry.amount).is_some() {
                return Err(LedgerError::BalanceInconsistency(format!(
                    "duplicate entry {} -> {}",
                    entry.debtor, entry.creditor
                )));
            }
        }
        check_member_totals(
            matrix
                .entries
                .iter()
                .map(|(key, amount)| (key.debtor.as_str(), key.creditor.as_str(), *amount)),
        )
        .map_err(LedgerError::BalanceInconsistency)?;
        Ok(matrix)
    }

    /// Replays `expenses` from an empty matrix.
    pub fn replay(members: &[Member], expenses: &[Expense]) -> ResultLedger<Self> {
        let mut matrix = Self::new();
        for expense in expenses {
            matrix.apply_expense(expense, members)?;
        }
        Ok(matrix)
    }

    pub fn entries(&self) -> Vec<BalanceEntry> {
        self.entries
            .iter()
            .map(|(key, amount)| BalanceEntry {
                debtor: key.debtor.clone(),
                creditor: key.creditor.clone(),
                amount: *amount,
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// How much `debtor` currently owes `creditor`.
    pub fn owes(&self, debtor: &str, creditor: &str) -> Amount {
        self.entries
            .get(&debt(debtor, creditor))
            .copied()
            .unwrap_or(Amount::ZERO)
    }

    /// `owes(a, b) - owes(b, a)`.
    pub fn net_balance(&self, a: &str, b: &str) -> Amount {
        self.owes(a, b) - self.owes(b, a)
    }

    /// Everything `member` owes to others.
    pub fn total_owed(&self, member: &str) -> ResultLedger<Amount> {
        Amount::checked_sum(
            self.entries
                .iter()
                .filter(|(key, _)| key.debtor == member)
                .map(|(_, amount)| *amount),
        )
        .ok_or_else(|| LedgerError::BalanceInconsistency(format!("total owed by {member} overflows")))
    }

    /// Everything others owe to `member`.
    pub fn total_receivable(&self, member: &str) -> ResultLedger<Amount> {
        Amount::checked_sum(
            self.entries
                .iter()
                .filter(|(key, _)| key.creditor == member)
                .map(|(_, amount)| *amount),
        )
        .ok_or_else(|| LedgerError::BalanceInconsistency(format!("total owed to {member} overflows")))
    }

    /// Net amount the rest of the group owes to `member`.
    pub fn net(&self, member: &str) -> ResultLedger<Amount> {
        // Both totals are non-negative, so the difference always fits.
        Ok(self.total_receivable(member)? - self.total_owed(member)?)
    }

    /// `true` when `member` appears in any entry.
    pub fn involves(&self, member: &str) -> bool {
        self.entries
            .keys()
            .any(|key| key.debtor == member || key.creditor == member)
    }

    /// Ids appearing anywhere in the matrix.
    pub fn parties(&self) -> HashSet<&str> {
        self.entries
            .keys()
            .flat_map(|key| [key.debtor.as_str(), key.creditor.as_str()])
            .collect()
    }

    /// Computes what `expense` would do to the matrix without touching it.
    ///
    /// The payer, the recorder and every participant must be in `members`, and
    /// the amount must be positive. The expense is refused with
    /// [`LedgerError::InvalidAmount`] if a pair balance or a member's total
    /// owed or receivable would no longer fit in an `i64`.
    pub fn delta_for_expense(&self, expense: &Expense, members: &[Member]) -> ResultLedger<BalanceDelta> {
        expense.amount.ensure_positive()?;
        require_member(members, &expense.paid_by)?;
        require_member(members, &expense.created_by)?;
        for participant in &expense.participants {
            require_member(members, &participant.member)?;
        }
        if expense.kind == ExpenseKind::Settlement {
            match expense.participants.as_slice() {
                [receiver] if receiver.member != expense.paid_by => {}
                _ => {
                    return Err(LedgerError::InvalidShare(
                        "a settlement goes from the payer to exactly one other member".to_string(),
                    ))
                }
            }
        }

        let shares = split_weighted(expense.amount, &expense.participants)?;

        // Signed value per unordered pair: positive means `lo` owes `hi`.
        let mut pairs: BTreeMap<(&str, &str), Amount> = BTreeMap::new();
        let payer = expense.paid_by.as_str();
        for share in &shares {
            let member = share.member.as_str();
            if member == payer || share.amount.is_zero() {
                continue;
            }
            let (lo, hi, owed) = if member < payer {
                (member, payer, share.amount)
            } else {
                (payer, member, -share.amount)
            };
            let current = match pairs.get(&(lo, hi)) {
                Some(value) => *value,
                None => self.net_balance(lo, hi),
            };
            let updated = current.checked_add(owed).ok_or_else(|| {
                LedgerError::InvalidAmount(format!("balance between {lo} and {hi} overflows"))
            })?;
            pairs.insert((lo, hi), updated);
        }

        let changes = pairs
            .into_iter()
            .map(|((lo, hi), value)| {
                if value.is_negative() {
                    PairChange {
                        debtor: hi.to_string(),
                        creditor: lo.to_string(),
                        amount: -value,
                    }
                } else {
                    PairChange {
                        debtor: lo.to_string(),
                        creditor: hi.to_string(),
                        amount: value,
                    }
                }
            })
            .collect::<Vec<_>>();
        self.ensure_totals_fit(&changes)?;

        Ok(BalanceDelta { shares, changes })
    }

    fn ensure_totals_fit(&self, changes: &[PairChange]) -> ResultLedger<()> {
        let touched: HashSet<(&str, &str)> = changes
            .iter()
            .map(|c| unordered(&c.debtor, &c.creditor))
            .collect();
        let kept = self
            .entries
            .iter()
            .filter(|(key, _)| !touched.contains(&unordered(&key.debtor, &key.creditor)))
            .map(|(key, amount)| (key.debtor.as_str(), key.creditor.as_str(), *amount));
        let written = changes
            .iter()
            .filter(|c| c.amount.is_positive())
            .map(|c| (c.debtor.as_str(), c.creditor.as_str(), c.amount));
        check_member_totals(kept.chain(written)).map_err(LedgerError::InvalidAmount)
    }

    /// Applies `expense` to the matrix: for every participant other than the
    /// payer, `owes(participant, payer)` grows by the participant's share,
    /// netted against the opposite direction.
    ///
    /// On error the matrix is left untouched.
    pub fn apply_expense(&mut self, expense: &Expense, members: &[Member]) -> ResultLedger<BalanceDelta> {
        let delta = self.delta_for_expense(expense, members)?;
        self.apply_delta(&delta);
        Ok(delta)
    }

    /// Writes a delta computed by [`Self::delta_for_expense`] against this
    /// same matrix.
    pub(crate) fn apply_delta(&mut self, delta: &BalanceDelta) {
        for change in &delta.changes {
            self.entries.remove(&debt(&change.creditor, &change.debtor));
            if change.amount.is_positive() {
                self.entries
                    .insert(debt(&change.debtor, &change.creditor), change.amount);
            } else {
                self.entries.remove(&debt(&change.debtor, &change.creditor));
            }
        }
    }
}

/// A change pushed by the ledger store.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    MemberAdded { member: Member },
    MemberRemoved { member: MemberId },
    ExpenseRecorded { expense: Expense },
}

/// In-memory view of one group: membership, history and balances.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupLedger {
    group: Group,
    balances: BalanceMatrix,
    version: i64,
}

impl GroupLedger {
    /// Starts a ledger for `group`, replaying any expenses it already has.
    pub fn new(group: Group) -> ResultLedger<Self> {
        let balances = BalanceMatrix::replay(&group.known_members(), &group.expenses)?;
        Ok(Self {
            group,
            balances,
            version: 0,
        })
    }

    pub fn from_state(state: GroupState) -> ResultLedger<Self> {
        Ok(Self {
            balances: BalanceMatrix::from_entries(state.balances)?,
            group: state.group,
            version: state.version,
        })
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn balances(&self) -> &BalanceMatrix {
        &self.balances
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn state(&self) -> GroupState {
        GroupState {
            group: self.group.clone(),
            balances: self.balances.entries(),
            version: self.version,
        }
    }

    /// Sum of the shared expenses `member` paid for. Settlements are not
    /// spending and are left out.
    pub fn total_paid(&self, member: &str) -> ResultLedger<Amount> {
        Amount::checked_sum(
            self.group
                .expenses
                .iter()
                .filter(|e| e.kind == ExpenseKind::Expense && e.paid_by == member)
                .map(|e| e.amount),
        )
        .ok_or_else(|| LedgerError::BalanceInconsistency(format!("total paid by {member} overflows")))
    }

    /// Validates `expense` against the current members and balances and
    /// computes its delta. Shared expenses are also refused once the group's
    /// total spending would overflow.
    pub fn delta_for_expense(&self, expense: &Expense) -> ResultLedger<BalanceDelta> {
        let delta = self
            .balances
            .delta_for_expense(expense, &self.group.members)?;
        if expense.kind == ExpenseKind::Expense
            && self.group.total_spent()?.checked_add(expense.amount).is_none()
        {
            return Err(LedgerError::InvalidAmount(format!(
                "total spent in group \"{}\" overflows",
                self.group.id
            )));
        }
        Ok(delta)
    }

    /// Checks the incrementally maintained matrix against a full replay.
    pub fn verify(&self) -> ResultLedger<()> {
        let replayed = BalanceMatrix::replay(&self.group.known_members(), &self.group.expenses)?;
        if replayed == self.balances {
            Ok(())
        } else {
            Err(LedgerError::BalanceInconsistency(format!(
                "stored balances of group \"{}\" differ from its expense history",
                self.group.id
            )))
        }
    }

    /// `true` when `member` neither owes nor is owed anything.
    pub fn is_settled(&self, member: &str) -> bool {
        !self.balances.involves(member)
    }

    /// Folds one event into the ledger. Nothing changes if it fails.
    pub fn apply(&mut self, event: LedgerEvent) -> ResultLedger<()> {
        match event {
            LedgerEvent::MemberAdded { member } => {
                if self.group.is_member(&member.id) {
                    return Err(LedgerError::DuplicateMember(member.id));
                }
                self.group.former_members.retain(|m| m.id != member.id);
                self.group.members.push(member);
            }
            LedgerEvent::MemberRemoved { member } => {
                if !self.group.is_member(&member) {
                    return Err(LedgerError::UnknownMember(member));
                }
                if !self.is_settled(&member) {
                    return Err(LedgerError::MemberHasBalance(member));
                }
                if self.group.members.len() == 1 {
                    return Err(LedgerError::LastMember(member));
                }
                if let Some(index) = self.group.members.iter().position(|m| m.id == member) {
                    let removed = self.group.members.remove(index);
                    self.group.former_members.push(removed);
                }
            }
            LedgerEvent::ExpenseRecorded { expense } => {
                let delta = self.delta_for_expense(&expense)?;
                self.commit(expense, &delta);
                return Ok(());
            }
        }
        self.version += 1;
        Ok(())
    }

    /// Stores an expense together with the delta computed for it.
    pub(crate) fn commit(&mut self, expense: Expense, delta: &BalanceDelta) {
        self.balances.apply_delta(delta);
        self.group.expenses.push(expense);
        self.version += 1;
    }
}
