//! The operations exposed to callers, built on top of a [`LedgerStore`].
//!
//! Reads fetch a fresh [`GroupState`], rebuild a [`GroupLedger`] from it and
//! compute on that. Writes compute their change on the fetched state and hand
//! it to the store as a conditional commit. When the commit reports a
//! conflict the whole operation starts over from a new read.
use std::sync::Arc;

use bson::oid::ObjectId;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    balance::{GroupLedger, LedgerEvent, PairChange},
    error::{LedgerError, ResultLedger},
    exchange::get_settlement_plan,
    money::Amount,
    schemas::{
        BalanceEntry, Category, Expense, ExpenseDraft, ExpenseKind, Group, GroupListing,
        GroupState, Member, Participant, SettlementTransfer,
    },
    settings,
    split::Share,
    store::{CommitOutcome, LedgerStore},
    summary::{group_summary, GroupSummary},
};

/// Result of recording an expense.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AppliedExpense {
    pub expense: Expense,
    pub shares: Vec<Share>,
    pub changes: Vec<PairChange>,
    pub version: i64,
}

pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    max_commit_retries: u32,
    verify_on_read: bool,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            max_commit_retries: 3,
            verify_on_read: true,
        }
    }

    pub fn with_settings(store: Arc<dyn LedgerStore>, settings: &settings::Ledger) -> Self {
        Self::new(store)
            .max_commit_retries(settings.max_commit_retries)
            .verify_on_read(settings.verify_on_read)
    }

    pub fn max_commit_retries(mut self, retries: u32) -> Self {
        self.max_commit_retries = retries;
        self
    }

    pub fn verify_on_read(mut self, verify: bool) -> Self {
        self.verify_on_read = verify;
        self
    }

    async fn load(&self, group_id: &str) -> ResultLedger<GroupLedger> {
        let state = self.store.fetch_group_state(group_id).await?;
        let ledger = GroupLedger::from_state(state).and_then(|ledger| {
            if self.verify_on_read {
                ledger.verify()?;
            }
            Ok(ledger)
        });
        if let Err(LedgerError::BalanceInconsistency(reason)) = &ledger {
            tracing::error!(group_id, reason, "stored balances are inconsistent");
        }
        ledger
    }

    /// Bumps the attempt counter after a conflict, failing once retries run out.
    fn retry_after_conflict(&self, group_id: &str, attempt: &mut u32) -> ResultLedger<()> {
        *attempt += 1;
        if *attempt > self.max_commit_retries {
            tracing::warn!(group_id, attempts = *attempt, "giving up after repeated conflicts");
            return Err(LedgerError::Conflict(group_id.to_string()));
        }
        tracing::debug!(group_id, attempt = *attempt, "write conflict, retrying from a fresh read");
        Ok(())
    }

    pub async fn create_group(
        &self,
        id: &str,
        name: &str,
        category: Category,
        creator: Member,
    ) -> ResultLedger<GroupState> {
        let group = Group::new(id, name, category, creator);
        self.store.create_group(group).await?;
        tracing::info!(group_id = id, "group created");
        self.store.fetch_group_state(id).await
    }

    pub async fn list_groups(&self) -> ResultLedger<Vec<GroupListing>> {
        self.store.list_groups().await
    }

    pub async fn get_group(&self, group_id: &str) -> ResultLedger<Group> {
        Ok(self.store.fetch_group_state(group_id).await?.group)
    }

    pub async fn add_member(&self, group_id: &str, member: Member) -> ResultLedger<Group> {
        let mut attempt = 0;
        loop {
            let mut ledger = self.load(group_id).await?;
            let version = ledger.version();
            ledger.apply(LedgerEvent::MemberAdded {
                member: member.clone(),
            })?;
            match self.store.add_member(group_id, &member, version).await? {
                CommitOutcome::Committed { .. } => {
                    tracing::info!(group_id, member = member.id, "member added");
                    return Ok(ledger.group().clone());
                }
                CommitOutcome::Conflict => self.retry_after_conflict(group_id, &mut attempt)?,
            }
        }
    }

    /// Removes a member who is fully settled with everyone else.
    pub async fn remove_member(&self, group_id: &str, member_id: &str) -> ResultLedger<Group> {
        let mut attempt = 0;
        loop {
            let mut ledger = self.load(group_id).await?;
            let version = ledger.version();
            let member = ledger
                .group()
                .member(member_id)
                .cloned()
                .ok_or_else(|| LedgerError::UnknownMember(member_id.to_string()))?;
            ledger.apply(LedgerEvent::MemberRemoved {
                member: member.id.clone(),
            })?;
            match self.store.remove_member(group_id, &member, version).await? {
                CommitOutcome::Committed { .. } => {
                    tracing::info!(group_id, member = member_id, "member removed");
                    return Ok(ledger.group().clone());
                }
                CommitOutcome::Conflict => self.retry_after_conflict(group_id, &mut attempt)?,
            }
        }
    }

    /// Splits `draft` between its participants and commits it together with
    /// the balance changes it causes.
    pub async fn record_expense(&self, group_id: &str, draft: ExpenseDraft) -> ResultLedger<AppliedExpense> {
        let id = ObjectId::new().to_hex();
        let created_at = Utc::now();
        let mut attempt = 0;
        loop {
            let ledger = self.load(group_id).await?;
            let expense = draft.clone().into_expense(id.clone(), ledger.group(), created_at);
            let applied = self.commit(&ledger, expense).await?;
            match applied {
                Some(applied) => return Ok(applied),
                None => self.retry_after_conflict(group_id, &mut attempt)?,
            }
        }
    }

    /// Records that `from` paid `to` back `amount`.
    pub async fn record_settlement(
        &self,
        group_id: &str,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> ResultLedger<AppliedExpense> {
        amount.ensure_positive()?;
        let id = ObjectId::new().to_hex();
        let created_at = Utc::now();
        let mut attempt = 0;
        loop {
            let ledger = self.load(group_id).await?;
            let expense = Expense {
                id: id.clone(),
                description: format!("{from} paid {to}"),
                amount,
                kind: ExpenseKind::Settlement,
                paid_by: from.to_string(),
                participants: vec![Participant::new(to)],
                created_by: from.to_string(),
                created_at,
            };
            match self.commit(&ledger, expense).await? {
                Some(applied) => return Ok(applied),
                None => self.retry_after_conflict(group_id, &mut attempt)?,
            }
        }
    }

    // `None` when the store reported a conflict.
    async fn commit(&self, ledger: &GroupLedger, expense: Expense) -> ResultLedger<Option<AppliedExpense>> {
        let group = ledger.group();
        let delta = ledger.delta_for_expense(&expense)?;
        let outcome = self
            .store
            .commit_expense(&group.id, &expense, ledger.version(), &delta)
            .await?;
        Ok(match outcome {
            CommitOutcome::Committed { version } => {
                tracing::info!(
                    group_id = group.id,
                    expense_id = expense.id,
                    amount = %expense.amount,
                    paid_by = expense.paid_by,
                    version,
                    "expense recorded"
                );
                Some(AppliedExpense {
                    expense,
                    shares: delta.shares,
                    changes: delta.changes,
                    version,
                })
            }
            CommitOutcome::Conflict => None,
        })
    }

    pub async fn get_summary(&self, group_id: &str) -> ResultLedger<GroupSummary> {
        let ledger = self.load(group_id).await?;
        group_summary(&ledger)
    }

    pub async fn get_settlement_plan(&self, group_id: &str) -> ResultLedger<Vec<SettlementTransfer>> {
        let ledger = self.load(group_id).await?;
        let plan = get_settlement_plan(ledger.balances(), &ledger.group().known_members());
        if let Err(LedgerError::BalanceInconsistency(reason)) = &plan {
            tracing::error!(group_id, reason, "cannot settle inconsistent balances");
        }
        plan
    }

    pub async fn get_balances(&self, group_id: &str) -> ResultLedger<Vec<BalanceEntry>> {
        Ok(self.load(group_id).await?.balances().entries())
    }

    pub async fn get_expenses(&self, group_id: &str) -> ResultLedger<Vec<Expense>> {
        Ok(self.load(group_id).await?.group().expenses.clone())
    }
}
