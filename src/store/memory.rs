use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{listing, CommitOutcome, LedgerStore};
use crate::{
    balance::{BalanceDelta, GroupLedger, LedgerEvent},
    error::{LedgerError, ResultLedger},
    schemas::{Expense, Group, GroupListing, GroupState, Member},
};

/// Keeps every group in process memory. Used by the tests and by
/// `storage = "memory"`.
#[derive(Default)]
pub struct MemoryStore {
    groups: RwLock<HashMap<String, GroupLedger>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn create_group(&self, group: Group) -> ResultLedger<()> {
        let mut groups = self.groups.write().await;
        if groups.contains_key(&group.id) {
            return Err(LedgerError::DuplicateGroup(group.id));
        }
        let ledger = GroupLedger::new(group)?;
        groups.insert(ledger.group().id.clone(), ledger);
        Ok(())
    }

    async fn list_groups(&self) -> ResultLedger<Vec<GroupListing>> {
        let groups = self.groups.read().await;
        let mut listings = groups
            .values()
            .map(|l| listing(l.group()))
            .collect::<ResultLedger<Vec<GroupListing>>>()?;
        listings.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(listings)
    }

    async fn fetch_group_state(&self, group_id: &str) -> ResultLedger<GroupState> {
        self.groups
            .read()
            .await
            .get(group_id)
            .map(GroupLedger::state)
            .ok_or_else(|| LedgerError::GroupNotFound(group_id.to_string()))
    }

    async fn commit_expense(
        &self,
        group_id: &str,
        expense: &Expense,
        expected_version: i64,
        delta: &BalanceDelta,
    ) -> ResultLedger<CommitOutcome> {
        let mut groups = self.groups.write().await;
        let ledger = groups
            .get_mut(group_id)
            .ok_or_else(|| LedgerError::GroupNotFound(group_id.to_string()))?;
        if ledger.version() != expected_version {
            return Ok(CommitOutcome::Conflict);
        }
        ledger.commit(expense.clone(), delta);
        Ok(CommitOutcome::Committed {
            version: ledger.version(),
        })
    }

    async fn add_member(
        &self,
        group_id: &str,
        member: &Member,
        expected_version: i64,
    ) -> ResultLedger<CommitOutcome> {
        self.apply_if_current(
            group_id,
            expected_version,
            LedgerEvent::MemberAdded {
                member: member.clone(),
            },
        )
        .await
    }

    async fn remove_member(
        &self,
        group_id: &str,
        member: &Member,
        expected_version: i64,
    ) -> ResultLedger<CommitOutcome> {
        self.apply_if_current(
            group_id,
            expected_version,
            LedgerEvent::MemberRemoved {
                member: member.id.clone(),
            },
        )
        .await
    }
}

impl MemoryStore {
    async fn apply_if_current(
        &self,
        group_id: &str,
        expected_version: i64,
        event: LedgerEvent,
    ) -> ResultLedger<CommitOutcome> {
        let mut groups = self.groups.write().await;
        let ledger = groups
            .get_mut(group_id)
            .ok_or_else(|| LedgerError::GroupNotFound(group_id.to_string()))?;
        if ledger.version() != expected_version {
            return Ok(CommitOutcome::Conflict);
        }
        ledger.apply(event)?;
        Ok(CommitOutcome::Committed {
            version: ledger.version(),
        })
    }
}
