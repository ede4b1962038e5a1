//! Durable storage behind the ledger.
//!
//! Stores only persist what the service hands them. Every write is
//! conditional on the version the caller read, which is how concurrent
//! writers are kept from overwriting each other.
use async_trait::async_trait;

use crate::{
    balance::BalanceDelta,
    error::ResultLedger,
    schemas::{Expense, Group, GroupListing, GroupState, Member},
};

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed { version: i64 },
    /// The group moved past the expected version.
    Conflict,
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn create_group(&self, group: Group) -> ResultLedger<()>;

    async fn list_groups(&self) -> ResultLedger<Vec<GroupListing>>;

    async fn fetch_group_state(&self, group_id: &str) -> ResultLedger<GroupState>;

    /// Appends `expense` and writes `delta` in a single step, provided the
    /// group is still at `expected_version`.
    async fn commit_expense(
        &self,
        group_id: &str,
        expense: &Expense,
        expected_version: i64,
        delta: &BalanceDelta,
    ) -> ResultLedger<CommitOutcome>;

    async fn add_member(
        &self,
        group_id: &str,
        member: &Member,
        expected_version: i64,
    ) -> ResultLedger<CommitOutcome>;

    async fn remove_member(
        &self,
        group_id: &str,
        member: &Member,
        expected_version: i64,
    ) -> ResultLedger<CommitOutcome>;
}

fn listing(group: &Group) -> ResultLedger<GroupListing> {
    Ok(GroupListing {
        id: group.id.clone(),
        name: group.name.clone(),
        category: group.category,
        members: group.members.len(),
        total_spent: group.total_spent()?,
    })
}
