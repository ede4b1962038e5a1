use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, to_bson},
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client, Collection, IndexModel,
};
use serde::{Deserialize, Serialize};

use super::{listing, CommitOutcome, LedgerStore};
use crate::{
    balance::{BalanceDelta, BalanceMatrix, GroupLedger},
    error::{LedgerError, ResultLedger},
    schemas::{BalanceEntry, Category, Expense, Group, GroupListing, GroupState, Member},
};

/// One group per document, with its balances and version inline so that a
/// single `update_one` covers a whole expense.
#[derive(Clone, Debug, Deserialize, Serialize)]
struct GroupDocument {
    id: String,
    name: String,
    #[serde(default)]
    category: Category,
    members: Vec<Member>,
    #[serde(default)]
    former_members: Vec<Member>,
    #[serde(default)]
    expenses: Vec<Expense>,
    #[serde(default)]
    balances: Vec<BalanceEntry>,
    #[serde(default)]
    balance_version: i64,
}

impl From<GroupDocument> for GroupState {
    fn from(document: GroupDocument) -> Self {
        GroupState {
            group: Group {
                id: document.id,
                name: document.name,
                category: document.category,
                members: document.members,
                former_members: document.former_members,
                expenses: document.expenses,
            },
            balances: document.balances,
            version: document.balance_version,
        }
    }
}

impl From<GroupState> for GroupDocument {
    fn from(state: GroupState) -> Self {
        GroupDocument {
            id: state.group.id,
            name: state.group.name,
            category: state.group.category,
            members: state.group.members,
            former_members: state.group.former_members,
            expenses: state.group.expenses,
            balances: state.balances,
            balance_version: state.version,
        }
    }
}

pub struct MongoStore {
    groups: Collection<GroupDocument>,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> ResultLedger<Self> {
        let client = Client::with_uri_str(uri).await?;
        let groups = client.database(database).collection::<GroupDocument>("Groups");
        let index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        groups.create_index(index, None).await?;
        tracing::info!(database, "connected to MongoDB");
        Ok(Self { groups })
    }

    async fn find(&self, group_id: &str) -> ResultLedger<GroupDocument> {
        self.groups
            .find_one(doc! { "id": group_id }, None)
            .await?
            .ok_or_else(|| LedgerError::GroupNotFound(group_id.to_string()))
    }
}

#[async_trait]
impl LedgerStore for MongoStore {
    async fn create_group(&self, group: Group) -> ResultLedger<()> {
        let id = group.id.clone();
        let state = GroupLedger::new(group)?.state();
        match self.groups.insert_one(GroupDocument::from(state), None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(LedgerError::DuplicateGroup(id)),
            Err(err) => Err(err.into()),
        }
    }

    async fn list_groups(&self) -> ResultLedger<Vec<GroupListing>> {
        let documents: Vec<GroupDocument> = self.groups.find(None, None).await?.try_collect().await?;
        documents
            .into_iter()
            .map(|d| listing(&GroupState::from(d).group))
            .collect()
    }

    async fn fetch_group_state(&self, group_id: &str) -> ResultLedger<GroupState> {
        Ok(self.find(group_id).await?.into())
    }

    async fn commit_expense(
        &self,
        group_id: &str,
        expense: &Expense,
        expected_version: i64,
        delta: &BalanceDelta,
    ) -> ResultLedger<CommitOutcome> {
        let current = self.find(group_id).await?;
        if current.balance_version != expected_version {
            return Ok(CommitOutcome::Conflict);
        }

        let mut balances = BalanceMatrix::from_entries(current.balances)?;
        balances.apply_delta(delta);

        // The version in the filter makes this a compare-and-swap.
        let result = self
            .groups
            .update_one(
                doc! { "id": group_id, "balance_version": expected_version },
                doc! {
                    "$push": { "expenses": to_bson(expense)? },
                    "$set": { "balances": to_bson(&balances.entries())? },
                    "$inc": { "balance_version": 1_i64 },
                },
                None,
            )
            .await?;

        if result.matched_count == 0 {
            return Ok(CommitOutcome::Conflict);
        }
        Ok(CommitOutcome::Committed {
            version: expected_version + 1,
        })
    }

    async fn add_member(
        &self,
        group_id: &str,
        member: &Member,
        expected_version: i64,
    ) -> ResultLedger<CommitOutcome> {
        let result = self
            .groups
            .update_one(
                doc! {
                    "id": group_id,
                    "balance_version": expected_version,
                    "members.id": { "$ne": member.id.as_str() },
                },
                doc! {
                    "$push": { "members": to_bson(member)? },
                    "$pull": { "former_members": { "id": member.id.as_str() } },
                    "$inc": { "balance_version": 1_i64 },
                },
                None,
            )
            .await?;
        Ok(outcome(result.matched_count, expected_version))
    }

    async fn remove_member(
        &self,
        group_id: &str,
        member: &Member,
        expected_version: i64,
    ) -> ResultLedger<CommitOutcome> {
        let result = self
            .groups
            .update_one(
                doc! {
                    "id": group_id,
                    "balance_version": expected_version,
                    "members.id": member.id.as_str(),
                },
                doc! {
                    "$pull": { "members": { "id": member.id.as_str() } },
                    "$push": { "former_members": to_bson(member)? },
                    "$inc": { "balance_version": 1_i64 },
                },
                None,
            )
            .await?;
        Ok(outcome(result.matched_count, expected_version))
    }
}

const DUPLICATE_KEY: i32 = 11000;

// Raised by the unique index on `id` when two creates race.
fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY
    )
}

fn outcome(matched: u64, expected_version: i64) -> CommitOutcome {
    if matched == 0 {
        CommitOutcome::Conflict
    } else {
        CommitOutcome::Committed {
            version: expected_version + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::{
        money::Amount,
        schemas::{ExpenseKind, Participant},
    };

    #[test]
    fn document_round_trips_through_bson() {
        let mut group = Group::new("g", "Roommates", Category::Home, Member::new("a", "Asha"));
        group.members.push(Member::new("b", "Bilal"));
        group.expenses.push(Expense {
            id: "e1".into(),
            description: "Groceries".into(),
            amount: Amount::new(1250),
            kind: ExpenseKind::Expense,
            paid_by: "a".into(),
            participants: vec![Participant::new("a"), Participant::weighted("b", 3)],
            created_by: "b".into(),
            created_at: Utc::now(),
        });
        let state = GroupState {
            group,
            balances: vec![BalanceEntry {
                debtor: "b".into(),
                creditor: "a".into(),
                amount: Amount::new(938),
            }],
            version: 7,
        };

        let bson = to_bson(&GroupDocument::from(state.clone())).unwrap();
        let document = bson.as_document().unwrap();
        assert_eq!(document.get_i64("balance_version").unwrap(), 7);
        assert_eq!(document.get_str("category").unwrap(), "home");

        let back: GroupDocument = mongodb::bson::from_bson(bson).unwrap();
        assert_eq!(GroupState::from(back), state);
    }

    // Needs a MongoDB server, `MONGODB_URI` or localhost.
    #[tokio::test]
    #[ignore]
    async fn racing_creates_report_a_duplicate_group() {
        let uri = std::env::var("MONGODB_URI").unwrap_or_else(|_| "mongodb://localhost:27017".to_string());
        let database = format!("opensplit_test_{}", mongodb::bson::oid::ObjectId::new().to_hex());
        let store = MongoStore::connect(&uri, &database).await.unwrap();

        let group = || Group::new("flat", "Roommates", Category::Home, Member::new("a", "Asha"));
        let (first, second) = tokio::join!(store.create_group(group()), store.create_group(group()));
        let mut results = vec![first, second];
        results.sort_by_key(|r| r.is_err());
        assert_eq!(results[0], Ok(()));
        assert_eq!(results[1], Err(LedgerError::DuplicateGroup("flat".to_string())));

        let listings = store.list_groups().await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].total_spent, Amount::ZERO);

        let client = Client::with_uri_str(&uri).await.unwrap();
        client.database(&database).drop(None).await.unwrap();
    }
}
