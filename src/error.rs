//! Errors the ledger can return.
//!
//! Every variant except [`Conflict`] is terminal for the operation that raised
//! it. [`Conflict`] means a conditional write lost a race and the whole
//! operation can be retried from a fresh read. [`BalanceInconsistency`] means
//! the stored bookkeeping is corrupt and must never be corrected silently.
//!
//! [`Conflict`]: LedgerError::Conflict
//! [`BalanceInconsistency`]: LedgerError::BalanceInconsistency
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Cannot split an expense between zero participants")]
    EmptySplit,
    #[error("Invalid share: {0}")]
    InvalidShare(String),
    #[error("\"{0}\" is not a member of the group")]
    UnknownMember(String),
    #[error("Balance inconsistency: {0}")]
    BalanceInconsistency(String),
    #[error("Group \"{0}\" was modified concurrently")]
    Conflict(String),
    #[error("Group \"{0}\" not found")]
    GroupNotFound(String),
    #[error("Group \"{0}\" already exists")]
    DuplicateGroup(String),
    #[error("\"{0}\" is already a member of the group")]
    DuplicateMember(String),
    #[error("\"{0}\" still has an outstanding balance")]
    MemberHasBalance(String),
    #[error("\"{0}\" is the last member of the group")]
    LastMember(String),
    #[error(transparent)]
    Database(#[from] mongodb::error::Error),
    #[error(transparent)]
    Serialization(#[from] bson::ser::Error),
}

pub type ResultLedger<T> = Result<T, LedgerError>;

impl PartialEq for LedgerError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::EmptySplit, Self::EmptySplit) => true,
            (Self::InvalidShare(a), Self::InvalidShare(b)) => a == b,
            (Self::UnknownMember(a), Self::UnknownMember(b)) => a == b,
            (Self::BalanceInconsistency(a), Self::BalanceInconsistency(b)) => a == b,
            (Self::Conflict(a), Self::Conflict(b)) => a == b,
            (Self::GroupNotFound(a), Self::GroupNotFound(b)) => a == b,
            (Self::DuplicateGroup(a), Self::DuplicateGroup(b)) => a == b,
            (Self::DuplicateMember(a), Self::DuplicateMember(b)) => a == b,
            (Self::MemberHasBalance(a), Self::MemberHasBalance(b)) => a == b,
            (Self::LastMember(a), Self::LastMember(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            (Self::Serialization(a), Self::Serialization(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl LedgerError {
    fn kind(&self) -> &'static str {
        match self {
            Self::InvalidAmount(_) => "invalid_amount",
            Self::EmptySplit => "empty_split",
            Self::InvalidShare(_) => "invalid_share",
            Self::UnknownMember(_) => "unknown_member",
            Self::BalanceInconsistency(_) => "balance_inconsistency",
            Self::Conflict(_) => "conflict",
            Self::GroupNotFound(_) => "group_not_found",
            Self::DuplicateGroup(_) => "duplicate_group",
            Self::DuplicateMember(_) => "duplicate_member",
            Self::MemberHasBalance(_) => "member_has_balance",
            Self::LastMember(_) => "last_member",
            Self::Database(_) | Self::Serialization(_) => "storage",
        }
    }
}

impl ResponseError for LedgerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidAmount(_)
            | Self::EmptySplit
            | Self::InvalidShare(_)
            | Self::UnknownMember(_) => StatusCode::BAD_REQUEST,
            Self::GroupNotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_)
            | Self::DuplicateGroup(_)
            | Self::DuplicateMember(_)
            | Self::MemberHasBalance(_)
            | Self::LastMember(_) => StatusCode::CONFLICT,
            Self::BalanceInconsistency(_) | Self::Database(_) | Self::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.kind(),
            message: self.to_string(),
        })
    }
}
