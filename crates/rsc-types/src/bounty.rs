use crate::amount::RscAmount;
use crate::id::{BountyId, DocumentId, EscrowId, SolutionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Comment,
    Paper,
    Post,
    Review,
}

/// Polymorphic reference to a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub kind: ContentKind,
    pub object_id: u64,
}

impl ContentRef {
    pub fn new(kind: ContentKind, object_id: u64) -> Self {
        Self { kind, object_id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BountyStatus {
    Open,
    Awarded,
    Expired,
    Refunded,
}

impl BountyStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BountyStatus::Open)
    }

    pub fn can_transition_to(&self, next: BountyStatus) -> bool {
        matches!(
            (self, next),
            (BountyStatus::Open, BountyStatus::Awarded)
                | (BountyStatus::Open, BountyStatus::Expired)
                | (BountyStatus::Open, BountyStatus::Refunded)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BountyStatus::Open => "OPEN",
            BountyStatus::Awarded => "AWARDED",
            BountyStatus::Expired => "EXPIRED",
            BountyStatus::Refunded => "REFUNDED",
        }
    }
}

impl fmt::Display for BountyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounty {
    pub id: BountyId,
    pub amount: RscAmount,
    pub escrow_id: EscrowId,
    pub created_by_id: UserId,
    pub item: ContentRef,
    pub unified_document_id: DocumentId,
    pub status: BountyStatus,
    pub expiration_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl Bounty {
    pub fn is_open(&self) -> bool {
        self.status == BountyStatus::Open
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date <= now
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SolutionStatus {
    Submitted,
    Awarded,
    Rejected,
}

impl SolutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SolutionStatus::Submitted => "SUBMITTED",
            SolutionStatus::Awarded => "AWARDED",
            SolutionStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for SolutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BountySolution {
    pub id: SolutionId,
    pub bounty_id: BountyId,
    pub created_by_id: UserId,
    pub item: ContentRef,
    pub status: SolutionStatus,
    pub awarded_amount: RscAmount,
    pub awarded_by_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
