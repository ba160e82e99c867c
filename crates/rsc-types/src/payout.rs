use crate::amount::RscAmount;
use crate::id::{DepositId, UserId, WithdrawalId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payment progress shared by withdrawals, escrows and distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaidStatus {
    Pending,
    Paid,
    Failed,
}

impl PaidStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaidStatus::Pending => "PENDING",
            PaidStatus::Paid => "PAID",
            PaidStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PaidStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Common paid-status accessors for any record that settles a payment.
pub trait PaidStatusModel {
    fn paid_status(&self) -> Option<PaidStatus>;
    fn set_paid_status(&mut self, status: Option<PaidStatus>);

    fn set_paid(&mut self) {
        self.set_paid_status(Some(PaidStatus::Paid));
    }

    fn set_paid_pending(&mut self) {
        self.set_paid_status(Some(PaidStatus::Pending));
    }

    fn set_paid_failed(&mut self) {
        self.set_paid_status(Some(PaidStatus::Failed));
    }

    fn is_paid(&self) -> bool {
        self.paid_status() == Some(PaidStatus::Paid)
    }

    fn is_paid_pending(&self) -> bool {
        self.paid_status() == Some(PaidStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub amount: RscAmount,
    pub fee: RscAmount,
    pub to_address: String,
    pub network: String,
    pub token: String,
    pub paid_status: PaidStatus,
    pub transaction_hash: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Withdrawal {
    /// Total debited from the user's ledger for this withdrawal.
    pub fn total_debit(&self) -> RscAmount {
        self.amount + self.fee
    }
}

impl PaidStatusModel for Withdrawal {
    fn paid_status(&self) -> Option<PaidStatus> {
        Some(self.paid_status)
    }

    fn set_paid_status(&mut self, status: Option<PaidStatus>) {
        if let Some(status) = status {
            self.paid_status = status;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: DepositId,
    pub user_id: UserId,
    pub amount: RscAmount,
    pub transaction_hash: String,
    pub from_address: String,
    pub network: String,
    pub created_at: DateTime<Utc>,
}
