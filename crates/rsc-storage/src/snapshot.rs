use crate::backend::{Result, StorageError, Table};
use crate::memory::{MemoryBackend, Tables};
use rsc_types::{
    BalanceEntry, BalanceLot, Bounty, BountySolution, Deposit, Distribution, Escrow,
    FundingCredit, StakingDistributionRecord, StakingSnapshot, UserId, Withdrawal,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub version: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub entry_count: usize,
    pub lot_count: usize,
    /// blake3 over the serialized ledger body, hex encoded
    pub hash: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LedgerBody {
    sequences: Vec<(Table, u64)>,
    entries: Vec<BalanceEntry>,
    lots: Vec<BalanceLot>,
    distributions: Vec<Distribution>,
    escrows: Vec<Escrow>,
    bounties: Vec<Bounty>,
    solutions: Vec<BountySolution>,
    withdrawals: Vec<Withdrawal>,
    deposits: Vec<Deposit>,
    funding_credits: Vec<FundingCredit>,
    snapshots: Vec<StakingSnapshot>,
    staking_cycles: Vec<StakingDistributionRecord>,
    reputation: Vec<(UserId, Decimal)>,
}

/// Point-in-time copy of a [`MemoryBackend`], persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub metadata: SnapshotMetadata,
    body: LedgerBody,
}

impl LedgerSnapshot {
    pub async fn capture(backend: &MemoryBackend) -> Result<Self> {
        let (tables, sequences) = backend.export_parts().await;

        let mut sequences: Vec<(Table, u64)> = sequences.into_iter().collect();
        sequences.sort();
        let mut reputation: Vec<(UserId, Decimal)> = tables.reputation.into_iter().collect();
        reputation.sort_by_key(|(user, _)| *user);

        let body = LedgerBody {
            sequences,
            entries: tables.entries.into_values().collect(),
            lots: tables.lots.into_values().collect(),
            distributions: tables.distributions.into_values().collect(),
            escrows: tables.escrows.into_values().collect(),
            bounties: tables.bounties.into_values().collect(),
            solutions: tables.solutions.into_values().collect(),
            withdrawals: tables.withdrawals.into_values().collect(),
            deposits: tables.deposits.into_values().collect(),
            funding_credits: tables.funding_credits.into_values().collect(),
            snapshots: tables.snapshots.into_values().collect(),
            staking_cycles: tables.staking_cycles.into_values().collect(),
            reputation,
        };

        let metadata = SnapshotMetadata {
            version: SNAPSHOT_VERSION,
            created_at: chrono::Utc::now(),
            entry_count: body.entries.len(),
            lot_count: body.lots.len(),
            hash: Self::calculate_hash(&body)?,
        };

        Ok(Self { metadata, body })
    }

    pub fn restore(self) -> MemoryBackend {
        let body = self.body;
        let tables = Tables {
            entries: body.entries.into_iter().map(|r| (r.id, r)).collect(),
            lots: body.lots.into_iter().map(|r| (r.id, r)).collect(),
            distributions: body.distributions.into_iter().map(|r| (r.id, r)).collect(),
            escrows: body.escrows.into_iter().map(|r| (r.id, r)).collect(),
            bounties: body.bounties.into_iter().map(|r| (r.id, r)).collect(),
            solutions: body.solutions.into_iter().map(|r| (r.id, r)).collect(),
            withdrawals: body.withdrawals.into_iter().map(|r| (r.id, r)).collect(),
            deposits: body.deposits.into_iter().map(|r| (r.id, r)).collect(),
            funding_credits: body.funding_credits.into_iter().map(|r| (r.id, r)).collect(),
            snapshots: body
                .snapshots
                .into_iter()
                .map(|r| ((r.user_id, r.snapshot_date), r))
                .collect(),
            staking_cycles: body
                .staking_cycles
                .into_iter()
                .map(|r| (r.distribution_date, r))
                .collect(),
            reputation: body.reputation.into_iter().collect(),
        };
        MemoryBackend::from_parts(tables, body.sequences.into_iter().collect())
    }

    fn calculate_hash(body: &LedgerBody) -> Result<String> {
        let bytes = serde_json::to_vec(body)?;
        Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
    }

    pub fn verify(&self) -> bool {
        Self::calculate_hash(&self.body)
            .map(|hash| hash == self.metadata.hash)
            .unwrap_or(false)
    }

    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;

        let tmp = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        fs::rename(&tmp, path).await?;

        info!(
            path = %path.display(),
            entries = self.metadata.entry_count,
            "💾 Ledger snapshot saved"
        );
        Ok(())
    }

    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let data = fs::read(path).await?;
        let snapshot: Self = serde_json::from_slice(&data)?;

        if snapshot.metadata.version != SNAPSHOT_VERSION {
            return Err(StorageError::BackendError(format!(
                "Unsupported snapshot version {}",
                snapshot.metadata.version
            )));
        }
        if !snapshot.verify() {
            return Err(StorageError::BackendError(
                "Snapshot verification failed".into(),
            ));
        }

        Ok(snapshot)
    }
}
