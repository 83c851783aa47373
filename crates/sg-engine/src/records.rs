//! Auxiliary records kept in the secure store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sg_plan::{Amount, PlanId, WalletAddress};

/// Last connected wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Connected address
    pub owner: WalletAddress,
    /// Staking contract address
    pub contract: String,
    /// Network name or chain id
    pub network: String,
    /// When the connection was made
    pub connected_at: DateTime<Utc>,
}

/// One executed step, as shown in the owner's history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Plan the step belonged to
    pub plan_id: PlanId,
    /// "stake" or "unstake"
    pub kind: String,
    /// Amount submitted
    pub amount: Amount,
    /// Transaction hash
    pub hash: String,
    /// Submission time
    pub timestamp: DateTime<Utc>,
}
