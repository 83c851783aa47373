//! Randomized multi-step staking planner
//!
//! Produces a fixed-shape plan (alternating stake/unstake, even length) whose
//! amounts, percentages and delays are drawn to resemble manual activity.

use crate::amount::{Amount, DECIMALS};
use crate::error::PlanGenerationError;
use crate::plan::{ExecutionPlan, PlanId, PlanStatus, ScheduledTransaction, StepKind, WalletAddress};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Minimum number of transactions in a plan
pub const MIN_TRANSACTIONS: u32 = 2;

/// Maximum number of transactions in a plan
pub const MAX_TRANSACTIONS: u32 = 20;

/// Round percentages favoured for unstake steps
pub const ROUND_PERCENTAGES: [u8; 17] = [
    10, 15, 20, 25, 30, 35, 40, 45, 50, 55, 60, 65, 70, 75, 80, 85, 90,
];

/// Planner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Gas estimate per transaction
    pub gas_per_transaction: Amount,
}

impl PlannerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With per-transaction gas estimate
    #[inline]
    #[must_use]
    pub fn with_gas_per_transaction(mut self, gas: Amount) -> Self {
        self.gas_per_transaction = gas;
        self
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            // 0.002
            gas_per_transaction: Amount::from_base_units(2_000_000_000_000_000),
        }
    }
}

/// Clamp to `[2, 20]` and round down to even
#[inline]
#[must_use]
pub fn clamp_even(num_transactions: u32) -> u32 {
    let n = num_transactions.clamp(MIN_TRANSACTIONS, MAX_TRANSACTIONS);
    n - n % 2
}

/// Format seconds as `"{m}m {s}s"`
#[must_use]
pub fn format_duration(secs: u64) -> String {
    format!("{}m {}s", secs / 60, secs % 60)
}

/// Plan generator
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlanner {
    config: PlannerConfig,
}

impl ExecutionPlanner {
    /// Create planner with configuration
    #[inline]
    #[must_use]
    pub fn new(config: PlannerConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Generate a plan using the thread-local RNG
    ///
    /// # Errors
    /// See [`ExecutionPlanner::generate_with`]
    pub fn generate(
        &self,
        owner: WalletAddress,
        total_stake: Amount,
        num_transactions: u32,
    ) -> Result<ExecutionPlan, PlanGenerationError> {
        self.generate_with(&mut rand::rng(), owner, total_stake, num_transactions)
    }

    /// Generate a plan drawing randomness from `rng`
    ///
    /// # Errors
    /// - `NonPositiveTotal` if `total_stake` is zero
    /// - `TotalTooSmall` if the total cannot be split into non-zero stakes
    pub fn generate_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        owner: WalletAddress,
        total_stake: Amount,
        num_transactions: u32,
    ) -> Result<ExecutionPlan, PlanGenerationError> {
        if total_stake.is_zero() {
            return Err(PlanGenerationError::NonPositiveTotal);
        }

        let n = clamp_even(num_transactions);
        let pairs = (n / 2) as usize;

        let stakes = stake_amounts(rng, total_stake, pairs)?;
        let percentages: Vec<u8> = (0..pairs).map(|_| unstake_percentage(rng)).collect();
        let delays: Vec<u64> = (0..n).map(|_| step_delay(rng)).collect();

        let mut sequence = Vec::with_capacity(n as usize);
        let mut elapsed = 0u64;
        let kinds = stakes.into_iter().zip(percentages).flat_map(|(amount, percentage)| {
            [StepKind::Stake { amount }, StepKind::Unstake { percentage }]
        });
        for (kind, delay) in kinds.zip(delays) {
            elapsed += delay;
            sequence.push(ScheduledTransaction::new(kind, delay, elapsed));
        }

        let plan = ExecutionPlan {
            id: PlanId::new(),
            owner,
            total_stake,
            // n <= 20
            num_transactions: u8::try_from(n).unwrap_or(u8::MAX),
            transaction_sequence: sequence,
            status: PlanStatus::PendingApproval,
            current_index: 0,
            estimated_gas_cost: self.config.gas_per_transaction.saturating_mul(u64::from(n)),
            total_execution_time: format_duration(elapsed),
            total_delay_secs: elapsed,
            created_at: Utc::now(),
            failure: None,
        };

        tracing::debug!(
            plan_id = %plan.id,
            owner = %plan.owner,
            steps = n,
            total_delay_secs = elapsed,
            "generated execution plan"
        );
        Ok(plan)
    }
}

/// Split `total` into `count` non-zero amounts summing exactly to `total`
///
/// Each amount but the last takes 10-30% of what remains, rounded to a random
/// number of decimal places; the last takes the exact remainder.
fn stake_amounts<R: Rng + ?Sized>(
    rng: &mut R,
    total: Amount,
    count: usize,
) -> Result<Vec<Amount>, PlanGenerationError> {
    let too_small = || PlanGenerationError::TotalTooSmall {
        total,
        stake_steps: count,
    };

    let mut remaining = total;
    let mut amounts = Vec::with_capacity(count);
    for _ in 1..count {
        let raw = remaining.fraction_bps(rng.random_range(1_000..=3_000));
        let places = decimal_places(rng);
        // Coarse rounding can hit zero or swallow the remainder; refine until it fits
        let amount = (places..=DECIMALS)
            .map(|p| raw.round_dp(p))
            .find(|a| !a.is_zero() && *a < remaining)
            .ok_or_else(too_small)?;
        remaining = remaining.checked_sub(amount).ok_or_else(too_small)?;
        amounts.push(amount);
    }
    amounts.push(remaining);
    Ok(amounts)
}

/// 0-3 decimal places weighted 40/30/20/10
fn decimal_places<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    match rng.random_range(0..100u32) {
        0..=39 => 0,
        40..=69 => 1,
        70..=89 => 2,
        _ => 3,
    }
}

/// 60% a round value, 40% any integer in `[10, 90]`
fn unstake_percentage<R: Rng + ?Sized>(rng: &mut R) -> u8 {
    if rng.random_bool(0.6) {
        ROUND_PERCENTAGES[rng.random_range(0..ROUND_PERCENTAGES.len())]
    } else {
        rng.random_range(10..=90)
    }
}

/// Seconds: 40% `[30,120)`, 30% `[120,300)`, 30% `[300,600)`
fn step_delay<R: Rng + ?Sized>(rng: &mut R) -> u64 {
    let bucket: f64 = rng.random();
    if bucket < 0.4 {
        rng.random_range(30..120)
    } else if bucket < 0.7 {
        rng.random_range(120..300)
    } else {
        rng.random_range(300..600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn owner() -> WalletAddress {
        WalletAddress::new("0xOwner")
    }

    #[test]
    fn clamp_even_policy() {
        assert_eq!(clamp_even(0), 2);
        assert_eq!(clamp_even(1), 2);
        assert_eq!(clamp_even(3), 2);
        assert_eq!(clamp_even(4), 4);
        assert_eq!(clamp_even(7), 6);
        assert_eq!(clamp_even(20), 20);
        assert_eq!(clamp_even(21), 20);
        assert_eq!(clamp_even(u32::MAX), 20);
    }

    #[test]
    fn duration_format() {
        assert_eq!(format_duration(0), "0m 0s");
        assert_eq!(format_duration(125), "2m 5s");
        assert_eq!(format_duration(3600), "60m 0s");
    }

    #[test]
    fn generate_ten_over_four() {
        let planner = ExecutionPlanner::default();
        let plan = planner
            .generate_with(&mut StdRng::seed_from_u64(7), owner(), Amount::from_whole(10), 4)
            .unwrap();

        assert_eq!(plan.num_transactions, 4);
        assert_eq!(plan.transaction_sequence.len(), 4);
        assert_eq!(plan.status, PlanStatus::PendingApproval);
        assert_eq!(plan.current_index, 0);
        assert_eq!(plan.stake_sum(), Some(Amount::from_whole(10)));
        assert!(plan.transaction_sequence[0].kind.is_stake());
        assert!(!plan.transaction_sequence[1].kind.is_stake());
        assert_eq!(plan.estimated_gas_cost, "0.008".parse().unwrap());
    }

    #[test]
    fn zero_total_rejected() {
        let err = ExecutionPlanner::default()
            .generate(owner(), Amount::ZERO, 4)
            .unwrap_err();
        assert_eq!(err, PlanGenerationError::NonPositiveTotal);
    }

    #[test]
    fn dust_total_rejected() {
        let err = ExecutionPlanner::default()
            .generate(owner(), Amount::from_base_units(3), 20)
            .unwrap_err();
        assert!(matches!(err, PlanGenerationError::TotalTooSmall { stake_steps: 10, .. }));
    }

    #[test]
    fn execute_at_is_cumulative() {
        let plan = ExecutionPlanner::default()
            .generate_with(&mut StdRng::seed_from_u64(1), owner(), Amount::from_whole(100), 8)
            .unwrap();

        let mut elapsed = 0;
        for step in &plan.transaction_sequence {
            assert!((30..600).contains(&step.delay_secs));
            elapsed += step.delay_secs;
            assert_eq!(step.execute_at_secs, elapsed);
        }
        assert_eq!(plan.total_delay_secs, elapsed);
        assert_eq!(plan.total_execution_time, format_duration(elapsed));
    }

    #[test]
    fn unstake_percentages_in_range() {
        let mut rng = StdRng::seed_from_u64(99);
        for _ in 0..1_000 {
            assert!((10..=90).contains(&unstake_percentage(&mut rng)));
        }
    }

    #[test]
    fn delay_buckets_all_reached() {
        let mut rng = StdRng::seed_from_u64(3);
        let delays: Vec<u64> = (0..1_000).map(|_| step_delay(&mut rng)).collect();
        assert!(delays.iter().any(|d| *d < 120));
        assert!(delays.iter().any(|d| (120..300).contains(d)));
        assert!(delays.iter().any(|d| *d >= 300));
        assert!(delays.iter().all(|d| (30..600).contains(d)));
    }
}
