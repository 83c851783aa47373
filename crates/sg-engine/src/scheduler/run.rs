//! Run task: waits out each step's delay and executes it
//!
//! At most one step is in flight per owner; the owner's gate is held from the
//! post-delay recheck through submission and persistence, so a pause or stop
//! issued mid-step takes effect once the outcome is recorded.

use super::events::SchedulerEventKind;
use super::lane::Lane;
use super::Inner;
use crate::client::{SubmitError, TxHash, WalletContext};
use crate::records::HistoryEntry;
use crate::state::{self, PlanEvent};
use chrono::Utc;
use sg_plan::{Amount, ExecutionPlan, PlanStatus, StepKind, WalletAddress};
use sg_vault::VaultError;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(crate) async fn drive(
    inner: Arc<Inner>,
    ctx: WalletContext,
    lane: Arc<Lane>,
    token: CancellationToken,
) {
    loop {
        let Some(wait) = inner.next_wait(&ctx.owner, &lane, &token).await else {
            return;
        };

        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!(owner = %ctx.owner, "run cancelled during delay");
                return;
            }
            () = tokio::time::sleep(wait) => {}
        }

        if !inner.run_step(&ctx, &lane, &token).await {
            return;
        }
    }
}

impl Inner {
    /// Delay before the next step, or `None` if the run should end
    async fn next_wait(
        &self,
        owner: &WalletAddress,
        lane: &Lane,
        token: &CancellationToken,
    ) -> Option<Duration> {
        let _gate = lane.gate().lock().await;
        if token.is_cancelled() {
            return None;
        }
        let plan = self.executing_plan(owner, lane)?;
        let step = plan.current_step()?;
        debug!(
            owner = %owner,
            plan_id = %plan.id,
            index = plan.current_index,
            delay_secs = step.delay_secs,
            "arming step timer"
        );
        Some(self.config.scaled_delay(step.delay_secs))
    }

    /// Execute the step at `current_index`; returns whether to keep running
    async fn run_step(&self, ctx: &WalletContext, lane: &Lane, token: &CancellationToken) -> bool {
        let _gate = lane.gate().lock().await;
        if token.is_cancelled() {
            return false;
        }
        let Some(plan) = self.executing_plan(&ctx.owner, lane) else {
            return false;
        };
        let index = plan.current_index;
        let Some(kind) = plan.current_step().map(|step| step.kind) else {
            return false;
        };

        info!(
            owner = %ctx.owner,
            plan_id = %plan.id,
            index,
            kind = kind.label(),
            "executing step"
        );

        match self.submit(ctx, kind).await {
            Ok((hash, amount)) => self.on_success(lane, plan, index, kind, hash, amount).await,
            Err(e) => {
                self.on_failure(lane, plan, index, e.to_string()).await;
                false
            }
        }
    }

    /// Persisted (or parked) plan, only while it is executing
    fn executing_plan(&self, owner: &WalletAddress, lane: &Lane) -> Option<ExecutionPlan> {
        match self.load_synced(owner, lane) {
            Ok(Some(plan)) if plan.status == PlanStatus::Executing => Some(plan),
            Ok(_) => None,
            Err(e) => {
                warn!(owner = %owner, error = %e, "run halted: plan unavailable");
                None
            }
        }
    }

    async fn submit(
        &self,
        ctx: &WalletContext,
        kind: StepKind,
    ) -> Result<(TxHash, Amount), SubmitError> {
        match kind {
            StepKind::Stake { amount } => Ok((self.client.submit_stake(ctx, amount).await?, amount)),
            StepKind::Unstake { percentage } => {
                let staked = self.client.staked_balance(ctx).await?;
                let amount = staked.percent(percentage);
                if amount.is_zero() {
                    return Err(SubmitError::NothingStaked);
                }
                Ok((self.client.submit_unstake(ctx, amount).await?, amount))
            }
        }
    }

    async fn on_success(
        &self,
        lane: &Lane,
        mut plan: ExecutionPlan,
        index: usize,
        kind: StepKind,
        hash: TxHash,
        amount: Amount,
    ) -> bool {
        let executed_at = Utc::now();
        let event = PlanEvent::StepSucceeded {
            hash: hash.0.clone(),
            executed_at,
            resolved_amount: amount,
        };
        if let Err(e) = state::apply(&mut plan, event) {
            error!(owner = %plan.owner, plan_id = %plan.id, index, error = %e, "step outcome rejected");
            return false;
        }

        let completed = plan.status == PlanStatus::Completed;
        let persisted = if completed {
            if let Err(e) = self.plans.save(&plan) {
                warn!(owner = %plan.owner, plan_id = %plan.id, error = %e, "failed to record completion");
            }
            self.persist_with_retry(&plan, || self.plans.delete(&plan.owner))
                .await
        } else {
            self.persist_with_retry(&plan, || self.plans.save(&plan)).await
        };

        let entry = HistoryEntry {
            plan_id: plan.id,
            kind: kind.label().to_string(),
            amount,
            hash: hash.0.clone(),
            timestamp: executed_at,
        };
        if let Err(e) = self.history.record(&plan.owner, entry) {
            warn!(owner = %plan.owner, error = %e, "failed to append history");
        }

        self.emit(&plan, SchedulerEventKind::StepExecuted { index, hash: hash.0 });

        if !persisted {
            warn!(owner = %plan.owner, plan_id = %plan.id, index, "step outcome parked until storage recovers");
            self.emit(&plan, SchedulerEventKind::PersistenceDeferred { index });
            lane.park(plan);
            return false;
        }
        if completed {
            info!(owner = %plan.owner, plan_id = %plan.id, "plan completed");
            self.emit(&plan, SchedulerEventKind::Completed);
            return false;
        }
        true
    }

    async fn on_failure(&self, lane: &Lane, mut plan: ExecutionPlan, index: usize, reason: String) {
        error!(owner = %plan.owner, plan_id = %plan.id, index, reason = %reason, "step failed");
        if let Err(e) = state::apply(&mut plan, PlanEvent::StepFailed { reason: reason.clone() }) {
            error!(owner = %plan.owner, plan_id = %plan.id, index, error = %e, "step outcome rejected");
            return;
        }
        if !self.persist_with_retry(&plan, || self.plans.save(&plan)).await {
            lane.park(plan.clone());
        }
        self.emit(&plan, SchedulerEventKind::Failed { index, reason });
    }

    /// Run `op` until it succeeds or the configured attempts are exhausted
    async fn persist_with_retry<F>(&self, plan: &ExecutionPlan, op: F) -> bool
    where
        F: Fn() -> Result<(), VaultError>,
    {
        let attempts = self.config.persist_retry_attempts.max(1);
        for attempt in 1..=attempts {
            match op() {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        owner = %plan.owner,
                        plan_id = %plan.id,
                        attempt,
                        error = %e,
                        "persisting plan failed"
                    );
                    if attempt < attempts {
                        tokio::time::sleep(self.config.persist_backoff(attempt)).await;
                    }
                }
            }
        }
        false
    }
}
