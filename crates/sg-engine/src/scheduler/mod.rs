//! Execution scheduler
//!
//! Drives each owner's plan through its lifecycle:
//!
//! ```text
//! (idle) -> pending_approval -> approved -> executing <-> paused -> completed
//!                                               |
//!                                               +-> failed
//! ```
//!
//! Stop and reject return an owner to idle from any status by deleting the
//! plan. Every status change goes through [`state::apply`]; every mutation
//! for an owner is serialized by that owner's gate. Pause and stop cancel the
//! run task's token before taking the gate, so no step starts after they
//! return.

mod events;
mod lane;
mod run;

pub use events::{SchedulerEvent, SchedulerEventKind};

use crate::client::{TransactionClient, WalletContext};
use crate::config::{EngineConfig, SchedulerConfig};
use crate::error::EngineError;
use crate::repository::{HistoryLog, PlanRepository};
use crate::state::{self, PlanEvent};
use dashmap::DashMap;
use lane::Lane;
use sg_plan::{Amount, ExecutionPlan, ExecutionPlanner, PlanStatus, WalletAddress};
use sg_vault::SecureStore;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Parameters for a new plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanRequest {
    /// Total to stake across all stake steps
    pub total_stake: Amount,
    /// Requested step count, clamped to an even number in `[2, 20]`
    pub num_transactions: u32,
    /// Balance the owner can stake from, if known
    pub available_balance: Option<Amount>,
}

impl PlanRequest {
    /// Create a request without a balance check
    #[inline]
    #[must_use]
    pub fn new(total_stake: Amount, num_transactions: u32) -> Self {
        Self {
            total_stake,
            num_transactions,
            available_balance: None,
        }
    }

    /// With available balance
    #[inline]
    #[must_use]
    pub fn with_available_balance(mut self, balance: Amount) -> Self {
        self.available_balance = Some(balance);
        self
    }
}

/// Owner-initiated transitions
#[derive(Debug, Clone, Copy)]
enum Command {
    Approve,
    Start,
    Pause,
    Resume,
}

pub(crate) struct Inner {
    plans: PlanRepository,
    history: HistoryLog,
    planner: ExecutionPlanner,
    config: SchedulerConfig,
    client: Arc<dyn TransactionClient>,
    lanes: DashMap<WalletAddress, Arc<Lane>>,
    events: broadcast::Sender<SchedulerEvent>,
}

impl Inner {
    fn lane(&self, owner: &WalletAddress) -> Arc<Lane> {
        Arc::clone(&self.lanes.entry(owner.clone()).or_default())
    }

    fn emit(&self, plan: &ExecutionPlan, kind: SchedulerEventKind) {
        // No subscribers is not an error
        let _ = self.events.send(SchedulerEvent {
            owner: plan.owner.clone(),
            plan_id: plan.id,
            kind,
        });
    }

    /// Load the owner's plan, first writing back any parked outcome
    fn load_synced(
        &self,
        owner: &WalletAddress,
        lane: &Lane,
    ) -> Result<Option<ExecutionPlan>, EngineError> {
        let Some(parked) = lane.parked() else {
            return Ok(self.plans.load(owner)?);
        };

        let flushed = if parked.status == PlanStatus::Completed {
            self.plans.delete(owner)
        } else {
            self.plans.save(&parked)
        };
        match flushed {
            Ok(()) => {
                lane.clear_parked();
                info!(owner = %owner, plan_id = %parked.id, "flushed deferred plan state");
                Ok((parked.status != PlanStatus::Completed).then_some(parked))
            }
            Err(e) => {
                warn!(owner = %owner, plan_id = %parked.id, error = %e, "deferred plan state still unsynced");
                Err(EngineError::PersistencePending {
                    owner: owner.clone(),
                    index: parked.current_index.saturating_sub(1),
                })
            }
        }
    }

    /// Turn an `executing` plan with no live run task into `paused`
    ///
    /// Such a plan was left by a previous process or by a run that halted.
    /// Returns whether the plan was changed. Call with the gate held.
    fn reconcile_interrupted(
        &self,
        lane: &Lane,
        plan: &mut ExecutionPlan,
    ) -> Result<bool, EngineError> {
        if plan.status != PlanStatus::Executing || lane.is_running() {
            return Ok(false);
        }
        state::apply(plan, PlanEvent::Pause)?;
        self.plans.save(plan)?;
        info!(
            owner = %plan.owner,
            plan_id = %plan.id,
            index = plan.current_index,
            "interrupted plan recovered as paused"
        );
        self.emit(plan, SchedulerEventKind::Paused);
        Ok(true)
    }
}

/// Per-owner plan lifecycle and timed execution
#[derive(Clone)]
pub struct ExecutionScheduler {
    inner: Arc<Inner>,
}

impl fmt::Debug for ExecutionScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionScheduler")
            .field("config", &self.inner.config)
            .field("owners", &self.inner.lanes.len())
            .finish_non_exhaustive()
    }
}

impl ExecutionScheduler {
    /// Create a scheduler storing plans and history in `store`
    #[must_use]
    pub fn new(
        store: SecureStore,
        client: Arc<dyn TransactionClient>,
        planner: ExecutionPlanner,
        config: SchedulerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                plans: PlanRepository::new(store.clone()),
                history: HistoryLog::new(store, config.history_cap),
                planner,
                config,
                client,
                lanes: DashMap::new(),
                events,
            }),
        }
    }

    /// Create from the planner and scheduler sections of `config`
    #[must_use]
    pub fn from_config(
        store: SecureStore,
        client: Arc<dyn TransactionClient>,
        config: &EngineConfig,
    ) -> Self {
        Self::new(
            store,
            client,
            ExecutionPlanner::new(config.planner.clone()),
            config.scheduler.clone(),
        )
    }

    /// Receive every event emitted after this call
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.inner.events.subscribe()
    }

    /// Generate and store a new plan, replacing any existing one
    ///
    /// # Errors
    /// - `InsufficientBalance` if the request exceeds its available balance
    /// - `Plan` if the total cannot be split
    /// - `PersistencePending` if a previous outcome still cannot be written
    /// - `Vault` on storage failure
    pub async fn create_plan(
        &self,
        ctx: &WalletContext,
        request: PlanRequest,
    ) -> Result<ExecutionPlan, EngineError> {
        if let Some(available) = request.available_balance {
            if request.total_stake > available {
                return Err(EngineError::InsufficientBalance {
                    requested: request.total_stake,
                    available,
                });
            }
        }

        let lane = self.inner.lane(&ctx.owner);
        lane.cancel();
        let _gate = lane.gate().lock().await;
        self.inner.load_synced(&ctx.owner, &lane)?;

        let plan = self.inner.planner.generate(
            ctx.owner.clone(),
            request.total_stake,
            request.num_transactions,
        )?;
        self.inner.plans.replace(&plan)?;

        info!(
            owner = %plan.owner,
            plan_id = %plan.id,
            steps = plan.num_transactions,
            total_stake = %plan.total_stake,
            "plan created"
        );
        self.inner.emit(&plan, SchedulerEventKind::PlanCreated);
        Ok(plan)
    }

    /// Accept a pending plan
    ///
    /// # Errors
    /// `NoPlan`, `Transition` if not pending approval, or `Vault`
    pub async fn approve(&self, ctx: &WalletContext) -> Result<ExecutionPlan, EngineError> {
        self.transition(ctx, Command::Approve).await
    }

    /// Begin executing an approved plan
    ///
    /// # Errors
    /// `NoPlan`, `Transition` if not approved, or `Vault`
    pub async fn start(&self, ctx: &WalletContext) -> Result<ExecutionPlan, EngineError> {
        self.transition(ctx, Command::Start).await
    }

    /// Interrupt an executing plan, keeping its progress
    ///
    /// Returns after any in-flight step has been recorded.
    ///
    /// # Errors
    /// `NoPlan`, `Transition` if not executing, or `Vault`
    pub async fn pause(&self, ctx: &WalletContext) -> Result<ExecutionPlan, EngineError> {
        self.transition(ctx, Command::Pause).await
    }

    /// Continue a paused plan; the next step waits its full delay again
    ///
    /// # Errors
    /// `NoPlan`, `Transition` if not paused, or `Vault`
    pub async fn resume(&self, ctx: &WalletContext) -> Result<ExecutionPlan, EngineError> {
        self.transition(ctx, Command::Resume).await
    }

    /// Cancel any run and delete the plan; returns whether a plan existed
    ///
    /// # Errors
    /// `PersistencePending` or `Vault`
    pub async fn stop(&self, ctx: &WalletContext) -> Result<bool, EngineError> {
        let lane = self.inner.lane(&ctx.owner);
        lane.cancel();
        let _gate = lane.gate().lock().await;
        let Some(plan) = self.inner.load_synced(&ctx.owner, &lane)? else {
            return Ok(false);
        };
        self.inner.plans.delete(&ctx.owner)?;
        info!(owner = %plan.owner, plan_id = %plan.id, status = %plan.status, "plan stopped");
        self.inner.emit(&plan, SchedulerEventKind::Stopped);
        Ok(true)
    }

    /// Discard a plan; same as [`ExecutionScheduler::stop`]
    ///
    /// # Errors
    /// See [`ExecutionScheduler::stop`]
    pub async fn reject(&self, ctx: &WalletContext) -> Result<bool, EngineError> {
        self.stop(ctx).await
    }

    /// The owner's plan as last recorded, including an unsynced outcome
    ///
    /// A stored `executing` plan with no run task in this process is reported
    /// as `paused`, the status [`ExecutionScheduler::resume`] will act on.
    ///
    /// # Errors
    /// `Vault` on storage read failure
    pub fn current_plan(&self, ctx: &WalletContext) -> Result<Option<ExecutionPlan>, EngineError> {
        let lane = self.inner.lanes.get(&ctx.owner).map(|lane| Arc::clone(&lane));
        if let Some(parked) = lane.as_ref().and_then(|lane| lane.parked()) {
            return Ok((parked.status != PlanStatus::Completed).then_some(parked));
        }

        let mut plan = self.inner.plans.load(&ctx.owner)?;
        if let Some(plan) = plan.as_mut() {
            // A held gate means a transition or step is mid-flight
            let idle = lane
                .as_ref()
                .map_or(true, |lane| lane.gate().try_lock().is_ok() && !lane.is_running());
            if plan.status == PlanStatus::Executing && idle {
                state::apply(plan, PlanEvent::Pause)?;
            }
        }
        Ok(plan)
    }

    /// Reconcile a plan left by a previous process
    ///
    /// An `executing` plan becomes `paused` and is not re-armed; a leftover
    /// `completed` record is removed. Plans with a live run task in this
    /// process are returned unchanged.
    ///
    /// # Errors
    /// `PersistencePending` or `Vault`
    pub async fn recover(&self, ctx: &WalletContext) -> Result<Option<ExecutionPlan>, EngineError> {
        let lane = self.inner.lane(&ctx.owner);
        let _gate = lane.gate().lock().await;
        let Some(mut plan) = self.inner.load_synced(&ctx.owner, &lane)? else {
            return Ok(None);
        };
        if plan.status == PlanStatus::Completed {
            self.inner.plans.delete(&ctx.owner)?;
            return Ok(None);
        }
        self.inner.reconcile_interrupted(&lane, &mut plan)?;
        Ok(Some(plan))
    }

    /// Wait until the owner has no run task left
    ///
    /// A run armed while waiting (a resume, or a new start) is waited for too.
    pub async fn join(&self, ctx: &WalletContext) {
        let Some(lane) = self.inner.lanes.get(&ctx.owner).map(|lane| Arc::clone(&lane)) else {
            return;
        };
        while let Some(mut done) = lane.unfinished_run() {
            // Nothing is ever sent; the channel closes when the task exits
            while done.changed().await.is_ok() {}
        }
    }

    async fn transition(
        &self,
        ctx: &WalletContext,
        command: Command,
    ) -> Result<ExecutionPlan, EngineError> {
        let lane = self.inner.lane(&ctx.owner);
        let (event, notice, arms) = match command {
            Command::Approve => (PlanEvent::Approve, SchedulerEventKind::Approved, false),
            Command::Start => (PlanEvent::Start, SchedulerEventKind::Started, true),
            Command::Resume => (PlanEvent::Resume, SchedulerEventKind::Resumed, true),
            Command::Pause => {
                lane.cancel();
                (PlanEvent::Pause, SchedulerEventKind::Paused, false)
            }
        };

        let _gate = lane.gate().lock().await;
        let mut plan = self
            .inner
            .load_synced(&ctx.owner, &lane)?
            .ok_or_else(|| EngineError::NoPlan(ctx.owner.clone()))?;
        if matches!(command, Command::Resume) {
            self.inner.reconcile_interrupted(&lane, &mut plan)?;
        }
        let from = plan.status;
        state::apply(&mut plan, event)?;
        self.inner.plans.save(&plan)?;

        info!(
            owner = %plan.owner,
            plan_id = %plan.id,
            from = %from,
            to = %plan.status,
            index = plan.current_index,
            "plan transition"
        );
        if arms {
            self.arm(ctx, &lane);
        }
        self.inner.emit(&plan, notice);
        Ok(plan)
    }

    fn arm(&self, ctx: &WalletContext, lane: &Arc<Lane>) {
        let token = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(());
        let run = run::drive(
            Arc::clone(&self.inner),
            ctx.clone(),
            Arc::clone(lane),
            token.clone(),
        );
        let owner = ctx.owner.clone();
        tokio::spawn(async move {
            // Held for the task's lifetime, including unwinding
            let _done = done_tx;
            run.await;
            debug!(owner = %owner, "run task exited");
        });
        lane.arm(token, done_rx);
    }
}
