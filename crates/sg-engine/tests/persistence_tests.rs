//! Durability: cold-start recovery and storage failures after submission

use sg_engine::{
    EngineError, ExecutionScheduler, PlanRepository, PlanRequest, SchedulerEventKind,
    TransactionClient,
};
use sg_plan::{Amount, ExecutionPlanner, PlanStatus};
use sg_test_utils::{
    fast_scheduler_config, sample_plan, test_context, test_store, FlakyBackend, ScriptedClient,
};
use sg_vault::{FileBackend, KvBackend, MemoryBackend, SecureStore};
use std::sync::Arc;
use std::time::Duration;

fn scheduler(store: &SecureStore, client: Arc<dyn TransactionClient>) -> ExecutionScheduler {
    ExecutionScheduler::new(
        store.clone(),
        client,
        ExecutionPlanner::default(),
        fast_scheduler_config(),
    )
}

/// Plan for `owner` left mid-run by a previous process: two steps done
fn interrupted_plan(owner: &str) -> sg_plan::ExecutionPlan {
    let mut plan = sample_plan(owner, 10, 4);
    plan.status = PlanStatus::Executing;
    for step in plan.transaction_sequence.iter_mut().take(2) {
        step.executed = true;
        step.hash = Some("0xold".into());
    }
    plan.current_index = 2;
    plan
}

#[tokio::test(start_paused = true)]
async fn cold_start_recovers_executing_as_paused() {
    let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
    let store = test_store(Arc::clone(&backend));
    let plan = interrupted_plan("0xREC");
    PlanRepository::new(store.clone()).save(&plan).unwrap();

    // Fresh process over the same storage
    let client = Arc::new(ScriptedClient::new());
    let scheduler = scheduler(&test_store(backend), client.clone());
    let ctx = test_context("0xrec");

    let recovered = scheduler.recover(&ctx).await.unwrap().unwrap();
    assert_eq!(recovered.status, PlanStatus::Paused);
    assert_eq!(recovered.current_index, 2);
    assert_eq!(
        PlanRepository::new(store).load(&ctx.owner).unwrap().unwrap().status,
        PlanStatus::Paused
    );

    // Never re-armed on its own
    tokio::time::sleep(Duration::from_secs(3_600)).await;
    assert!(client.submissions().is_empty());

    scheduler.resume(&ctx).await.unwrap();
    scheduler.join(&ctx).await;

    // Only the two remaining steps were submitted
    let submissions = client.submissions();
    assert_eq!(submissions.len(), 2);
    assert_eq!(submissions[0].kind, "stake");
    assert_eq!(scheduler.current_plan(&ctx).unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn cold_start_resume_works_without_recover() {
    let backend: Arc<dyn KvBackend> = Arc::new(MemoryBackend::new());
    let store = test_store(Arc::clone(&backend));
    PlanRepository::new(store.clone()).save(&interrupted_plan("0xC01D")).unwrap();

    let client = Arc::new(ScriptedClient::new());
    let scheduler = scheduler(&test_store(backend), client.clone());
    let ctx = test_context("0xc01d");
    let mut events = scheduler.subscribe();

    // Nothing runs in this process, so the stored status is stale
    let current = scheduler.current_plan(&ctx).unwrap().unwrap();
    assert_eq!(current.status, PlanStatus::Paused);
    assert_eq!(current.current_index, 2);
    assert_eq!(
        PlanRepository::new(store.clone()).load(&ctx.owner).unwrap().unwrap().status,
        PlanStatus::Executing
    );

    let resumed = scheduler.resume(&ctx).await.unwrap();
    assert_eq!(resumed.status, PlanStatus::Executing);
    assert_eq!(resumed.current_index, 2);
    assert_eq!(
        scheduler.current_plan(&ctx).unwrap().unwrap().status,
        PlanStatus::Executing
    );

    let first = events.recv().await.unwrap().kind;
    let second = events.recv().await.unwrap().kind;
    assert_eq!(first, SchedulerEventKind::Paused);
    assert_eq!(second, SchedulerEventKind::Resumed);

    scheduler.join(&ctx).await;
    assert_eq!(client.submissions().len(), 2);
    assert!(!PlanRepository::new(store).exists(&ctx.owner).unwrap());
}

#[tokio::test]
async fn recover_leaves_other_statuses_alone() {
    let (store, ctx) = (test_store(Arc::new(MemoryBackend::new())), test_context("0xidle"));
    let scheduler = scheduler(&store, Arc::new(ScriptedClient::new()));

    assert_eq!(scheduler.recover(&ctx).await.unwrap(), None);

    let created = scheduler
        .create_plan(&ctx, PlanRequest::new(Amount::from_whole(2), 2))
        .await
        .unwrap();
    let recovered = scheduler.recover(&ctx).await.unwrap().unwrap();
    assert_eq!(recovered, created);

    let mut done = sample_plan("0xidle", 2, 2);
    done.status = PlanStatus::Completed;
    PlanRepository::new(store.clone()).save(&done).unwrap();
    assert_eq!(scheduler.recover(&ctx).await.unwrap(), None);
    assert!(!PlanRepository::new(store).exists(&ctx.owner).unwrap());
}

#[tokio::test(start_paused = true)]
async fn file_backed_plan_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = test_context("0xF11E");

    {
        let store = test_store(Arc::new(FileBackend::open(dir.path()).unwrap()));
        PlanRepository::new(store).save(&interrupted_plan("0xF11E")).unwrap();
    }

    let store = test_store(Arc::new(FileBackend::open(dir.path()).unwrap()));
    let client = Arc::new(ScriptedClient::new());
    let scheduler = scheduler(&store, client.clone());

    let recovered = scheduler.recover(&ctx).await.unwrap().unwrap();
    assert_eq!(recovered.status, PlanStatus::Paused);
    scheduler.resume(&ctx).await.unwrap();
    scheduler.join(&ctx).await;

    assert_eq!(client.submissions().len(), 2);
    assert!(!PlanRepository::new(store).exists(&ctx.owner).unwrap());
}

#[tokio::test(start_paused = true)]
async fn transient_write_failures_are_retried() {
    let backend = Arc::new(FlakyBackend::new());
    let store = test_store(backend.clone());
    let client = Arc::new(ScriptedClient::new());
    let scheduler = scheduler(&store, client.clone());
    let ctx = test_context("0xRETRY");

    scheduler
        .create_plan(&ctx, PlanRequest::new(Amount::from_whole(6), 4))
        .await
        .unwrap();
    scheduler.approve(&ctx).await.unwrap();
    scheduler.start(&ctx).await.unwrap();
    backend.fail_next_puts(2);
    scheduler.join(&ctx).await;

    assert_eq!(client.submissions().len(), 4);
    assert_eq!(scheduler.current_plan(&ctx).unwrap(), None);
}

#[tokio::test(start_paused = true)]
async fn unpersistable_outcome_is_parked_not_failed() {
    let backend = Arc::new(FlakyBackend::new());
    let store = test_store(backend.clone());
    let client = Arc::new(ScriptedClient::new());
    let scheduler = scheduler(&store, client.clone());
    let ctx = test_context("0xPARK");
    let mut events = scheduler.subscribe();

    scheduler
        .create_plan(&ctx, PlanRequest::new(Amount::from_whole(8), 4))
        .await
        .unwrap();
    scheduler.approve(&ctx).await.unwrap();
    scheduler.start(&ctx).await.unwrap();
    backend.set_fail_all_puts(true);
    scheduler.join(&ctx).await;

    // Step 0 went out once and the run halted
    assert_eq!(client.submissions().len(), 1);
    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds.last(),
        Some(&SchedulerEventKind::PersistenceDeferred { index: 0 })
    );

    // In memory the step is executed; on disk it is not yet
    let parked = scheduler.current_plan(&ctx).unwrap().unwrap();
    assert_eq!(parked.status, PlanStatus::Executing);
    assert_eq!(parked.current_index, 1);
    assert!(parked.transaction_sequence[0].executed);
    let stored = PlanRepository::new(store.clone()).load(&ctx.owner).unwrap().unwrap();
    assert_eq!(stored.current_index, 0);

    let err = scheduler.pause(&ctx).await.unwrap_err();
    assert!(matches!(err, EngineError::PersistencePending { index: 0, .. }));
    assert!(err.is_retryable());

    backend.set_fail_all_puts(false);
    let paused = scheduler.pause(&ctx).await.unwrap();
    assert_eq!(paused.status, PlanStatus::Paused);
    assert_eq!(paused.current_index, 1);
    let stored = PlanRepository::new(store).load(&ctx.owner).unwrap().unwrap();
    assert_eq!(stored.current_index, 1);
    assert!(stored.transaction_sequence[0].executed);

    scheduler.resume(&ctx).await.unwrap();
    scheduler.join(&ctx).await;

    // Step 0 was never resubmitted
    assert_eq!(client.submissions().len(), 4);
    assert_eq!(scheduler.current_plan(&ctx).unwrap(), None);
}
