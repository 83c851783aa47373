//! Property tests for the plan transition function

use chrono::Utc;
use proptest::prelude::*;
use sg_engine::state::{allowed_transitions, apply, PlanEvent};
use sg_plan::{Amount, ExecutionPlanner, PlanStatus, WalletAddress};

fn event_strategy() -> impl Strategy<Value = PlanEvent> {
    prop_oneof![
        Just(PlanEvent::Approve),
        Just(PlanEvent::Start),
        Just(PlanEvent::Pause),
        Just(PlanEvent::Resume),
        (1u64..1_000).prop_map(|n| PlanEvent::StepSucceeded {
            hash: format!("0x{n:x}"),
            executed_at: Utc::now(),
            resolved_amount: Amount::from_whole(n),
        }),
        Just(PlanEvent::StepFailed {
            reason: "reverted".into()
        }),
    ]
}

proptest! {
    #[test]
    fn prop_index_is_monotone_and_steps_run_once(
        steps in 2u32..=20,
        events in prop::collection::vec(event_strategy(), 0..80),
    ) {
        let mut plan = ExecutionPlanner::default()
            .generate(WalletAddress::new("0xprop"), Amount::from_whole(100), steps)
            .unwrap();
        let len = plan.transaction_sequence.len();

        for event in events {
            let before = plan.clone();
            match apply(&mut plan, event) {
                Ok(to) => {
                    prop_assert!(
                        allowed_transitions(before.status).contains(&to),
                        "{:?} -> {:?}", before.status, to
                    );
                    prop_assert!(plan.current_index >= before.current_index);
                    prop_assert!(plan.current_index <= before.current_index + 1);
                    // An executed step keeps its hash
                    for (old, new) in before.transaction_sequence.iter().zip(&plan.transaction_sequence) {
                        if old.executed {
                            prop_assert_eq!(&old.hash, &new.hash);
                        }
                    }
                }
                Err(_) => {
                    prop_assert_eq!(&plan, &before);
                }
            }

            prop_assert!(plan.current_index <= len);
            prop_assert_eq!(plan.executed_count(), plan.current_index);
            prop_assert!(plan.transaction_sequence[..plan.current_index].iter().all(|s| s.executed));
            if plan.status == PlanStatus::Completed {
                prop_assert_eq!(plan.current_index, len);
            }
        }
    }
}
