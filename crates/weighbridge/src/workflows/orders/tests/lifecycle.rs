use super::common::*;

use chrono::{Duration, Utc};

use crate::store::Store;
use crate::workflows::orders::domain::{
    OrderEventData, OrderId, OrderStatus, OrderView, TenantId, WeighTarget,
};
use crate::workflows::orders::service::{OrderService, OrderServiceError};
use crate::workflows::orders::verification::{RecommendedAction, WeightStatus};

async fn create_burrito_order(
    service: &OrderService<ScriptedStructuring, ScriptedVision>,
    tenant: &TenantId,
) -> OrderView {
    service
        .create_order(tenant, "1 burrito", burrito_payload())
        .await
        .expect("order is created")
}

async fn backdate(store: &Store, id: &OrderId, hours: i64) {
    let stamp = Utc::now() - Duration::hours(hours);
    sqlx::query("UPDATE orders SET created_at = ?, updated_at = ? WHERE id = ?")
        .bind(stamp)
        .bind(stamp)
        .bind(id.to_string())
        .execute(store.pool())
        .await
        .expect("backdate order");
}

#[tokio::test]
async fn weigh_completes_by_default() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;

    let weighed = service
        .record_weight(&tenant(), &view.id, 470, WeighTarget::default(), None)
        .await
        .expect("weight records");

    assert_eq!(weighed.order.status, "completed");
    assert_eq!(weighed.order.actual_weight_grams, Some(470));
    assert_eq!(weighed.order.delta_weight_grams, Some(20));
    assert!(weighed.order.weight_verified_at.is_some());
    assert_eq!(weighed.verdict.status, WeightStatus::Perfect);
    assert_eq!(weighed.verdict.action, RecommendedAction::Ready);
    assert_eq!(weighed.verdict.tolerance_grams, 100);
}

#[tokio::test]
async fn weigh_can_stop_at_weighed() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;

    let weighed = service
        .record_weight(&tenant(), &view.id, 470, WeighTarget::Weighed, None)
        .await
        .expect("weight records");

    assert_eq!(weighed.order.status, "weighed");
}

#[tokio::test]
async fn repeat_weigh_is_rejected() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;
    service
        .record_weight(&tenant(), &view.id, 470, WeighTarget::default(), None)
        .await
        .expect("first weigh");

    match service
        .record_weight(&tenant(), &view.id, 480, WeighTarget::default(), None)
        .await
    {
        Err(OrderServiceError::Transition(transition)) => {
            assert_eq!(transition.from, OrderStatus::Completed);
        }
        other => panic!("expected transition error, got {other:?}"),
    }
}

#[tokio::test]
async fn weigh_event_carries_actor_and_outcome() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;

    service
        .record_weight(
            &tenant(),
            &view.id,
            300,
            WeighTarget::default(),
            Some("maria".to_string()),
        )
        .await
        .expect("weight records");

    let events = service
        .order_events(&tenant(), &view.id)
        .await
        .expect("ledger loads");
    assert_eq!(events.len(), 2);
    assert_eq!(
        events[1].data,
        OrderEventData::WeightVerified {
            actual_weight_grams: 300,
            expected_weight_grams: 450,
            delta_weight_grams: -150,
            outcome: WeightStatus::Underweight,
        }
    );
    assert_eq!(events[1].actor.as_deref(), Some("maria"));
}

#[tokio::test]
async fn revert_from_weighed_clears_measurements() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;
    service
        .record_weight(&tenant(), &view.id, 600, WeighTarget::Weighed, None)
        .await
        .expect("weight records");

    let reverted = service
        .revert(&tenant(), &view.id, None)
        .await
        .expect("revert succeeds");

    assert_eq!(reverted.status, "pending_weight");
    assert!(reverted.actual_weight_grams.is_none());
    assert!(reverted.delta_weight_grams.is_none());
    assert!(reverted.weight_verified_at.is_none());

    let events = service
        .order_events(&tenant(), &view.id)
        .await
        .expect("ledger loads");
    assert_eq!(
        events.last().map(|event| &event.data),
        Some(&OrderEventData::StatusChanged {
            from: OrderStatus::Weighed,
            to: OrderStatus::PendingWeight,
            reason: None,
        })
    );
}

#[tokio::test]
async fn revert_from_completed_keeps_measurements() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;
    service
        .record_weight(&tenant(), &view.id, 470, WeighTarget::default(), None)
        .await
        .expect("weight records");

    let reverted = service
        .revert(&tenant(), &view.id, None)
        .await
        .expect("revert succeeds");

    assert_eq!(reverted.status, "weighed");
    assert_eq!(reverted.actual_weight_grams, Some(470));
    assert_eq!(reverted.delta_weight_grams, Some(20));
}

#[tokio::test]
async fn revert_requires_weighed_or_completed() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;

    match service.revert(&tenant(), &view.id, None).await {
        Err(OrderServiceError::Transition(transition)) => {
            assert_eq!(transition.from, OrderStatus::PendingWeight);
        }
        other => panic!("expected transition error, got {other:?}"),
    }
}

#[tokio::test]
async fn staging_requires_a_weighed_order() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;

    match service.stage_for_lockers(&tenant(), &view.id, None).await {
        Err(OrderServiceError::Transition(transition)) => {
            assert_eq!(transition.from, OrderStatus::PendingWeight);
        }
        other => panic!("expected transition error, got {other:?}"),
    }

    service
        .record_weight(&tenant(), &view.id, 470, WeighTarget::Weighed, None)
        .await
        .expect("weight records");
    let staged = service
        .stage_for_lockers(&tenant(), &view.id, None)
        .await
        .expect("staging succeeds");
    assert_eq!(staged.status, "ready_for_lockers");
}

#[tokio::test]
async fn batch_complete_finishes_every_staged_order() {
    let (service, _store) = build_service().await;
    let mut ids = Vec::new();
    for _ in 0..2 {
        let view = create_burrito_order(&service, &tenant()).await;
        service
            .record_weight(&tenant(), &view.id, 470, WeighTarget::Weighed, None)
            .await
            .expect("weight records");
        service
            .stage_for_lockers(&tenant(), &view.id, None)
            .await
            .expect("staging succeeds");
        ids.push(view.id);
    }

    let completed = service
        .batch_complete(&tenant(), &ids, Some("locker-crew".to_string()))
        .await
        .expect("batch completes");
    assert_eq!(completed, 2);

    for id in &ids {
        let view = service.order(&tenant(), id).await.expect("order loads");
        assert_eq!(view.status, "completed");
        let events = service
            .order_events(&tenant(), id)
            .await
            .expect("ledger loads");
        assert_eq!(
            events.last().map(|event| &event.data),
            Some(&OrderEventData::StatusChanged {
                from: OrderStatus::ReadyForLockers,
                to: OrderStatus::Completed,
                reason: Some("batch completion".to_string()),
            })
        );
    }
}

#[tokio::test]
async fn batch_complete_aborts_whole_batch_on_a_mismatch() {
    let (service, _store) = build_service().await;
    let staged = create_burrito_order(&service, &tenant()).await;
    service
        .record_weight(&tenant(), &staged.id, 470, WeighTarget::Weighed, None)
        .await
        .expect("weight records");
    service
        .stage_for_lockers(&tenant(), &staged.id, None)
        .await
        .expect("staging succeeds");
    let pending = create_burrito_order(&service, &tenant()).await;

    match service
        .batch_complete(&tenant(), &[staged.id, pending.id], None)
        .await
    {
        Err(OrderServiceError::Transition(transition)) => {
            assert_eq!(transition.from, OrderStatus::PendingWeight);
        }
        other => panic!("expected transition error, got {other:?}"),
    }

    let untouched = service
        .order(&tenant(), &staged.id)
        .await
        .expect("order loads");
    assert_eq!(untouched.status, "ready_for_lockers");
}

#[tokio::test]
async fn batch_complete_aborts_on_unknown_ids() {
    let (service, _store) = build_service().await;
    let staged = create_burrito_order(&service, &tenant()).await;
    service
        .record_weight(&tenant(), &staged.id, 470, WeighTarget::Weighed, None)
        .await
        .expect("weight records");
    service
        .stage_for_lockers(&tenant(), &staged.id, None)
        .await
        .expect("staging succeeds");

    match service
        .batch_complete(&tenant(), &[staged.id, OrderId::new()], None)
        .await
    {
        Err(OrderServiceError::NotFound) => {}
        other => panic!("expected not found, got {other:?}"),
    }

    let untouched = service
        .order(&tenant(), &staged.id)
        .await
        .expect("order loads");
    assert_eq!(untouched.status, "ready_for_lockers");
}

#[tokio::test]
async fn cancel_open_orders_and_record_the_reason() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;

    let cancelled = service
        .cancel(
            &tenant(),
            &view.id,
            Some("customer no-show".to_string()),
            None,
        )
        .await
        .expect("cancel succeeds");
    assert_eq!(cancelled.status, "cancelled");

    let events = service
        .order_events(&tenant(), &view.id)
        .await
        .expect("ledger loads");
    assert_eq!(
        events.last().map(|event| &event.data),
        Some(&OrderEventData::StatusChanged {
            from: OrderStatus::PendingWeight,
            to: OrderStatus::Cancelled,
            reason: Some("customer no-show".to_string()),
        })
    );
}

#[tokio::test]
async fn cancel_requires_an_open_order() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;
    service
        .record_weight(&tenant(), &view.id, 470, WeighTarget::default(), None)
        .await
        .expect("weight records");

    match service.cancel(&tenant(), &view.id, None, None).await {
        Err(OrderServiceError::Transition(transition)) => {
            assert_eq!(transition.from, OrderStatus::Completed);
        }
        other => panic!("expected transition error, got {other:?}"),
    }
}

#[tokio::test]
async fn archive_works_from_any_status_and_repeats_as_a_noop() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;
    service
        .record_weight(&tenant(), &view.id, 470, WeighTarget::default(), None)
        .await
        .expect("weight records");

    let archived = service
        .archive(&tenant(), &view.id, None, None)
        .await
        .expect("archive succeeds");
    assert_eq!(archived.status, "archived");
    assert_eq!(archived.archived_reason.as_deref(), Some("archived by operator"));
    assert!(archived.archived_at.is_some());

    let repeated = service
        .archive(&tenant(), &view.id, Some("again".to_string()), None)
        .await
        .expect("repeat archive succeeds");
    assert_eq!(repeated.status, "archived");
    assert_eq!(repeated.archived_reason.as_deref(), Some("archived by operator"));

    let events = service
        .order_events(&tenant(), &view.id)
        .await
        .expect("ledger loads");
    let archive_events = events
        .iter()
        .filter(|event| matches!(event.data, OrderEventData::Archived { .. }))
        .count();
    assert_eq!(archive_events, 1, "repeat archive must not append");
}

#[tokio::test]
async fn unarchive_restores_pending_by_default() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;
    service
        .archive(&tenant(), &view.id, None, None)
        .await
        .expect("archive succeeds");

    let restored = service
        .unarchive(&tenant(), &view.id, None, None)
        .await
        .expect("unarchive succeeds");

    assert_eq!(restored.status, "pending_weight");
    assert!(restored.archived_at.is_none());
    assert!(restored.archived_reason.is_none());

    let events = service
        .order_events(&tenant(), &view.id)
        .await
        .expect("ledger loads");
    assert_eq!(
        events.last().map(|event| &event.data),
        Some(&OrderEventData::Unarchived {
            restored_to: OrderStatus::PendingWeight,
        })
    );
}

#[tokio::test]
async fn unarchive_honors_an_explicit_restore_target() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;
    service
        .record_weight(&tenant(), &view.id, 470, WeighTarget::Weighed, None)
        .await
        .expect("weight records");
    service
        .archive(&tenant(), &view.id, None, None)
        .await
        .expect("archive succeeds");

    let restored = service
        .unarchive(&tenant(), &view.id, Some(OrderStatus::Weighed), None)
        .await
        .expect("unarchive succeeds");
    assert_eq!(restored.status, "weighed");
}

#[tokio::test]
async fn unarchive_rejects_archived_as_a_target() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;
    service
        .archive(&tenant(), &view.id, None, None)
        .await
        .expect("archive succeeds");

    match service
        .unarchive(&tenant(), &view.id, Some(OrderStatus::Archived), None)
        .await
    {
        Err(OrderServiceError::Validation(_)) => {}
        other => panic!("expected validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn unarchive_requires_an_archived_order() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;

    match service.unarchive(&tenant(), &view.id, None, None).await {
        Err(OrderServiceError::Transition(transition)) => {
            assert_eq!(transition.from, OrderStatus::PendingWeight);
        }
        other => panic!("expected transition error, got {other:?}"),
    }
}

#[tokio::test]
async fn sweep_archives_stale_pending_orders_across_tenants() {
    let (service, store) = build_service().await;
    seed_catalog(&store, &other_tenant()).await;

    let stale_a = create_burrito_order(&service, &tenant()).await;
    let fresh = create_burrito_order(&service, &tenant()).await;
    let stale_b = create_burrito_order(&service, &other_tenant()).await;
    let done = create_burrito_order(&service, &tenant()).await;
    service
        .record_weight(&tenant(), &done.id, 470, WeighTarget::default(), None)
        .await
        .expect("weight records");

    backdate(&store, &stale_a.id, 30).await;
    backdate(&store, &stale_b.id, 30).await;
    backdate(&store, &done.id, 30).await;

    let archived = service.sweep_inactive().await.expect("sweep runs");
    assert_eq!(archived, 2);

    let swept = service
        .order(&tenant(), &stale_a.id)
        .await
        .expect("order loads");
    assert_eq!(swept.status, "archived");
    assert_eq!(
        swept.archived_reason.as_deref(),
        Some("auto-archived after 24h of inactivity")
    );

    let events = service
        .order_events(&tenant(), &stale_a.id)
        .await
        .expect("ledger loads");
    let last = events.last().expect("archive event present");
    assert!(matches!(last.data, OrderEventData::Archived { .. }));
    assert_eq!(last.actor.as_deref(), Some("system"));

    let foreign = service
        .order(&other_tenant(), &stale_b.id)
        .await
        .expect("order loads");
    assert_eq!(foreign.status, "archived");

    let untouched = service
        .order(&tenant(), &fresh.id)
        .await
        .expect("order loads");
    assert_eq!(untouched.status, "pending_weight");

    let completed = service
        .order(&tenant(), &done.id)
        .await
        .expect("order loads");
    assert_eq!(completed.status, "completed", "sweep only takes pending");
}

#[tokio::test]
async fn sweep_skips_orders_touched_inside_the_window() {
    let (service, store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;

    // Old order, recent activity.
    let stamp = Utc::now() - Duration::hours(30);
    sqlx::query("UPDATE orders SET created_at = ? WHERE id = ?")
        .bind(stamp)
        .bind(view.id.to_string())
        .execute(store.pool())
        .await
        .expect("backdate creation");

    let archived = service.sweep_inactive().await.expect("sweep runs");
    assert_eq!(archived, 0);

    let untouched = service
        .order(&tenant(), &view.id)
        .await
        .expect("order loads");
    assert_eq!(untouched.status, "pending_weight");
}

#[tokio::test]
async fn ledger_reads_back_in_commit_order() {
    let (service, _store) = build_service().await;
    let view = create_burrito_order(&service, &tenant()).await;
    service
        .record_weight(&tenant(), &view.id, 300, WeighTarget::Weighed, None)
        .await
        .expect("first weigh");
    service
        .revert(&tenant(), &view.id, None)
        .await
        .expect("revert succeeds");
    service
        .record_weight(&tenant(), &view.id, 440, WeighTarget::Weighed, None)
        .await
        .expect("second weigh");
    service
        .stage_for_lockers(&tenant(), &view.id, None)
        .await
        .expect("staging succeeds");

    let events = service
        .order_events(&tenant(), &view.id)
        .await
        .expect("ledger loads");
    let kinds: Vec<_> = events.iter().map(|event| event.data.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            "created",
            "weight_verified",
            "status_changed",
            "weight_verified",
            "status_changed",
        ]
    );
    assert!(events.windows(2).all(|pair| pair[0].id < pair[1].id));
}
