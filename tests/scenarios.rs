#![allow(unused_imports)]

use anyhow::Context;
use canteen_orders::codes::PaymentCode;
use canteen_orders::error::Error;
use canteen_orders::order::{LineItem, OrderPatch, OrderStatus};
use canteen_orders::settings::CancelThreshold;
use canteen_orders::student::StudentPatch;
use canteen_orders::{CancelledBy, CanteenService, SledStore, Store};
use std::sync::Arc;

use canteen_orders::feed::EntityKind;
use canteen_orders::order::TimeStamp;
use tempfile::tempdir;

// Sled uses file-based locking to prevent concurrent access, so only one
// test can hold a database at a time. As is good practice in testing, each
// test opens its own database inside a tempdir for simplified cleanup.
fn open_service(dir: &tempfile::TempDir, name: &str) -> anyhow::Result<CanteenService<SledStore>> {
    let store = SledStore::open(dir.path().join(name))?;
    store.ensure_init()?;
    Ok(CanteenService::new(store))
}

fn small_cart() -> Vec<LineItem> {
    vec![
        LineItem::new("item-tea", "Tea", 12, 2),
        LineItem::new("item-samosa", "Samosa", 20, 1),
    ]
}

#[test]
fn checkout_verify_and_fulfill() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "checkout_verify_and_fulfill.db")?;

    let order = service
        .place_order("s1001", small_cart())
        .context("checkout failed: ")?;

    assert_eq!(order.status, OrderStatus::PendingPayment);
    assert_eq!(order.total, 44);
    assert_eq!(order.pid.as_str(), "S1001");
    assert!(order.payment_code.is_none());
    assert!(order.verified_at.is_none());

    // student requests the payment code
    let order = service.request_payment_code(&order.id)?;
    assert_eq!(order.status, OrderStatus::PaidUnverified);
    let code = order.payment_code.clone().expect("code assigned");

    // staff types the code into the console
    let order = service.verify_payment_code(code.as_str())?;
    assert_eq!(order.status, OrderStatus::Verified);
    assert!(order.verified_at.is_some());

    // the same code presented twice reads as a miss
    let second = service.verify_payment_code(code.as_str());
    assert!(matches!(second, Err(Error::CodeNotFound)));

    let order = service.fulfill_order(&order.id)?;
    assert_eq!(order.status, OrderStatus::Fulfilled);
    let stamped_at = order.fulfilled_at.clone().expect("fulfilment stamped");

    // double-click tolerance: a retry succeeds without re-stamping
    let again = service.fulfill_order(&order.id)?;
    assert_eq!(again.status, OrderStatus::Fulfilled);
    assert_eq!(again.fulfilled_at, Some(stamped_at));

    Ok(())
}

#[test]
fn verification_normalizes_staff_input() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "verification_normalizes.db")?;

    let order = service.place_order("s1002", small_cart())?;
    let order = service.request_payment_code(&order.id)?;
    let code = order.payment_code.clone().expect("code assigned");

    // lowercase with padding must still find the order
    let typed = format!("  {}  ", code.as_str().to_lowercase());
    let order = service.verify_payment_code(&typed)?;
    assert_eq!(order.status, OrderStatus::Verified);

    Ok(())
}

#[test]
fn third_cancellation_trips_the_auto_block() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "auto_block.db")?;

    // default threshold is 3
    assert_eq!(service.cancel_threshold()?.get(), 3);

    for round in 0..3 {
        let order = service.place_order("s2001", small_cart())?;
        let cancelled = service.cancel_order(&order.id, CancelledBy::Student)?;
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());

        let standing = service.check_student_standing("s2001")?;
        if round < 2 {
            assert!(!standing.blocked, "blocked before the threshold");
        }
    }

    let standing = service.check_student_standing("s2001")?;
    assert!(standing.blocked);
    assert_eq!(standing.recent_cancellations, 3);
    assert_eq!(
        standing.block_reason,
        "Auto-blocked due to 3 cancellations in last 24h"
    );

    // a blocked student cannot check out, and sees the reason verbatim
    let refused = service.place_order("s2001", small_cart());
    match refused {
        Err(Error::StudentBlocked { reason }) => {
            assert_eq!(reason, "Auto-blocked due to 3 cancellations in last 24h")
        }
        other => panic!("expected StudentBlocked, got {other:?}"),
    }

    Ok(())
}

#[test]
fn aged_cancellations_fall_out_of_the_window() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "aged_cancellations.db")?;

    // two cancellations on record, one of them 25 hours old
    let pid = canteen_orders::student::Pid::new("s2002")?;
    service.store().upsert_student(
        &pid,
        StudentPatch {
            cancellations: Some(vec![TimeStamp::hours_ago(25), TimeStamp::hours_ago(1)]),
            ..StudentPatch::default()
        },
    )?;

    let standing = service.check_student_standing("s2002")?;
    assert_eq!(standing.recent_cancellations, 1);
    assert!(!standing.blocked);

    Ok(())
}

#[test]
fn standing_warns_before_the_last_safe_cancellation() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "standing_warns.db")?;

    for _ in 0..2 {
        let order = service.place_order("s2003", small_cart())?;
        service.cancel_order(&order.id, CancelledBy::Student)?;
    }

    // threshold 3, two recent cancellations: one more blocks, so the
    // advisory flag is up while the student is still unblocked
    let standing = service.check_student_standing("s2003")?;
    assert_eq!(standing.recent_cancellations, 2);
    assert!(!standing.blocked);
    assert!(standing.at_risk());

    Ok(())
}

#[test]
fn staff_cancellations_do_not_feed_the_policy() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "staff_cancellations.db")?;

    for _ in 0..3 {
        let order = service.place_order("s2004", small_cart())?;
        service.cancel_order(&order.id, CancelledBy::Staff)?;
    }

    let standing = service.check_student_standing("s2004")?;
    assert_eq!(standing.recent_cancellations, 0);
    assert!(!standing.blocked);

    Ok(())
}

#[test]
fn staff_block_and_unblock_round_trip() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "staff_block_unblock.db")?;

    service.block_student("s3001", "policy")?;

    let refused = service.place_order("s3001", small_cart());
    match refused {
        Err(Error::StudentBlocked { reason }) => assert_eq!(reason, "policy"),
        other => panic!("expected StudentBlocked, got {other:?}"),
    }

    let student = service.unblock_student("s3001")?;
    assert!(!student.blocked);
    assert!(student.block_reason.is_empty());

    let order = service.place_order("s3001", small_cart())?;
    assert_eq!(order.status, OrderStatus::PendingPayment);

    Ok(())
}

#[test]
fn fulfilled_orders_are_immutable_records() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "fulfilled_immutable.db")?;

    let order = service.place_order("s3002", small_cart())?;
    let order = service.request_payment_code(&order.id)?;
    let code = order.payment_code.clone().expect("code assigned");
    let order = service.verify_payment_code(code.as_str())?;
    let order = service.fulfill_order(&order.id)?;

    let refused = service.cancel_order(&order.id, CancelledBy::Student);
    assert!(matches!(
        refused,
        Err(Error::InvalidTransition {
            from: OrderStatus::Fulfilled,
            ..
        })
    ));

    // the record is unchanged in the store
    let stored = service
        .store()
        .order_by_id(&order.id)?
        .expect("order persisted");
    assert_eq!(stored.status, OrderStatus::Fulfilled);
    assert!(stored.cancelled_at.is_none());

    Ok(())
}

#[test]
fn cancelled_orders_free_their_codes_and_absorb_retries() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "cancelled_absorbs.db")?;

    let order = service.place_order("s3003", small_cart())?;
    let order = service.request_payment_code(&order.id)?;
    let code = order.payment_code.clone().expect("code assigned");

    let order = service.cancel_order(&order.id, CancelledBy::Student)?;
    assert_eq!(order.status, OrderStatus::Cancelled);

    // the code no longer verifies anything
    let miss = service.verify_payment_code(code.as_str());
    assert!(matches!(miss, Err(Error::CodeNotFound)));

    // a second student cancel is a no-op and records nothing new
    let before = service.check_student_standing("s3003")?.recent_cancellations;
    let again = service.cancel_order(&order.id, CancelledBy::Student)?;
    assert_eq!(again.status, OrderStatus::Cancelled);
    let after = service.check_student_standing("s3003")?.recent_cancellations;
    assert_eq!(before, after);

    Ok(())
}

#[test]
fn threshold_is_clamped_and_coerced() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "threshold_clamped.db")?;

    assert_eq!(
        service.set_cancel_threshold(CancelThreshold::new(15))?.get(),
        10
    );
    assert_eq!(
        service.set_cancel_threshold(CancelThreshold::new(0))?.get(),
        1
    );

    // free-form console input that fails to parse falls back to the default
    let coerced = CancelThreshold::coerce(Some("x"));
    assert_eq!(service.set_cancel_threshold(coerced)?.get(), 3);
    assert_eq!(service.cancel_threshold()?.get(), 3);

    Ok(())
}

#[test]
fn threshold_of_one_blocks_on_first_cancellation() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "threshold_one.db")?;

    service.set_cancel_threshold(CancelThreshold::new(1))?;

    let order = service.place_order("s4001", small_cart())?;
    service.cancel_order(&order.id, CancelledBy::Student)?;

    let standing = service.check_student_standing("s4001")?;
    assert!(standing.blocked);
    assert_eq!(standing.recent_cancellations, 1);

    Ok(())
}

#[test]
fn duplicate_codes_verify_only_the_earliest_order() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "duplicate_codes.db")?;

    // normal flow never produces duplicates; simulate a backend
    // inconsistency by patching the same code onto two orders
    let first = service.place_order("s5001", small_cart())?;
    let second = service.place_order("s5001", small_cart())?;

    let code = PaymentCode::normalize("AAA-0000-ZZZ");
    for id in [&first.id, &second.id] {
        service.store().update_order(
            id,
            OrderPatch {
                status: Some(OrderStatus::PaidUnverified),
                payment_code: Some(code.clone()),
                ..OrderPatch::default()
            },
        )?;
    }

    let verified = service.verify_payment_code(code.as_str())?;
    assert_eq!(verified.id, first.id, "earliest-created match wins");

    let untouched = service
        .store()
        .order_by_id(&second.id)?
        .expect("order persisted");
    assert_eq!(untouched.status, OrderStatus::PaidUnverified);

    Ok(())
}

#[test]
fn events_fire_once_per_mutation_and_never_on_failure() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "events.db")?;

    let events = service.subscribe();

    let order = service.place_order("s6001", small_cart())?;
    let event = events.try_recv()?;
    assert_eq!(event.kind, EntityKind::Order);
    assert_eq!(event.id, order.id);
    assert!(events.try_recv().is_err(), "exactly one event per mutation");

    // a failed verification publishes nothing
    let miss = service.verify_payment_code("ZZZ-9999-ZZZ");
    assert!(miss.is_err());
    assert!(events.try_recv().is_err());

    // a student cancellation mutates the order and the ledger
    service.cancel_order(&order.id, CancelledBy::Student)?;
    let kinds: Vec<EntityKind> = events.try_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EntityKind::Order, EntityKind::Student]);

    Ok(())
}

#[test]
fn checkout_rejects_malformed_carts() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "malformed_carts.db")?;

    let empty = service.place_order("s7001", vec![]);
    assert!(matches!(empty, Err(Error::InvalidInput(_))));

    let zero_qty = service.place_order("s7001", vec![LineItem::new("item-tea", "Tea", 12, 0)]);
    assert!(matches!(zero_qty, Err(Error::InvalidInput(_))));

    let short_pid = service.place_order("x", small_cart());
    assert!(matches!(short_pid, Err(Error::InvalidInput(_))));

    Ok(())
}

#[test]
fn staff_password_check_and_change() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let service = open_service(&temp_dir, "staff_password.db")?;

    // the seeded default
    assert!(service.check_staff_password("admin123")?);
    assert!(!service.check_staff_password("wrong")?);

    service.set_staff_password("hunter22")?;
    assert!(service.check_staff_password("hunter22")?);
    assert!(!service.check_staff_password("admin123")?);

    let too_short = service.set_staff_password("abc");
    assert!(matches!(too_short, Err(Error::InvalidInput(_))));

    Ok(())
}
