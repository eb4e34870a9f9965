//! Service layer API for the order workflow operations
//!
//! One method per presentation-facing operation. Every guard re-reads
//! current state from the store immediately before deciding a write; each
//! transition is a single merge-update of a single document, so a failed
//! call leaves nothing to roll back and every call is safe to retry.
use crate::codes::{self, PaymentCode};
use crate::error::{Error, Result};
use crate::feed::{ChangeEvent, ChangeFeed, EntityKind};
use crate::menu::MenuItem;
use crate::order::{LineItem, Order, OrderStatus, TimeStamp};
use crate::policy::{self, CANCEL_WINDOW_HOURS, StudentStanding};
use crate::settings::{self, CancelThreshold, SettingsPatch};
use crate::store::{SETTINGS_KEY, Store};
use crate::student::{Pid, Student, StudentPatch};
use crossbeam_channel::Receiver;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Who asked for a cancellation. Only student-initiated cancellations feed
/// the abuse policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelledBy {
    Student,
    Staff,
}

pub struct CanteenService<S> {
    store: S,
    feed: ChangeFeed,
}

impl<S: Store> CanteenService<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            feed: ChangeFeed::new(),
        }
    }

    /// Read access to the underlying store, for surfaces that render
    /// listings directly.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    fn publish(&self, kind: EntityKind, id: &str) {
        self.feed.publish(kind, id);
    }

    fn load_order(&self, id: &str) -> Result<Order> {
        self.store.order_by_id(id)?.ok_or_else(|| Error::NotFound {
            kind: "order",
            id: id.to_string(),
        })
    }

    /// Checkout: snapshot the cart into a new PENDING_PAYMENT order, unless
    /// the student's ledger record vetoes it.
    pub fn place_order(&self, pid: &str, line_items: Vec<LineItem>) -> Result<Order> {
        let pid = Pid::new(pid)?;

        // Policy veto comes first, from a fresh read of the ledger
        match self.store.student(&pid)? {
            Some(student) if student.blocked => {
                let reason = if student.block_reason.is_empty() {
                    "Policy violation".to_string()
                } else {
                    student.block_reason
                };
                return Err(Error::StudentBlocked { reason });
            }
            Some(_) => {}
            // First interaction creates the ledger record
            None => {
                self.store.upsert_student(&pid, StudentPatch::default())?;
            }
        }

        let order = Order::new(pid, line_items)?;
        let order = self.store.create_order(&order)?;

        info!(order = %order.id, pid = %order.pid, total = order.total, "order placed");
        self.publish(EntityKind::Order, &order.id);

        Ok(order)
    }

    /// Generate a payment code, attach it to a PENDING_PAYMENT order and
    /// advance it to PAID_UNVERIFIED. The collision check covers codes on
    /// every non-cancelled order; a cancelled order frees its code.
    pub fn request_payment_code(&self, order_id: &str) -> Result<Order> {
        let order = self.load_order(order_id)?;

        let in_use: HashSet<PaymentCode> = self
            .store
            .list_orders()?
            .into_iter()
            .filter(|o| o.status != OrderStatus::Cancelled)
            .filter_map(|o| o.payment_code)
            .filter(|c| !c.is_empty())
            .collect();
        let code = codes::generate(&in_use);

        let patch = order.accept_payment_code(&code)?;
        let order = self.store.update_order(&order.id, patch)?;

        info!(order = %order.id, pid = %order.pid, "payment code assigned");
        self.publish(EntityKind::Order, &order.id);

        Ok(order)
    }

    /// Staff verify action. A miss, a code on an already-verified order and
    /// a code on a cancelled order all read the same to the caller, so the
    /// console cannot distinguish them for a stranger.
    pub fn verify_payment_code(&self, raw_code: &str) -> Result<Order> {
        let code = PaymentCode::normalize(raw_code);
        if code.is_empty() {
            return Err(Error::CodeNotFound);
        }

        let order = self
            .store
            .order_by_payment_code(&code)?
            .ok_or(Error::CodeNotFound)?;

        let patch = match order.verify(TimeStamp::new()) {
            Ok(Some(patch)) => patch,
            // stale match: already verified, fulfilled or cancelled
            _ => return Err(Error::CodeNotFound),
        };
        let order = self.store.update_order(&order.id, patch)?;

        info!(order = %order.id, pid = %order.pid, "payment code verified");
        self.publish(EntityKind::Order, &order.id);

        Ok(order)
    }

    /// Hand the order over. Retrying a fulfilled order succeeds without
    /// touching the stored record.
    pub fn fulfill_order(&self, order_id: &str) -> Result<Order> {
        let order = self.load_order(order_id)?;

        match order.fulfill(TimeStamp::new())? {
            Some(patch) => {
                let order = self.store.update_order(&order.id, patch)?;
                info!(order = %order.id, "order fulfilled");
                self.publish(EntityKind::Order, &order.id);
                Ok(order)
            }
            None => {
                debug!(order = %order.id, "fulfill retried on a fulfilled order");
                Ok(order)
            }
        }
    }

    /// Cancel a pre-terminal order. A student-initiated cancellation also
    /// lands in the ledger and may trip the auto-block; a retry on an
    /// already-cancelled order changes nothing and records nothing.
    pub fn cancel_order(&self, order_id: &str, by: CancelledBy) -> Result<Order> {
        let order = self.load_order(order_id)?;

        let order = match order.cancel(TimeStamp::new())? {
            Some(patch) => {
                let order = self.store.update_order(&order.id, patch)?;
                info!(order = %order.id, pid = %order.pid, ?by, "order cancelled");
                self.publish(EntityKind::Order, &order.id);
                order
            }
            None => {
                debug!(order = %order.id, "cancel retried on a cancelled order");
                return Ok(order);
            }
        };

        if by == CancelledBy::Student {
            self.record_student_cancellation(&order.pid)?;
        }

        Ok(order)
    }

    /// Append the cancellation to the ledger, then evaluate the threshold
    /// against the count including this one. The threshold is read from the
    /// store on every call, never cached.
    fn record_student_cancellation(&self, pid: &Pid) -> Result<()> {
        let mut cancellations = self
            .store
            .student(pid)?
            .map(|s| s.cancellations)
            .unwrap_or_default();
        cancellations.push(TimeStamp::new());

        let student = self.store.upsert_student(
            pid,
            StudentPatch {
                cancellations: Some(cancellations),
                ..StudentPatch::default()
            },
        )?;
        self.publish(EntityKind::Student, pid.as_str());

        let threshold = self.store.settings()?.cancel_threshold;
        let recent = student.recent_cancellations(CANCEL_WINDOW_HOURS);
        if policy::should_block(recent, threshold) {
            self.store.upsert_student(
                pid,
                StudentPatch {
                    blocked: Some(true),
                    block_reason: Some(policy::auto_block_reason(recent)),
                    ..StudentPatch::default()
                },
            )?;
            warn!(pid = %pid, recent, threshold = %threshold, "student auto-blocked");
            self.publish(EntityKind::Student, pid.as_str());
        }

        Ok(())
    }

    /// Standing as the checkout dialog needs it: block flag, reason and the
    /// recent count before any pending cancellation is added.
    pub fn check_student_standing(&self, pid: &str) -> Result<StudentStanding> {
        let pid = Pid::new(pid)?;
        let student = self.store.student(&pid)?;
        let threshold = self.store.settings()?.cancel_threshold;

        Ok(StudentStanding::evaluate(pid, student.as_ref(), threshold))
    }

    /// Staff block. Idempotent; an empty reason gets the stock wording.
    pub fn block_student(&self, pid: &str, reason: &str) -> Result<Student> {
        let pid = Pid::new(pid)?;
        let reason = if reason.trim().is_empty() {
            "Blocked by admin".to_string()
        } else {
            reason.to_string()
        };

        let student = self.store.upsert_student(
            &pid,
            StudentPatch {
                blocked: Some(true),
                block_reason: Some(reason),
                ..StudentPatch::default()
            },
        )?;

        info!(pid = %pid, "student blocked by staff");
        self.publish(EntityKind::Student, pid.as_str());

        Ok(student)
    }

    /// Staff unblock; clears the reason.
    pub fn unblock_student(&self, pid: &str) -> Result<Student> {
        let pid = Pid::new(pid)?;

        let student = self.store.upsert_student(
            &pid,
            StudentPatch {
                blocked: Some(false),
                block_reason: Some(String::new()),
                ..StudentPatch::default()
            },
        )?;

        info!(pid = %pid, "student unblocked by staff");
        self.publish(EntityKind::Student, pid.as_str());

        Ok(student)
    }

    pub fn cancel_threshold(&self) -> Result<CancelThreshold> {
        Ok(self.store.settings()?.cancel_threshold)
    }

    pub fn set_cancel_threshold(&self, threshold: CancelThreshold) -> Result<CancelThreshold> {
        let settings = self.store.update_settings(SettingsPatch {
            cancel_threshold: Some(threshold),
            ..SettingsPatch::default()
        })?;

        info!(threshold = %settings.cancel_threshold, "cancel threshold updated");
        self.publish(EntityKind::Settings, SETTINGS_KEY);

        Ok(settings.cancel_threshold)
    }

    pub fn check_staff_password(&self, pass: &str) -> Result<bool> {
        Ok(settings::hash_password(pass) == self.store.settings()?.admin_password_hash)
    }

    pub fn set_staff_password(&self, new_password: &str) -> Result<()> {
        if new_password.len() < 6 {
            return Err(Error::InvalidInput(
                "password must be at least 6 characters".into(),
            ));
        }

        self.store.update_settings(SettingsPatch {
            admin_password_hash: Some(settings::hash_password(new_password)),
            ..SettingsPatch::default()
        })?;

        info!("staff password updated");
        self.publish(EntityKind::Settings, SETTINGS_KEY);

        Ok(())
    }

    pub fn list_orders(&self) -> Result<Vec<Order>> {
        self.store.list_orders()
    }

    pub fn orders_for_student(&self, pid: &str) -> Result<Vec<Order>> {
        let pid = Pid::new(pid)?;
        self.store.orders_for_student(&pid)
    }

    pub fn list_menu(&self) -> Result<Vec<MenuItem>> {
        self.store.list_menu()
    }

    pub fn upsert_menu_item(&self, item: MenuItem) -> Result<MenuItem> {
        let item = self.store.upsert_menu_item(item)?;
        self.publish(EntityKind::MenuItem, &item.id);
        Ok(item)
    }

    pub fn set_menu_available(&self, id: &str, available: bool) -> Result<MenuItem> {
        let item = self.store.set_menu_available(id, available)?;
        self.publish(EntityKind::MenuItem, &item.id);
        Ok(item)
    }

    pub fn delete_menu_item(&self, id: &str) -> Result<()> {
        self.store.delete_menu_item(id)?;
        self.publish(EntityKind::MenuItem, id);
        Ok(())
    }
}
