//! Core order entity, timestamps and the lifecycle state machine
use crate::codes::PaymentCode;
use crate::error::{Error, Result};
use crate::student::Pid;
use crate::utils;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

#[derive(Debug, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl<T: TimeZone> PartialEq for TimeStamp<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: TimeZone> Eq for TimeStamp<T> {}

impl<T: TimeZone> PartialOrd for TimeStamp<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: TimeZone> Ord for TimeStamp<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .unwrap()
            .into()
    }
    /// A timestamp the given number of hours in the past, for window maths.
    pub fn hours_ago(hours: i64) -> Self {
        Self(Utc::now() - chrono::Duration::hours(hours))
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> std::result::Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(
        d: &mut minicbor::Decoder<'b>,
        _: &mut C,
    ) -> std::result::Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    #[n(0)]
    PendingPayment,
    #[n(1)]
    PaidUnverified,
    #[n(2)]
    Verified,
    #[n(3)]
    Fulfilled,
    #[n(4)]
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PendingPayment => "PENDING_PAYMENT",
            OrderStatus::PaidUnverified => "PAID_UNVERIFIED",
            OrderStatus::Verified => "VERIFIED",
            OrderStatus::Fulfilled => "FULFILLED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Fulfilled | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cart line, snapshotted at checkout. Later menu edits never reach back
/// into historical orders.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    #[n(0)]
    pub item_id: String,
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub unit_price: u64,
    #[n(3)]
    pub quantity: u32,
}

impl LineItem {
    pub fn new(item_id: impl Into<String>, name: impl Into<String>, unit_price: u64, quantity: u32) -> Self {
        Self {
            item_id: item_id.into(),
            name: name.into(),
            unit_price,
            quantity,
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Order {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub pid: Pid,
    #[n(2)]
    pub line_items: Vec<LineItem>,
    #[n(3)]
    pub total: u64,
    #[n(4)]
    pub status: OrderStatus,
    #[n(5)]
    pub payment_code: Option<PaymentCode>,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
    #[n(7)]
    pub updated_at: TimeStamp<Utc>,
    #[n(8)]
    pub verified_at: Option<TimeStamp<Utc>>,
    #[n(9)]
    pub fulfilled_at: Option<TimeStamp<Utc>>,
    #[n(10)]
    pub cancelled_at: Option<TimeStamp<Utc>>,
}

/// Merge-style partial update for an order document. The store applies the
/// set fields and refreshes `updated_at`.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub status: Option<OrderStatus>,
    pub payment_code: Option<PaymentCode>,
    pub verified_at: Option<TimeStamp<Utc>>,
    pub fulfilled_at: Option<TimeStamp<Utc>>,
    pub cancelled_at: Option<TimeStamp<Utc>>,
}

impl OrderPatch {
    pub fn apply(self, order: &mut Order) {
        if let Some(status) = self.status {
            order.status = status;
        }
        if let Some(code) = self.payment_code {
            order.payment_code = Some(code);
        }
        if let Some(ts) = self.verified_at {
            order.verified_at = Some(ts);
        }
        if let Some(ts) = self.fulfilled_at {
            order.fulfilled_at = Some(ts);
        }
        if let Some(ts) = self.cancelled_at {
            order.cancelled_at = Some(ts);
        }
    }
}

impl Order {
    /// Build a fresh order from a checkout snapshot. The total is computed
    /// here once and never recomputed, so later price edits cannot alter it.
    pub fn new(pid: Pid, line_items: Vec<LineItem>) -> Result<Self> {
        if line_items.is_empty() {
            return Err(Error::InvalidInput("order has no line items".into()));
        }
        if line_items.iter().any(|it| it.quantity < 1) {
            return Err(Error::InvalidInput(
                "line item quantity must be at least 1".into(),
            ));
        }

        let total = line_items
            .iter()
            .map(|it| it.quantity as u64 * it.unit_price)
            .sum();
        let id = utils::new_uuid_to_bech32("order_")?;
        let now = TimeStamp::new();

        Ok(Self {
            id,
            pid,
            line_items,
            total,
            status: OrderStatus::PendingPayment,
            payment_code: None,
            created_at: now.clone(),
            updated_at: now,
            verified_at: None,
            fulfilled_at: None,
            cancelled_at: None,
        })
    }

    /// Guard for attaching a freshly generated payment code. Only a
    /// PENDING_PAYMENT order accepts one; the transition lands the order in
    /// PAID_UNVERIFIED.
    pub fn accept_payment_code(&self, code: &PaymentCode) -> Result<OrderPatch> {
        if code.is_empty() {
            return Err(Error::InvalidInput("payment code is empty".into()));
        }
        if self.status != OrderStatus::PendingPayment {
            return Err(Error::InvalidTransition {
                from: self.status,
                event: "assign a payment code to",
            });
        }
        Ok(OrderPatch {
            status: Some(OrderStatus::PaidUnverified),
            payment_code: Some(code.clone()),
            ..OrderPatch::default()
        })
    }

    /// Guard for the staff verify action. `None` means the order is already
    /// VERIFIED and the call is an idempotent no-op.
    pub fn verify(&self, at: TimeStamp<Utc>) -> Result<Option<OrderPatch>> {
        match self.status {
            OrderStatus::PaidUnverified => Ok(Some(OrderPatch {
                status: Some(OrderStatus::Verified),
                verified_at: Some(at),
                ..OrderPatch::default()
            })),
            OrderStatus::Verified => Ok(None),
            from => Err(Error::InvalidTransition {
                from,
                event: "verify",
            }),
        }
    }

    /// Guard for fulfilment. Re-fulfilling a FULFILLED order is a no-op so a
    /// double-click from the staff console cannot re-stamp `fulfilled_at`.
    pub fn fulfill(&self, at: TimeStamp<Utc>) -> Result<Option<OrderPatch>> {
        match self.status {
            OrderStatus::Verified => Ok(Some(OrderPatch {
                status: Some(OrderStatus::Fulfilled),
                fulfilled_at: Some(at),
                ..OrderPatch::default()
            })),
            OrderStatus::Fulfilled => Ok(None),
            from => Err(Error::InvalidTransition {
                from,
                event: "fulfill",
            }),
        }
    }

    /// Guard for cancellation. Any pre-terminal state may cancel; a second
    /// cancel is a no-op; a fulfilled order is an immutable record and the
    /// attempt is rejected.
    pub fn cancel(&self, at: TimeStamp<Utc>) -> Result<Option<OrderPatch>> {
        match self.status {
            OrderStatus::PendingPayment | OrderStatus::PaidUnverified | OrderStatus::Verified => {
                Ok(Some(OrderPatch {
                    status: Some(OrderStatus::Cancelled),
                    cancelled_at: Some(at),
                    ..OrderPatch::default()
                }))
            }
            OrderStatus::Cancelled => Ok(None),
            from => Err(Error::InvalidTransition {
                from,
                event: "cancel",
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_encoding() {
        let original = TimeStamp::new();

        let encoding = minicbor::to_vec(&original).unwrap();
        let decode: TimeStamp<Utc> = minicbor::decode(&encoding).unwrap();

        assert_eq!(original, decode);
    }

    #[test]
    fn order_encoding() {
        let pid = Pid::new("s123").unwrap();
        let order = Order::new(pid, vec![LineItem::new("item-1", "Tea", 12, 2)]).unwrap();

        let encoding = minicbor::to_vec(&order).unwrap();
        let decode: Order = minicbor::decode(&encoding).unwrap();

        assert_eq!(order, decode);
    }

    #[test]
    fn total_is_sum_of_lines() {
        let pid = Pid::new("s123").unwrap();
        let order = Order::new(
            pid,
            vec![
                LineItem::new("a", "Samosa", 20, 3),
                LineItem::new("b", "Coffee", 18, 1),
            ],
        )
        .unwrap();

        assert_eq!(order.total, 78);
        assert_eq!(order.status, OrderStatus::PendingPayment);
        assert!(order.payment_code.is_none());
    }
}
