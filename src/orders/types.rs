//! Core types for ladder order tracking.
//!
//! Provides type-safe order identifiers and the persisted ledger entry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::OrderSide;

/// Type-safe broker-assigned trigger identifier.
///
/// Uses a newtype wrapper to prevent accidentally mixing order IDs with
/// other string types at compile time. `Clone`, `Send` and `Sync`, so it
/// crosses async boundaries freely.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(String);

impl OrderId {
    /// Create a new OrderId from any string-like type.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let s: String = id.into();
        debug_assert!(!s.is_empty(), "OrderId cannot be empty");
        if s.is_empty() {
            tracing::warn!("Creating OrderId with empty string - this may cause tracking issues");
        }
        Self(s)
    }

    /// Get the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner String.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OrderId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for OrderId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Ledger order lifecycle states.
///
/// Serialized in uppercase to stay readable alongside ledger files
/// written by earlier runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Submitted, not yet confirmed live by the broker
    Pending,
    /// Confirmed live, waiting for the trigger price
    Active,
    /// Trigger fired; the limit order is assumed to be filling
    Triggered,
    /// Filled (terminal)
    Complete,
    /// Rejected or failed after triggering (terminal)
    Failed,
    /// Explicitly cancelled (terminal)
    Cancelled,
}

impl OrderStatus {
    /// True once no further updates are expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }

    /// True while the order still sits (or may sit) on the broker's
    /// open-trigger list.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }

    /// True if the order contributes shares to the position.
    pub fn counts_as_filled(&self) -> bool {
        matches!(self, Self::Complete | Self::Triggered)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Triggered => write!(f, "TRIGGERED"),
            Self::Complete => write!(f, "COMPLETE"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// How an order was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderKind {
    /// Immediate market order (first rung during market hours)
    #[serde(rename = "MARKET")]
    Market,
    /// Conditional good-till-triggered limit order
    #[serde(rename = "LIMIT_GTT")]
    LimitGtt,
}

/// Evidence backing a COMPLETE transition.
///
/// Reconciliation can prove a fill from the broker's reported status, or
/// merely infer it from the order vanishing off the open-trigger list.
/// The inference is recorded so a later trade-book cross-check can
/// revisit low-confidence completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionEvidence {
    /// The broker reported a triggered/complete status directly.
    RemoteStatus,
    /// The order disappeared from the open-trigger list while we held it
    /// as active. Assumed filled; could also be an out-of-band cancel or
    /// a rejected-then-purged trigger.
    VanishedFromRemote,
}

/// Strategy metadata carried on a ledger entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderExtra {
    /// Placed by maintenance to refill the ladder, not by the initial pass.
    #[serde(default)]
    pub is_replacement: bool,
    /// Net profit target the sell order was computed for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_profit_pct: Option<Decimal>,
    /// Average purchase price backing a sell order's price.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_purchase_price: Option<Decimal>,
    /// Evidence for a COMPLETE transition, if reconciliation applied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_evidence: Option<CompletionEvidence>,
    /// Recorded reason for a FAILED transition.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

/// One persisted ledger entry: everything the engine knows about an
/// order it placed (or adopted from the broker).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerOrder {
    /// Broker-assigned id; `None` until the broker confirms the order.
    /// An unconfirmed order never counts as active.
    pub id: Option<OrderId>,
    pub symbol: String,
    pub exchange: String,
    pub side: OrderSide,
    pub kind: OrderKind,
    pub quantity: u32,
    pub price: Decimal,
    /// Absent for market orders.
    pub trigger_price: Option<Decimal>,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub extra: OrderExtra,
}

impl LedgerOrder {
    /// Create a new conditional order entry in PENDING state.
    pub fn new_conditional(
        symbol: impl Into<String>,
        exchange: impl Into<String>,
        side: OrderSide,
        quantity: u32,
        price: Decimal,
        trigger_price: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            symbol: symbol.into(),
            exchange: exchange.into(),
            side,
            kind: OrderKind::LimitGtt,
            quantity,
            price,
            trigger_price: Some(trigger_price),
            status: OrderStatus::Pending,
            placed_at: now,
            updated_at: now,
            extra: OrderExtra::default(),
        }
    }

    /// Create a new market order entry in PENDING state.
    pub fn new_market(
        symbol: impl Into<String>,
        exchange: impl Into<String>,
        side: OrderSide,
        quantity: u32,
        price: Decimal,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            symbol: symbol.into(),
            exchange: exchange.into(),
            side,
            kind: OrderKind::Market,
            quantity,
            price,
            trigger_price: None,
            status: OrderStatus::Pending,
            placed_at: now,
            updated_at: now,
            extra: OrderExtra::default(),
        }
    }

    /// Confirm the broker id and flip to ACTIVE.
    pub fn confirm(&mut self, id: OrderId) {
        self.id = Some(id);
        self.status = OrderStatus::Active;
        self.updated_at = Utc::now();
    }

    /// A confirmed order that still sits on the open-trigger list.
    pub fn is_open(&self) -> bool {
        self.id.is_some() && self.status.is_open()
    }

    pub fn is_buy(&self) -> bool {
        self.side == OrderSide::Buy
    }

    pub fn is_sell(&self) -> bool {
        self.side == OrderSide::Sell
    }
}
