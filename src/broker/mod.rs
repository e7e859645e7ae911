//! Broker Boundary
//!
//! Exchange-agnostic trait for the order-management surface the engine
//! consumes, plus the single normalized order shape every adapter must
//! map its responses into. Internal logic never branches on raw broker
//! response shapes; that flattening happens here and only here.

mod kite;
mod retry;

pub use kite::{KiteBroker, KiteConfig};
pub use retry::{ResilientBroker, RetryPolicy};

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::orders::OrderId;
use crate::types::OrderSide;

/// Errors from broker-facing calls.
///
/// The taxonomy drives recovery: configuration problems are fatal,
/// transients are retried then skipped for the cycle, validation errors
/// reject a single order, and session expiry is surfaced to a
/// supervisor for re-authentication — the engine never exits the
/// process on its own.
#[derive(Error, Debug, Clone)]
pub enum BrokerError {
    /// Missing or unusable credentials/parameters. Fatal, never retried.
    #[error("broker configuration error: {0}")]
    Config(String),

    /// Network failures, 5xx responses, rate limits and timeouts.
    /// Retryable; a timeout says nothing about order state truth.
    #[error("transient broker error: {0}")]
    Transient(String),

    /// The broker rejected this specific order (price band, quantity,
    /// trigger too close to last price, ...).
    #[error("order validation failed: {0}")]
    Validation(String),

    /// The access token is no longer valid. The supervisor must
    /// re-authenticate and restart the affected loop.
    #[error("broker session expired")]
    SessionExpired,
}

impl BrokerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Order status as reported by the broker, normalized from the raw
/// response strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Active,
    Pending,
    /// Trigger fired, limit order handed to the exchange
    Triggered,
    /// Filled
    Complete,
    Cancelled,
    Rejected,
    /// Anything the mapping table does not recognize; carried verbatim
    /// for drift tracking
    Unknown(String),
}

impl RemoteStatus {
    /// Parse a raw broker status string (case-insensitive).
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "ACTIVE" => Self::Active,
            "PENDING" | "OPEN" => Self::Pending,
            "TRIGGERED" => Self::Triggered,
            "COMPLETE" | "FILLED" => Self::Complete,
            "CANCELLED" | "DELETED" => Self::Cancelled,
            "REJECTED" | "FAILED" => Self::Rejected,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Still sitting on the open-trigger list.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Pending)
    }

    /// Counts as a fill.
    pub fn is_filled(&self) -> bool {
        matches!(self, Self::Triggered | Self::Complete)
    }

    /// Terminal without a fill.
    pub fn is_dead(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Rejected)
    }
}

impl std::fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "ACTIVE"),
            Self::Pending => write!(f, "PENDING"),
            Self::Triggered => write!(f, "TRIGGERED"),
            Self::Complete => write!(f, "COMPLETE"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
            Self::Unknown(s) => write!(f, "{}", s),
        }
    }
}

/// The single normalized shape for a broker-side conditional order.
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerOrder {
    pub id: OrderId,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub price: Decimal,
    pub trigger_price: Option<Decimal>,
    pub status: RemoteStatus,
}

impl BrokerOrder {
    /// Active/pending buy order for the given symbol.
    pub fn is_open_buy_for(&self, symbol: &str) -> bool {
        self.side == OrderSide::Buy
            && self.status.is_open()
            && self.symbol.eq_ignore_ascii_case(symbol)
    }

    /// Active/pending sell order for the given symbol.
    pub fn is_open_sell_for(&self, symbol: &str) -> bool {
        self.side == OrderSide::Sell
            && self.status.is_open()
            && self.symbol.eq_ignore_ascii_case(symbol)
    }
}

/// Request payload for a conditional (trigger) order.
#[derive(Debug, Clone)]
pub struct ConditionalOrderRequest {
    pub symbol: String,
    pub exchange: String,
    pub side: OrderSide,
    pub quantity: u32,
    pub price: Decimal,
    pub trigger_price: Decimal,
    /// Last traded price, required by the broker's trigger validation.
    pub last_price: Decimal,
}

/// The broker order-management surface consumed by the engine.
///
/// Implementations must be safe to share across tasks; all calls are
/// blocking I/O from the engine's perspective and are always issued
/// from worker tasks, never from the tick-delivery callback.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Place a conditional order; returns the broker-assigned id.
    async fn place_conditional_order(
        &self,
        request: &ConditionalOrderRequest,
    ) -> Result<OrderId, BrokerError>;

    /// Place an immediate market order; returns the broker-assigned id.
    async fn place_market_order(
        &self,
        symbol: &str,
        exchange: &str,
        side: OrderSide,
        quantity: u32,
    ) -> Result<OrderId, BrokerError>;

    /// Modify an existing conditional order in place.
    async fn modify_conditional_order(
        &self,
        id: &OrderId,
        quantity: u32,
        price: Decimal,
        trigger_price: Decimal,
    ) -> Result<(), BrokerError>;

    /// Cancel a conditional order that has not triggered yet.
    async fn cancel_conditional_order(&self, id: &OrderId) -> Result<(), BrokerError>;

    /// Fetch the full open/recent conditional order list.
    async fn list_conditional_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError>;

    /// Last traded price for a symbol.
    async fn last_traded_price(&self, symbol: &str) -> Result<Decimal, BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_status_parse() {
        assert_eq!(RemoteStatus::parse("active"), RemoteStatus::Active);
        assert_eq!(RemoteStatus::parse("OPEN"), RemoteStatus::Pending);
        assert_eq!(RemoteStatus::parse("Triggered"), RemoteStatus::Triggered);
        assert_eq!(RemoteStatus::parse("FILLED"), RemoteStatus::Complete);
        assert_eq!(RemoteStatus::parse("complete"), RemoteStatus::Complete);
        assert_eq!(RemoteStatus::parse("deleted"), RemoteStatus::Cancelled);
        assert_eq!(RemoteStatus::parse("rejected"), RemoteStatus::Rejected);
        assert_eq!(
            RemoteStatus::parse("weird"),
            RemoteStatus::Unknown("WEIRD".to_string())
        );
    }

    #[test]
    fn test_remote_status_predicates() {
        assert!(RemoteStatus::Active.is_open());
        assert!(RemoteStatus::Pending.is_open());
        assert!(!RemoteStatus::Triggered.is_open());

        assert!(RemoteStatus::Triggered.is_filled());
        assert!(RemoteStatus::Complete.is_filled());
        assert!(!RemoteStatus::Cancelled.is_filled());

        assert!(RemoteStatus::Cancelled.is_dead());
        assert!(RemoteStatus::Rejected.is_dead());
        assert!(!RemoteStatus::Unknown("X".into()).is_dead());
    }

    #[test]
    fn test_error_transience() {
        assert!(BrokerError::Transient("503".into()).is_transient());
        assert!(!BrokerError::Config("no key".into()).is_transient());
        assert!(!BrokerError::SessionExpired.is_transient());
    }
}
