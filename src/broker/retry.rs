//! Timeout and retry decoration for broker calls.
//!
//! Wraps any [`Broker`] so that every call carries a hard timeout and
//! read-only/cancel calls retry transient failures with exponential
//! backoff. Placements and modifications are deliberately not retried:
//! a timed-out placement may still have gone through, and a duplicate
//! rung is worse than a missing one — reconciliation adopts stragglers
//! on the next cycle instead.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::warn;

use super::{Broker, BrokerError, BrokerOrder, ConditionalOrderRequest};
use crate::orders::OrderId;
use crate::types::OrderSide;

/// Backoff and timeout settings for broker calls.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Hard deadline per call attempt.
    pub call_timeout: Duration,
    /// Maximum retry attempts for transient failures on safe calls.
    pub max_retries: usize,
    /// Exponential base in milliseconds: the n-th retry waits
    /// `base^n` ms (10 -> 10ms, 100ms, 1s).
    pub backoff_base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(15),
            max_retries: 3,
            backoff_base_ms: 10,
        }
    }
}

/// [`Broker`] decorator applying [`RetryPolicy`].
pub struct ResilientBroker<B> {
    inner: B,
    policy: RetryPolicy,
}

impl<B: Broker> ResilientBroker<B> {
    pub fn new(inner: B, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Single attempt with the call timeout applied. A timeout is a
    /// transient failure, never order-state truth.
    async fn timed<T, F>(&self, what: &str, fut: F) -> Result<T, BrokerError>
    where
        F: Future<Output = Result<T, BrokerError>>,
    {
        match tokio::time::timeout(self.policy.call_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Transient(format!(
                "{what} timed out after {:?}",
                self.policy.call_timeout
            ))),
        }
    }

    fn backoff(&self) -> impl Iterator<Item = Duration> {
        ExponentialBackoff::from_millis(self.policy.backoff_base_ms)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.policy.max_retries)
    }
}

#[async_trait]
impl<B: Broker> Broker for ResilientBroker<B> {
    async fn place_conditional_order(
        &self,
        request: &ConditionalOrderRequest,
    ) -> Result<OrderId, BrokerError> {
        self.timed(
            "place_conditional_order",
            self.inner.place_conditional_order(request),
        )
        .await
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        exchange: &str,
        side: OrderSide,
        quantity: u32,
    ) -> Result<OrderId, BrokerError> {
        self.timed(
            "place_market_order",
            self.inner.place_market_order(symbol, exchange, side, quantity),
        )
        .await
    }

    async fn modify_conditional_order(
        &self,
        id: &OrderId,
        quantity: u32,
        price: Decimal,
        trigger_price: Decimal,
    ) -> Result<(), BrokerError> {
        self.timed(
            "modify_conditional_order",
            self.inner
                .modify_conditional_order(id, quantity, price, trigger_price),
        )
        .await
    }

    async fn cancel_conditional_order(&self, id: &OrderId) -> Result<(), BrokerError> {
        RetryIf::spawn(
            self.backoff(),
            || self.timed("cancel_conditional_order", self.inner.cancel_conditional_order(id)),
            retry_transient,
        )
        .await
    }

    async fn list_conditional_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        RetryIf::spawn(
            self.backoff(),
            || self.timed("list_conditional_orders", self.inner.list_conditional_orders()),
            retry_transient,
        )
        .await
    }

    async fn last_traded_price(&self, symbol: &str) -> Result<Decimal, BrokerError> {
        RetryIf::spawn(
            self.backoff(),
            || self.timed("last_traded_price", self.inner.last_traded_price(symbol)),
            retry_transient,
        )
        .await
    }
}

fn retry_transient(error: &BrokerError) -> bool {
    let retry = error.is_transient();
    if retry {
        warn!(%error, "transient broker failure, backing off for retry");
    }
    retry
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// Broker stub that fails transiently a set number of times.
    struct FlakyBroker {
        failures_remaining: Arc<AtomicU32>,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl Broker for FlakyBroker {
        async fn place_conditional_order(
            &self,
            _request: &ConditionalOrderRequest,
        ) -> Result<OrderId, BrokerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BrokerError::Transient("down".into()))
        }

        async fn place_market_order(
            &self,
            _symbol: &str,
            _exchange: &str,
            _side: OrderSide,
            _quantity: u32,
        ) -> Result<OrderId, BrokerError> {
            unreachable!()
        }

        async fn modify_conditional_order(
            &self,
            _id: &OrderId,
            _quantity: u32,
            _price: Decimal,
            _trigger_price: Decimal,
        ) -> Result<(), BrokerError> {
            unreachable!()
        }

        async fn cancel_conditional_order(&self, _id: &OrderId) -> Result<(), BrokerError> {
            unreachable!()
        }

        async fn list_conditional_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
                v.checked_sub(1)
            }).is_ok()
            {
                Err(BrokerError::Transient("flaky".into()))
            } else {
                Ok(Vec::new())
            }
        }

        async fn last_traded_price(&self, _symbol: &str) -> Result<Decimal, BrokerError> {
            unreachable!()
        }
    }

    fn flaky(failures: u32) -> (ResilientBroker<FlakyBroker>, Arc<AtomicU32>) {
        let calls = Arc::new(AtomicU32::new(0));
        let broker = FlakyBroker {
            failures_remaining: Arc::new(AtomicU32::new(failures)),
            calls: calls.clone(),
        };
        let policy = RetryPolicy {
            call_timeout: Duration::from_secs(1),
            max_retries: 3,
            backoff_base_ms: 1,
        };
        (ResilientBroker::new(broker, policy), calls)
    }

    #[tokio::test]
    async fn test_list_retries_transient_failures() {
        let (broker, calls) = flaky(2);
        let result = broker.list_conditional_orders().await;
        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_list_gives_up_after_cap() {
        let (broker, calls) = flaky(10);
        let result = broker.list_conditional_orders().await;
        assert!(matches!(result, Err(BrokerError::Transient(_))));
        // 1 initial attempt + 3 retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_placement_is_not_retried() {
        let (broker, calls) = flaky(0);
        let request = ConditionalOrderRequest {
            symbol: "ITC".into(),
            exchange: "NSE".into(),
            side: OrderSide::Buy,
            quantity: 1,
            price: Decimal::from(99),
            trigger_price: Decimal::from(98),
            last_price: Decimal::from(100),
        };
        let result = broker.place_conditional_order(&request).await;
        assert!(matches!(result, Err(BrokerError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1, "placements must fail fast");
    }
}
