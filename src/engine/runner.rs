//! Engine runner: wires the tick stream and the maintenance timer into
//! the controller.
//!
//! Both triggers funnel into the same per-symbol mutex inside the
//! controller, so tick- and timer-driven cycles never interleave their
//! ledger mutations. Broker I/O always happens on these worker tasks —
//! the tick channel decouples the engine from whatever delivers market
//! data, so a slow broker call can never exert backpressure on the feed.
//!
//! A shutdown signal is observed between cycles and mid-stream; the
//! ledger is flushed before the runner returns. Session expiry is
//! returned to the caller — a supervisor re-authenticates and restarts
//! the loop, the engine itself never exits the process.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use super::controller::AccumulationController;
use super::EngineError;
use crate::broker::Broker;
use crate::resilience::CircuitBreaker;
use crate::types::MarketTick;

/// Default breaker: open after 3 consecutive failed cycles, probe after
/// two minutes.
const BREAKER_FAILURE_THRESHOLD: u32 = 3;
const BREAKER_RESET_TIMEOUT: Duration = Duration::from_secs(120);

/// Runs the maintenance loop for one controller until shutdown, feed
/// exhaustion, a prolonged market close, or session expiry.
pub struct EngineRunner<B: Broker> {
    controller: Arc<AccumulationController<B>>,
    breaker: Arc<CircuitBreaker>,
    shutdown: watch::Receiver<bool>,
}

impl<B: Broker + 'static> EngineRunner<B> {
    pub fn new(
        controller: Arc<AccumulationController<B>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            controller,
            breaker: Arc::new(CircuitBreaker::new(
                BREAKER_FAILURE_THRESHOLD,
                BREAKER_RESET_TIMEOUT,
            )),
            shutdown,
        }
    }

    /// Drive maintenance from `ticks` and the configured interval until
    /// one of the exit conditions fires. The ledger is flushed on every
    /// exit path.
    pub async fn run(mut self, ticks: mpsc::Receiver<MarketTick>) -> Result<(), EngineError> {
        let symbol = self.controller.config().symbol.clone();
        let interval_period = self.controller.config().maintenance_interval;
        let max_closed_cycles = self.controller.config().max_market_closed_cycles;

        let mut interval = tokio::time::interval(interval_period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(symbol, interval_secs = interval_period.as_secs(), "maintenance loop started");

        let mut ticks = Some(ticks);
        let exit = loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        info!(symbol, "shutdown signal observed");
                        break Ok(());
                    }
                }

                maybe_tick = recv_or_pend(&mut ticks) => {
                    match maybe_tick {
                        Some(tick) => {
                            if !tick.symbol.eq_ignore_ascii_case(&symbol) {
                                continue;
                            }
                            if self.breaker.is_open() {
                                continue;
                            }
                            match self.controller.on_tick(&tick).await {
                                Ok(Some(_outcome)) => self.breaker.record_success(),
                                Ok(None) => {} // coalesced, no cycle ran
                                Err(e) if e.is_session_expired() => break Err(e),
                                Err(e) => {
                                    warn!(symbol, error = %e, "tick-driven cycle failed");
                                    self.breaker.record_failure();
                                }
                            }
                        }
                        None => {
                            // Feed loss must not corrupt anything: the
                            // timer keeps maintenance alive without ticks.
                            warn!(symbol, "tick stream closed, continuing on timer only");
                            ticks = None;
                        }
                    }
                }

                _ = interval.tick() => {
                    if self.breaker.is_open() {
                        info!(symbol, "circuit open, skipping timer cycle");
                        continue;
                    }
                    match self.controller.maintain().await {
                        Ok(outcome) => {
                            self.breaker.record_success();
                            if outcome.market_closed_cycles >= max_closed_cycles {
                                info!(
                                    symbol,
                                    cycles = outcome.market_closed_cycles,
                                    "market closed for the configured limit, stopping loop"
                                );
                                break Ok(());
                            }
                        }
                        Err(e) if e.is_session_expired() => break Err(e),
                        Err(e) => {
                            warn!(symbol, error = %e, "timer-driven cycle failed");
                            self.breaker.record_failure();
                        }
                    }
                }
            }
        };

        if let Err(flush_err) = self.controller.flush().await {
            error!(symbol, error = %flush_err, "failed to flush ledger on exit");
        } else {
            info!(symbol, "ledger flushed, maintenance loop stopped");
        }

        exit
    }
}

/// Receive from the tick channel, or pend forever once the feed is gone
/// so the select keeps servicing the timer and shutdown arms.
async fn recv_or_pend(ticks: &mut Option<mpsc::Receiver<MarketTick>>) -> Option<MarketTick> {
    match ticks.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerError, BrokerOrder, ConditionalOrderRequest};
    use crate::engine::StrategyConfig;
    use crate::orders::OrderId;
    use crate::types::OrderSide;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Broker whose snapshot is always empty and whose quote is fixed.
    struct QuietBroker {
        lists: AtomicU32,
    }

    #[async_trait]
    impl Broker for QuietBroker {
        async fn place_conditional_order(
            &self,
            _request: &ConditionalOrderRequest,
        ) -> Result<OrderId, BrokerError> {
            Ok(OrderId::new("trg-x"))
        }

        async fn place_market_order(
            &self,
            _symbol: &str,
            _exchange: &str,
            _side: OrderSide,
            _quantity: u32,
        ) -> Result<OrderId, BrokerError> {
            Ok(OrderId::new("ord-x"))
        }

        async fn modify_conditional_order(
            &self,
            _id: &OrderId,
            _quantity: u32,
            _price: Decimal,
            _trigger_price: Decimal,
        ) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn cancel_conditional_order(&self, _id: &OrderId) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn list_conditional_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn last_traded_price(&self, _symbol: &str) -> Result<Decimal, BrokerError> {
            Ok(dec!(100.00))
        }
    }

    fn test_config(tag: &str) -> StrategyConfig {
        let mut config = StrategyConfig::for_symbol("ITC");
        config.ledger_dir = std::env::temp_dir().join(format!(
            "gttladder-runner-{}-{}",
            tag,
            std::process::id()
        ));
        config.maintenance_interval = Duration::from_millis(20);
        config
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let config = test_config("shutdown");
        let dir = config.ledger_dir.clone();
        let controller = Arc::new(AccumulationController::new(
            Arc::new(QuietBroker { lists: AtomicU32::new(0) }),
            config,
        ));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (_tick_tx, tick_rx) = mpsc::channel(8);

        let handle = tokio::spawn(EngineRunner::new(controller, stop_rx).run(tick_rx));
        tokio::time::sleep(Duration::from_millis(60)).await;
        stop_tx.send(true).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("runner must observe shutdown")
            .unwrap();
        assert!(result.is_ok());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_tick_stream_loss_keeps_timer_alive() {
        let config = test_config("feedloss");
        let dir = config.ledger_dir.clone();
        let broker = Arc::new(QuietBroker { lists: AtomicU32::new(0) });
        let controller = Arc::new(AccumulationController::new(broker.clone(), config));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (tick_tx, tick_rx) = mpsc::channel::<MarketTick>(8);

        let handle = tokio::spawn(EngineRunner::new(controller, stop_rx).run(tick_rx));
        drop(tick_tx); // feed dies immediately
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop_tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("runner must survive feed loss");

        // Timer cycles kept hitting the broker after the feed died
        assert!(broker.lists.load(Ordering::SeqCst) >= 2);
        let _ = std::fs::remove_dir_all(dir);
    }
}
