//! Accumulation controller state machine.
//!
//! One controller owns one symbol's ladder:
//!
//! - **initial placement**: plan the ladder from the current price and
//!   place it, unless the broker already shows enough active buys
//! - **maintaining**: reconcile, keep the single sell order correct, and
//!   refill the ladder back to the target rung count
//! - **cancelling**: tear down every working order and clear the ledger
//!
//! All ledger mutation happens behind one per-symbol mutex; the tick
//! path uses `try_lock` so a busy cycle drops ticks instead of queueing
//! them behind the feed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::session::SymbolSession;
use super::{EngineError, StrategyConfig};
use crate::broker::{Broker, BrokerError, BrokerOrder, ConditionalOrderRequest, RemoteStatus};
use crate::ladder::{self, PlannedOrder};
use crate::market;
use crate::orders::{
    DuplicateGuard, LedgerOrder, OrderId, OrderLedger, OrderStatus, Position, ReconcileReport,
    ReconciliationEngine,
};
use crate::pricing;
use crate::types::{MarketTick, OrderSide};

/// What prompted a maintenance cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaintenanceTrigger {
    Tick,
    Timer,
}

/// What a sell-order refresh ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SellAction {
    None,
    Placed,
    Updated,
    UpToDate,
    ParkedForNextSession,
}

/// Summary of one maintenance cycle.
#[derive(Debug)]
pub struct MaintenanceOutcome {
    pub trigger: MaintenanceTrigger,
    pub any_transitions: bool,
    pub position: Position,
    pub sell_action: SellAction,
    pub replacements_placed: u32,
    pub active_buys: u32,
    /// Consecutive market-closed timer cycles (0 while the market is open).
    pub market_closed_cycles: u32,
}

/// Summary of the initial placement pass.
#[derive(Debug)]
pub struct PlacementSummary {
    /// The broker already had enough active buys; nothing was placed.
    pub adopted_existing: bool,
    pub planned: u32,
    pub placed: u32,
    pub skipped_similar: u32,
}

struct EngineState {
    orders: Vec<LedgerOrder>,
    session: SymbolSession,
}

/// Drives the ladder for a single symbol against a [`Broker`].
pub struct AccumulationController<B: Broker> {
    broker: Arc<B>,
    config: StrategyConfig,
    ledger: OrderLedger,
    reconciler: ReconciliationEngine,
    guard: DuplicateGuard,
    state: Mutex<EngineState>,
    coalesced_ticks: AtomicU64,
}

impl<B: Broker> AccumulationController<B> {
    /// Build a controller, reloading any persisted ledger for the symbol.
    pub fn new(broker: Arc<B>, config: StrategyConfig) -> Self {
        let ledger = OrderLedger::new(&config.ledger_dir);
        let orders = ledger.load(&config.symbol);
        let reconciler = ReconciliationEngine::new(ledger.clone());
        Self {
            broker,
            config,
            ledger,
            reconciler,
            guard: DuplicateGuard::default(),
            state: Mutex::new(EngineState {
                orders,
                session: SymbolSession::new(),
            }),
            coalesced_ticks: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    fn market_open(&self) -> bool {
        !self.config.enforce_market_hours || market::is_market_open_now()
    }

    /// INITIAL_PLACEMENT: adopt an already-full ladder, or plan and
    /// place a fresh one. Placement failures abort the remaining rungs
    /// without rolling back the ones already working (a partial ladder
    /// is an accepted, logged outcome).
    pub async fn initial_placement(&self) -> Result<PlacementSummary, EngineError> {
        let mut state = self.state.lock().await;
        let symbol = self.config.symbol.clone();

        let snapshot = self.broker.list_conditional_orders().await?;
        let active_buys: Vec<BrokerOrder> = snapshot
            .iter()
            .filter(|o| o.is_open_buy_for(&symbol))
            .cloned()
            .collect();

        if active_buys.len() as u32 >= self.config.target_active_buys {
            info!(
                symbol,
                active = active_buys.len(),
                target = self.config.target_active_buys,
                "broker already holds a full ladder, adopting it"
            );
            self.adopt_remote_orders(&mut state, &snapshot)?;
            return Ok(PlacementSummary {
                adopted_existing: true,
                planned: 0,
                placed: 0,
                skipped_similar: 0,
            });
        }

        let last_price = self.broker.last_traded_price(&symbol).await?;
        if last_price <= Decimal::ZERO {
            return Err(EngineError::NoMarketPrice(symbol));
        }
        state.session.last_price = Some(last_price);

        let tick_size = pricing::tick_size_for(last_price);
        let plan = ladder::plan(last_price, tick_size, &self.config.schedule)
            .map_err(|e| EngineError::Broker(BrokerError::Validation(e.to_string())))?;

        info!(
            symbol,
            rungs = plan.len(),
            %last_price,
            %tick_size,
            "placing initial ladder"
        );

        let mut placed = 0u32;
        let mut skipped = 0u32;

        for rung in &plan {
            // Guarded against the pre-pass snapshot only: the plan's own
            // rungs sit ~1% apart by construction and must not suppress
            // each other.
            if self
                .guard
                .is_similar(rung.limit_price, rung.trigger_price, &active_buys)
            {
                info!(
                    symbol,
                    level = rung.level,
                    price = %rung.limit_price,
                    "skipping rung too close to an existing order"
                );
                skipped += 1;
                continue;
            }

            let market_first =
                rung.level == 0 && self.config.market_first && self.market_open();

            let result = if market_first {
                self.place_market_rung(&mut state, rung, last_price).await
            } else {
                self.place_conditional_rung(&mut state, rung, last_price, false)
                    .await
            };

            match result {
                Ok(_order) => {
                    placed += 1;
                }
                Err(EngineError::Broker(BrokerError::SessionExpired)) => {
                    return Err(EngineError::Broker(BrokerError::SessionExpired));
                }
                Err(e) => {
                    warn!(
                        symbol,
                        level = rung.level,
                        quantity = rung.quantity,
                        price = %rung.limit_price,
                        trigger = %rung.trigger_price,
                        error = %e,
                        "rung placement failed, aborting the rest of the pass"
                    );
                    break;
                }
            }
        }

        info!(
            symbol,
            placed,
            skipped,
            planned = plan.len(),
            "initial placement pass finished"
        );
        if (placed + skipped) < plan.len() as u32 {
            warn!(
                symbol,
                placed,
                planned = plan.len(),
                "partial ladder: some rungs were not placed; maintenance will fill the gap"
            );
        }

        Ok(PlacementSummary {
            adopted_existing: false,
            planned: plan.len() as u32,
            placed,
            skipped_similar: skipped,
        })
    }

    /// Tick-driven maintenance. Returns `None` when a cycle is already
    /// running — the tick is coalesced rather than queued so the feed
    /// never backs up behind broker I/O.
    pub async fn on_tick(
        &self,
        tick: &MarketTick,
    ) -> Result<Option<MaintenanceOutcome>, EngineError> {
        let Ok(mut state) = self.state.try_lock() else {
            self.coalesced_ticks.fetch_add(1, Ordering::Relaxed);
            debug!(symbol = %self.config.symbol, price = %tick.last_price, "cycle in progress, tick coalesced");
            return Ok(None);
        };

        state.session.coalesced_ticks = self.coalesced_ticks.load(Ordering::Relaxed);
        state.session.record_tick(tick.last_price);
        let outcome = self
            .run_maintenance(&mut state, MaintenanceTrigger::Tick)
            .await?;
        Ok(Some(outcome))
    }

    /// Timer-driven maintenance.
    pub async fn maintain(&self) -> Result<MaintenanceOutcome, EngineError> {
        let mut state = self.state.lock().await;
        self.run_maintenance(&mut state, MaintenanceTrigger::Timer)
            .await
    }

    /// CANCELLING: cancel every working order for the symbol and clear
    /// the ledger file. Destructive and irreversible; callers must have
    /// confirmed with the operator.
    pub async fn cancel_all(&self) -> Result<usize, EngineError> {
        let mut state = self.state.lock().await;
        let symbol = self.config.symbol.clone();

        let snapshot = self.broker.list_conditional_orders().await?;
        let mut cancelled = 0usize;

        for order in snapshot
            .iter()
            .filter(|o| o.symbol.eq_ignore_ascii_case(&symbol) && o.status.is_open())
        {
            match self.broker.cancel_conditional_order(&order.id).await {
                Ok(()) => {
                    cancelled += 1;
                    info!(symbol, id = %order.id, side = %order.side, "order cancelled");
                }
                Err(BrokerError::SessionExpired) => {
                    return Err(EngineError::Broker(BrokerError::SessionExpired))
                }
                Err(e) => {
                    warn!(symbol, id = %order.id, error = %e, "failed to cancel order");
                }
            }
        }

        state.orders.clear();
        self.ledger.clear(&symbol)?;
        info!(symbol, cancelled, "ladder torn down and ledger cleared");
        Ok(cancelled)
    }

    /// Flush the in-memory ledger to disk (shutdown path).
    pub async fn flush(&self) -> Result<(), EngineError> {
        let state = self.state.lock().await;
        self.ledger.save(&self.config.symbol, &state.orders)?;
        Ok(())
    }

    async fn run_maintenance(
        &self,
        state: &mut MutexGuard<'_, EngineState>,
        trigger: MaintenanceTrigger,
    ) -> Result<MaintenanceOutcome, EngineError> {
        let symbol = self.config.symbol.clone();
        let market_open = self.market_open();

        let market_closed_cycles = if trigger == MaintenanceTrigger::Timer {
            if market_open {
                state.session.reset_market_closed_cycles();
                0
            } else {
                state.session.record_market_closed_cycle()
            }
        } else {
            state.session.market_closed_cycles
        };

        let snapshot = self.broker.list_conditional_orders().await?;

        let report = {
            let state = &mut **state;
            self.reconciler
                .reconcile(&symbol, &mut state.orders, &snapshot)?
        };
        state.session.record_cycle();

        if report.any_transitions {
            info!(
                symbol,
                completions = report.completions.len(),
                failures = report.failures.len(),
                total_shares = report.position.total_shares,
                avg_price = %report.position.average_price,
                "reconciliation applied transitions"
            );
        }

        let last_price = match state.session.last_price {
            Some(p) if p > Decimal::ZERO => p,
            _ => match self.broker.last_traded_price(&symbol).await {
                Ok(p) => {
                    state.session.last_price = Some(p);
                    p
                }
                Err(e) => {
                    // Without a price there is nothing safe to place or
                    // reprice this cycle; reconciliation already ran.
                    warn!(symbol, error = %e, "no market price, skipping placement work this cycle");
                    return Ok(MaintenanceOutcome {
                        trigger,
                        any_transitions: report.any_transitions,
                        position: report.position,
                        sell_action: SellAction::None,
                        replacements_placed: 0,
                        active_buys: snapshot
                            .iter()
                            .filter(|o| o.is_open_buy_for(&symbol))
                            .count() as u32,
                        market_closed_cycles,
                    });
                }
            },
        };
        let tick_size = pricing::tick_size_for(last_price);

        let sell_action = self
            .refresh_sell_order(state, &snapshot, &report, last_price, tick_size, market_open)
            .await?;

        let (replacements_placed, active_buys) = self
            .refill_ladder(state, &snapshot, last_price, tick_size)
            .await?;

        Ok(MaintenanceOutcome {
            trigger,
            any_transitions: report.any_transitions,
            position: report.position,
            sell_action,
            replacements_placed,
            active_buys,
            market_closed_cycles,
        })
    }

    /// Keep the single profit-target sell order sized to the holdings
    /// and priced off the fee-aware solver.
    async fn refresh_sell_order(
        &self,
        state: &mut MutexGuard<'_, EngineState>,
        snapshot: &[BrokerOrder],
        report: &ReconcileReport,
        last_price: Decimal,
        tick_size: Decimal,
        market_open: bool,
    ) -> Result<SellAction, EngineError> {
        let symbol = self.config.symbol.clone();
        let position = report.position;

        if position.total_shares == 0 {
            return Ok(SellAction::None);
        }

        if !market_open {
            if state.session.sell_parked_outside_market {
                debug!(symbol, "market closed and sell already parked for next session");
                return Ok(SellAction::ParkedForNextSession);
            }
            // Fall through once so a sell is waiting when the session opens.
            state.session.sell_parked_outside_market = true;
        }

        let target_pct = self.config.profit_target_for(position.total_shares);
        let raw_sell = pricing::optimal_sell_price(
            position.average_price,
            position.total_shares,
            target_pct,
        );
        let sell_price = pricing::round_to_tick_or_paise(raw_sell, tick_size);
        let (sell_trigger, _) = match pricing::trigger_and_limit(
            sell_price,
            self.config.sell_trigger_drop_pct,
            tick_size,
            OrderSide::Sell,
            self.config.sell_delta_ticks,
        ) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(symbol, error = %e, "sell trigger derivation failed, skipping sell refresh");
                return Ok(SellAction::None);
            }
        };

        let open_sells: Vec<&BrokerOrder> = snapshot
            .iter()
            .filter(|o| o.is_open_sell_for(&symbol))
            .collect();

        // The sell order is unique in flight: surplus sells are
        // cancelled before the survivor is resized.
        for surplus in open_sells.iter().skip(1) {
            warn!(symbol, id = %surplus.id, "duplicate sell order found, cancelling");
            match self.broker.cancel_conditional_order(&surplus.id).await {
                Ok(()) => self.mark_cancelled(state, &surplus.id)?,
                Err(BrokerError::SessionExpired) => {
                    return Err(EngineError::Broker(BrokerError::SessionExpired))
                }
                Err(e) => warn!(symbol, id = %surplus.id, error = %e, "could not cancel duplicate sell"),
            }
        }

        match open_sells.first() {
            Some(existing) => {
                let price_diff = (existing.price - sell_price).abs();
                if existing.quantity == position.total_shares && price_diff <= dec!(0.01) {
                    debug!(
                        symbol,
                        quantity = existing.quantity,
                        price = %existing.price,
                        "sell order already up to date"
                    );
                    return Ok(SellAction::UpToDate);
                }

                info!(
                    symbol,
                    id = %existing.id,
                    old_quantity = existing.quantity,
                    new_quantity = position.total_shares,
                    old_price = %existing.price,
                    new_price = %sell_price,
                    trigger = %sell_trigger,
                    target_pct = %target_pct,
                    "updating sell order"
                );
                match self
                    .broker
                    .modify_conditional_order(
                        &existing.id,
                        position.total_shares,
                        sell_price,
                        sell_trigger,
                    )
                    .await
                {
                    Ok(()) => {
                        self.record_sell(
                            state,
                            Some(existing.id.clone()),
                            position,
                            sell_price,
                            sell_trigger,
                            target_pct,
                        )?;
                        Ok(SellAction::Updated)
                    }
                    Err(BrokerError::SessionExpired) => {
                        Err(EngineError::Broker(BrokerError::SessionExpired))
                    }
                    Err(e) => {
                        warn!(symbol, id = %existing.id, error = %e, "sell order update failed, will retry next cycle");
                        Ok(SellAction::None)
                    }
                }
            }
            None => {
                info!(
                    symbol,
                    quantity = position.total_shares,
                    price = %sell_price,
                    trigger = %sell_trigger,
                    target_pct = %target_pct,
                    avg_price = %position.average_price,
                    "placing sell order"
                );
                let request = self.sell_request(position, sell_price, sell_trigger, last_price, tick_size);
                match self.broker.place_conditional_order(&request).await {
                    Ok(id) => {
                        self.record_sell(
                            state,
                            Some(id),
                            position,
                            sell_price,
                            sell_trigger,
                            target_pct,
                        )?;
                        Ok(SellAction::Placed)
                    }
                    Err(BrokerError::SessionExpired) => {
                        Err(EngineError::Broker(BrokerError::SessionExpired))
                    }
                    Err(e) => {
                        warn!(symbol, error = %e, "sell order placement failed, will retry next cycle");
                        Ok(SellAction::None)
                    }
                }
            }
        }
    }

    /// Refill the ladder back to the target number of active buys,
    /// continuing 1% rungs below the lowest working price.
    async fn refill_ladder(
        &self,
        state: &mut MutexGuard<'_, EngineState>,
        snapshot: &[BrokerOrder],
        last_price: Decimal,
        tick_size: Decimal,
    ) -> Result<(u32, u32), EngineError> {
        let symbol = self.config.symbol.clone();
        let mut active_buys: Vec<BrokerOrder> = snapshot
            .iter()
            .filter(|o| o.is_open_buy_for(&symbol))
            .cloned()
            .collect();

        let target = self.config.target_active_buys;
        if active_buys.len() as u32 >= target {
            return Ok((0, active_buys.len() as u32));
        }
        let needed = target - active_buys.len() as u32;

        // Continue from the lowest working price, or the market price
        // when the ladder is empty.
        let mut base_price = active_buys
            .iter()
            .map(|o| o.price)
            .filter(|p| *p > Decimal::ZERO)
            .min()
            .unwrap_or(last_price);
        let mut next_quantity = active_buys
            .iter()
            .map(|o| o.quantity)
            .max()
            .unwrap_or(0)
            + 1;

        info!(
            symbol,
            active = active_buys.len(),
            target,
            needed,
            %base_price,
            "refilling ladder"
        );

        let mut placed = 0u32;
        // A candidate flagged by the guard is not placed; the chain
        // continues from its limit so the next attempt lands deeper.
        // The attempt cap bounds the walk when everything is crowded.
        let max_attempts = needed * 2 + 2;
        for _ in 0..max_attempts {
            if placed >= needed {
                break;
            }
            let rung = match ladder::continuation_rung(base_price, tick_size, next_quantity) {
                Ok(r) => r,
                Err(e) => {
                    warn!(symbol, error = %e, "continuation rung derivation failed");
                    break;
                }
            };

            if self
                .guard
                .is_similar(rung.limit_price, rung.trigger_price, &active_buys)
            {
                info!(
                    symbol,
                    price = %rung.limit_price,
                    trigger = %rung.trigger_price,
                    "replacement rung too close to a working order, stepping deeper"
                );
                base_price = rung.limit_price;
                continue;
            }

            match self
                .place_conditional_rung(state, &rung, last_price, true)
                .await
            {
                Ok(order) => {
                    placed += 1;
                    base_price = rung.limit_price;
                    next_quantity = rung.quantity + 1;
                    active_buys.push(order);
                }
                Err(EngineError::Broker(BrokerError::SessionExpired)) => {
                    return Err(EngineError::Broker(BrokerError::SessionExpired));
                }
                Err(e) => {
                    warn!(
                        symbol,
                        quantity = rung.quantity,
                        price = %rung.limit_price,
                        trigger = %rung.trigger_price,
                        error = %e,
                        "replacement placement failed, stopping refill for this cycle"
                    );
                    break;
                }
            }
        }

        Ok((placed, active_buys.len() as u32))
    }

    /// Place one conditional buy rung and record it in the ledger.
    async fn place_conditional_rung(
        &self,
        state: &mut MutexGuard<'_, EngineState>,
        rung: &PlannedOrder,
        last_price: Decimal,
        is_replacement: bool,
    ) -> Result<BrokerOrder, EngineError> {
        let symbol = self.config.symbol.clone();
        let request = ConditionalOrderRequest {
            symbol: symbol.clone(),
            exchange: self.config.exchange.clone(),
            side: OrderSide::Buy,
            quantity: rung.quantity,
            price: rung.limit_price,
            trigger_price: rung.trigger_price,
            last_price: nudged_last_price(last_price, rung.trigger_price, pricing::tick_size_for(last_price)),
        };

        let id = self.broker.place_conditional_order(&request).await?;
        info!(
            symbol,
            %id,
            quantity = rung.quantity,
            price = %rung.limit_price,
            trigger = %rung.trigger_price,
            is_replacement,
            "buy rung placed"
        );

        let mut entry = LedgerOrder::new_conditional(
            symbol.clone(),
            self.config.exchange.clone(),
            OrderSide::Buy,
            rung.quantity,
            rung.limit_price,
            rung.trigger_price,
        );
        entry.extra.is_replacement = is_replacement;
        entry.confirm(id.clone());

        let broker_view = BrokerOrder {
            id,
            symbol,
            side: OrderSide::Buy,
            quantity: rung.quantity,
            price: rung.limit_price,
            trigger_price: Some(rung.trigger_price),
            status: RemoteStatus::Active,
        };

        {
            let state = &mut **state;
            self.ledger.upsert(&mut state.orders, entry);
            self.ledger.save(&self.config.symbol, &state.orders)?;
        }
        Ok(broker_view)
    }

    /// Place the first rung as an immediate market order.
    async fn place_market_rung(
        &self,
        state: &mut MutexGuard<'_, EngineState>,
        rung: &PlannedOrder,
        last_price: Decimal,
    ) -> Result<BrokerOrder, EngineError> {
        let symbol = self.config.symbol.clone();
        let id = self
            .broker
            .place_market_order(&symbol, &self.config.exchange, OrderSide::Buy, rung.quantity)
            .await?;
        info!(symbol, %id, quantity = rung.quantity, %last_price, "first rung placed as market order");

        let mut entry = LedgerOrder::new_market(
            symbol.clone(),
            self.config.exchange.clone(),
            OrderSide::Buy,
            rung.quantity,
            last_price,
        );
        // A market order fills immediately; it enters the ledger as
        // TRIGGERED and reconciliation settles it to COMPLETE.
        entry.confirm(id.clone());
        entry.status = OrderStatus::Triggered;

        let broker_view = BrokerOrder {
            id,
            symbol,
            side: OrderSide::Buy,
            quantity: rung.quantity,
            price: last_price,
            trigger_price: None,
            status: RemoteStatus::Triggered,
        };

        {
            let state = &mut **state;
            self.ledger.upsert(&mut state.orders, entry);
            self.ledger.save(&self.config.symbol, &state.orders)?;
        }
        Ok(broker_view)
    }

    /// Record the current sell order in the ledger, replacing any open
    /// sell entry (the sell is unique in flight).
    fn record_sell(
        &self,
        state: &mut MutexGuard<'_, EngineState>,
        id: Option<OrderId>,
        position: Position,
        sell_price: Decimal,
        sell_trigger: Decimal,
        target_pct: Decimal,
    ) -> Result<(), EngineError> {
        let symbol = self.config.symbol.clone();
        let state = &mut **state;

        if let Some(existing) = state
            .orders
            .iter_mut()
            .find(|o| o.is_sell() && o.status.is_open() && (id.is_none() || o.id == id))
        {
            existing.quantity = position.total_shares;
            existing.price = sell_price;
            existing.trigger_price = Some(sell_trigger);
            existing.updated_at = chrono::Utc::now();
            existing.extra.target_profit_pct = Some(target_pct);
            existing.extra.avg_purchase_price = Some(position.average_price);
            if existing.id.is_none() {
                existing.id = id;
            }
        } else {
            let mut entry = LedgerOrder::new_conditional(
                symbol.clone(),
                self.config.exchange.clone(),
                OrderSide::Sell,
                position.total_shares,
                sell_price,
                sell_trigger,
            );
            entry.extra.target_profit_pct = Some(target_pct);
            entry.extra.avg_purchase_price = Some(position.average_price);
            if let Some(id) = id {
                entry.confirm(id);
            }
            state.orders.push(entry);
        }

        self.ledger.save(&symbol, &state.orders)?;
        Ok(())
    }

    fn sell_request(
        &self,
        position: Position,
        sell_price: Decimal,
        sell_trigger: Decimal,
        last_price: Decimal,
        tick_size: Decimal,
    ) -> ConditionalOrderRequest {
        ConditionalOrderRequest {
            symbol: self.config.symbol.clone(),
            exchange: self.config.exchange.clone(),
            side: OrderSide::Sell,
            quantity: position.total_shares,
            price: sell_price,
            trigger_price: sell_trigger,
            last_price: nudged_last_price(last_price, sell_trigger, tick_size),
        }
    }

    fn mark_cancelled(
        &self,
        state: &mut MutexGuard<'_, EngineState>,
        id: &OrderId,
    ) -> Result<(), EngineError> {
        let state = &mut **state;
        if let Some(entry) = state
            .orders
            .iter_mut()
            .find(|o| o.id.as_ref() == Some(id))
        {
            entry.status = OrderStatus::Cancelled;
            entry.updated_at = chrono::Utc::now();
            self.ledger.save(&self.config.symbol, &state.orders)?;
        }
        Ok(())
    }

    /// Merge the broker's orders for this symbol into the ledger
    /// (startup with a ladder already working).
    fn adopt_remote_orders(
        &self,
        state: &mut MutexGuard<'_, EngineState>,
        snapshot: &[BrokerOrder],
    ) -> Result<(), EngineError> {
        let symbol = self.config.symbol.clone();
        let state = &mut **state;

        for remote in snapshot
            .iter()
            .filter(|o| o.symbol.eq_ignore_ascii_case(&symbol))
        {
            if state
                .orders
                .iter()
                .any(|o| o.id.as_ref() == Some(&remote.id))
            {
                continue;
            }
            let Some(status) = adopt_status(&remote.status) else {
                warn!(symbol, id = %remote.id, status = %remote.status, "not adopting order with unmapped status");
                continue;
            };

            let mut entry = LedgerOrder::new_conditional(
                symbol.clone(),
                self.config.exchange.clone(),
                remote.side,
                remote.quantity,
                remote.price,
                remote.trigger_price.unwrap_or(remote.price),
            );
            entry.confirm(remote.id.clone());
            entry.status = status;
            state.orders.push(entry);
        }

        self.ledger.save(&symbol, &state.orders)?;
        Ok(())
    }
}

/// The broker rejects triggers sitting on top of the reported last
/// price; when they are too close, report a price a rupee away on the
/// far side so the trigger validates. The real market price is
/// untouched — this only widens the reported gap.
fn nudged_last_price(last_price: Decimal, trigger_price: Decimal, tick_size: Decimal) -> Decimal {
    if (last_price - trigger_price).abs() >= tick_size {
        return last_price;
    }
    if trigger_price < last_price {
        trigger_price + Decimal::ONE
    } else {
        trigger_price - Decimal::ONE
    }
}

fn adopt_status(remote: &RemoteStatus) -> Option<OrderStatus> {
    match remote {
        RemoteStatus::Active => Some(OrderStatus::Active),
        RemoteStatus::Pending => Some(OrderStatus::Pending),
        RemoteStatus::Triggered => Some(OrderStatus::Triggered),
        RemoteStatus::Complete => Some(OrderStatus::Complete),
        RemoteStatus::Cancelled => Some(OrderStatus::Cancelled),
        RemoteStatus::Rejected => Some(OrderStatus::Failed),
        RemoteStatus::Unknown(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nudged_last_price() {
        // Far enough apart: untouched
        assert_eq!(
            nudged_last_price(dec!(100.00), dec!(99.00), dec!(0.05)),
            dec!(100.00)
        );
        // Trigger below and too close: report a rupee above the trigger
        assert_eq!(
            nudged_last_price(dec!(99.01), dec!(99.00), dec!(0.05)),
            dec!(100.00)
        );
        // Trigger above and too close: report a rupee below
        assert_eq!(
            nudged_last_price(dec!(99.00), dec!(99.02), dec!(0.05)),
            dec!(98.02)
        );
    }

    #[test]
    fn test_adopt_status_mapping() {
        assert_eq!(adopt_status(&RemoteStatus::Active), Some(OrderStatus::Active));
        assert_eq!(
            adopt_status(&RemoteStatus::Rejected),
            Some(OrderStatus::Failed)
        );
        assert_eq!(adopt_status(&RemoteStatus::Unknown("X".into())), None);
    }
}
