//! Dual-source order reconciliation.
//!
//! The ledger and the broker's open-trigger list disagree constantly:
//! triggers fire and vanish, orders get rejected after triggering, and
//! statuses drift. Reconciliation walks every open local entry against a
//! fresh remote snapshot, applies the resulting transition, and persists
//! it immediately so a crash mid-pass loses at most the in-flight
//! comparison — never a confirmed transition.
//!
//! Only this engine advances an order's status past ACTIVE.

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::ledger::{LedgerError, OrderLedger};
use super::types::{CompletionEvidence, LedgerOrder, OrderId, OrderStatus};
use crate::broker::{BrokerOrder, RemoteStatus};

/// Derived holdings for a symbol, recomputed in the same pass as the
/// transitions so it always reflects the just-updated ledger.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub total_shares: u32,
    pub average_price: Decimal,
}

/// A buy order newly counted as filled during this pass.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRecord {
    pub id: Option<OrderId>,
    pub quantity: u32,
    pub price: Decimal,
    pub evidence: CompletionEvidence,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// At least one status changed this pass.
    pub any_transitions: bool,
    /// Orders that flipped to COMPLETE this pass.
    pub completions: Vec<CompletionRecord>,
    /// Orders that flipped to FAILED this pass.
    pub failures: Vec<Option<OrderId>>,
    /// Holdings after the transitions above.
    pub position: Position,
}

/// Compares ledger entries against the broker snapshot and writes the
/// resulting transitions back through the ledger.
#[derive(Debug, Clone)]
pub struct ReconciliationEngine {
    ledger: OrderLedger,
}

impl ReconciliationEngine {
    pub fn new(ledger: OrderLedger) -> Self {
        Self { ledger }
    }

    /// Run one reconciliation pass for `symbol`.
    ///
    /// `orders` is the in-memory ledger (mutated in place); `snapshot`
    /// is the freshly fetched remote order list. Each transition is
    /// saved to disk before the next entry is examined.
    pub fn reconcile(
        &self,
        symbol: &str,
        orders: &mut Vec<LedgerOrder>,
        snapshot: &[BrokerOrder],
    ) -> Result<ReconcileReport, LedgerError> {
        let mut report = ReconcileReport::default();

        for index in 0..orders.len() {
            let entry = &orders[index];
            if !entry.symbol.eq_ignore_ascii_case(symbol) {
                continue;
            }

            let transition = match entry.status {
                OrderStatus::Pending | OrderStatus::Active => {
                    self.transition_for_open_entry(symbol, entry, snapshot)
                }
                // A lingering TRIGGERED means the fill was seen on a
                // previous pass; settle it as COMPLETE now.
                OrderStatus::Triggered => Some(Transition::Complete {
                    evidence: CompletionEvidence::RemoteStatus,
                }),
                _ => None,
            };

            let Some(transition) = transition else {
                continue;
            };

            let entry = &mut orders[index];
            match transition {
                Transition::Complete { evidence } => {
                    info!(
                        id = ?entry.id,
                        symbol,
                        side = %entry.side,
                        quantity = entry.quantity,
                        price = %entry.price,
                        ?evidence,
                        "order counted as executed"
                    );
                    entry.status = OrderStatus::Complete;
                    entry.extra.completion_evidence = Some(evidence);
                    if entry.is_buy() {
                        report.completions.push(CompletionRecord {
                            id: entry.id.clone(),
                            quantity: entry.quantity,
                            price: entry.price,
                            evidence,
                        });
                    }
                }
                Transition::Failed { reason } => {
                    warn!(
                        id = ?entry.id,
                        symbol,
                        quantity = entry.quantity,
                        price = %entry.price,
                        reason = %reason,
                        "order failed to execute"
                    );
                    entry.status = OrderStatus::Failed;
                    entry.extra.failure_reason = Some(reason);
                    report.failures.push(entry.id.clone());
                }
                Transition::Drift { status } => {
                    debug!(id = ?entry.id, symbol, from = %entry.status, to = %status, "status drift copied from broker");
                    entry.status = status;
                }
            }
            entry.updated_at = chrono::Utc::now();
            report.any_transitions = true;

            // Persist before touching the next entry.
            self.ledger.save(symbol, orders)?;
        }

        report.position = compute_position(symbol, orders);
        Ok(report)
    }

    fn transition_for_open_entry(
        &self,
        symbol: &str,
        entry: &LedgerOrder,
        snapshot: &[BrokerOrder],
    ) -> Option<Transition> {
        let Some(id) = &entry.id else {
            // Never confirmed by the broker; there is nothing remote to
            // compare against and it must not be counted as active.
            debug!(symbol, price = %entry.price, "skipping unconfirmed ledger entry");
            return None;
        };

        let remote = snapshot
            .iter()
            .find(|o| &o.id == id && o.symbol.eq_ignore_ascii_case(symbol));

        let Some(remote) = remote else {
            // Vanished from the open-trigger list while we held it as
            // active. Inferred as filled — the broker also purges
            // rejected and out-of-band-cancelled triggers, so this
            // carries low confidence and is flagged as such.
            warn!(
                %id,
                symbol,
                quantity = entry.quantity,
                price = %entry.price,
                "order missing from broker snapshot, inferring execution (low confidence)"
            );
            return Some(Transition::Complete {
                evidence: CompletionEvidence::VanishedFromRemote,
            });
        };

        match &remote.status {
            s if s.is_filled() => Some(Transition::Complete {
                evidence: CompletionEvidence::RemoteStatus,
            }),
            s if s.is_dead() => Some(Transition::Failed {
                reason: format!("broker status: {s}"),
            }),
            RemoteStatus::Active if entry.status != OrderStatus::Active => {
                Some(Transition::Drift {
                    status: OrderStatus::Active,
                })
            }
            RemoteStatus::Pending if entry.status != OrderStatus::Pending => {
                Some(Transition::Drift {
                    status: OrderStatus::Pending,
                })
            }
            RemoteStatus::Unknown(raw) => {
                // No local representation for this status; log loudly
                // and leave the entry for manual reconciliation rather
                // than guess.
                warn!(%id, symbol, remote_status = %raw, "unrecognized broker status, leaving entry untouched");
                None
            }
            _ => None,
        }
    }
}

enum Transition {
    Complete { evidence: CompletionEvidence },
    Failed { reason: String },
    Drift { status: OrderStatus },
}

/// Sum shares and value over executed buy orders for the symbol.
pub fn compute_position(symbol: &str, orders: &[LedgerOrder]) -> Position {
    let mut total_shares: u32 = 0;
    let mut total_value = Decimal::ZERO;

    for order in orders {
        if order.is_buy()
            && order.status.counts_as_filled()
            && order.symbol.eq_ignore_ascii_case(symbol)
        {
            total_shares += order.quantity;
            total_value += Decimal::from(order.quantity) * order.price;
        }
    }

    let average_price = if total_shares > 0 {
        total_value / Decimal::from(total_shares)
    } else {
        Decimal::ZERO
    };

    Position {
        total_shares,
        average_price,
    }
}
