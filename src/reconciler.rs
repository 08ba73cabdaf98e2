//! Position reconciliation pass.
//!
//! Detects closures by diffing the locally tracked ids against the broker's live
//! set, attributes realized profit from the broker's trade history, updates the
//! per-symbol statistics and notifies the sink exactly once per closed position.
//!
//! A failed open-positions query aborts the pass before anything is mutated:
//! treating a live position as closed would corrupt statistics and stop
//! monitoring it, while deferring detection costs one polling interval.

use crate::broker::{BrokerGateway, QueryError};
use crate::context::ReconcileContext;
use crate::ledger::TradeLedger;
use crate::metrics;
use crate::model::ClosureEvent;
use crate::notify::ClosureSink;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Broker query failed, pass aborted: {0}")]
    BrokerUnavailable(#[from] QueryError),
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// History window starts this long before the recorded open time.
    pub lookback: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::seconds(60),
        }
    }
}

pub struct Reconciler {
    config: ReconcilerConfig,
    ctx: ReconcileContext,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig, ctx: ReconcileContext) -> Self {
        Self { config, ctx }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.ctx.now()
    }

    /// Run one reconciliation pass.
    ///
    /// Callers must serialize passes over the same ledger; the `&mut` borrow
    /// enforces this within one task.
    pub async fn run_pass<S>(
        &self,
        ledger: &mut TradeLedger,
        gateway: &dyn BrokerGateway,
        sink: &mut S,
    ) -> Result<Vec<ClosureEvent>, ReconcileError>
    where
        S: ClosureSink + ?Sized,
    {
        if ledger.tracker().is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let open_ids = ledger.tracker().snapshot_ids();

        let broker_open_ids = match gateway.current_open_position_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(
                    gateway = gateway.name(),
                    tracked = open_ids.len(),
                    error = %e,
                    "Open-positions query failed - pass aborted, no state changed"
                );
                metrics::inc_aborted_passes();
                return Err(ReconcileError::BrokerUnavailable(e));
            }
        };

        let mut closed_ids: Vec<String> = open_ids
            .difference(&broker_open_ids)
            .cloned()
            .collect();
        closed_ids.sort();

        debug!(
            tracked = open_ids.len(),
            broker_open = broker_open_ids.len(),
            closed = closed_ids.len(),
            "Position diff computed"
        );

        let (tracker, statistics) = ledger.parts_mut();
        let mut events = Vec::with_capacity(closed_ids.len());

        for position_id in closed_ids {
            let Some(position) = tracker.get(&position_id).cloned() else {
                continue;
            };

            // Saturates at the earliest representable instant for extreme open times.
            let from = position
                .open_time
                .checked_sub_signed(self.config.lookback)
                .unwrap_or(DateTime::<Utc>::MIN_UTC);
            let to = self.ctx.now();

            let realized_profit = match gateway
                .historical_closing_record(&position_id, from, to)
                .await
            {
                Ok(Some(profit)) => {
                    debug!(position_id = %position_id, profit = %profit, "Closing deal found");
                    profit
                }
                Ok(None) => {
                    warn!(
                        position_id = %position_id,
                        symbol = %position.symbol,
                        from = %from,
                        to = %to,
                        "RECONCILIATION GAP - no closing deal in history window, profit recorded as 0"
                    );
                    metrics::inc_reconciliation_gaps();
                    Decimal::ZERO
                }
                Err(e) => {
                    warn!(
                        position_id = %position_id,
                        symbol = %position.symbol,
                        error = %e,
                        "RECONCILIATION GAP - history lookup failed, profit recorded as 0"
                    );
                    metrics::inc_reconciliation_gaps();
                    Decimal::ZERO
                }
            };

            statistics.apply_closure(&position.symbol, realized_profit);

            let event = ClosureEvent {
                position_id: position_id.clone(),
                symbol: position.symbol.clone(),
                realized_profit,
                closed_at: to,
            };
            sink.on_position_closed(&event);
            tracker.remove(&position_id);
            metrics::inc_closures();

            info!(
                position_id = %position_id,
                symbol = %position.symbol,
                side = %position.side,
                volume = %position.volume,
                profit = %realized_profit,
                "Position closed"
            );
            events.push(event);
        }

        metrics::observe_pass_duration(started.elapsed().as_secs_f64());
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::simulated::SimulatedBroker;
    use crate::model::{OpenPosition, Side};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    const T0_MS: i64 = 1_700_000_000_000;

    fn position(id: &str, symbol: &str) -> OpenPosition {
        OpenPosition {
            position_id: id.to_string(),
            symbol: symbol.to_string(),
            side: Side::Buy,
            volume: dec!(0.1),
            open_time: Utc.timestamp_millis_opt(T0_MS).unwrap(),
            open_price: dec!(1900),
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(
            ReconcilerConfig::default(),
            ReconcileContext::new_simulated(T0_MS + 3_600_000),
        )
    }

    #[tokio::test]
    async fn test_empty_tracker_skips_broker() {
        let broker = SimulatedBroker::new();
        let mut ledger = TradeLedger::new();
        let mut sink: Vec<ClosureEvent> = Vec::new();

        let events = reconciler()
            .run_pass(&mut ledger, &broker, &mut sink)
            .await
            .unwrap();

        assert!(events.is_empty());
        assert_eq!(broker.open_queries(), 0);
    }

    #[tokio::test]
    async fn test_lookback_tolerates_clock_skew() {
        // Broker clock stamps the close 30s before our recorded open time.
        let broker = SimulatedBroker::new();
        let skewed = Utc.timestamp_millis_opt(T0_MS - 30_000).unwrap();
        broker.close("T1", "XAUUSD", dec!(2), skewed);

        let mut ledger = TradeLedger::new();
        ledger.record_open(position("T1", "XAUUSD"));
        let mut sink: Vec<ClosureEvent> = Vec::new();

        let events = reconciler()
            .run_pass(&mut ledger, &broker, &mut sink)
            .await
            .unwrap();
        assert_eq!(events[0].realized_profit, dec!(2));
    }

    #[tokio::test]
    async fn test_earliest_open_time_does_not_overflow_window() {
        let broker = SimulatedBroker::new();
        let mut ledger = TradeLedger::new();
        let mut ancient = position("T1", "XAUUSD");
        ancient.open_time = DateTime::<Utc>::MIN_UTC;
        ledger.record_open(ancient);
        broker.close("T1", "XAUUSD", dec!(1.25), Utc.timestamp_millis_opt(T0_MS).unwrap());
        let mut sink: Vec<ClosureEvent> = Vec::new();

        let events = reconciler()
            .run_pass(&mut ledger, &broker, &mut sink)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].realized_profit, dec!(1.25));
        assert!(ledger.tracker().is_empty());
    }

    #[tokio::test]
    async fn test_closed_at_uses_context_clock() {
        let broker = SimulatedBroker::new();
        let mut ledger = TradeLedger::new();
        ledger.record_open(position("T1", "XAUUSD"));
        let mut sink: Vec<ClosureEvent> = Vec::new();

        let events = reconciler()
            .run_pass(&mut ledger, &broker, &mut sink)
            .await
            .unwrap();
        assert_eq!(events[0].closed_at.timestamp_millis(), T0_MS + 3_600_000);
    }
}
