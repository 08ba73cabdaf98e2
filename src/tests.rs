#[cfg(test)]
mod tests {
    use crate::broker::simulated::SimulatedBroker;
    use crate::context::ReconcileContext;
    use crate::ledger::TradeLedger;
    use crate::metrics;
    use crate::model::{ClosureEvent, OpenPosition, Side};
    use crate::reconciler::{Reconciler, ReconcilerConfig};
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    const T0_MS: i64 = 1_700_000_000_000;

    fn open(id: &str, symbol: &str) -> OpenPosition {
        OpenPosition {
            position_id: id.to_string(),
            symbol: symbol.to_string(),
            side: Side::Buy,
            volume: dec!(0.01),
            open_time: Utc.timestamp_millis_opt(T0_MS).unwrap(),
            open_price: Decimal::ZERO,
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(
            ReconcilerConfig::default(),
            ReconcileContext::new_simulated(T0_MS + 600_000),
        )
    }

    #[tokio::test]
    async fn test_statistics_never_double_count_after_removal() {
        let broker = SimulatedBroker::new();
        let mut ledger = TradeLedger::new();
        ledger.record_open(open("T1", "XAUUSD"));
        broker.close("T1", "XAUUSD", dec!(5), Utc.timestamp_millis_opt(T0_MS + 1_000).unwrap());

        let rec = reconciler();
        let mut sink: Vec<ClosureEvent> = Vec::new();
        rec.run_pass(&mut ledger, &broker, &mut sink).await.unwrap();
        rec.run_pass(&mut ledger, &broker, &mut sink).await.unwrap();

        // Already removed by the first pass.
        let (tracker, _) = ledger.parts_mut();
        assert!(tracker.remove("T1").is_none());

        let stats = ledger.statistics().get("XAUUSD").unwrap();
        assert_eq!(stats.total_profit, dec!(5));
        assert_eq!(stats.closed_trades, 1);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_status_snapshot_after_pass() {
        let broker = SimulatedBroker::new();
        broker.open("T2");
        let mut ledger = TradeLedger::new();
        ledger.record_open(open("T1", "EURUSD"));
        ledger.record_open(open("T2", "EURUSD"));
        broker.close("T1", "EURUSD", dec!(-3.5), Utc.timestamp_millis_opt(T0_MS + 1_000).unwrap());

        let rec = reconciler();
        let mut sink: Vec<ClosureEvent> = Vec::new();
        rec.run_pass(&mut ledger, &broker, &mut sink).await.unwrap();

        let status = ledger.status(false, rec.now());
        assert_eq!(status.positions.len(), 1);
        assert_eq!(status.positions[0].position_id, "T2");
        let eur = status.statistics.get("EURUSD").unwrap();
        assert_eq!(eur.stats.losing_trades, 1);
        assert_eq!(eur.win_rate, 0.0);
        assert_eq!(status.as_of.timestamp_millis(), T0_MS + 600_000);
    }

    #[tokio::test]
    async fn test_metrics_exposition_names_reconciler_series() {
        let broker = SimulatedBroker::new();
        let mut ledger = TradeLedger::new();
        ledger.record_open(open("T9", "BTCUSD"));
        broker.close_without_history("T9");

        let mut sink: Vec<ClosureEvent> = Vec::new();
        reconciler().run_pass(&mut ledger, &broker, &mut sink).await.unwrap();

        let text = metrics::render();
        assert!(text.contains("nexus_reconciler_closures_total"));
        assert!(text.contains("nexus_reconciler_gaps_total"));
    }
}
