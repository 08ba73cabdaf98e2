use crate::model::SymbolStatistics;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Per-symbol running totals, created lazily on the first closure of a symbol.
///
/// Mutated only by the reconciler; everything else reads snapshots.
#[derive(Debug, Default)]
pub struct StatisticsAggregator {
    by_symbol: HashMap<String, SymbolStatistics>,
}

impl StatisticsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only snapshot for one symbol.
    pub fn get(&self, symbol: &str) -> Option<SymbolStatistics> {
        self.by_symbol.get(symbol).cloned()
    }

    pub fn all(&self) -> HashMap<String, SymbolStatistics> {
        self.by_symbol.clone()
    }

    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.by_symbol.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub(crate) fn apply_closure(&mut self, symbol: &str, realized_profit: Decimal) {
        let stats = self.by_symbol.entry(symbol.to_string()).or_default();
        stats.total_profit += realized_profit;
        stats.closed_trades += 1;
        if realized_profit > Decimal::ZERO {
            stats.winning_trades += 1;
        } else if realized_profit < Decimal::ZERO {
            stats.losing_trades += 1;
        }
    }
}
