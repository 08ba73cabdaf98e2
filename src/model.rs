use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Side {
    #[serde(rename = "BUY")]
    Buy,
    #[serde(rename = "SELL")]
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A trade the local side believes is still open.
///
/// Inserted once when a fill is reported and deleted once the broker stops
/// listing it. Never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpenPosition {
    pub position_id: String,
    pub symbol: String,
    pub side: Side,
    pub volume: Decimal,
    pub open_time: DateTime<Utc>,
    /// Informational only, never used for profit attribution.
    #[serde(default)]
    pub open_price: Decimal,
}

/// Output unit of a reconciliation pass. Not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosureEvent {
    pub position_id: String,
    pub symbol: String,
    pub realized_profit: Decimal,
    pub closed_at: DateTime<Utc>,
}

/// Running per-symbol totals. Only grows.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SymbolStatistics {
    pub total_profit: Decimal,
    pub winning_trades: u64,
    pub losing_trades: u64,
    /// Every reconciled closure, including zero-profit ones.
    pub closed_trades: u64,
}

impl SymbolStatistics {
    /// Winning share of reconciled closures, in percent.
    pub fn win_rate(&self) -> f64 {
        if self.closed_trades == 0 {
            return 0.0;
        }
        self.winning_trades as f64 / self.closed_trades as f64 * 100.0
    }
}

/// A closing deal from the broker's trade history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClosingDeal {
    pub position_id: String,
    pub symbol: String,
    pub profit: Decimal,
    pub closed_at: DateTime<Utc>,
}

/// A position the broker currently reports as open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerPosition {
    pub position_id: String,
    pub symbol: String,
}
