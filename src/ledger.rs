use crate::model::{OpenPosition, SymbolStatistics};
use crate::position_tracker::PositionTracker;
use crate::statistics::StatisticsAggregator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Long-lived reconciliation state owned by the caller and handed to each pass.
#[derive(Debug, Default)]
pub struct TradeLedger {
    tracker: PositionTracker,
    statistics: StatisticsAggregator,
}

impl TradeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_open(&mut self, position: OpenPosition) -> Option<OpenPosition> {
        self.tracker.record_open(position)
    }

    pub fn tracker(&self) -> &PositionTracker {
        &self.tracker
    }

    pub fn statistics(&self) -> &StatisticsAggregator {
        &self.statistics
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut PositionTracker, &mut StatisticsAggregator) {
        (&mut self.tracker, &mut self.statistics)
    }

    pub fn status(&self, paused: bool, as_of: DateTime<Utc>) -> LedgerStatus {
        let statistics = self
            .statistics
            .all()
            .into_iter()
            .map(|(symbol, stats)| {
                let win_rate = stats.win_rate();
                (symbol, StatisticsView { stats, win_rate })
            })
            .collect();

        LedgerStatus {
            as_of,
            paused,
            positions: self.tracker.positions(),
            statistics,
            last_pass: None,
        }
    }
}

/// Statistics plus derived win rate, as served to readers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatisticsView {
    #[serde(flatten)]
    pub stats: SymbolStatistics,
    pub win_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PassSummary {
    pub finished_at: DateTime<Utc>,
    pub closures: usize,
    #[serde(default)]
    pub error: Option<String>,
}

/// Eventually-consistent snapshot published after every pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerStatus {
    pub as_of: DateTime<Utc>,
    pub paused: bool,
    pub positions: Vec<OpenPosition>,
    pub statistics: BTreeMap<String, StatisticsView>,
    #[serde(default)]
    pub last_pass: Option<PassSummary>,
}

impl Default for LedgerStatus {
    fn default() -> Self {
        Self {
            as_of: DateTime::<Utc>::UNIX_EPOCH,
            paused: false,
            positions: Vec::new(),
            statistics: BTreeMap::new(),
            last_pass: None,
        }
    }
}
