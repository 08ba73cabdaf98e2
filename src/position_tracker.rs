use crate::metrics;
use crate::model::OpenPosition;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Local view of the positions believed to be open, keyed by broker position id.
///
/// Pure in-memory bookkeeping: no I/O, no locking. The broker remains the source
/// of truth, so inconsistencies here are logged and absorbed rather than raised.
#[derive(Debug, Default)]
pub struct PositionTracker {
    positions: HashMap<String, OpenPosition>,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly opened position.
    ///
    /// A duplicate id is a caller bookkeeping error; last write wins and the
    /// replaced record is returned.
    pub fn record_open(&mut self, position: OpenPosition) -> Option<OpenPosition> {
        let position_id = position.position_id.clone();
        let previous = self.positions.insert(position_id.clone(), position);

        match &previous {
            Some(old) => {
                let new_symbol = self
                    .positions
                    .get(&position_id)
                    .map(|p| p.symbol.as_str())
                    .unwrap_or_default();
                warn!(
                    position_id = %position_id,
                    previous_symbol = %old.symbol,
                    symbol = %new_symbol,
                    "Duplicate position id recorded - overwriting tracked entry"
                );
                metrics::inc_duplicate_opens();
            }
            None => {
                debug!(position_id = %position_id, "Position tracked");
            }
        }

        metrics::set_tracked_positions(self.positions.len() as i64);
        previous
    }

    /// Stop tracking a position. Absent ids are a no-op.
    pub fn remove(&mut self, position_id: &str) -> Option<OpenPosition> {
        let removed = self.positions.remove(position_id);
        if removed.is_some() {
            metrics::set_tracked_positions(self.positions.len() as i64);
        }
        removed
    }

    /// Point-in-time copy of the tracked ids.
    pub fn snapshot_ids(&self) -> HashSet<String> {
        self.positions.keys().cloned().collect()
    }

    pub fn get(&self, position_id: &str) -> Option<&OpenPosition> {
        self.positions.get(position_id)
    }

    pub fn contains(&self, position_id: &str) -> bool {
        self.positions.contains_key(position_id)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Cloned list of tracked positions, oldest first.
    pub fn positions(&self) -> Vec<OpenPosition> {
        let mut all: Vec<OpenPosition> = self.positions.values().cloned().collect();
        all.sort_by(|a, b| {
            a.open_time
                .cmp(&b.open_time)
                .then_with(|| a.position_id.cmp(&b.position_id))
        });
        all
    }
}
