use crate::broker::adapter::{BrokerGateway, QueryError};
use crate::model::ClosingDeal;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct SimulatedBook {
    open: HashSet<String>,
    deals: HashMap<String, ClosingDeal>,
    terminal_offline: bool,
    failing_lookups: HashSet<String>,
}

/// In-memory broker for dry runs and tests.
///
/// Positions are opened and closed by hand; closing a position records a
/// closing deal unless the close is marked as missing from history.
#[derive(Debug, Default)]
pub struct SimulatedBroker {
    book: Mutex<SimulatedBook>,
    open_queries: AtomicU64,
    history_queries: AtomicU64,
}

impl SimulatedBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, position_id: &str) {
        self.book.lock().open.insert(position_id.to_string());
    }

    /// Close a position and record its closing deal.
    pub fn close(&self, position_id: &str, symbol: &str, profit: Decimal, closed_at: DateTime<Utc>) {
        let mut book = self.book.lock();
        book.open.remove(position_id);
        book.deals.insert(
            position_id.to_string(),
            ClosingDeal {
                position_id: position_id.to_string(),
                symbol: symbol.to_string(),
                profit,
                closed_at,
            },
        );
    }

    /// Close a position without leaving a trace in the trade history.
    pub fn close_without_history(&self, position_id: &str) {
        let mut book = self.book.lock();
        book.open.remove(position_id);
        book.deals.remove(position_id);
    }

    /// While offline, every open-positions query fails.
    pub fn set_offline(&self, offline: bool) {
        self.book.lock().terminal_offline = offline;
    }

    /// Make the history lookup for one position fail with an API error.
    pub fn fail_lookup(&self, position_id: &str) {
        self.book.lock().failing_lookups.insert(position_id.to_string());
    }

    pub fn open_queries(&self) -> u64 {
        self.open_queries.load(Ordering::SeqCst)
    }

    pub fn history_queries(&self) -> u64 {
        self.history_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerGateway for SimulatedBroker {
    async fn current_open_position_ids(&self) -> Result<HashSet<String>, QueryError> {
        self.open_queries.fetch_add(1, Ordering::SeqCst);
        let book = self.book.lock();
        if book.terminal_offline {
            return Err(QueryError::Unavailable(
                "Simulated terminal offline".to_string(),
            ));
        }
        Ok(book.open.clone())
    }

    async fn historical_closing_record(
        &self,
        position_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<Decimal>, QueryError> {
        self.history_queries.fetch_add(1, Ordering::SeqCst);
        let book = self.book.lock();
        if book.failing_lookups.contains(position_id) {
            return Err(QueryError::Api(format!(
                "Simulated history failure for {}",
                position_id
            )));
        }

        Ok(book
            .deals
            .get(position_id)
            .filter(|d| d.closed_at >= from && d.closed_at <= to)
            .map(|d| d.profit))
    }

    fn name(&self) -> &str {
        "Simulated"
    }
}
