use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("Decode error: {0}")]
    Decode(String),
}

/// The two capabilities the reconciler consumes from the trading terminal.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Ids of every position the broker currently reports as open.
    async fn current_open_position_ids(&self) -> Result<HashSet<String>, QueryError>;

    /// Realized profit of the deal that closed `position_id` within `[from, to]`.
    /// `Ok(None)` when no closing deal exists in the window.
    async fn historical_closing_record(
        &self,
        position_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<Decimal>, QueryError>;

    /// Gateway name (e.g., "MT5 Bridge")
    fn name(&self) -> &str;
}
