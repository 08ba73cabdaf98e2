use crate::broker::adapter::{BrokerGateway, QueryError};
use crate::config::BrokerSettings;
use crate::model::{BrokerPosition, ClosingDeal};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Gateway to the local terminal bridge, which exposes the trading terminal's
/// open positions and closing deals over HTTP.
pub struct BridgeGateway {
    base_url: String,
    api_key: Option<String>,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct PositionsResponse {
    #[serde(default)]
    positions: Vec<WirePosition>,
}

#[derive(Debug, Deserialize)]
struct WirePosition {
    ticket: serde_json::Value,
    #[serde(default)]
    symbol: String,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    deals: Vec<WireDeal>,
}

#[derive(Debug, Deserialize)]
struct WireDeal {
    ticket: serde_json::Value,
    #[serde(default)]
    symbol: String,
    profit: Decimal,
    #[serde(default)]
    close_time: i64,
}

/// Terminal tickets arrive as integers; some bridge builds send strings.
fn ticket_id(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

pub(crate) fn parse_positions(body: &str) -> Result<Vec<BrokerPosition>, QueryError> {
    let resp: PositionsResponse =
        serde_json::from_str(body).map_err(|e| QueryError::Decode(e.to_string()))?;

    resp.positions
        .into_iter()
        .map(|p| {
            let position_id = ticket_id(&p.ticket).ok_or_else(|| {
                QueryError::Decode(format!("Position without usable ticket: {}", p.ticket))
            })?;
            Ok(BrokerPosition {
                position_id,
                symbol: p.symbol,
            })
        })
        .collect()
}

pub(crate) fn parse_deals(body: &str) -> Result<Vec<ClosingDeal>, QueryError> {
    let resp: HistoryResponse =
        serde_json::from_str(body).map_err(|e| QueryError::Decode(e.to_string()))?;

    // Deals without a ticket cannot be matched to a position; skip them.
    Ok(resp
        .deals
        .into_iter()
        .filter_map(|d| {
            let position_id = ticket_id(&d.ticket)?;
            let closed_at = Utc
                .timestamp_opt(d.close_time, 0)
                .single()
                .unwrap_or_default();
            Some(ClosingDeal {
                position_id,
                symbol: d.symbol,
                profit: d.profit,
                closed_at,
            })
        })
        .collect())
}

fn map_transport_error(e: reqwest::Error) -> QueryError {
    if e.is_timeout() || e.is_connect() {
        QueryError::Unavailable(e.to_string())
    } else {
        QueryError::Network(e.to_string())
    }
}

impl BridgeGateway {
    pub fn new(settings: &BrokerSettings) -> Result<Self, QueryError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| QueryError::Network(format!("HTTP client init failed: {}", e)))?;

        Ok(Self {
            base_url: settings.bridge_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            client,
        })
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<String, QueryError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }

        let resp = request.send().await.map_err(map_transport_error)?;
        let status = resp.status();
        let text = resp.text().await.map_err(map_transport_error)?;

        if status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(QueryError::Unavailable(format!(
                "Bridge reports terminal offline: {}",
                text
            )));
        }
        if !status.is_success() {
            return Err(QueryError::Api(format!(
                "Bridge request {} failed {}: {}",
                path, status, text
            )));
        }

        Ok(text)
    }

    pub async fn open_positions(&self) -> Result<Vec<BrokerPosition>, QueryError> {
        let body = self.get("/positions", &[]).await?;
        parse_positions(&body)
    }

    pub async fn closing_deals(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ClosingDeal>, QueryError> {
        let query = [
            ("from", from.timestamp().to_string()),
            ("to", to.timestamp().to_string()),
        ];
        let body = self.get("/history", &query).await?;
        parse_deals(&body)
    }
}

#[async_trait]
impl BrokerGateway for BridgeGateway {
    async fn current_open_position_ids(&self) -> Result<HashSet<String>, QueryError> {
        let positions = self.open_positions().await?;
        Ok(positions.into_iter().map(|p| p.position_id).collect())
    }

    async fn historical_closing_record(
        &self,
        position_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<Decimal>, QueryError> {
        let deals = self.closing_deals(from, to).await?;
        debug!(position_id = %position_id, deals = deals.len(), "History window fetched");

        Ok(deals
            .into_iter()
            .find(|d| d.position_id == position_id)
            .map(|d| d.profit))
    }

    fn name(&self) -> &str {
        "MT5 Bridge"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_positions_accepts_numeric_and_string_tickets() {
        let body = r#"{"positions":[{"ticket":123456,"symbol":"XAUUSD","volume":0.1},{"ticket":"987","symbol":"BTCUSD"}]}"#;
        let positions = parse_positions(body).unwrap();

        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0].position_id, "123456");
        assert_eq!(positions[1].position_id, "987");
        assert_eq!(positions[1].symbol, "BTCUSD");
    }

    #[test]
    fn test_parse_positions_rejects_missing_ticket() {
        let body = r#"{"positions":[{"ticket":null,"symbol":"XAUUSD"}]}"#;
        assert!(matches!(parse_positions(body), Err(QueryError::Decode(_))));
    }

    #[test]
    fn test_parse_deals() {
        let body = r#"{"deals":[{"ticket":55,"symbol":"EURUSD","profit":-12.75,"close_time":1700000000},{"ticket":null,"profit":1.0}]}"#;
        let deals = parse_deals(body).unwrap();

        assert_eq!(deals.len(), 1);
        assert_eq!(deals[0].position_id, "55");
        assert_eq!(deals[0].profit, dec!(-12.75));
        assert_eq!(deals[0].closed_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_empty_bodies_decode_to_nothing() {
        assert!(parse_positions("{}").unwrap().is_empty());
        assert!(parse_deals(r#"{"deals":[]}"#).unwrap().is_empty());
        assert!(matches!(parse_deals("not json"), Err(QueryError::Decode(_))));
    }
}
