//! Zerodha Kite Connect GTT adapter.
//!
//! Thin REST client over the Kite Connect v3 API. Every response shape
//! the GTT endpoints produce — fields under `condition`, under
//! `orders[0]`, or at the top level depending on the call — is flattened
//! into [`BrokerOrder`] by [`normalize_trigger`]; nothing outside this
//! module ever sees the raw JSON.

use rust_decimal::Decimal;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Broker, BrokerError, BrokerOrder, ConditionalOrderRequest, RemoteStatus};
use crate::orders::OrderId;
use crate::types::OrderSide;
use async_trait::async_trait;

const DEFAULT_BASE_URL: &str = "https://api.kite.trade";

/// Connection settings for the Kite REST API.
#[derive(Debug, Clone)]
pub struct KiteConfig {
    pub api_key: String,
    pub access_token: String,
    pub base_url: String,
    /// Exchange used for modify calls, where the API requires the full
    /// condition restated but the trigger list omits the exchange.
    pub exchange: String,
}

impl KiteConfig {
    /// Read credentials from `KITE_API_KEY` / `KITE_ACCESS_TOKEN`.
    pub fn from_env() -> Result<Self, BrokerError> {
        let api_key = std::env::var("KITE_API_KEY")
            .map_err(|_| BrokerError::Config("KITE_API_KEY must be set".to_string()))?;
        let access_token = std::env::var("KITE_ACCESS_TOKEN")
            .map_err(|_| BrokerError::Config("KITE_ACCESS_TOKEN must be set".to_string()))?;
        Ok(Self {
            api_key,
            access_token,
            base_url: DEFAULT_BASE_URL.to_string(),
            exchange: "NSE".to_string(),
        })
    }
}

/// Kite Connect GTT client.
pub struct KiteBroker {
    config: KiteConfig,
    client: reqwest::Client,
}

impl KiteBroker {
    pub fn new(config: KiteConfig) -> Result<Self, BrokerError> {
        if config.api_key.is_empty() || config.access_token.is_empty() {
            return Err(BrokerError::Config(
                "api key and access token are required".to_string(),
            ));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| BrokerError::Config(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    fn auth_header(&self) -> String {
        format!("token {}:{}", self.config.api_key, self.config.access_token)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, BrokerError> {
        let response = request
            .header("X-Kite-Version", "3")
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| BrokerError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| BrokerError::Transient(format!("unreadable response body: {e}")))?;

        if status.is_success() {
            return Ok(body);
        }

        let error_type = body
            .get("error_type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message")
            .to_string();

        match (status.as_u16(), error_type) {
            (403, "TokenException") | (403, "PermissionException") => {
                Err(BrokerError::SessionExpired)
            }
            (400, _) | (_, "InputException") => Err(BrokerError::Validation(message)),
            (429, _) => Err(BrokerError::Transient(format!("rate limited: {message}"))),
            (s, _) if s >= 500 => Err(BrokerError::Transient(format!("broker {s}: {message}"))),
            (s, t) => Err(BrokerError::Validation(format!("{s} {t}: {message}"))),
        }
    }

    fn data(body: Value) -> Result<Value, BrokerError> {
        body.get("data")
            .cloned()
            .ok_or_else(|| BrokerError::Transient("response missing data field".to_string()))
    }
}

#[async_trait]
impl Broker for KiteBroker {
    async fn place_conditional_order(
        &self,
        request: &ConditionalOrderRequest,
    ) -> Result<OrderId, BrokerError> {
        // The API rejects triggers equal to the last price; the engine
        // guarantees at least a tick of distance before calling here.
        let condition = serde_json::json!({
            "exchange": request.exchange,
            "tradingsymbol": request.symbol,
            "trigger_values": [request.trigger_price],
            "last_price": request.last_price,
        });
        let orders = serde_json::json!([{
            "exchange": request.exchange,
            "tradingsymbol": request.symbol,
            "transaction_type": request.side.to_string(),
            "quantity": request.quantity,
            "order_type": "LIMIT",
            "product": "CNC",
            "price": request.price,
        }]);

        let form = [
            ("type", "single".to_string()),
            ("condition", condition.to_string()),
            ("orders", orders.to_string()),
        ];

        let body = self
            .send(self.client.post(self.url("/gtt/triggers")).form(&form))
            .await?;
        let data = Self::data(body)?;
        let trigger_id = data
            .get("trigger_id")
            .map(json_id_to_string)
            .ok_or_else(|| BrokerError::Transient("placement response missing trigger_id".into()))?;

        debug!(%trigger_id, symbol = %request.symbol, side = %request.side, "conditional order placed");
        Ok(OrderId::new(trigger_id))
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        exchange: &str,
        side: OrderSide,
        quantity: u32,
    ) -> Result<OrderId, BrokerError> {
        let form = [
            ("exchange", exchange.to_string()),
            ("tradingsymbol", symbol.to_string()),
            ("transaction_type", side.to_string()),
            ("quantity", quantity.to_string()),
            ("order_type", "MARKET".to_string()),
            ("product", "CNC".to_string()),
            ("validity", "DAY".to_string()),
        ];

        let body = self
            .send(self.client.post(self.url("/orders/regular")).form(&form))
            .await?;
        let data = Self::data(body)?;
        let order_id = data
            .get("order_id")
            .map(json_id_to_string)
            .ok_or_else(|| BrokerError::Transient("order response missing order_id".into()))?;

        debug!(%order_id, symbol, %side, quantity, "market order placed");
        Ok(OrderId::new(order_id))
    }

    async fn modify_conditional_order(
        &self,
        id: &OrderId,
        quantity: u32,
        price: Decimal,
        trigger_price: Decimal,
    ) -> Result<(), BrokerError> {
        // The modify endpoint needs the full condition restated; fetch
        // the live trigger so symbol/exchange/last price stay accurate.
        let existing = self
            .list_conditional_orders()
            .await?
            .into_iter()
            .find(|o| &o.id == id)
            .ok_or_else(|| BrokerError::Validation(format!("trigger {id} not found")))?;

        let last_price = match self.last_traded_price(&existing.symbol).await {
            Ok(p) => p,
            Err(e) => {
                // The trigger validator only needs a price away from the
                // trigger; one rupee of clearance mirrors the placement path.
                warn!(symbol = %existing.symbol, error = %e, "quote unavailable for modify, using trigger offset");
                trigger_price - Decimal::ONE
            }
        };

        let condition = serde_json::json!({
            "exchange": self.config.exchange,
            "tradingsymbol": existing.symbol,
            "trigger_values": [trigger_price],
            "last_price": last_price,
        });
        let orders = serde_json::json!([{
            "exchange": self.config.exchange,
            "tradingsymbol": existing.symbol,
            "transaction_type": existing.side.to_string(),
            "quantity": quantity,
            "order_type": "LIMIT",
            "product": "CNC",
            "price": price,
        }]);
        let form = [
            ("type", "single".to_string()),
            ("condition", condition.to_string()),
            ("orders", orders.to_string()),
        ];

        self.send(
            self.client
                .put(self.url(&format!("/gtt/triggers/{id}")))
                .form(&form),
        )
        .await?;
        debug!(%id, quantity, %price, %trigger_price, "conditional order modified");
        Ok(())
    }

    async fn cancel_conditional_order(&self, id: &OrderId) -> Result<(), BrokerError> {
        self.send(self.client.delete(self.url(&format!("/gtt/triggers/{id}"))))
            .await?;
        debug!(%id, "conditional order cancelled");
        Ok(())
    }

    async fn list_conditional_orders(&self) -> Result<Vec<BrokerOrder>, BrokerError> {
        let body = self.send(self.client.get(self.url("/gtt/triggers"))).await?;
        let data = Self::data(body)?;
        let raw_orders = data
            .as_array()
            .cloned()
            .unwrap_or_default();

        let mut orders = Vec::with_capacity(raw_orders.len());
        for raw in &raw_orders {
            match normalize_trigger(raw) {
                Some(order) => orders.push(order),
                None => warn!(raw = %raw, "dropping unnormalizable trigger from snapshot"),
            }
        }
        Ok(orders)
    }

    async fn last_traded_price(&self, symbol: &str) -> Result<Decimal, BrokerError> {
        let instrument = format!("NSE:{}", symbol.to_uppercase());
        let body = self
            .send(
                self.client
                    .get(self.url("/quote/ltp"))
                    .query(&[("i", instrument.as_str())]),
            )
            .await?;
        let data = Self::data(body)?;
        data.get(&instrument)
            .and_then(|q| q.get("last_price"))
            .and_then(value_to_decimal)
            .ok_or_else(|| BrokerError::Transient(format!("no quote for {instrument}")))
    }
}

/// Map one raw GTT trigger payload into the normalized order shape.
///
/// The API scatters fields across three places depending on endpoint and
/// version: the trigger condition (`condition.tradingsymbol`,
/// `condition.trigger_values[0]`), the nested resulting order
/// (`orders[0].price` etc.) and the top level (`id`, `status`, sometimes
/// `price`/`quantity` on older payloads). Each field is resolved in that
/// order of preference.
pub fn normalize_trigger(raw: &Value) -> Option<BrokerOrder> {
    let nested = raw.get("orders").and_then(|o| o.get(0));
    let condition = raw.get("condition");

    let id = raw
        .get("id")
        .or_else(|| raw.get("trigger_id"))
        .map(json_id_to_string)?;

    let symbol = condition
        .and_then(|c| c.get("tradingsymbol"))
        .or_else(|| nested.and_then(|o| o.get("tradingsymbol")))
        .or_else(|| raw.get("tradingsymbol"))
        .and_then(Value::as_str)?
        .to_string();

    let side_str = nested
        .and_then(|o| o.get("transaction_type"))
        .or_else(|| raw.get("transaction_type"))
        .and_then(Value::as_str)?;
    let side = match side_str.to_ascii_uppercase().as_str() {
        "BUY" => OrderSide::Buy,
        "SELL" => OrderSide::Sell,
        _ => return None,
    };

    let quantity = nested
        .and_then(|o| o.get("quantity"))
        .or_else(|| raw.get("quantity"))
        .and_then(Value::as_u64)? as u32;

    let price = nested
        .and_then(|o| o.get("price"))
        .or_else(|| raw.get("price"))
        .and_then(value_to_decimal)?;

    let trigger_price = condition
        .and_then(|c| c.get("trigger_values"))
        .and_then(|v| v.get(0))
        .or_else(|| condition.and_then(|c| c.get("price")))
        .or_else(|| raw.get("trigger_price"))
        .and_then(value_to_decimal);

    let status = raw
        .get("status")
        .and_then(Value::as_str)
        .map(RemoteStatus::parse)
        .unwrap_or(RemoteStatus::Unknown("MISSING".to_string()));

    Some(BrokerOrder {
        id: OrderId::new(id),
        symbol,
        side,
        quantity,
        price,
        trigger_price,
        status,
    })
}

/// Trigger ids arrive as numbers or strings depending on API version.
fn json_id_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn value_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_normalize_nested_shape() {
        let raw = serde_json::json!({
            "id": 112_358,
            "status": "active",
            "condition": {
                "exchange": "NSE",
                "tradingsymbol": "ITC",
                "trigger_values": [99.0],
                "last_price": 100.0,
            },
            "orders": [{
                "tradingsymbol": "ITC",
                "transaction_type": "BUY",
                "quantity": 2,
                "price": 99.1,
            }],
        });

        let order = normalize_trigger(&raw).unwrap();
        assert_eq!(order.id.as_str(), "112358");
        assert_eq!(order.symbol, "ITC");
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.quantity, 2);
        assert_eq!(order.price, dec!(99.1));
        assert_eq!(order.trigger_price, Some(dec!(99.0)));
        assert_eq!(order.status, RemoteStatus::Active);
    }

    #[test]
    fn test_normalize_flat_shape() {
        let raw = serde_json::json!({
            "trigger_id": "T-77",
            "tradingsymbol": "ONGC",
            "transaction_type": "SELL",
            "quantity": 15,
            "price": "251.45",
            "trigger_price": "248.40",
            "status": "TRIGGERED",
        });

        let order = normalize_trigger(&raw).unwrap();
        assert_eq!(order.id.as_str(), "T-77");
        assert_eq!(order.side, OrderSide::Sell);
        assert_eq!(order.price, dec!(251.45));
        assert_eq!(order.trigger_price, Some(dec!(248.40)));
        assert_eq!(order.status, RemoteStatus::Triggered);
    }

    #[test]
    fn test_normalize_condition_price_fallback() {
        // Older payloads put the trigger under condition.price
        let raw = serde_json::json!({
            "id": 9,
            "status": "active",
            "condition": { "tradingsymbol": "ITC", "price": 98.5 },
            "orders": [{ "transaction_type": "BUY", "quantity": 1, "price": 98.6 }],
        });

        let order = normalize_trigger(&raw).unwrap();
        assert_eq!(order.trigger_price, Some(dec!(98.5)));
    }

    #[test]
    fn test_normalize_rejects_incomplete_payload() {
        let raw = serde_json::json!({ "id": 1, "status": "active" });
        assert!(normalize_trigger(&raw).is_none());
    }

    #[test]
    fn test_config_requires_credentials() {
        let config = KiteConfig {
            api_key: String::new(),
            access_token: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            exchange: "NSE".to_string(),
        };
        assert!(matches!(KiteBroker::new(config), Err(BrokerError::Config(_))));
    }
}
