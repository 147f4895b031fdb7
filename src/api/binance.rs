use crate::gateway::{EndpointClass, ExchangeClient, GatewayError};
use crate::models::{Candle, OrderAck, OrderSpec, Timeframe};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

// Binance USD-M futures REST API
// Docs: https://developers.binance.com/docs/derivatives/usds-margined-futures
const BINANCE_FUTURES_API: &str = "https://fapi.binance.com";
const MAX_KLINES: usize = 1500;

type HmacSha256 = Hmac<Sha256>;

/// Client for the Binance USD-M futures REST API
///
/// Only classifies failures; retries and rate limiting live in the gateway.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    recv_window_ms: u64,
}

// Keeps credentials out of logs
impl fmt::Debug for BinanceFuturesClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BinanceFuturesClient")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .field("recv_window_ms", &self.recv_window_ms)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct TickerPrice {
    price: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    total_margin_balance: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    #[serde(default)]
    avg_price: Option<Decimal>,
}

impl BinanceFuturesClient {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: BINANCE_FUTURES_API.to_string(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            recv_window_ms: 5_000,
        }
    }

    /// Point at another deployment (testnet, mock server)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_recv_window(mut self, recv_window_ms: u64) -> Self {
        self.recv_window_ms = recv_window_ms;
        self
    }

    /// Hex HMAC-SHA256 of `payload` keyed with the API secret
    fn sign(&self, payload: &str) -> Result<String, GatewayError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|_| GatewayError::Unauthorized("API secret unusable as HMAC key".into()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn query_string(params: &[(&str, String)]) -> String {
        // parameter values are symbols, numbers, enums and hex ids; all URL-safe
        params
            .iter()
            .map(|(key, value)| format!("{}={}", key, value))
            .collect::<Vec<_>>()
            .join("&")
    }

    async fn public_get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        class: EndpointClass,
    ) -> Result<T, GatewayError> {
        let url = format!("{}{}?{}", self.base_url, path, Self::query_string(params));
        let body = self.execute(self.client.get(&url), class).await?;
        decode(&body)
    }

    async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        mut params: Vec<(&str, String)>,
        class: EndpointClass,
    ) -> Result<T, GatewayError> {
        params.push(("recvWindow", self.recv_window_ms.to_string()));
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query = Self::query_string(&params);
        let signature = self.sign(&query)?;
        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, signature);

        let request = self
            .client
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key);
        let body = self.execute(request, class).await?;
        decode(&body)
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        class: EndpointClass,
    ) -> Result<String, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Transient(format!("network error: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Transient(format!("failed reading response: {}", e)))?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(classify(status, &body, class))
        }
    }
}

/// Map an HTTP failure onto the gateway error kinds
fn classify(status: StatusCode, body: &str, class: EndpointClass) -> GatewayError {
    let api_error = serde_json::from_str::<ApiError>(body).ok();
    let message = api_error
        .as_ref()
        .map(|e| format!("{} (code {})", e.msg, e.code))
        .unwrap_or_else(|| format!("HTTP {}: {}", status, body));

    match status.as_u16() {
        401 | 403 => GatewayError::Unauthorized(message),
        // 418 is an IP ban for ignoring 429s
        429 | 418 => GatewayError::RateLimited { class },
        408 => GatewayError::Transient(message),
        500..=599 => GatewayError::Transient(message),
        _ => match api_error.map(|e| e.code) {
            // bad signature, malformed or revoked key
            Some(-1022) | Some(-2014) | Some(-2015) => GatewayError::Unauthorized(message),
            // clock drift against recvWindow
            Some(-1021) => GatewayError::Transient(message),
            _ => GatewayError::Rejected(message),
        },
    }
}

fn decode<T: DeserializeOwned>(body: &str) -> Result<T, GatewayError> {
    serde_json::from_str(body)
        .map_err(|e| GatewayError::Transient(format!("unexpected response body: {}", e)))
}

fn parse_kline(row: &[Value]) -> Option<Candle> {
    let decimal = |index: usize| -> Option<Decimal> { Decimal::from_str(row.get(index)?.as_str()?).ok() };
    let time = |index: usize| -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(row.get(index)?.as_i64()?)
    };

    Some(Candle {
        open_time: time(0)?,
        open: decimal(1)?,
        high: decimal(2)?,
        low: decimal(3)?,
        close: decimal(4)?,
        volume: decimal(5)?,
        close_time: time(6)?,
    })
}

#[async_trait]
impl ExchangeClient for BinanceFuturesClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: usize,
    ) -> Result<Vec<Candle>, GatewayError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", timeframe.interval().to_string()),
            ("limit", lookback.clamp(1, MAX_KLINES).to_string()),
        ];
        let rows: Vec<Vec<Value>> = self
            .public_get("/fapi/v1/klines", &params, EndpointClass::MarketData)
            .await?;

        let candles: Vec<Candle> = rows.iter().filter_map(|row| parse_kline(row)).collect();
        if candles.len() != rows.len() {
            tracing::warn!(
                symbol,
                skipped = rows.len() - candles.len(),
                "Dropped malformed klines"
            );
        }
        Ok(candles)
    }

    async fn get_current_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        let ticker: TickerPrice = self
            .public_get(
                "/fapi/v1/ticker/price",
                &[("symbol", symbol.to_string())],
                EndpointClass::MarketData,
            )
            .await?;
        Ok(ticker.price)
    }

    async fn get_margin_balance(&self) -> Result<Decimal, GatewayError> {
        let account: AccountInfo = self
            .signed(Method::GET, "/fapi/v2/account", Vec::new(), EndpointClass::Account)
            .await?;
        Ok(account.total_margin_balance)
    }

    async fn set_leverage(&self, symbol: &str, multiplier: u32) -> Result<(), GatewayError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("leverage", multiplier.to_string()),
        ];
        let _: Value = self
            .signed(Method::POST, "/fapi/v1/leverage", params, EndpointClass::Account)
            .await?;
        Ok(())
    }

    async fn place_order(&self, order: &OrderSpec) -> Result<OrderAck, GatewayError> {
        let mut params = vec![
            ("symbol", order.symbol.clone()),
            ("side", order.side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", order.quantity.normalize().to_string()),
            ("newOrderRespType", "RESULT".to_string()),
        ];
        if order.reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }
        if let Some(client_order_id) = &order.client_order_id {
            params.push(("newClientOrderId", client_order_id.clone()));
        }

        let response: OrderResponse = self
            .signed(Method::POST, "/fapi/v1/order", params, EndpointClass::Order)
            .await?;

        tracing::info!(
            symbol = %order.symbol,
            side = order.side.as_str(),
            quantity = %order.quantity,
            order_id = response.order_id,
            "Order accepted"
        );

        Ok(OrderAck {
            order_id: response.order_id.to_string(),
            average_price: response.avg_price.filter(|p| !p.is_zero()),
        })
    }

    // Binance only enforces newClientOrderId uniqueness among open orders, so a
    // filled market order can be duplicated by a resend
    fn supports_client_order_id(&self) -> bool {
        false
    }
}
