use reqwest::Method;
use uuid::Uuid;

use crate::Result;
use crate::auth::Params;
use crate::error::Validation;
use crate::rest::RestClient;
use crate::settings::Settings;
use crate::types::{
    AccountInfo, Balance, LeverageChange, OrderRequest, OrderResponse, OrderResult, OrderSummary,
    Position,
};
use crate::validation::{self, DEFAULT_HISTORY_LIMIT, ValidatedOrder};

const PING: &str = "/fapi/v1/ping";
const ORDER: &str = "/fapi/v1/order";
const OPEN_ORDERS: &str = "/fapi/v1/openOrders";
const ALL_ORDERS: &str = "/fapi/v1/allOrders";
const LEVERAGE: &str = "/fapi/v1/leverage";
const POSITION_RISK: &str = "/fapi/v2/positionRisk";
const ACCOUNT: &str = "/fapi/v2/account";

/// Order operations over a [`RestClient`].
///
/// Input is validated before any request is built, so a rejected order never
/// reaches the network.
#[derive(Clone, Debug)]
pub struct OrderManager {
    client: RestClient,
    default_leverage: Option<u32>,
}

impl OrderManager {
    #[must_use]
    pub fn new(client: RestClient) -> Self {
        Self {
            client,
            default_leverage: None,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = RestClient::from_settings(settings)?;
        Ok(Self::new(client).with_default_leverage(settings.default_leverage))
    }

    /// Leverage set before placing orders that do not name their own.
    #[must_use]
    pub fn with_default_leverage(mut self, leverage: Option<u32>) -> Self {
        self.default_leverage = leverage;
        self
    }

    #[must_use]
    pub fn client(&self) -> &RestClient {
        &self.client
    }

    /// Validates and places `request`.
    ///
    /// When the order (or the manager's default) carries a leverage, it is set
    /// on the symbol first; a failure there aborts the placement. A
    /// `newClientOrderId` is generated once, so a retried placement cannot
    /// create a second order.
    pub async fn place_order(&self, request: &OrderRequest) -> Result<OrderResult> {
        let order = validation::validate_request(request).inspect_err(rejected)?;

        if let Some(leverage) = order.leverage().or(self.default_leverage) {
            self.set_leverage(order.symbol(), leverage).await?;
        }

        self.submit(&order).await
    }

    async fn submit(&self, order: &ValidatedOrder) -> Result<OrderResult> {
        let client_order_id = Uuid::new_v4();
        tracing::info!(
            symbol = order.symbol(),
            side = %order.side(),
            order_type = %order.order_type(),
            quantity = %order.quantity(),
            price = ?order.price(),
            stop_price = ?order.stop_price(),
            %client_order_id,
            "placing order"
        );

        let response: OrderResponse = self
            .client
            .send(Method::POST, ORDER, &order.to_params(client_order_id))
            .await
            .inspect_err(|e| tracing::error!(symbol = order.symbol(), error = %e, "order failed"))?;

        let result = OrderResult::from_response(response, order.symbol());
        tracing::info!(
            order_id = result.order_id,
            status = %result.status,
            executed_qty = %result.executed_qty,
            "order placed"
        );
        Ok(result)
    }

    pub async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<OrderResult> {
        let symbol = validation::validate_symbol(symbol).inspect_err(rejected)?;
        let order_id = validation::validate_order_id(order_id).inspect_err(rejected)?;

        tracing::info!(%symbol, order_id, "cancelling order");
        let params = Params::new()
            .with("symbol", &symbol)
            .with("orderId", order_id);
        let response: OrderResponse = self.client.send(Method::DELETE, ORDER, &params).await?;

        let result = OrderResult::from_response(response, &symbol);
        tracing::info!(order_id, status = %result.status, "order cancelled");
        Ok(result)
    }

    pub async fn get_order(&self, symbol: &str, order_id: u64) -> Result<OrderSummary> {
        let symbol = validation::validate_symbol(symbol).inspect_err(rejected)?;
        let order_id = validation::validate_order_id(order_id).inspect_err(rejected)?;

        let params = Params::new()
            .with("symbol", &symbol)
            .with("orderId", order_id);
        self.client.send(Method::GET, ORDER, &params).await
    }

    /// Open orders, for one symbol or all of them.
    pub async fn list_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderSummary>> {
        let symbol = symbol
            .map(validation::validate_symbol)
            .transpose()
            .inspect_err(rejected)?;
        let params = Params::new().with_opt("symbol", symbol.as_ref());

        let orders: Vec<OrderSummary> = self.client.send(Method::GET, OPEN_ORDERS, &params).await?;
        tracing::debug!(count = orders.len(), "fetched open orders");
        Ok(orders)
    }

    /// Recent orders (open and closed), at most `limit`, defaulting to 10.
    pub async fn history(&self, symbol: Option<&str>, limit: Option<u32>) -> Result<Vec<OrderSummary>> {
        let symbol = symbol
            .map(validation::validate_symbol)
            .transpose()
            .inspect_err(rejected)?;
        let limit = validation::validate_limit(limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
            .inspect_err(rejected)?;
        let params = Params::new()
            .with_opt("symbol", symbol.as_ref())
            .with("limit", limit);

        self.client.send(Method::GET, ALL_ORDERS, &params).await
    }

    /// Open positions. Flat entries the exchange reports for every symbol are dropped.
    pub async fn position(&self, symbol: Option<&str>) -> Result<Vec<Position>> {
        let symbol = symbol
            .map(validation::validate_symbol)
            .transpose()
            .inspect_err(rejected)?;
        let params = Params::new().with_opt("symbol", symbol.as_ref());

        let positions: Vec<Position> = self
            .client
            .send(Method::GET, POSITION_RISK, &params)
            .await?;
        Ok(positions.into_iter().filter(Position::is_open).collect())
    }

    /// Balance of `asset`; zero when the account does not hold it.
    pub async fn balance(&self, asset: &str) -> Result<Balance> {
        let asset = validation::validate_asset(asset).inspect_err(rejected)?;
        let account: AccountInfo = self
            .client
            .send(Method::GET, ACCOUNT, &Params::new())
            .await?;

        Ok(account
            .assets
            .into_iter()
            .find(|balance| balance.asset == asset)
            .unwrap_or_else(|| Balance::zero(asset)))
    }

    /// Sets leverage on `symbol`. A leverage that is already in effect is not an error.
    pub async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<LeverageChange> {
        let symbol = validation::validate_symbol(symbol).inspect_err(rejected)?;
        let leverage = validation::validate_leverage(leverage).inspect_err(rejected)?;

        let params = Params::new()
            .with("symbol", &symbol)
            .with("leverage", leverage);
        match self
            .client
            .send::<LeverageChange>(Method::POST, LEVERAGE, &params)
            .await
        {
            Ok(change) => {
                tracing::info!(%symbol, leverage = change.leverage, "leverage set");
                Ok(change)
            }
            Err(err) if err.api().is_some_and(|api| api.is_leverage_unchanged()) => {
                tracing::debug!(%symbol, leverage, "leverage already set");
                Ok(LeverageChange::unchanged(&symbol, leverage))
            }
            Err(err) => Err(err),
        }
    }

    /// Pings the exchange, then makes one signed call to check the credentials.
    pub async fn test_connection(&self) -> Result<()> {
        self.client
            .send_public::<serde_json::Value>(Method::GET, PING, &Params::new())
            .await?;
        self.client
            .send::<AccountInfo>(Method::GET, ACCOUNT, &Params::new())
            .await
            .inspect_err(|e| tracing::error!(error = %e, "credential check failed"))?;

        tracing::info!(base_url = %self.client.base_url(), "connection ok");
        Ok(())
    }
}

fn rejected(err: &Validation) {
    tracing::warn!(error = %err, "input rejected");
}

impl From<RestClient> for OrderManager {
    fn from(client: RestClient) -> Self {
        Self::new(client)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use reqwest::StatusCode;
    use rust_decimal_macros::dec;
    use secrecy::SecretString;
    use url::Url;

    use super::*;
    use crate::audit::MemoryAuditLog;
    use crate::auth::Credentials;
    use crate::error::{Error, Kind, Validation};
    use crate::rest::{HttpRequest, HttpResponse, RetryPolicy, Transport};
    use crate::types::{OrderStatus, OrderType, Side};

    /// Replays canned responses in order and remembers every request.
    struct Scripted {
        responses: Mutex<Vec<HttpResponse>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl Scripted {
        fn new(responses: Vec<(StatusCode, &str)>) -> Arc<Self> {
            let mut responses: Vec<_> = responses
                .into_iter()
                .map(|(status, body)| HttpResponse::new(status, body))
                .collect();
            responses.reverse();
            Arc::new(Self {
                responses: Mutex::new(responses),
                requests: Mutex::default(),
            })
        }

        fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().expect("lock").clone()
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn execute(&self, request: HttpRequest) -> crate::Result<HttpResponse> {
            self.requests.lock().expect("lock").push(request);
            self.responses
                .lock()
                .expect("lock")
                .pop()
                .ok_or_else(|| Error::network("script exhausted"))
        }
    }

    fn manager(transport: &Arc<Scripted>) -> OrderManager {
        let credentials = Credentials::new("key", SecretString::from("secret"));
        let client = RestClient::new(
            Url::parse("http://exchange.test").expect("url"),
            credentials,
            Arc::clone(transport) as Arc<dyn Transport>,
            Arc::new(MemoryAuditLog::new()),
        )
        .with_policy(RetryPolicy::immediate(3));
        OrderManager::new(client)
    }

    fn query(request: &HttpRequest, key: &str) -> Option<String> {
        request
            .url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    #[tokio::test]
    async fn invalid_orders_never_reach_the_transport() {
        let transport = Scripted::new(vec![]);
        let request = OrderRequest::builder()
            .symbol("BTCUSDT")
            .side(Side::Buy)
            .order_type(OrderType::Limit)
            .quantity(dec!(0.01))
            .build();

        let err = manager(&transport)
            .place_order(&request)
            .await
            .expect_err("limit without price");

        assert_eq!(err.kind(), Kind::Validation);
        assert!(
            matches!(err.validation(), Some(Validation::MissingPrice { .. })),
            "{err:?}"
        );
        assert!(transport.requests().is_empty(), "nothing sent");
    }

    /// Collects formatted `tracing` output.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("lock")).into_owned()
        }
    }

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn rejected_orders_are_logged() {
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let transport = Scripted::new(vec![]);
        let request = OrderRequest::builder()
            .symbol("BTCUSDT")
            .side(Side::Buy)
            .order_type(OrderType::Limit)
            .quantity(dec!(0.01))
            .build();

        manager(&transport)
            .place_order(&request)
            .await
            .expect_err("limit without price");

        let logs = captured.text();
        assert!(logs.contains("input rejected"), "{logs}");
        assert!(
            logs.contains("LIMIT orders require a positive price"),
            "{logs}"
        );
    }

    #[tokio::test]
    async fn leverage_is_set_before_the_order() -> anyhow::Result<()> {
        let transport = Scripted::new(vec![
            (StatusCode::OK, r#"{"symbol":"BTCUSDT","leverage":20,"maxNotionalValue":"250000"}"#),
            (
                StatusCode::OK,
                r#"{"orderId":7,"symbol":"BTCUSDT","status":"NEW","executedQty":"0","avgPrice":"0.00"}"#,
            ),
        ]);
        let request = OrderRequest::builder()
            .symbol("btcusdt")
            .side(Side::Sell)
            .order_type(OrderType::Limit)
            .quantity(dec!(0.01))
            .price(dec!(65000))
            .leverage(20)
            .build();

        let result = manager(&transport).place_order(&request).await?;

        assert_eq!(result.order_id, 7);
        assert_eq!(result.status, OrderStatus::New);
        assert_eq!(result.avg_price, None);

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].url.path(), LEVERAGE);
        assert_eq!(query(&requests[0], "leverage").as_deref(), Some("20"));
        assert_eq!(requests[1].url.path(), ORDER);
        assert_eq!(query(&requests[1], "symbol").as_deref(), Some("BTCUSDT"));
        assert_eq!(query(&requests[1], "timeInForce").as_deref(), Some("GTC"));
        Ok(())
    }

    #[tokio::test]
    async fn retried_placements_reuse_the_client_order_id() -> anyhow::Result<()> {
        let transport = Scripted::new(vec![
            (StatusCode::SERVICE_UNAVAILABLE, ""),
            (StatusCode::OK, r#"{"orderId":1,"status":"FILLED","executedQty":"0.001","avgPrice":"61000"}"#),
        ]);
        let request = OrderRequest::builder()
            .symbol("BTCUSDT")
            .side(Side::Buy)
            .order_type(OrderType::Market)
            .quantity(dec!(0.001))
            .build();

        manager(&transport).place_order(&request).await?;

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        let first = query(&requests[0], "newClientOrderId");
        assert!(first.is_some(), "client order id sent");
        assert_eq!(first, query(&requests[1], "newClientOrderId"));
        Ok(())
    }

    #[tokio::test]
    async fn failed_leverage_change_aborts_the_order() {
        let transport = Scripted::new(vec![(
            StatusCode::BAD_REQUEST,
            r#"{"code":-4028,"msg":"Leverage 120 is not valid"}"#,
        )]);
        let request = OrderRequest::builder()
            .symbol("BTCUSDT")
            .side(Side::Buy)
            .order_type(OrderType::Market)
            .quantity(dec!(0.001))
            .leverage(120)
            .build();

        let err = manager(&transport)
            .place_order(&request)
            .await
            .expect_err("leverage rejected");

        assert_eq!(err.api().map(|api| api.code), Some(-4028));
        assert_eq!(transport.requests().len(), 1, "order not sent");
    }

    #[tokio::test]
    async fn unchanged_leverage_is_not_an_error() -> anyhow::Result<()> {
        let transport = Scripted::new(vec![(
            StatusCode::BAD_REQUEST,
            r#"{"code":-4046,"msg":"No need to change margin type."}"#,
        )]);

        let change = manager(&transport).set_leverage("ETHUSDT", 5).await?;

        assert!(change.unchanged, "reported as unchanged");
        assert_eq!(change.symbol, "ETHUSDT");
        assert_eq!(change.leverage, 5);
        Ok(())
    }

    #[tokio::test]
    async fn default_leverage_applies_when_the_order_has_none() -> anyhow::Result<()> {
        let transport = Scripted::new(vec![
            (StatusCode::OK, r#"{"symbol":"BTCUSDT","leverage":10}"#),
            (StatusCode::OK, r#"{"orderId":2,"status":"NEW"}"#),
        ]);
        let request = OrderRequest::builder()
            .symbol("BTCUSDT")
            .side(Side::Buy)
            .order_type(OrderType::Market)
            .quantity(dec!(0.001))
            .build();

        manager(&transport)
            .with_default_leverage(Some(10))
            .place_order(&request)
            .await?;

        let requests = transport.requests();
        assert_eq!(query(&requests[0], "leverage").as_deref(), Some("10"));
        Ok(())
    }

    #[tokio::test]
    async fn missing_asset_reports_zero_balance() -> anyhow::Result<()> {
        let transport = Scripted::new(vec![(
            StatusCode::OK,
            r#"{"assets":[{"asset":"USDT","availableBalance":"900.5","walletBalance":"1000"}]}"#,
        )]);

        let balance = manager(&transport).balance("bnb").await?;

        assert_eq!(balance, Balance::zero("BNB"));
        Ok(())
    }

    #[tokio::test]
    async fn flat_positions_are_dropped() -> anyhow::Result<()> {
        let transport = Scripted::new(vec![(
            StatusCode::OK,
            r#"[
                {"symbol":"BTCUSDT","positionAmt":"-0.010","entryPrice":"60000","markPrice":"61000","unRealizedProfit":"-10","leverage":"20"},
                {"symbol":"ETHUSDT","positionAmt":"0.000","entryPrice":"0","markPrice":"3000","unRealizedProfit":"0","leverage":"10"}
            ]"#,
        )]);

        let positions = manager(&transport).position(None).await?;

        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].symbol, "BTCUSDT");
        assert_eq!(positions[0].size(), dec!(0.010));
        Ok(())
    }

    #[tokio::test]
    async fn history_passes_symbol_and_limit_through() -> anyhow::Result<()> {
        let transport = Scripted::new(vec![(
            StatusCode::OK,
            r#"[
                {"orderId":1,"symbol":"BTCUSDT","side":"BUY","type":"MARKET","status":"FILLED","time":1700000000000},
                {"orderId":2,"symbol":"BTCUSDT","side":"SELL","type":"LIMIT","status":"CANCELED","price":"65000","time":1700000002000}
            ]"#,
        )]);

        let orders = manager(&transport).history(Some("btcusdt"), Some(2)).await?;

        let ids: Vec<u64> = orders.iter().map(|o| o.order_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(orders[0].is_market(), "no price on market orders");

        let request = &transport.requests()[0];
        assert_eq!(request.url.path(), ALL_ORDERS);
        assert_eq!(query(request, "symbol").as_deref(), Some("BTCUSDT"));
        assert_eq!(query(request, "limit").as_deref(), Some("2"));
        Ok(())
    }

    #[tokio::test]
    async fn history_limit_is_checked() {
        let transport = Scripted::new(vec![]);

        let err = manager(&transport)
            .history(Some("BTCUSDT"), Some(500))
            .await
            .expect_err("limit above 100");

        assert!(
            matches!(err.validation(), Some(Validation::InvalidLimit { .. })),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn connection_test_pings_without_a_signature() -> anyhow::Result<()> {
        let transport = Scripted::new(vec![
            (StatusCode::OK, "{}"),
            (StatusCode::OK, r#"{"assets":[]}"#),
        ]);

        manager(&transport).test_connection().await?;

        let requests = transport.requests();
        assert_eq!(requests[0].url.path(), PING);
        assert_eq!(query(&requests[0], "signature"), None);
        assert!(query(&requests[1], "signature").is_some(), "account call is signed");
        Ok(())
    }
}
