use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_with::{DisplayFromStr, serde_as};
use strum_macros::Display;

use crate::Result;
use crate::error::{Error, Validation};

#[non_exhaustive]
#[derive(Clone, Copy, Debug, Display, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn parse(value: &str) -> Result<Side> {
        match value.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            _ => Err(Validation::InvalidSide(value.to_owned()).into()),
        }
    }
}

impl FromStr for Side {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Side::parse(s)
    }
}

/// Order types accepted on the command line.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    Limit,
    StopLimit,
}

impl OrderType {
    pub fn parse(value: &str) -> Result<OrderType> {
        match value.trim().to_ascii_uppercase().as_str() {
            "MARKET" => Ok(OrderType::Market),
            "LIMIT" => Ok(OrderType::Limit),
            "STOP_LIMIT" | "STOP-LIMIT" | "STOP" => Ok(OrderType::StopLimit),
            _ => Err(Validation::InvalidOrderType(value.to_owned()).into()),
        }
    }

    /// Value of the `type` parameter the exchange expects.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::Limit => "LIMIT",
            OrderType::StopLimit => "STOP",
        }
    }

    #[must_use]
    pub const fn requires_price(self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    #[must_use]
    pub const fn requires_stop_price(self) -> bool {
        matches!(self, OrderType::StopLimit)
    }
}

impl FromStr for OrderType {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        OrderType::parse(s)
    }
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, Display, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    #[serde(alias = "EXPIRED_IN_MATCH")]
    Expired,
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PriceField {
    Price,
    StopPrice,
}

impl std::fmt::Display for PriceField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceField::Price => f.write_str("price"),
            PriceField::StopPrice => f.write_str("stop price"),
        }
    }
}

/// Parameters for a single order, as collected from the user.
///
/// Nothing here is checked yet; see [`crate::validation::validate_request`].
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq, bon::Builder)]
pub struct OrderRequest {
    #[builder(into)]
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub leverage: Option<u32>,
}

/// Outcome of a placement or cancellation.
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OrderResult {
    pub order_id: u64,
    pub client_order_id: Option<String>,
    pub symbol: String,
    pub status: OrderStatus,
    pub executed_qty: Decimal,
    /// `None` while nothing has been filled.
    pub avg_price: Option<Decimal>,
}

impl OrderResult {
    pub(crate) fn from_response(response: OrderResponse, symbol: &str) -> Self {
        let avg_price = response
            .avg_price
            .filter(|p| !p.is_zero())
            .or_else(|| match response.cum_quote {
                Some(quote) if !quote.is_zero() && !response.executed_qty.is_zero() => {
                    quote.checked_div(response.executed_qty)
                }
                _ => None,
            });

        Self {
            order_id: response.order_id,
            client_order_id: response.client_order_id,
            symbol: response.symbol.unwrap_or_else(|| symbol.to_owned()),
            status: response.status,
            executed_qty: response.executed_qty,
            avg_price,
        }
    }
}

/// Order body returned by placement and cancellation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OrderResponse {
    order_id: u64,
    #[serde(default)]
    symbol: Option<String>,
    status: OrderStatus,
    #[serde(default)]
    client_order_id: Option<String>,
    #[serde(default)]
    executed_qty: Decimal,
    #[serde(default)]
    avg_price: Option<Decimal>,
    #[serde(default)]
    cum_quote: Option<Decimal>,
}

/// One row of the open-order or order-history listings.
#[non_exhaustive]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: u64,
    pub symbol: String,
    pub side: Side,
    /// Exchange order type; listings may contain types this client never places.
    #[serde(rename = "type")]
    pub order_type: String,
    pub status: OrderStatus,
    #[serde(default)]
    pub orig_qty: Decimal,
    #[serde(default)]
    pub executed_qty: Decimal,
    #[serde(default)]
    pub price: Decimal,
    #[serde(default)]
    pub stop_price: Decimal,
    #[serde(default)]
    pub avg_price: Decimal,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub time: Option<DateTime<Utc>>,
}

impl OrderSummary {
    #[must_use]
    pub fn is_market(&self) -> bool {
        self.price.is_zero()
    }
}

#[non_exhaustive]
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Long,
    Short,
}

#[serde_as]
#[non_exhaustive]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub symbol: String,
    pub position_amt: Decimal,
    #[serde(default)]
    pub entry_price: Decimal,
    #[serde(default)]
    pub mark_price: Decimal,
    #[serde(default, rename = "unRealizedProfit")]
    pub unrealized_profit: Decimal,
    #[serde_as(as = "DisplayFromStr")]
    pub leverage: u32,
    #[serde(default)]
    pub margin_type: Option<String>,
}

impl Position {
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.position_amt.is_zero()
    }

    #[must_use]
    pub fn direction(&self) -> Option<Direction> {
        if self.position_amt.is_sign_positive() && !self.position_amt.is_zero() {
            Some(Direction::Long)
        } else if self.position_amt.is_sign_negative() && !self.position_amt.is_zero() {
            Some(Direction::Short)
        } else {
            None
        }
    }

    #[must_use]
    pub fn size(&self) -> Decimal {
        self.position_amt.abs()
    }
}

#[non_exhaustive]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub asset: String,
    #[serde(rename = "availableBalance")]
    pub available: Decimal,
    #[serde(rename = "walletBalance")]
    pub total: Decimal,
}

impl Balance {
    #[must_use]
    pub fn zero<S: Into<String>>(asset: S) -> Self {
        Self {
            asset: asset.into(),
            available: Decimal::ZERO,
            total: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AccountInfo {
    #[serde(default)]
    pub(crate) assets: Vec<Balance>,
}

#[non_exhaustive]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LeverageChange {
    pub symbol: String,
    pub leverage: u32,
    /// Reported as a string; may be a number or a sentinel such as `INF`.
    #[serde(default)]
    pub max_notional_value: Option<String>,
    #[serde(skip)]
    pub unchanged: bool,
}

impl LeverageChange {
    pub(crate) fn unchanged(symbol: &str, leverage: u32) -> Self {
        Self {
            symbol: symbol.to_owned(),
            leverage,
            max_notional_value: None,
            unchanged: true,
        }
    }
}

/// Error body the exchange sends with non-2xx responses.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub(crate) code: i64,
    pub(crate) msg: String,
}
