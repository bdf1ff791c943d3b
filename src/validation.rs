//! Checks run on order parameters before anything is signed or sent.
//!
//! Every function is pure: it returns the normalized value or the specific
//! [`Validation`] failure. [`validate_request`] combines them into a
//! [`ValidatedOrder`], the only input [`crate::OrderManager`] will place.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::auth::Params;
use crate::error::Validation;
use crate::types::{OrderRequest, OrderType, PriceField, Side};

/// Highest leverage the exchange accepts on any symbol.
pub const MAX_LEVERAGE: u32 = 125;
pub const QUANTITY_MAX_SCALE: u32 = 6;
pub const PRICE_MAX_SCALE: u32 = 8;
pub const MAX_HISTORY_LIMIT: u32 = 100;
pub const DEFAULT_HISTORY_LIMIT: u32 = 10;

const SYMBOL_LEN: std::ops::RangeInclusive<usize> = 3..=20;
const ASSET_LEN: std::ops::RangeInclusive<usize> = 2..=10;

type Checked<T> = std::result::Result<T, Validation>;

/// Trims and upper-cases `symbol`, then requires 3-20 ASCII letters or digits.
pub fn validate_symbol(symbol: &str) -> Checked<String> {
    let normalized = symbol.trim().to_ascii_uppercase();
    let invalid = |reason| Validation::InvalidSymbol {
        symbol: symbol.to_owned(),
        reason,
    };

    if normalized.is_empty() {
        return Err(invalid("symbol cannot be empty"));
    }
    if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid(
            "only letters and digits are allowed (e.g. BTCUSDT, ETHUSDT)",
        ));
    }
    if !SYMBOL_LEN.contains(&normalized.len()) {
        return Err(invalid("expected 3 to 20 characters"));
    }
    Ok(normalized)
}

/// Accepts a positive quantity with at most 6 decimal places.
///
/// The decimal-place cap is enforced here on purpose, so finer quantities are
/// rejected locally instead of by the exchange's precision check.
pub fn validate_quantity(quantity: Decimal) -> Checked<Decimal> {
    if quantity <= Decimal::ZERO {
        return Err(Validation::InvalidQuantity(quantity));
    }
    check_scale("quantity", quantity, QUANTITY_MAX_SCALE)
}

/// Checks that the price fields present are exactly the ones `order_type` needs.
///
/// LIMIT needs a price, STOP_LIMIT a price and a stop price, MARKET neither.
/// A field the type does not use is rejected rather than dropped.
pub fn validate_order(
    order_type: OrderType,
    price: Option<Decimal>,
    stop_price: Option<Decimal>,
) -> Checked<(Option<Decimal>, Option<Decimal>)> {
    let price = check_price_field(
        order_type,
        PriceField::Price,
        price,
        order_type.requires_price(),
    )?;
    let stop_price = check_price_field(
        order_type,
        PriceField::StopPrice,
        stop_price,
        order_type.requires_stop_price(),
    )?;
    Ok((price, stop_price))
}

fn check_price_field(
    order_type: OrderType,
    field: PriceField,
    value: Option<Decimal>,
    required: bool,
) -> Checked<Option<Decimal>> {
    match (value, required) {
        (Some(_), false) => Err(Validation::ExtraneousPrice { order_type, field }),
        (None, false) => Ok(None),
        (Some(v), true) if v > Decimal::ZERO => {
            let name = match field {
                PriceField::Price => "price",
                PriceField::StopPrice => "stop price",
            };
            check_scale(name, v, PRICE_MAX_SCALE).map(Some)
        }
        (_, true) => Err(Validation::MissingPrice { order_type, field }),
    }
}

pub fn validate_leverage(leverage: u32) -> Checked<u32> {
    validate_leverage_within(leverage, MAX_LEVERAGE)
}

/// Like [`validate_leverage`] with a symbol-specific ceiling.
pub fn validate_leverage_within(leverage: u32, max: u32) -> Checked<u32> {
    if (1..=max).contains(&leverage) {
        Ok(leverage)
    } else {
        Err(Validation::InvalidLeverage { leverage, max })
    }
}

pub fn validate_order_id(order_id: u64) -> Checked<u64> {
    if order_id == 0 {
        return Err(Validation::MissingOrderId);
    }
    Ok(order_id)
}

pub fn validate_limit(limit: u32) -> Checked<u32> {
    if (1..=MAX_HISTORY_LIMIT).contains(&limit) {
        Ok(limit)
    } else {
        Err(Validation::InvalidLimit {
            limit,
            max: MAX_HISTORY_LIMIT,
        })
    }
}

pub fn validate_asset(asset: &str) -> Checked<String> {
    let normalized = asset.trim().to_ascii_uppercase();
    if ASSET_LEN.contains(&normalized.len())
        && normalized.chars().all(|c| c.is_ascii_alphanumeric())
    {
        Ok(normalized)
    } else {
        Err(Validation::InvalidAsset(asset.to_owned()))
    }
}

fn check_scale(field: &'static str, value: Decimal, max: u32) -> Checked<Decimal> {
    let normalized = value.normalize();
    if normalized.scale() > max {
        return Err(Validation::ExcessPrecision {
            field,
            value,
            scale: normalized.scale(),
            max,
        });
    }
    Ok(normalized)
}

/// Runs every check over `request`.
pub fn validate_request(request: &OrderRequest) -> Checked<ValidatedOrder> {
    let symbol = validate_symbol(&request.symbol)?;
    let quantity = validate_quantity(request.quantity)?;
    let (price, stop_price) =
        validate_order(request.order_type, request.price, request.stop_price)?;
    let leverage = request.leverage.map(validate_leverage).transpose()?;

    Ok(ValidatedOrder {
        symbol,
        side: request.side,
        order_type: request.order_type,
        quantity,
        price,
        stop_price,
        leverage,
    })
}

/// An [`OrderRequest`] that passed [`validate_request`].
///
/// Price fields are present exactly when the order type needs them.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidatedOrder {
    symbol: String,
    side: Side,
    order_type: OrderType,
    quantity: Decimal,
    price: Option<Decimal>,
    stop_price: Option<Decimal>,
    leverage: Option<u32>,
}

impl ValidatedOrder {
    #[must_use]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[must_use]
    pub fn side(&self) -> Side {
        self.side
    }

    #[must_use]
    pub fn order_type(&self) -> OrderType {
        self.order_type
    }

    #[must_use]
    pub fn quantity(&self) -> Decimal {
        self.quantity
    }

    #[must_use]
    pub fn price(&self) -> Option<Decimal> {
        self.price
    }

    #[must_use]
    pub fn stop_price(&self) -> Option<Decimal> {
        self.stop_price
    }

    #[must_use]
    pub fn leverage(&self) -> Option<u32> {
        self.leverage
    }

    /// Parameters for `POST /fapi/v1/order`.
    #[must_use]
    pub fn to_params(&self, client_order_id: Uuid) -> Params {
        let time_in_force = (self.order_type != OrderType::Market).then_some("GTC");

        Params::new()
            .with("symbol", &self.symbol)
            .with("side", self.side)
            .with("type", self.order_type.wire_name())
            .with("quantity", self.quantity)
            .with_opt("price", self.price)
            .with_opt("stopPrice", self.stop_price)
            .with_opt("timeInForce", time_in_force)
            .with("newClientOrderId", client_order_id)
    }
}
