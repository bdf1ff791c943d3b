//! Plain-text output.

use std::fmt;

use futures_trading_bot::types::{Balance, LeverageChange, OrderResult, OrderSummary, Position};
use futures_trading_bot::validation::ValidatedOrder;
use futures_trading_bot::{Error, Kind};
use rust_decimal::Decimal;

/// Left-aligned columns sized to their widest cell.
pub struct Table {
    title: String,
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new<T: Into<String>>(title: T, headers: Vec<&'static str>) -> Self {
        Self {
            title: title.into(),
            headers,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    fn widths(&self) -> Vec<usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                self.rows
                    .iter()
                    .filter_map(|row| row.get(i))
                    .map(|cell| cell.chars().count())
                    .chain(std::iter::once(header.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.widths();

        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", line(self.headers.iter().copied(), &widths))?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        write!(f, "{}", rule.join("  "))?;
        for row in &self.rows {
            write!(f, "\n{}", line(row.iter().map(String::as_str), &widths))?;
        }
        Ok(())
    }
}

fn line<'a, I: Iterator<Item = &'a str>>(cells: I, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_owned()
}

/// `label: value` lines under a heading.
fn fields(title: &str, pairs: &[(&str, String)]) -> String {
    let width = pairs.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    let mut out = title.to_owned();
    for (key, value) in pairs {
        out.push_str(&format!("\n  {key:<width$}  {value}"));
    }
    out
}

fn price(value: Decimal) -> String {
    if value.is_zero() {
        "MARKET".to_owned()
    } else {
        value.to_string()
    }
}

pub fn order_summary(order: &ValidatedOrder) -> String {
    let mut pairs = vec![
        ("Symbol", order.symbol().to_owned()),
        ("Side", order.side().to_string()),
        ("Type", order.order_type().to_string()),
        ("Quantity", order.quantity().to_string()),
    ];
    if let Some(price) = order.price() {
        pairs.push(("Price", price.to_string()));
    }
    if let Some(stop) = order.stop_price() {
        pairs.push(("Stop Price", stop.to_string()));
    }
    fields("Order Summary", &pairs)
}

pub fn order_result(title: &str, result: &OrderResult) -> String {
    let mut pairs = vec![
        ("OrderID", result.order_id.to_string()),
        ("Symbol", result.symbol.clone()),
        ("Status", result.status.to_string()),
        ("ExecutedQty", result.executed_qty.to_string()),
    ];
    if let Some(avg) = result.avg_price {
        pairs.push(("AvgPrice", avg.round_dp(2).to_string()));
    }
    if let Some(id) = &result.client_order_id {
        pairs.push(("ClientOrderID", id.clone()));
    }
    fields(title, &pairs)
}

pub fn orders(orders: &[OrderSummary]) -> String {
    let mut table = Table::new(
        "Orders",
        vec!["Order ID", "Symbol", "Side", "Type", "Qty", "Filled", "Price", "Status"],
    );
    for order in orders {
        table.push(vec![
            order.order_id.to_string(),
            order.symbol.clone(),
            order.side.to_string(),
            order.order_type.clone(),
            order.orig_qty.to_string(),
            order.executed_qty.to_string(),
            price(order.price),
            order.status.to_string(),
        ]);
    }
    table.to_string()
}

pub fn open_orders(orders: &[OrderSummary]) -> String {
    if orders.is_empty() {
        return "No open orders found.".to_owned();
    }
    let mut table = Table::new(
        format!("Open Orders ({})", orders.len()),
        vec!["Order ID", "Symbol", "Side", "Type", "Qty", "Price", "Status"],
    );
    for order in orders {
        table.push(vec![
            order.order_id.to_string(),
            order.symbol.clone(),
            order.side.to_string(),
            order.order_type.clone(),
            order.orig_qty.to_string(),
            price(order.price),
            order.status.to_string(),
        ]);
    }
    table.to_string()
}

pub fn history(orders: &[OrderSummary]) -> String {
    if orders.is_empty() {
        return "No order history found.".to_owned();
    }
    let mut table = Table::new(
        format!("Order History (Last {} orders)", orders.len()),
        vec!["Order ID", "Symbol", "Side", "Type", "Qty", "Price", "Status", "Time"],
    );
    for order in orders {
        let time = order
            .time
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        table.push(vec![
            order.order_id.to_string(),
            order.symbol.clone(),
            order.side.to_string(),
            order.order_type.clone(),
            order.orig_qty.to_string(),
            price(order.price),
            order.status.to_string(),
            time,
        ]);
    }
    table.to_string()
}

pub fn positions(positions: &[Position]) -> String {
    if positions.is_empty() {
        return "No active positions found.".to_owned();
    }
    let mut table = Table::new(
        "Positions",
        vec!["Symbol", "Side", "Size", "Entry", "Mark", "PnL", "Leverage"],
    );
    for position in positions {
        table.push(vec![
            position.symbol.clone(),
            position
                .direction()
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            position.size().to_string(),
            position.entry_price.to_string(),
            position.mark_price.to_string(),
            position.unrealized_profit.round_dp(2).to_string(),
            format!("{}x", position.leverage),
        ]);
    }
    table.to_string()
}

pub fn balance(balance: &Balance) -> String {
    fields(
        &format!("{} Balance", balance.asset),
        &[
            ("Available", balance.available.to_string()),
            ("Total", balance.total.to_string()),
        ],
    )
}

pub fn leverage(change: &LeverageChange) -> String {
    if change.unchanged {
        format!("Leverage for {} already {}x", change.symbol, change.leverage)
    } else {
        format!("Leverage set to {}x for {}", change.leverage, change.symbol)
    }
}

/// User-facing error text. Exchange errors keep their code and message and
/// add a hint when the code is well known.
pub fn error(err: &Error) -> String {
    let mut out = match (err.kind(), err.api(), err.inner()) {
        (_, Some(api), _) => {
            let mut text = format!("Error: [{}] {}", api.code, api.message);
            if let Some(hint) = api.hint() {
                text.push_str(&format!("\n  {hint}"));
            }
            text
        }
        (Kind::Validation, None, Some(source)) => format!("Invalid input: {source}"),
        (_, None, Some(source)) => format!("Error: {source}"),
        (kind, None, None) => format!("Error: {kind:?}"),
    };
    if err.attempts() > 1 {
        out.push_str(&format!(" (after {} attempts)", err.attempts()));
    }
    out
}

#[cfg(test)]
mod tests {
    use futures_trading_bot::error::{Api, Validation};
    use futures_trading_bot::types::{OrderRequest, OrderType, Side};
    use futures_trading_bot::validation::validate_request;
    use reqwest::{Method, StatusCode};
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn columns_line_up() {
        let mut table = Table::new("Orders", vec!["ID", "Symbol"]);
        table.push(vec!["12345".to_owned(), "BTCUSDT".to_owned()]);
        table.push(vec!["7".to_owned(), "ETHUSDT".to_owned()]);

        assert_eq!(
            table.to_string(),
            "Orders\nID     Symbol\n-----  -------\n12345  BTCUSDT\n7      ETHUSDT"
        );
    }

    #[test]
    fn summary_lists_only_the_fields_in_use() -> anyhow::Result<()> {
        let request = OrderRequest::builder()
            .symbol("btcusdt")
            .side(Side::Buy)
            .order_type(OrderType::Market)
            .quantity(dec!(0.001))
            .build();

        let summary = order_summary(&validate_request(&request)?);

        assert!(summary.contains("BTCUSDT"), "{summary}");
        assert!(summary.contains("MARKET"), "{summary}");
        assert!(!summary.contains("Price"), "{summary}");
        Ok(())
    }

    #[test]
    fn exchange_errors_keep_code_and_add_a_hint() {
        let err: Error = Api::new(
            StatusCode::BAD_REQUEST,
            Method::POST,
            "/fapi/v1/order",
            -2019,
            "Margin is insufficient.",
        )
        .into();

        let text = error(&err);

        assert!(text.starts_with("Error: [-2019] Margin is insufficient."), "{text}");
        assert_eq!(text.lines().count(), 2, "{text}");
    }

    #[test]
    fn validation_errors_read_as_input_problems() {
        let err: Error = Validation::MissingOrderId.into();

        assert_eq!(error(&err), "Invalid input: an order id is required");
    }
}
