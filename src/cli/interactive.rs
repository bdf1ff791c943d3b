use std::io::{self, BufRead, Write};
use std::str::FromStr;

use futures_trading_bot::types::{OrderRequest, OrderType, Side};
use futures_trading_bot::validation::DEFAULT_HISTORY_LIMIT;
use futures_trading_bot::{Error, Kind, OrderManager, Result};
use rust_decimal::Decimal;

use super::render;

const MENU: &str = "\
Main Menu:
  1. Place Market Order
  2. Place Limit Order
  3. Place Stop-Limit Order
  4. View Open Orders
  5. View Order History
  6. View Positions
  7. Check Balance
  8. Set Leverage
  9. Cancel Order
  10. Test Connection
  0. Exit";

/// Line-oriented prompts over any reader and writer.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn say(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.output, "{text}")
    }

    /// Prints `label` and reads one trimmed line; `None` at end of input.
    pub fn ask(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.output, "{label}: ")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_owned()))
    }

    /// Like [`Console::ask`], with `default` used for an empty answer.
    pub fn ask_or(&mut self, label: &str, default: &str) -> io::Result<Option<String>> {
        let answer = self.ask(&format!("{label} [{default}]"))?;
        Ok(answer.map(|a| if a.is_empty() { default.to_owned() } else { a }))
    }

    /// `y`/`yes` confirms; anything else, including end of input, declines.
    pub fn confirm(&mut self, question: &str) -> io::Result<bool> {
        let answer = self.ask(&format!("{question} [y/N]"))?;
        Ok(answer.is_some_and(|a| matches!(a.to_ascii_lowercase().as_str(), "y" | "yes")))
    }
}

/// Menu loop. Failed actions are reported and the menu shown again; it ends on
/// `0` or end of input.
pub async fn run<R: BufRead, W: Write>(
    manager: &OrderManager,
    console: &mut Console<R, W>,
) -> Result<()> {
    loop {
        console.say(MENU)?;
        let Some(choice) = console.ask("Select option")? else {
            return Ok(());
        };

        let outcome = match choice.as_str() {
            "0" => {
                console.say("Goodbye!")?;
                return Ok(());
            }
            "1" => place(manager, console, OrderType::Market).await,
            "2" => place(manager, console, OrderType::Limit).await,
            "3" => place(manager, console, OrderType::StopLimit).await,
            "4" => open_orders(manager, console).await,
            "5" => history(manager, console).await,
            "6" => positions(manager, console).await,
            "7" => balance(manager, console).await,
            "8" => leverage(manager, console).await,
            "9" => cancel(manager, console).await,
            "10" => test_connection(manager, console).await,
            other => Ok(console.say(&format!("Unknown option `{other}`"))?),
        };

        match outcome {
            Ok(()) => {}
            Err(err) if ends_session(&err) => return Err(err),
            Err(err) => {
                tracing::warn!(kind = ?err.kind(), error = %err, "menu action failed");
                console.say(&render::error(&err))?;
            }
        }
    }
}

/// Reads a required answer; end of input aborts the current action.
fn required<R: BufRead, W: Write>(console: &mut Console<R, W>, label: &str) -> Result<String> {
    console
        .ask(label)?
        .ok_or_else(input_closed)
}

fn parsed<T, R, W>(console: &mut Console<R, W>, label: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    R: BufRead,
    W: Write,
{
    let answer = required(console, label)?;
    answer.parse().map_err(|e| invalid_input(label, e))
}

fn optional<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    label: &str,
) -> Result<Option<String>> {
    let answer = required(console, label)?;
    Ok((!answer.is_empty()).then_some(answer))
}

fn invalid_input<E: std::fmt::Display>(label: &str, error: E) -> Error {
    Error::with_source(Kind::Validation, InputError(format!("{label}: {error}")))
}

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct InputError(String);

/// End of input reached while an action was still asking questions.
#[derive(Debug, thiserror::Error)]
#[error("input closed")]
struct InputClosed;

fn input_closed() -> Error {
    Error::with_source(Kind::Internal, InputClosed)
}

/// Only a closed or broken console ends the menu.
fn ends_session(err: &Error) -> bool {
    err.downcast_ref::<InputClosed>().is_some() || err.downcast_ref::<io::Error>().is_some()
}

async fn place<R: BufRead, W: Write>(
    manager: &OrderManager,
    console: &mut Console<R, W>,
    order_type: OrderType,
) -> Result<()> {
    let symbol = required(console, "Symbol (e.g., BTCUSDT)")?;
    let side = Side::parse(&required(console, "Side (BUY/SELL)")?)?;
    let quantity: Decimal = parsed(console, "Quantity")?;
    let price = if order_type.requires_price() {
        Some(parsed::<Decimal, _, _>(console, "Limit price")?)
    } else {
        None
    };
    let stop_price = if order_type.requires_stop_price() {
        Some(parsed::<Decimal, _, _>(console, "Stop price")?)
    } else {
        None
    };

    let request = OrderRequest::builder()
        .symbol(symbol)
        .side(side)
        .order_type(order_type)
        .quantity(quantity)
        .maybe_price(price)
        .maybe_stop_price(stop_price)
        .build();
    super::place(manager, &request, true, console).await
}

async fn open_orders<R: BufRead, W: Write>(
    manager: &OrderManager,
    console: &mut Console<R, W>,
) -> Result<()> {
    let symbol = optional(console, "Symbol (leave empty for all)")?;
    let orders = manager.list_orders(symbol.as_deref()).await?;
    Ok(console.say(&render::open_orders(&orders))?)
}

async fn history<R: BufRead, W: Write>(
    manager: &OrderManager,
    console: &mut Console<R, W>,
) -> Result<()> {
    let symbol = optional(console, "Symbol (leave empty for all)")?;
    let limit = console
        .ask_or("Number of orders", &DEFAULT_HISTORY_LIMIT.to_string())?
        .ok_or_else(input_closed)?;
    let limit: u32 = limit
        .parse()
        .map_err(|e| invalid_input("Number of orders", e))?;

    let orders = manager.history(symbol.as_deref(), Some(limit)).await?;
    Ok(console.say(&render::history(&orders))?)
}

async fn positions<R: BufRead, W: Write>(
    manager: &OrderManager,
    console: &mut Console<R, W>,
) -> Result<()> {
    let symbol = optional(console, "Symbol (leave empty for all)")?;
    let positions = manager.position(symbol.as_deref()).await?;
    Ok(console.say(&render::positions(&positions))?)
}

async fn balance<R: BufRead, W: Write>(
    manager: &OrderManager,
    console: &mut Console<R, W>,
) -> Result<()> {
    let asset = console
        .ask_or("Asset", "USDT")?
        .ok_or_else(input_closed)?;
    let balance = manager.balance(&asset).await?;
    Ok(console.say(&render::balance(&balance))?)
}

async fn leverage<R: BufRead, W: Write>(
    manager: &OrderManager,
    console: &mut Console<R, W>,
) -> Result<()> {
    let symbol = required(console, "Symbol")?;
    let leverage: u32 = parsed(console, "Leverage (1-125)")?;
    let change = manager.set_leverage(&symbol, leverage).await?;
    Ok(console.say(&render::leverage(&change))?)
}

async fn test_connection<R: BufRead, W: Write>(
    manager: &OrderManager,
    console: &mut Console<R, W>,
) -> Result<()> {
    manager.test_connection().await?;
    Ok(console.say("Connection OK")?)
}

async fn cancel<R: BufRead, W: Write>(
    manager: &OrderManager,
    console: &mut Console<R, W>,
) -> Result<()> {
    let symbol = required(console, "Symbol")?;
    let order_id: u64 = parsed(console, "Order ID")?;
    let result = manager.cancel_order(&symbol, order_id).await?;
    Ok(console.say(&render::order_result("ORDER CANCELLED", &result))?)
}
