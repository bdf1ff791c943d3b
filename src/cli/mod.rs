//! Subcommands of the `trading-bot` binary.

use std::io;

use clap::Subcommand;
use futures_trading_bot::types::{OrderRequest, OrderType, Side};
use futures_trading_bot::validation::{self, DEFAULT_HISTORY_LIMIT};
use futures_trading_bot::{OrderManager, Result};
use rust_decimal::Decimal;

pub mod interactive;
pub mod render;

use interactive::Console;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Place a MARKET, LIMIT or STOP_LIMIT order
    Place {
        /// Trading pair, e.g. BTCUSDT
        #[clap(short, long)]
        symbol: String,
        /// BUY or SELL
        #[clap(long)]
        side: String,
        /// MARKET, LIMIT or STOP_LIMIT
        #[clap(short = 't', long = "type")]
        order_type: String,
        #[clap(short, long)]
        quantity: Decimal,
        /// Limit price, required for LIMIT and STOP_LIMIT
        #[clap(short, long)]
        price: Option<Decimal>,
        /// Trigger price, required for STOP_LIMIT
        #[clap(long)]
        stop_price: Option<Decimal>,
        /// Leverage to set on the symbol first (1-125)
        #[clap(short, long)]
        leverage: Option<u32>,
        /// Skip the confirmation prompt
        #[clap(long)]
        no_confirm: bool,
    },
    /// Cancel an open order
    Cancel {
        #[clap(short, long)]
        symbol: String,
        #[clap(short, long)]
        order_id: u64,
    },
    /// Show a single order
    Order {
        #[clap(short, long)]
        symbol: String,
        #[clap(short, long)]
        order_id: u64,
    },
    /// List open orders
    Orders {
        #[clap(short, long)]
        symbol: Option<String>,
    },
    /// Show recent orders, open and closed
    History {
        #[clap(short, long)]
        symbol: Option<String>,
        #[clap(short, long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: u32,
    },
    /// Show open positions
    Position {
        #[clap(short, long)]
        symbol: Option<String>,
    },
    /// Show the balance of one asset
    Balance {
        #[clap(short, long, default_value = "USDT")]
        asset: String,
    },
    /// Set leverage on a symbol
    Leverage { symbol: String, leverage: u32 },
    /// Check connectivity and credentials
    Test,
    /// Menu-driven session on stdin
    Interactive,
}

pub async fn execute(manager: &OrderManager, command: Command) -> Result<()> {
    match command {
        Command::Place {
            symbol,
            side,
            order_type,
            quantity,
            price,
            stop_price,
            leverage,
            no_confirm,
        } => {
            let request = OrderRequest::builder()
                .symbol(symbol)
                .side(Side::parse(&side)?)
                .order_type(OrderType::parse(&order_type)?)
                .quantity(quantity)
                .maybe_price(price)
                .maybe_stop_price(stop_price)
                .maybe_leverage(leverage)
                .build();
            let mut console = Console::new(io::stdin().lock(), io::stdout());
            place(manager, &request, !no_confirm, &mut console).await
        }
        Command::Cancel { symbol, order_id } => {
            let result = manager.cancel_order(&symbol, order_id).await?;
            println!("{}", render::order_result("ORDER CANCELLED", &result));
            Ok(())
        }
        Command::Order { symbol, order_id } => {
            let order = manager.get_order(&symbol, order_id).await?;
            println!("{}", render::orders(std::slice::from_ref(&order)));
            Ok(())
        }
        Command::Orders { symbol } => {
            let orders = manager.list_orders(symbol.as_deref()).await?;
            println!("{}", render::open_orders(&orders));
            Ok(())
        }
        Command::History { symbol, limit } => {
            let orders = manager.history(symbol.as_deref(), Some(limit)).await?;
            println!("{}", render::history(&orders));
            Ok(())
        }
        Command::Position { symbol } => {
            let positions = manager.position(symbol.as_deref()).await?;
            println!("{}", render::positions(&positions));
            Ok(())
        }
        Command::Balance { asset } => {
            let balance = manager.balance(&asset).await?;
            println!("{}", render::balance(&balance));
            Ok(())
        }
        Command::Leverage { symbol, leverage } => {
            let change = manager.set_leverage(&symbol, leverage).await?;
            println!("{}", render::leverage(&change));
            Ok(())
        }
        Command::Test => {
            manager.test_connection().await?;
            println!("Connection OK: {}", manager.client().base_url());
            Ok(())
        }
        Command::Interactive => {
            let mut console = Console::new(io::stdin().lock(), io::stdout());
            interactive::run(manager, &mut console).await
        }
    }
}

/// Shows the order, asks for confirmation when `confirm` is set, then places it.
///
/// Declining is not an error.
pub async fn place<R: io::BufRead, W: io::Write>(
    manager: &OrderManager,
    request: &OrderRequest,
    confirm: bool,
    console: &mut Console<R, W>,
) -> Result<()> {
    let order = validation::validate_request(request)?;
    console.say(&render::order_summary(&order))?;

    if confirm && !console.confirm("Proceed with order placement?")? {
        console.say("Order not placed.")?;
        return Ok(());
    }

    let result = manager.place_order(request).await?;
    console.say(&render::order_result("ORDER SUCCESS", &result))?;
    Ok(())
}
