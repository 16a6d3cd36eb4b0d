//! CLI argument definitions for quotegate.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `quote` | Latest quote for one or more symbols |
//! | `bars` | Historical OHLCV bars over a time range |
//! | `company` | Company reference data |
//! | `news` | Recent headlines for a symbol |
//! | `market-status` | Current session state |
//! | `account` | Brokerage account balances |
//! | `positions` | Open positions, or one symbol's position |
//! | `orders` | Order listing |
//! | `order` | Submit or cancel an order |
//! | `sources` | Registered vendors, circuit states and rankings |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Exit 5 when the gateway raised notifications |
//! | `--no-cache` | `false` | Skip the cache entirely |
//! | `--refresh` | `false` | Fetch from vendors and overwrite cached entries |
//! | `--ttl-ms` | per data type | Override the cache lifetime |
//! | `--redis-url` | `QUOTEGATE_REDIS_URL` | Remote cache tier |
//!
//! # Examples
//!
//! ```bash
//! quotegate quote AAPL MSFT --pretty
//! quotegate bars AAPL --timeframe 1d --start 2024-01-02 --end 2024-02-01
//! quotegate sources --data-type company-info
//! ```

use clap::{Args, Parser, Subcommand, ValueEnum};
use quotegate_core::{DataType, OrderSide, OrderStatusFilter};

/// Multi-vendor market data gateway
///
/// Queries Alpaca, Polygon and Financial Modeling Prep behind one interface,
/// with automatic fallback, circuit breaking and a tiered cache.
#[derive(Debug, Parser)]
#[command(
    name = "quotegate",
    author,
    version,
    about = "Multi-vendor market data gateway",
    long_about = "quotegate routes market data and brokerage requests across vendors:\n\
\n\
  • Priority-ordered fallback (Alpaca, Polygon, FMP)\n\
  • Per-vendor circuit breakers, retries and rate limits\n\
  • Local and Redis cache tiers\n\
\n\
Credentials are read from QUOTEGATE_* environment variables, falling back to the \
vendor's own names (ALPACA_API_KEY, POLYGON_API_KEY, FMP_API_KEY)."
)]
pub struct Cli {
    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Fail with exit code 5 when any notification was raised.
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Bypass the cache for reads and writes.
    #[arg(long, global = true, default_value_t = false, conflicts_with = "refresh")]
    pub no_cache: bool,

    /// Ignore cached values but store the fresh result.
    #[arg(long, global = true, default_value_t = false)]
    pub refresh: bool,

    /// Cache lifetime override in milliseconds.
    #[arg(long, global = true)]
    pub ttl_ms: Option<u64>,

    /// Redis URL for the remote cache tier.
    #[arg(long, global = true)]
    pub redis_url: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch latest quotes.
    Quote(QuoteArgs),
    /// Fetch OHLCV bars.
    Bars(BarsArgs),
    /// Fetch company reference data.
    Company(SymbolArgs),
    /// Fetch recent news for a symbol.
    News(NewsArgs),
    /// Show whether the market is open.
    MarketStatus,
    /// Show brokerage account balances.
    Account,
    /// List open positions.
    Positions(PositionsArgs),
    /// List orders.
    Orders(OrdersArgs),
    /// Submit or cancel orders.
    Order(OrderArgs),
    /// Show registered vendors and their health.
    Sources(SourcesArgs),
}

#[derive(Debug, Args)]
pub struct QuoteArgs {
    /// One or more ticker symbols.
    #[arg(required = true)]
    pub symbols: Vec<String>,
}

#[derive(Debug, Args)]
pub struct SymbolArgs {
    pub symbol: String,
}

#[derive(Debug, Args)]
pub struct BarsArgs {
    pub symbol: String,

    /// Bar timeframe (1m, 5m, 15m, 1h, 1d).
    #[arg(long, default_value = "1d")]
    pub timeframe: String,

    /// Range start, RFC3339 or YYYY-MM-DD.
    #[arg(long)]
    pub start: String,

    /// Range end, RFC3339 or YYYY-MM-DD. Defaults to now.
    #[arg(long)]
    pub end: Option<String>,
}

#[derive(Debug, Args)]
pub struct NewsArgs {
    pub symbol: String,

    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Debug, Args)]
pub struct PositionsArgs {
    /// Only this symbol's position.
    #[arg(long)]
    pub symbol: Option<String>,
}

#[derive(Debug, Args)]
pub struct OrdersArgs {
    #[arg(long, value_enum, default_value_t = StatusSelector::Open)]
    pub status: StatusSelector,

    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Restrict to these symbols.
    #[arg(long = "symbol")]
    pub symbols: Vec<String>,
}

#[derive(Debug, Args)]
pub struct OrderArgs {
    #[command(subcommand)]
    pub command: OrderCommand,
}

#[derive(Debug, Subcommand)]
pub enum OrderCommand {
    /// Submit a market order, or a limit order when --limit-price is set.
    Submit(SubmitArgs),
    /// Cancel an order by id.
    Cancel(CancelArgs),
}

#[derive(Debug, Args)]
pub struct SubmitArgs {
    pub symbol: String,

    #[arg(long, value_enum)]
    pub side: SideSelector,

    #[arg(long)]
    pub qty: f64,

    #[arg(long)]
    pub limit_price: Option<f64>,
}

#[derive(Debug, Args)]
pub struct CancelArgs {
    pub order_id: String,
}

#[derive(Debug, Args)]
pub struct SourcesArgs {
    /// Include the quality ranking for this data type.
    #[arg(long, value_enum)]
    pub data_type: Option<DataTypeSelector>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusSelector {
    Open,
    Closed,
    All,
}

impl From<StatusSelector> for OrderStatusFilter {
    fn from(value: StatusSelector) -> Self {
        match value {
            StatusSelector::Open => Self::Open,
            StatusSelector::Closed => Self::Closed,
            StatusSelector::All => Self::All,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SideSelector {
    Buy,
    Sell,
}

impl From<SideSelector> for OrderSide {
    fn from(value: SideSelector) -> Self {
        match value {
            SideSelector::Buy => Self::Buy,
            SideSelector::Sell => Self::Sell,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DataTypeSelector {
    Quote,
    Quotes,
    Bars,
    CompanyInfo,
    News,
    MarketStatus,
    Account,
    Positions,
    Orders,
    Trading,
}

impl From<DataTypeSelector> for DataType {
    fn from(value: DataTypeSelector) -> Self {
        match value {
            DataTypeSelector::Quote => Self::Quote,
            DataTypeSelector::Quotes => Self::Quotes,
            DataTypeSelector::Bars => Self::Bars,
            DataTypeSelector::CompanyInfo => Self::CompanyInfo,
            DataTypeSelector::News => Self::News,
            DataTypeSelector::MarketStatus => Self::MarketStatus,
            DataTypeSelector::Account => Self::Account,
            DataTypeSelector::Positions => Self::Positions,
            DataTypeSelector::Orders => Self::Orders,
            DataTypeSelector::Trading => Self::Trading,
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::*;

    #[test]
    fn argument_definitions_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_cache_flags_parse_after_the_subcommand() {
        let cli = Cli::parse_from(["quotegate", "quote", "aapl", "--no-cache", "--ttl-ms", "500"]);
        assert!(cli.no_cache);
        assert_eq!(cli.ttl_ms, Some(500));
        assert!(matches!(cli.command, Command::Quote(ref args) if args.symbols == ["aapl"]));
    }

    #[test]
    fn no_cache_conflicts_with_refresh() {
        let result = Cli::try_parse_from(["quotegate", "--no-cache", "--refresh", "account"]);
        assert!(result.is_err());
    }
}
