use quotegate_core::{
    BarSeries, BarsRequest, CacheOptions, Quote, Symbol, Timeframe, UnifiedGateway, UtcDateTime,
};
use serde::Serialize;
use serde_json::Value;

use crate::cli::{BarsArgs, NewsArgs, QuoteArgs, SymbolArgs};
use crate::error::CliError;

use super::parse_timestamp;

#[derive(Debug, Serialize)]
struct QuoteResponseData {
    quotes: Vec<Quote>,
}

pub async fn quote(
    gateway: &UnifiedGateway,
    args: &QuoteArgs,
    options: CacheOptions,
) -> Result<Value, CliError> {
    let symbols = Symbol::parse_many(args.symbols.as_slice())?;

    // A single symbol goes through the quote path so it shares cache entries with library callers.
    let quotes = match symbols.as_slice() {
        [symbol] => vec![gateway.get_quote(symbol, options).await?],
        _ => gateway.get_quotes(&symbols, options).await?,
    };
    Ok(serde_json::to_value(QuoteResponseData { quotes })?)
}

pub async fn bars(
    gateway: &UnifiedGateway,
    args: &BarsArgs,
    options: CacheOptions,
) -> Result<Value, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let timeframe = args.timeframe.parse::<Timeframe>()?;
    let start = parse_timestamp(&args.start)?;
    let end = match &args.end {
        Some(raw) => parse_timestamp(raw)?,
        None => UtcDateTime::now(),
    };
    let request = BarsRequest::new(symbol, timeframe, start, end)?;

    let series: BarSeries = gateway.get_bars(&request, options).await?;
    Ok(serde_json::to_value(series)?)
}

pub async fn company(
    gateway: &UnifiedGateway,
    args: &SymbolArgs,
    options: CacheOptions,
) -> Result<Value, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let profile = gateway.get_company_info(&symbol, options).await?;
    Ok(serde_json::to_value(profile)?)
}

pub async fn news(
    gateway: &UnifiedGateway,
    args: &NewsArgs,
    options: CacheOptions,
) -> Result<Value, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let articles = gateway.get_news(&symbol, args.limit, options).await?;
    Ok(serde_json::json!({ "articles": articles }))
}

pub async fn market_status(
    gateway: &UnifiedGateway,
    options: CacheOptions,
) -> Result<Value, CliError> {
    let status = gateway.get_market_status(options).await?;
    Ok(serde_json::to_value(status)?)
}
