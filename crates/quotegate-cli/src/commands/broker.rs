use quotegate_core::{CacheOptions, OrderRequest, OrdersQuery, Symbol, UnifiedGateway};
use serde_json::{json, Value};

use crate::cli::{CancelArgs, OrdersArgs, PositionsArgs, SubmitArgs};
use crate::error::CliError;

pub async fn account(gateway: &UnifiedGateway, options: CacheOptions) -> Result<Value, CliError> {
    let account = gateway.get_account(options).await?;
    Ok(serde_json::to_value(account)?)
}

pub async fn positions(
    gateway: &UnifiedGateway,
    args: &PositionsArgs,
    options: CacheOptions,
) -> Result<Value, CliError> {
    let positions = match &args.symbol {
        Some(raw) => {
            let symbol = Symbol::parse(raw)?;
            gateway
                .get_position(&symbol, options)
                .await?
                .into_iter()
                .collect::<Vec<_>>()
        }
        None => gateway.get_positions(options).await?,
    };
    Ok(json!({ "positions": positions }))
}

pub async fn orders(
    gateway: &UnifiedGateway,
    args: &OrdersArgs,
    options: CacheOptions,
) -> Result<Value, CliError> {
    let symbols = args
        .symbols
        .iter()
        .map(|raw| Symbol::parse(raw))
        .collect::<Result<Vec<_>, _>>()?;
    let query = OrdersQuery::new(args.status.into(), args.limit)?.with_symbols(symbols);

    let orders = gateway.get_orders(&query, options).await?;
    Ok(json!({ "orders": orders }))
}

pub async fn submit(gateway: &UnifiedGateway, args: &SubmitArgs) -> Result<Value, CliError> {
    let symbol = Symbol::parse(&args.symbol)?;
    let request = match args.limit_price {
        Some(price) => OrderRequest::limit(symbol, args.side.into(), args.qty, price)?,
        None => OrderRequest::market(symbol, args.side.into(), args.qty)?,
    };

    let order = gateway.place_order(&request).await?;
    Ok(serde_json::to_value(order)?)
}

pub async fn cancel(gateway: &UnifiedGateway, args: &CancelArgs) -> Result<Value, CliError> {
    gateway.cancel_order(&args.order_id).await?;
    Ok(json!({ "order_id": args.order_id, "canceled": true }))
}
