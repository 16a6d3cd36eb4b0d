mod broker;
mod market;
mod sources;

use std::sync::Arc;
use std::time::{Duration, Instant};

use quotegate_core::{
    CacheMode, CacheOptions, GatewayConfig, MemorySink, NotificationSink, UnifiedGateway,
    UtcDateTime, ValidationError,
};
use serde_json::Value;

use crate::cli::{Cli, Command, OrderCommand};
use crate::error::CliError;
use crate::output::{Envelope, Meta};

pub async fn run(cli: &Cli) -> Result<Envelope, CliError> {
    let mut config = GatewayConfig::from_env()?;
    if let Some(url) = &cli.redis_url {
        config.cache.redis_url = Some(url.clone());
    }
    // One-shot invocations never live long enough for a refresh pass.
    config.prefetch.enabled = false;

    let sink = Arc::new(MemorySink::new());
    let gateway = UnifiedGateway::builder(config)
        .with_sink(Arc::clone(&sink) as Arc<dyn NotificationSink>)
        .connect()
        .await
        .build();
    let options = cache_options(cli);

    let started = Instant::now();
    let (name, data): (&'static str, Value) = match &cli.command {
        Command::Quote(args) => ("quote", market::quote(&gateway, args, options).await?),
        Command::Bars(args) => ("bars", market::bars(&gateway, args, options).await?),
        Command::Company(args) => ("company", market::company(&gateway, args, options).await?),
        Command::News(args) => ("news", market::news(&gateway, args, options).await?),
        Command::MarketStatus => (
            "market-status",
            market::market_status(&gateway, options).await?,
        ),
        Command::Account => ("account", broker::account(&gateway, options).await?),
        Command::Positions(args) => (
            "positions",
            broker::positions(&gateway, args, options).await?,
        ),
        Command::Orders(args) => ("orders", broker::orders(&gateway, args, options).await?),
        Command::Order(args) => match &args.command {
            OrderCommand::Submit(submit) => {
                ("order submit", broker::submit(&gateway, submit).await?)
            }
            OrderCommand::Cancel(cancel) => {
                ("order cancel", broker::cancel(&gateway, cancel).await?)
            }
        },
        Command::Sources(args) => ("sources", sources::run(&gateway, args).await?),
    };
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::debug!(command = name, latency_ms, "command finished");

    Ok(Envelope {
        meta: Meta {
            command: name,
            latency_ms,
            cache_mode: mode_label(options.mode),
            notifications: sink.drain(),
        },
        data,
    })
}

fn cache_options(cli: &Cli) -> CacheOptions {
    let mut options = if cli.no_cache {
        CacheOptions::no_cache()
    } else if cli.refresh {
        CacheOptions::refresh()
    } else {
        CacheOptions::default()
    };
    if let Some(ttl_ms) = cli.ttl_ms {
        options = options.with_ttl(Duration::from_millis(ttl_ms));
    }
    options
}

const fn mode_label(mode: CacheMode) -> &'static str {
    match mode {
        CacheMode::Use => "use",
        CacheMode::Refresh => "refresh",
        CacheMode::Bypass => "bypass",
    }
}

/// Accepts RFC3339 with any offset, `YYYY-MM-DD`, or `YYYY-MM-DD HH:MM:SS` (UTC).
fn parse_timestamp(raw: &str) -> Result<UtcDateTime, ValidationError> {
    if raw.contains('T') {
        UtcDateTime::parse_any_offset(raw)
    } else {
        UtcDateTime::parse_naive(raw)
    }
}
