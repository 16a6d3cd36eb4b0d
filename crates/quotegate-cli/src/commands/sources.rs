use quotegate_core::{DataType, UnifiedGateway, VendorId};
use serde::Serialize;
use serde_json::Value;

use crate::cli::SourcesArgs;
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct Ranking {
    data_type: DataType,
    vendors: Vec<VendorId>,
}

pub async fn run(gateway: &UnifiedGateway, args: &SourcesArgs) -> Result<Value, CliError> {
    let ranking = args.data_type.map(|selector| {
        let data_type = DataType::from(selector);
        Ranking {
            data_type,
            vendors: gateway.vendor_ranking(data_type),
        }
    });

    Ok(serde_json::json!({
        "vendors": gateway.vendors(),
        "ranking": ranking,
        "cache": gateway.cache_stats().await,
    }))
}
