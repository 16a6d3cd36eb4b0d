use std::io::Write;

use quotegate_core::Notification;
use serde::Serialize;
use serde_json::Value;

/// Response wrapper printed for every command.
#[derive(Debug, Serialize)]
pub struct Envelope {
    pub meta: Meta,
    pub data: Value,
}

#[derive(Debug, Serialize)]
pub struct Meta {
    pub command: &'static str,
    pub latency_ms: u64,
    pub cache_mode: &'static str,
    pub notifications: Vec<Notification>,
}

pub fn render(envelope: &Envelope, pretty: bool) -> Result<(), std::io::Error> {
    let rendered = if pretty {
        serde_json::to_string_pretty(envelope)
    } else {
        serde_json::to_string(envelope)
    }
    .map_err(std::io::Error::other)?;

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{rendered}")
}
