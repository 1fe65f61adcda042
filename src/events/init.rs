use std::sync::Arc;

use crate::config::LoggingConfig;
use crate::events::dispatcher::init_events;
use crate::events::model::LogLevel;
use crate::events::sink::{ConsoleSink, JsonFileSink, LogSink};

const DEFAULT_JSON_PATH: &str = "logs/relay_audit.jsonl";
const DEFAULT_JSON_MAX_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_JSON_BACKUPS: u32 = 3;
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Install the default sink pair (console + rotating JSON audit file).
pub async fn init_default_events() {
    init_events_from_config(None).await
}

/// Build the sink set from the `[logging]` config section and install it.
/// Every option falls back to a default, so a missing section gives the
/// same result as [`init_default_events`]. A JSON sink that cannot open
/// its file is skipped rather than failing startup.
pub async fn init_events_from_config(logging: Option<&LoggingConfig>) {
    let mut sinks: Vec<Arc<dyn LogSink>> = Vec::new();

    let disable_console = logging.and_then(|l| l.disable_console).unwrap_or(false);
    if !disable_console {
        let min_level = logging
            .and_then(|l| l.console_level.as_deref())
            .and_then(parse_level);
        sinks.push(Arc::new(ConsoleSink::new(min_level)));
    }

    let json_path = logging
        .and_then(|l| l.json_path.clone())
        .unwrap_or_else(|| DEFAULT_JSON_PATH.into());
    let max_bytes = logging
        .and_then(|l| l.json_max_bytes)
        .map(|b| b as u64)
        .unwrap_or(DEFAULT_JSON_MAX_BYTES);
    let backups = logging
        .and_then(|l| l.json_rotate)
        .unwrap_or(DEFAULT_JSON_BACKUPS);
    if let Ok(json_sink) = JsonFileSink::new(&json_path, true, max_bytes, backups).await {
        sinks.push(Arc::new(json_sink));
    }

    init_events(sinks, EVENT_QUEUE_CAPACITY).await;
}

fn parse_level(s: &str) -> Option<LogLevel> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(LogLevel::Trace),
        "debug" => Some(LogLevel::Debug),
        "info" => Some(LogLevel::Info),
        "warn" => Some(LogLevel::Warn),
        "error" => Some(LogLevel::Error),
        _ => None,
    }
}
