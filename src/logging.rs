//! Structured logging.
//!
//! JSON output for aggregation, correlation IDs for tracing one CLI
//! invocation or one scan pass end to end, and dedicated helpers for the
//! tree/wallet lifecycle events this subsystem actually produces
//! (insertion, rebuild, integrity checks, spends) in place of the prior
//! deposit/withdrawal-shaped ones.

use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Application log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl From<&str> for LogLevel {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Event categories for structured logging.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Tree lifecycle: insertion, rebuild, integrity check.
    Tree,
    /// Wallet lifecycle: discovery, spend marking, witness construction.
    Wallet,
    /// Storage backend events (batch commit retries, backend open/close).
    Storage,
    /// Process lifecycle (startup, shutdown).
    System,
    /// Any surfaced error, regardless of originating component.
    Error,
}

/// Structured log event.
#[derive(Debug, Serialize)]
pub struct LogEvent {
    pub timestamp: String,
    pub level: String,
    pub category: EventCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
}

/// Error details for error events.
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    pub kind: String,
    pub message: String,
}

impl LogEvent {
    pub fn new(level: LogLevel, category: EventCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: format!("{:?}", level).to_uppercase(),
            category,
            message: message.into(),
            correlation_id: None,
            data: None,
            duration_ms: None,
            error: None,
        }
    }

    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, kind: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(ErrorDetails {
            kind: kind.into(),
            message: message.into(),
        });
        self
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| format!("{{\"error\": \"failed to serialize log\", \"message\": \"{}\"}}", self.message))
    }
}

/// Logs one tree lifecycle event (insertion, rebuild, integrity check).
pub fn log_tree_event(event_type: &str, output_count: u64, depth: u32, success: bool, error: Option<&str>) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Tree, event_type).with_data(serde_json::json!({
        "output_count": output_count,
        "depth": depth,
        "success": success,
    }));
    if let Some(err) = error {
        event = event.with_error("tree_error", err);
    }
    if success {
        tracing::info!(target: "curvetree::tree", "{}", event.to_json());
    } else {
        tracing::error!(target: "curvetree::tree", "{}", event.to_json());
    }
}

/// Logs one wallet lifecycle event (discovery, spend, witness build).
pub fn log_wallet_event(event_type: &str, amount: u64, success: bool, error: Option<&str>) {
    let level = if success { LogLevel::Info } else { LogLevel::Error };
    let mut event = LogEvent::new(level, EventCategory::Wallet, event_type)
        .with_data(serde_json::json!({ "amount": amount, "success": success }));
    if let Some(err) = error {
        event = event.with_error("wallet_error", err);
    }
    if success {
        tracing::info!(target: "curvetree::wallet", "{}", event.to_json());
    } else {
        tracing::error!(target: "curvetree::wallet", "{}", event.to_json());
    }
}

/// Every error surfaced to a caller is logged here before propagating,
/// carrying the structured `kind` tag from
/// [`crate::common::CurveTreeError::kind`].
pub fn log_surfaced_error(kind: &str, message: &str, correlation_id: Option<&str>) {
    let mut event =
        LogEvent::new(LogLevel::Error, EventCategory::Error, "operation failed").with_error(kind, message);
    if let Some(id) = correlation_id {
        event = event.with_correlation_id(id);
    }
    tracing::error!(target: "curvetree::error", kind = kind, "{}", event.to_json());
}

/// Initialize the logging system.
pub fn init_logging(level: LogLevel, json_format: bool) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "curvetree={},sled={}",
            format!("{:?}", level).to_lowercase(),
            format!("{:?}", level).to_lowercase()
        ))
    });

    if json_format {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );
        subscriber.try_init().map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(
            fmt::layer()
                .pretty()
                .with_target(true)
                .with_thread_ids(false)
                .with_file(true)
                .with_line_number(true)
                .with_span_events(FmtSpan::CLOSE),
        );
        subscriber.try_init().map_err(|e| LoggingError::InitFailed(e.to_string()))?;
    }

    Ok(())
}

/// Initialize logging from a [`crate::config::CurveTreeConfig`].
pub fn init_from_config(config: &crate::config::CurveTreeConfig) -> Result<(), LoggingError> {
    let level = LogLevel::from(config.log_level.as_str());
    init_logging(level, false)
}

/// Logging errors.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("failed to initialize logging: {0}")]
    InitFailed(String),
}

/// A short correlation ID for tracing one CLI invocation end to end
/// through its log lines.
pub fn generate_correlation_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    format!("{:x}", nanos & 0xFFFF_FFFF)
}
