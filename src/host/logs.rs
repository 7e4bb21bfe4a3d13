// Per-language sink for log messages sent by analyzers

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, trace, warn, Span};

/// Log level as sent on the wire, 0 (trace) through 6 (none)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum AnalyzerLogLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
    None,
}

impl TryFrom<i32> for AnalyzerLogLevel {
    type Error = String;

    fn try_from(value: i32) -> Result<Self, String> {
        match value {
            0 => Ok(AnalyzerLogLevel::Trace),
            1 => Ok(AnalyzerLogLevel::Debug),
            2 => Ok(AnalyzerLogLevel::Information),
            3 => Ok(AnalyzerLogLevel::Warning),
            4 => Ok(AnalyzerLogLevel::Error),
            5 => Ok(AnalyzerLogLevel::Critical),
            6 => Ok(AnalyzerLogLevel::None),
            other => Err(format!("unknown log level {}", other)),
        }
    }
}

impl From<AnalyzerLogLevel> for i32 {
    fn from(level: AnalyzerLogLevel) -> i32 {
        level as i32
    }
}

/// Message text with any exception details appended
pub fn compose_message(message: &str, exception_info: Option<&str>) -> String {
    match exception_info {
        Some(info) if !info.is_empty() => format!("{}\nException Info:\n\n{}", message, info),
        _ => message.to_string(),
    }
}

/// Re-emits analyzer messages through `tracing`, one span per language
#[derive(Default)]
pub struct LanguageLogs {
    spans: DashMap<String, Span>,
}

impl LanguageLogs {
    pub fn new() -> Self {
        Self::default()
    }

    fn span(&self, language: &str) -> Span {
        self.spans
            .entry(language.to_ascii_lowercase())
            .or_insert_with(|| info_span!("analyzer", language = %language))
            .clone()
    }

    /// Log one analyzer message. Returns false if the level drops it.
    pub fn write(&self, language: &str, level: AnalyzerLogLevel, message: &str, exception_info: Option<&str>) -> bool {
        if level == AnalyzerLogLevel::None {
            return false;
        }

        let message = compose_message(message, exception_info);
        let span = self.span(language);
        let _entered = span.enter();
        match level {
            AnalyzerLogLevel::Trace => trace!("{}", message),
            AnalyzerLogLevel::Debug => debug!("{}", message),
            AnalyzerLogLevel::Information => info!("{}", message),
            AnalyzerLogLevel::Warning => warn!("{}", message),
            AnalyzerLogLevel::Error | AnalyzerLogLevel::Critical => error!("{}", message),
            AnalyzerLogLevel::None => {}
        }
        true
    }

    /// Number of languages that have logged so far
    pub fn language_count(&self) -> usize {
        self.spans.len()
    }
}
