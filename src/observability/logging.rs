//! Structured JSON logging.
//!
//! # Responsibilities
//! - Emit one self-contained JSON record per line to a single process sink
//! - Serialize writers so concurrent records never interleave
//! - Bridge `tracing` events into the same record shape
//! - Route panics through the sink instead of raw stderr text
//!
//! # Record shape
//! ```text
//! {"level":"ERROR","time":"2024-05-01T10:00:00Z","message":"...","properties":{...},"trace":"..."}
//! ```
//! `properties` is omitted when empty; `trace` is only present for ERROR and FATAL.

use std::any::Any;
use std::backtrace::Backtrace;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::panic;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

/// Key/value context attached to a record.
pub type Properties = BTreeMap<String, String>;

/// Severity of a log record. Ordered from least to most severe.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Fatal,
    /// Suppresses every record.
    Off,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
            LogLevel::Off => "OFF",
        }
    }

    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    fn filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal => "error",
            LogLevel::Off => "off",
        }
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE | tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize)]
struct LogRecord<'a> {
    level: &'static str,
    time: String,
    message: &'a str,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    properties: &'a Properties,
    #[serde(skip_serializing_if = "Option::is_none")]
    trace: Option<String>,
}

type Sink = Mutex<Box<dyn Write + Send>>;

/// Process-wide leveled JSON logger.
///
/// Cloning is cheap; all clones share the same sink and its lock.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<Sink>,
    min_level: LogLevel,
}

impl Logger {
    /// Create a logger writing to `writer`, dropping records below `min_level`.
    pub fn new<W: Write + Send + 'static>(writer: W, min_level: LogLevel) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
            min_level,
        }
    }

    /// Create a logger writing to standard output.
    pub fn stdout(min_level: LogLevel) -> Self {
        Self::new(io::stdout(), min_level)
    }

    pub fn info(&self, message: &str, properties: Properties) {
        let _ = self.emit(LogLevel::Info, message, &properties);
    }

    pub fn error(&self, err: &dyn fmt::Display, properties: Properties) {
        let _ = self.emit(LogLevel::Error, &err.to_string(), &properties);
    }

    /// Write a FATAL record and terminate the process with status 1.
    pub fn fatal(&self, err: &dyn fmt::Display, properties: Properties) -> ! {
        let _ = self.emit(LogLevel::Fatal, &err.to_string(), &properties);
        std::process::exit(1)
    }

    /// A `tracing` layer rendering events through this logger's sink.
    pub fn layer(&self) -> JsonLayer {
        JsonLayer {
            logger: self.clone(),
        }
    }

    /// Replace the default panic hook with one ERROR record per panic.
    ///
    /// Recovery (the task tracker, the HTTP panic layer) still runs after the
    /// hook and logs its own record with the task or request context.
    pub fn install_panic_hook(&self) {
        let logger = self.clone();
        panic::set_hook(Box::new(move |info| {
            let mut properties = Properties::new();
            if let Some(location) = info.location() {
                properties.insert("location".to_string(), location.to_string());
            }
            if let Some(name) = thread::current().name() {
                properties.insert("thread".to_string(), name.to_string());
            }
            logger.error(&panic_message(info.payload()), properties);
        }));
    }

    /// Install this logger as the global `tracing` subscriber.
    ///
    /// `RUST_LOG` takes precedence over the logger's minimum level when set.
    pub fn install(&self) -> Result<(), TryInitError> {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.min_level.filter_directive()));

        tracing_subscriber::registry()
            .with(filter)
            .with(self.layer())
            .try_init()
    }

    fn emit(&self, level: LogLevel, message: &str, properties: &Properties) -> io::Result<()> {
        if level < self.min_level {
            return Ok(());
        }

        let record = LogRecord {
            level: level.as_str(),
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            message,
            properties,
            trace: (level >= LogLevel::Error).then(|| Backtrace::force_capture().to_string()),
        };

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        // One lock per record: a record is either fully written or not at all.
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        sink.write_all(&line)?;
        sink.flush()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("min_level", &self.min_level)
            .finish_non_exhaustive()
    }
}

/// `tracing` layer that writes each event as one JSON record.
pub struct JsonLayer {
    logger: Logger,
}

impl<S: Subscriber> Layer<S> for JsonLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let level = LogLevel::from(event.metadata().level());
        if level < self.logger.min_level {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        let _ = self.logger.emit(level, &visitor.message, &visitor.properties);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    properties: Properties,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.properties.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_owned());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{value:?}"));
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
