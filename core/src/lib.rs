//! # sketchysensor-core
//!
//! Core library for the sketchysensor event providers, providing the shared
//! plumbing between a sampling loop and a running SketchyBar instance.
//!
//! ## Features
//!
//! - **Bar command model** - `--add event` / `--trigger` messages with exact quoting
//! - **Dispatch seam** - the [`Dispatcher`] trait and the process-backed [`CliDispatcher`]
//! - **Provider configuration** - validated event name, cadence and dispatch bounds
//! - **Error handling** - Comprehensive error types with context
//!
//! ## Quick Start
//!
//! ```rust
//! use sketchysensor_core::{BarCommand, EventTrigger};
//!
//! let register = BarCommand::add_event("ram_update");
//! assert_eq!(register.to_string(), "--add event 'ram_update'");
//!
//! let trigger: BarCommand = EventTrigger::new("ram_update")
//!     .with_field("used_percent", "07")
//!     .into();
//! assert_eq!(trigger.to_string(), "--trigger 'ram_update' used_percent='07'");
//! ```

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time;

/// Binary used to reach the bar when nothing else is configured.
pub const DEFAULT_BAR_COMMAND: &str = "sketchybar";

/// Payload of a `--trigger` command: an event name plus ordered key/value fields.
///
/// # Examples
///
/// ```rust
/// use sketchysensor_core::EventTrigger;
///
/// let trigger = EventTrigger::new("ram_update")
///     .with_field("swap_used", 512)
///     .with_field("swap_total", 2048);
///
/// assert_eq!(
///     trigger.to_string(),
///     "--trigger 'ram_update' swap_used='512' swap_total='2048'"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTrigger {
    /// Name of the event previously registered with `--add event`
    pub name: String,
    /// Payload fields, rendered in insertion order
    pub fields: Vec<(String, String)>,
}

impl EventTrigger {
    /// Create a trigger with no payload fields.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a payload field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.fields.push((key.into(), value.to_string()));
        self
    }

    /// Look up a payload field by key.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for EventTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "--trigger '{}'", self.name)?;
        for (key, value) in &self.fields {
            write!(f, " {key}='{value}'")?;
        }
        Ok(())
    }
}

/// A single command understood by the bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarCommand {
    /// Register a custom event so items can subscribe to it.
    AddEvent(String),
    /// Fire a registered event with a payload.
    Trigger(EventTrigger),
}

impl BarCommand {
    /// Build an `--add event '<name>'` command.
    #[must_use]
    pub fn add_event(name: impl Into<String>) -> Self {
        Self::AddEvent(name.into())
    }

    /// Name of the event this command refers to.
    #[must_use]
    pub fn event_name(&self) -> &str {
        match self {
            Self::AddEvent(name) => name,
            Self::Trigger(trigger) => &trigger.name,
        }
    }
}

impl From<EventTrigger> for BarCommand {
    fn from(trigger: EventTrigger) -> Self {
        Self::Trigger(trigger)
    }
}

impl fmt::Display for BarCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddEvent(name) => write!(f, "--add event '{name}'"),
            Self::Trigger(trigger) => fmt::Display::fmt(trigger, f),
        }
    }
}

/// Split a bar message into process arguments.
///
/// Whitespace separates arguments unless it sits inside single or double
/// quotes. Quote characters group and are removed; a quote of the other kind
/// inside a quoted section is kept literally.
///
/// # Examples
///
/// ```rust
/// use sketchysensor_core::split_message;
///
/// assert_eq!(
///     split_message("--trigger 'ram update' used_percent='07'"),
///     vec!["--trigger", "ram update", "used_percent=07"]
/// );
/// ```
#[must_use]
pub fn split_message(message: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut outer_quote: Option<char> = None;

    for c in message.chars() {
        match (c, outer_quote) {
            ('\'' | '"', None) => {
                outer_quote = Some(c);
                in_token = true;
            }
            (c, Some(q)) if c == q => outer_quote = None,
            (c, None) if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (c, _) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if in_token {
        args.push(current);
    }
    args
}

/// Delivery of bar commands to the status-bar host.
///
/// Implementations perform one self-contained delivery per call. Callers
/// treat failures as non-fatal.
#[async_trait]
pub trait Dispatcher: Send {
    /// Deliver one formatted bar message.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be delivered or the bar
    /// rejected it.
    async fn dispatch(&mut self, message: &str) -> Result<(), SensorError>;

    /// Deliver a structured command.
    ///
    /// # Errors
    ///
    /// See [`Dispatcher::dispatch`].
    async fn send(&mut self, command: &BarCommand) -> Result<(), SensorError> {
        let message = command.to_string();
        self.dispatch(&message).await
    }
}

/// Dispatcher that runs the bar's command line client once per message.
///
/// The message is split with [`split_message`] and passed as arguments, so
/// `--add event 'ram_update'` becomes `sketchybar --add event ram_update`.
/// A child that outlives the configured timeout is killed.
#[derive(Debug, Clone)]
pub struct CliDispatcher {
    program: PathBuf,
    timeout: Duration,
}

impl CliDispatcher {
    /// Default upper bound for a single dispatch.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a dispatcher for the given client binary.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }

    /// Create a dispatcher from a validated provider configuration.
    #[must_use]
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(config.bar_command.clone()).with_timeout(config.dispatch_timeout)
    }

    /// Set the dispatch timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

}

impl Default for CliDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_BAR_COMMAND)
    }
}

#[async_trait]
impl Dispatcher for CliDispatcher {
    async fn dispatch(&mut self, message: &str) -> Result<(), SensorError> {
        let args = split_message(message);
        tracing::trace!(program = %self.program.display(), ?args, "dispatching bar message");

        let child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SensorError::dispatch_with_source(
                    format!("failed to start {}", self.program.display()),
                    e,
                )
            })?;

        let output = match time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => output?,
            Err(_) => {
                return Err(SensorError::timeout(
                    self.timeout,
                    format!("running {}", self.program.display()),
                ))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SensorError::dispatch(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }

        Ok(())
    }
}

/// Validated settings shared by every event provider.
///
/// # Examples
///
/// ```rust
/// use sketchysensor_core::ProviderConfig;
/// use std::time::Duration;
///
/// let config = ProviderConfig::new("ram_update", Duration::from_millis(500))?
///     .with_bar_command("/opt/homebrew/bin/sketchybar");
///
/// assert_eq!(config.event_name, "ram_update");
/// assert_eq!(config.update_interval, Duration::from_millis(500));
/// # Ok::<(), sketchysensor_core::SensorError>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    /// Event registered with the bar and fired on every tick
    pub event_name: String,
    /// Delay between the end of one tick and the start of the next
    pub update_interval: Duration,
    /// Bar client binary
    pub bar_command: PathBuf,
    /// Upper bound for a single dispatch
    pub dispatch_timeout: Duration,
}

impl ProviderConfig {
    /// Create a configuration, rejecting an empty event name or a zero interval.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Config`] if validation fails.
    pub fn new(event_name: impl Into<String>, update_interval: Duration) -> Result<Self, SensorError> {
        let config = Self {
            event_name: event_name.into(),
            update_interval,
            bar_command: PathBuf::from(DEFAULT_BAR_COMMAND),
            dispatch_timeout: CliDispatcher::DEFAULT_TIMEOUT,
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the bar client binary.
    #[must_use]
    pub fn with_bar_command(mut self, command: impl Into<PathBuf>) -> Self {
        self.bar_command = command.into();
        self
    }

    /// Set the dispatch timeout.
    #[must_use]
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Check the invariants every provider relies on.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Config`] describing the first violated rule.
    pub fn validate(&self) -> Result<(), SensorError> {
        if self.event_name.trim().is_empty() {
            return Err(SensorError::config("Event name must not be empty"));
        }
        if self.update_interval.is_zero() {
            return Err(SensorError::config("Update interval must be greater than zero"));
        }
        if self.dispatch_timeout.is_zero() {
            return Err(SensorError::config("Dispatch timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// Parse a positive number of seconds (fractions allowed) into a [`Duration`].
///
/// # Errors
///
/// Returns [`SensorError::Config`] for non-numeric, non-finite, zero or
/// negative input.
///
/// # Examples
///
/// ```rust
/// use sketchysensor_core::parse_seconds;
/// use std::time::Duration;
///
/// assert_eq!(parse_seconds("0.5")?, Duration::from_millis(500));
/// assert!(parse_seconds("notanumber").is_err());
/// # Ok::<(), sketchysensor_core::SensorError>(())
/// ```
pub fn parse_seconds(value: &str) -> Result<Duration, SensorError> {
    let seconds = value
        .trim()
        .parse::<f64>()
        .map_err(|_| SensorError::config_with_value("Expected a number of seconds", value))?;

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(SensorError::config_with_value(
            "Seconds must be a positive, finite number",
            value,
        ));
    }

    let duration = Duration::try_from_secs_f64(seconds)
        .map_err(|_| SensorError::config_with_value("Seconds out of range", value))?;
    if duration.is_zero() {
        return Err(SensorError::config_with_value(
            "Seconds must be at least one nanosecond",
            value,
        ));
    }
    Ok(duration)
}

/// Unit conversions shared by providers.
pub mod format {
    /// Bytes in one mebibyte.
    pub const BYTES_PER_MB: u64 = 1024 * 1024;

    /// Whole megabytes, truncating.
    ///
    /// ```rust
    /// use sketchysensor_core::format;
    ///
    /// assert_eq!(format::whole_megabytes(1_572_864), 1);
    /// ```
    #[must_use]
    pub const fn whole_megabytes(bytes: u64) -> u64 {
        bytes / BYTES_PER_MB
    }

    /// Share of `part` in `total` as a rounded percentage clamped to `0..=100`.
    ///
    /// A zero `total` yields 0.
    ///
    /// ```rust
    /// use sketchysensor_core::format;
    ///
    /// assert_eq!(format::clamped_percent(1, 4), 25);
    /// assert_eq!(format::clamped_percent(5, 4), 100);
    /// assert_eq!(format::clamped_percent(5, 0), 0);
    /// ```
    #[must_use]
    pub fn clamped_percent(part: u64, total: u64) -> u8 {
        if total == 0 {
            return 0;
        }
        let percent = (part as f64 / total as f64 * 100.0).round();
        percent.clamp(0.0, 100.0) as u8
    }
}

/// Common error types for provider operations.
///
/// This enum covers the failure modes of reading host statistics and of
/// delivering messages to the bar.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// I/O error occurred while reading sensor data.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error parsing sensor data from text format.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of what failed to parse
        message: String,
        /// Optional source error for chaining
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration error (invalid settings, etc.).
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration issue
        message: String,
        /// The invalid configuration value if applicable
        value: Option<String>,
    },

    /// Sensor is not available on this system.
    #[error("Sensor unavailable: {reason}")]
    Unavailable {
        /// Reason why the sensor is unavailable
        reason: String,
        /// Whether this is a temporary or permanent condition
        is_temporary: bool,
    },

    /// The bar could not be reached or rejected a message.
    #[error("Dispatch error: {message}")]
    Dispatch {
        /// What went wrong while delivering the message
        message: String,
        /// Optional source error for chaining
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Timeout occurred while waiting on an external operation.
    #[error("Timeout after {duration:?} while {operation}")]
    Timeout {
        /// How long the operation took before timing out
        duration: Duration,
        /// Description of what operation timed out
        operation: String,
    },
}

impl SensorError {
    /// Create a new parse error with a simple message.
    pub fn parse<S: Into<String>>(message: S) -> Self {
        Self::Parse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new parse error with a source error.
    pub fn parse_with_source<S: Into<String>, E>(message: S, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Parse {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
            value: None,
        }
    }

    /// Create a new configuration error with the invalid value.
    pub fn config_with_value<S: Into<String>, V: Into<String>>(message: S, value: V) -> Self {
        Self::Config {
            message: message.into(),
            value: Some(value.into()),
        }
    }

    /// Create a new unavailable error.
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self::Unavailable {
            reason: reason.into(),
            is_temporary: false,
        }
    }

    /// Create a new temporary unavailable error.
    pub fn temporarily_unavailable<S: Into<String>>(reason: S) -> Self {
        Self::Unavailable {
            reason: reason.into(),
            is_temporary: true,
        }
    }

    /// Create a new dispatch error.
    pub fn dispatch<S: Into<String>>(message: S) -> Self {
        Self::Dispatch {
            message: message.into(),
            source: None,
        }
    }

    /// Create a new dispatch error with a source error.
    pub fn dispatch_with_source<S: Into<String>, E>(message: S, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Dispatch {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new timeout error.
    pub fn timeout<S: Into<String>>(duration: Duration, operation: S) -> Self {
        Self::Timeout {
            duration,
            operation: operation.into(),
        }
    }

    /// Check if this error represents a temporary condition.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        match self {
            Self::Unavailable { is_temporary, .. } => *is_temporary,
            Self::Timeout { .. } => true,
            Self::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}
