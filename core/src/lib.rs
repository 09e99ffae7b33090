//! # hostcheck-rs-core
//!
//! Core library for the hostcheck-rs check suite providing the plumbing that
//! every host check shares.
//!
//! ## Features
//!
//! - **Status levels** - The OK/WARNING/CRITICAL/UNKNOWN ladder and the exit
//!   code convention monitoring supervisors expect
//! - **Result events** - JSON event records delivered to a local event collector
//! - **Event sinks** - Injectable [`EventSink`] capability with a UDP implementation
//! - **Common check trait** - Standardized [`Check`] interface
//! - **Configuration management** - RON-based global configuration
//! - **Error handling** - Error types with context
//!
//! ## Quick Start
//!
//! ```rust
//! use hostcheck_rs_core::{CheckEvent, EventSink, Status, UdpEventSink};
//!
//! let sink = UdpEventSink::new(UdpEventSink::DEFAULT_ADDRESS.parse()?)?;
//! let event = CheckEvent::new("cpu-usage-user", Status::Ok, "CPU user time is normal", None);
//!
//! // Delivery is fire-and-forget: nothing listens here in the doctest.
//! let _ = sink.emit(&event);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};

/// Severity of a check result.
///
/// Ordered from least to most severe for the thresholded levels; `Unknown`
/// sits last because it reports a check that could not decide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    /// Everything is within thresholds
    Ok,
    /// The warning threshold was reached
    Warning,
    /// The critical threshold was reached
    Critical,
    /// The check could not classify the value
    Unknown,
}

impl Status {
    /// Numeric status carried in events and used as the process exit code.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Warning => 1,
            Self::Critical => 2,
            Self::Unknown => 3,
        }
    }

    /// Upper-case label used as the output prefix.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Process exit code for this status.
    #[must_use]
    pub const fn exit_code(self) -> i32 {
        self.code() as i32
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The final outcome of a check run, reported through the process exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutput {
    /// Severity that becomes the exit code
    pub status: Status,
    /// Human-readable message for the status line
    pub message: String,
}

impl CheckOutput {
    /// Create a new output with the given status and message.
    pub fn new(status: Status, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Create an OK output.
    pub fn ok(message: impl Into<String>) -> Self {
        Self::new(Status::Ok, message)
    }

    /// Create a WARNING output.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Status::Warning, message)
    }

    /// Create a CRITICAL output.
    pub fn critical(message: impl Into<String>) -> Self {
        Self::new(Status::Critical, message)
    }

    /// Create an UNKNOWN output.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(Status::Unknown, message)
    }

    /// Render the status line printed on standard output.
    ///
    /// ```rust
    /// use hostcheck_rs_core::CheckOutput;
    ///
    /// let output = CheckOutput::warning("High CPU usage - Current: 85% (>= 80%)");
    /// assert_eq!(
    ///     output.render("cpu-usage"),
    ///     "cpu-usage WARNING: High CPU usage - Current: 85% (>= 80%)"
    /// );
    /// ```
    #[must_use]
    pub fn render(&self, check_name: &str) -> String {
        format!("{} {}: {}", check_name, self.status, self.message)
    }
}

/// One result event sent to the local event collector.
///
/// Serializes to a single JSON object. `handler` is omitted when no handler
/// is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckEvent {
    /// Check name, e.g. `cpu-usage-user`
    pub name: String,
    /// Numeric status (0-3)
    pub status: u8,
    /// `"<LEVEL>: <message>"`
    pub output: String,
    /// Handler the collector should route the event to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
}

impl CheckEvent {
    /// Build an event for `name` with the status prefix applied to `message`.
    pub fn new(
        name: impl Into<String>,
        status: Status,
        message: &str,
        handler: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            status: status.code(),
            output: format!("{}: {}", status.label(), message),
            handler: handler.map(str::to_owned),
        }
    }

    /// Serialize as one newline-terminated JSON line.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::Encode`] if serialization fails.
    pub fn to_line(&self) -> Result<String, CheckError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Capability for delivering result events.
///
/// Implementations must not retry; a failed delivery is reported to the
/// caller, which is expected to log it and move on.
pub trait EventSink {
    /// Deliver one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the event could not be encoded or handed to the
    /// transport.
    fn emit(&self, event: &CheckEvent) -> Result<(), CheckError>;
}

impl<S: EventSink + ?Sized> EventSink for &S {
    fn emit(&self, event: &CheckEvent) -> Result<(), CheckError> {
        (**self).emit(event)
    }
}

/// Connectionless event sink sending one JSON datagram per event.
#[derive(Debug)]
pub struct UdpEventSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpEventSink {
    /// Address of the local event collector.
    pub const DEFAULT_ADDRESS: &'static str = "127.0.0.1:3030";

    /// Bind an ephemeral socket able to reach `target`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if no local socket can be bound.
    pub fn new(target: SocketAddr) -> Result<Self, CheckError> {
        let bind_addr = if target.is_ipv4() {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        };
        let socket = UdpSocket::bind(bind_addr)?;
        Ok(Self { socket, target })
    }
}

impl EventSink for UdpEventSink {
    fn emit(&self, event: &CheckEvent) -> Result<(), CheckError> {
        let line = event.to_line()?;
        self.socket.send_to(line.as_bytes(), self.target)?;
        log::debug!("sent {} to {}", event.name, self.target);
        Ok(())
    }
}

/// Global configuration loaded from ~/.config/hostcheck-rs/config.ron
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GlobalConfig {
    /// Handler name stamped on every event
    #[serde(default)]
    pub handler: Option<String>,
    /// Address of the local event collector
    #[serde(default = "default_event_address")]
    pub event_address: String,
    /// Kernel CPU accounting file
    #[serde(default = "default_proc_stat_path")]
    pub proc_stat_path: PathBuf,
}

fn default_event_address() -> String {
    UdpEventSink::DEFAULT_ADDRESS.to_owned()
}

fn default_proc_stat_path() -> PathBuf {
    PathBuf::from("/proc/stat")
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            handler: None,
            event_address: default_event_address(),
            proc_stat_path: default_proc_stat_path(),
        }
    }
}

impl GlobalConfig {
    /// Load configuration from the standard config file location.
    ///
    /// Searches for config in:
    /// 1. ~/.config/hostcheck-rs/config.ron
    /// 2. ~/.hostcheck-rs/config.ron (fallback)
    ///
    /// Returns default config if no file is found.
    pub fn load() -> Result<Self, CheckError> {
        if let Some(config_path) = Self::find_config_file() {
            Self::load_from_file(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, CheckError> {
        let content = std::fs::read_to_string(path)?;

        ron::from_str(&content).map_err(|e| {
            CheckError::config_file(format!("Failed to parse {}: {}", path.display(), e))
        })
    }

    /// Find the config file in standard locations.
    pub fn find_config_file() -> Option<PathBuf> {
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_path = config_dir.join("hostcheck-rs").join("config.ron");
            if xdg_path.exists() {
                return Some(xdg_path);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let home_path = home_dir.join(".hostcheck-rs").join("config.ron");
            if home_path.exists() {
                return Some(home_path);
            }
        }

        None
    }

    /// Get the default config file path for writing.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("hostcheck-rs").join("config.ron"))
    }

    /// Example configuration with every field spelled out.
    pub fn example_config() -> Self {
        Self {
            handler: Some("default".to_owned()),
            ..Self::default()
        }
    }

    /// Write the example configuration, prefixed with a short comment header.
    pub fn save_example_config_to_file(path: &Path) -> Result<(), CheckError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let body =
            ron::ser::to_string_pretty(&Self::example_config(), ron::ser::PrettyConfig::default())
                .map_err(|e| {
                    CheckError::config_file(format!("Failed to serialize config: {}", e))
                })?;

        let content = format!(
            "// hostcheck-rs global configuration\n\
             //\n\
             // handler:        handler name stamped on every result event\n\
             // event_address:  UDP address of the local event collector\n\
             // proc_stat_path: kernel CPU accounting file\n\
             {}\n",
            body
        );

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Parse `event_address` into a socket address.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::ConfigInvalid`] if the address does not parse.
    pub fn event_socket_addr(&self) -> Result<SocketAddr, CheckError> {
        self.event_address.parse().map_err(|_| {
            CheckError::config_with_value("Invalid event collector address", &self.event_address)
        })
    }
}

/// Core trait that all host checks implement.
///
/// A check performs one evaluation per call to [`Check::run`], emitting any
/// per-item events through the sink and returning the overall outcome.
#[allow(async_fn_in_trait)]
pub trait Check {
    /// Error type for check operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Stable name of the check, used in the status line.
    fn name(&self) -> &str;

    /// Run the check once.
    ///
    /// # Errors
    ///
    /// Returns an error if the check could not produce a result at all.
    async fn run(&mut self, sink: &dyn EventSink) -> Result<CheckOutput, Self::Error>;

    /// Check if the inputs this check needs are available on this system.
    ///
    /// Default implementation returns `Ok(())`.
    fn check_availability(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// Common error types for check operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    /// I/O error outside the measured source (config files, sockets).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The measured source could not be read, parsed, or went backwards.
    #[error("Source unavailable: {reason}")]
    SourceUnavailable {
        /// Why the source could not be used
        reason: String,
        /// Optional source error for chaining
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid check configuration.
    #[error("Configuration error: {message}")]
    ConfigInvalid {
        /// Description of the configuration issue
        message: String,
        /// The invalid configuration value if applicable
        value: Option<String>,
    },

    /// The global configuration file could not be parsed or written.
    #[error("Config file error: {message}")]
    ConfigFile {
        /// Description of the failure
        message: String,
    },

    /// No time elapsed between samples, so no ratio can be formed.
    #[error("Division by zero: no ticks elapsed between samples")]
    DivisionByZero,

    /// Permission denied accessing the source.
    #[error("Permission denied: {resource}")]
    PermissionDenied {
        /// The resource that couldn't be accessed
        resource: String,
    },

    /// An event could not be encoded.
    #[error("Encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

impl CheckError {
    /// Create a new source unavailable error.
    pub fn source_unavailable<S: Into<String>>(reason: S) -> Self {
        Self::SourceUnavailable {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a new source unavailable error with a source error.
    pub fn source_unavailable_with<S: Into<String>, E>(reason: S, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::SourceUnavailable {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new configuration error.
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
            value: None,
        }
    }

    /// Create a new configuration error with the invalid value.
    pub fn config_with_value<S: Into<String>, V: Into<String>>(message: S, value: V) -> Self {
        Self::ConfigInvalid {
            message: message.into(),
            value: Some(value.into()),
        }
    }

    /// Create a new config file error.
    pub fn config_file<S: Into<String>>(message: S) -> Self {
        Self::ConfigFile {
            message: message.into(),
        }
    }

    /// Create a new permission denied error.
    pub fn permission_denied<S: Into<String>>(resource: S) -> Self {
        Self::PermissionDenied {
            resource: resource.into(),
        }
    }

    /// Whether the error aborts a run (as opposed to being handled inside it).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::DivisionByZero)
    }
}
