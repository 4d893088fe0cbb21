//! Error types for the WLAN offload coordinator
//!
//! Errors are organized by domain for better diagnostics:
//! - [`ConfigError`]: Construction and configuration failures
//! - [`StateError`]: Lifecycle and transition-ordering failures
//! - [`SessionError`]: Interface, session and station bookkeeping
//! - [`DatapathError`]: Per-packet TX/RX failures
//! - [`HwError`]: Failures reported by the accelerator or firmware
//! - [`MessageError`]: Malformed firmware command-channel messages
//!
//! The unified [`Error`] enum wraps all domain errors and is returned
//! by most coordinator methods.

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration and construction errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Invalid configuration parameter
    InvalidConfig,
    /// Descriptor pool would have no slots
    EmptyDescriptorPool,
    /// Bandwidth profiles or thresholds are not ordered high > medium > low
    InvalidBandwidth,
    /// Offload is not enabled in the feature mask
    OffloadDisabled,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ConfigError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ConfigError::InvalidConfig => "invalid configuration",
            ConfigError::EmptyDescriptorPool => "descriptor pool is empty",
            ConfigError::InvalidBandwidth => "bandwidth levels are not ordered",
            ConfigError::OffloadDisabled => "offload disabled",
        }
    }
}

// =============================================================================
// State Errors
// =============================================================================

/// Lifecycle and transition errors
///
/// Most of these indicate a missed transition upstream and are surfaced
/// rather than silently ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StateError {
    /// The subsystem is restarting; retry later
    Restarting,
    /// Pipes were asked to enable while already up
    PipesAlreadyUp,
    /// Pipes were asked to disable while already down
    PipesAlreadyDown,
    /// Pipes are not connected (firmware image not loaded)
    NotLoaded,
    /// A resource or pipe transition is in flight
    InProgress,
    /// The resource is held by an in-flight transfer or queued packet
    Busy,
    /// An unload transition is in flight
    Unloading,
    /// The deferred worker has stopped
    WorkerStopped,
}

impl core::fmt::Display for StateError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StateError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            StateError::Restarting => "subsystem restarting, retry",
            StateError::PipesAlreadyUp => "pipes already enabled",
            StateError::PipesAlreadyDown => "pipes already disabled",
            StateError::NotLoaded => "firmware image not loaded",
            StateError::InProgress => "transition in progress",
            StateError::Busy => "resource busy",
            StateError::Unloading => "unload in progress",
            StateError::WorkerStopped => "worker stopped",
        }
    }
}

// =============================================================================
// Session Errors
// =============================================================================

/// Interface, session and station bookkeeping errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionError {
    /// MAC address is all zeros
    InvalidMac,
    /// Session id is out of range
    InvalidSession,
    /// All interface contexts are in use
    NoFreeInterface,
    /// Interface context already set up for this session
    InterfaceExists,
    /// No interface context for this session
    NoInterface,
    /// STA disconnect without a prior connect
    NotConnected,
    /// Station id already associated
    DuplicateStation,
    /// Station id not associated
    UnknownStation,
    /// Station table is full
    StationTableFull,
    /// Device mode is not offloaded
    UnsupportedMode,
    /// Offload flag already has the requested value
    OffloadUnchanged,
}

impl core::fmt::Display for SessionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SessionError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionError::InvalidMac => "invalid MAC address",
            SessionError::InvalidSession => "invalid session id",
            SessionError::NoFreeInterface => "no free interface context",
            SessionError::InterfaceExists => "interface already set up",
            SessionError::NoInterface => "no interface context",
            SessionError::NotConnected => "station not connected",
            SessionError::DuplicateStation => "duplicate station id",
            SessionError::UnknownStation => "unknown station id",
            SessionError::StationTableFull => "station table full",
            SessionError::UnsupportedMode => "unsupported device mode",
            SessionError::OffloadUnchanged => "offload state unchanged",
        }
    }
}

// =============================================================================
// Data Path Errors
// =============================================================================

/// Per-packet TX/RX errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DatapathError {
    /// No transmit descriptor slot available
    NoDescriptor,
    /// Interface is down or was torn down
    InterfaceDown,
    /// Transmission is blocked (DFS channel availability check)
    TxBlocked,
    /// Firmware refused the frame
    SendFailed,
    /// Callback carried an event other than receive
    UnexpectedEvent,
    /// Frame dropped by exception-path policy
    Dropped,
    /// Frame too short or malformed
    MalformedFrame,
}

impl core::fmt::Display for DatapathError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DatapathError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            DatapathError::NoDescriptor => "no descriptor available",
            DatapathError::InterfaceDown => "interface down",
            DatapathError::TxBlocked => "transmit blocked",
            DatapathError::SendFailed => "send failed",
            DatapathError::UnexpectedEvent => "unexpected data-path event",
            DatapathError::Dropped => "frame dropped",
            DatapathError::MalformedFrame => "malformed frame",
        }
    }
}

// =============================================================================
// Hardware Errors
// =============================================================================

/// Failures reported by the accelerator or the WLAN firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HwError {
    /// Request rejected with a driver status code
    Rejected(i32),
    /// Pipe connect reported success with a null handle
    NullHandle,
    /// Collaborator not available
    Unavailable,
    /// Response not received in time
    Timeout,
}

impl core::fmt::Display for HwError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            HwError::Rejected(code) => write!(f, "{} ({code})", self.as_str()),
            _ => f.write_str(self.as_str()),
        }
    }
}

impl HwError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            HwError::Rejected(_) => "request rejected",
            HwError::NullHandle => "null pipe handle",
            HwError::Unavailable => "hardware unavailable",
            HwError::Timeout => "hardware response timed out",
        }
    }
}

// =============================================================================
// Message Errors
// =============================================================================

/// Firmware command-channel decoding errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageError {
    /// Fewer bytes than the fixed header
    ShortHeader,
    /// Opcode outside the known range
    UnknownOpcode(u16),
    /// Payload shorter than the opcode requires
    TruncatedPayload,
}

impl core::fmt::Display for MessageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MessageError::UnknownOpcode(op) => write!(f, "{} {op}", self.as_str()),
            _ => f.write_str(self.as_str()),
        }
    }
}

impl MessageError {
    /// Returns a human-readable description of the error
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            MessageError::ShortHeader => "short message header",
            MessageError::UnknownOpcode(_) => "unknown opcode",
            MessageError::TruncatedPayload => "truncated payload",
        }
    }
}

// =============================================================================
// Unified Error Type
// =============================================================================

/// This enum wraps all domain-specific errors for unified error handling.
///
/// Match on the inner domain error for specific handling:
/// ```ignore
/// match ctx.wlan_event(session, mode, event, mac, None) {
///     Err(Error::State(StateError::Restarting)) => { /* retry later */ }
///     Err(Error::Session(SessionError::NoFreeInterface)) => { /* ... */ }
///     _ => {}
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// Configuration error
    Config(ConfigError),
    /// Lifecycle or transition error
    State(StateError),
    /// Session bookkeeping error
    Session(SessionError),
    /// Data path error
    Datapath(DatapathError),
    /// Accelerator or firmware error
    Hw(HwError),
    /// Firmware message decoding error
    Message(MessageError),
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Config(e) => write!(f, "config: {}", e.as_str()),
            Error::State(e) => write!(f, "state: {}", e.as_str()),
            Error::Session(e) => write!(f, "session: {}", e.as_str()),
            Error::Datapath(e) => write!(f, "datapath: {}", e.as_str()),
            Error::Hw(e) => write!(f, "hw: {e}"),
            Error::Message(e) => write!(f, "message: {e}"),
        }
    }
}

impl std::error::Error for Error {}

// From impls for automatic conversion
impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<StateError> for Error {
    fn from(e: StateError) -> Self {
        Error::State(e)
    }
}

impl From<SessionError> for Error {
    fn from(e: SessionError) -> Self {
        Error::Session(e)
    }
}

impl From<DatapathError> for Error {
    fn from(e: DatapathError) -> Self {
        Error::Datapath(e)
    }
}

impl From<HwError> for Error {
    fn from(e: HwError) -> Self {
        Error::Hw(e)
    }
}

impl From<MessageError> for Error {
    fn from(e: MessageError) -> Self {
        Error::Message(e)
    }
}

/// Result type alias for coordinator operations
pub type Result<T> = core::result::Result<T, Error>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

/// Result type alias for lifecycle operations
pub type StateResult<T> = core::result::Result<T, StateError>;

/// Result type alias for session bookkeeping
pub type SessionResult<T> = core::result::Result<T, SessionError>;

/// Result type alias for data path operations
pub type DatapathResult<T> = core::result::Result<T, DatapathError>;

/// Result type alias for accelerator and firmware calls
pub type HwResult<T> = core::result::Result<T, HwError>;

// =============================================================================
// Unit Tests
// =============================================================================
