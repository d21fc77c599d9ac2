//! Error types for the engine.
//!
//! Everything that can go wrong before a stream is running is returned
//! synchronously as an [`EngineError`]. Problems detected while streaming are
//! never errors: the real-time callback reports them as
//! [`StatusEvent`](crate::StatusEvent)s through the status channel instead.

/// Synchronous, fatal-to-the-call errors.
///
/// When one of these is returned from [`Engine::start`](crate::Engine::start)
/// the engine is left exactly as it was (Idle stays Idle), so the caller can
/// simply fix the selection and try again.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The OS audio subsystem could not be queried at all.
    #[error("device enumeration failed: {reason}")]
    DeviceEnumeration {
        /// What the audio subsystem reported.
        reason: String,
    },

    /// No output device was given and none could be found.
    #[error("no output device available (looked for \"{pattern}\")")]
    NoOutputDevice {
        /// The name pattern used to look for the preferred output.
        pattern: String,
    },

    /// The duplex stream could not be opened or started.
    ///
    /// Covers busy devices, unsupported formats, and stale device handles.
    #[error("failed to open stream on '{device}': {reason}")]
    StreamOpen {
        /// Display name of the device that failed.
        device: String,
        /// Why it failed.
        reason: String,
    },

    /// Too many transform replacements are waiting for the audio thread.
    #[error("transform swap queue full, try again after the next block")]
    SwapQueueFull,

    /// The requested stream format is unusable.
    #[error("invalid stream config: {reason}")]
    InvalidConfig {
        /// What is wrong with it.
        reason: String,
    },
}

impl EngineError {
    pub(crate) fn enumeration(reason: impl ToString) -> Self {
        Self::DeviceEnumeration {
            reason: reason.to_string(),
        }
    }

    pub(crate) fn stream_open(device: impl Into<String>, reason: impl ToString) -> Self {
        Self::StreamOpen {
            device: device.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
