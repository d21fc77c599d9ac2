//! Engine and stream configuration.

use crate::device::DeviceDescriptor;
use crate::error::{EngineError, Result};

/// Display-name substring used to find the virtual output sink.
pub const DEFAULT_VIRTUAL_SINK: &str = "VoiceChanger Sink";

/// Default sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default block size in frames.
pub const DEFAULT_BLOCK_SIZE: usize = 512;

/// Engine-wide settings. Nothing here is persisted.
///
/// ```
/// use voxbridge::EngineConfig;
///
/// let config = EngineConfig::default()
///     .with_virtual_sink("Loopback")
///     .with_status_capacity(16);
/// assert_eq!(config.virtual_sink_name, "Loopback");
/// ```
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Host backends whose devices are listed first (matched case-insensitively).
    pub preferred_backends: Vec<String>,
    /// Substring identifying the virtual output sink.
    pub virtual_sink_name: String,
    /// How many status events can queue up between drains.
    pub status_capacity: usize,
    /// How many transform swaps can be pending at once.
    pub swap_capacity: usize,
    /// Slack between capture and playback, in blocks.
    pub latency_blocks: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preferred_backends: vec!["PipeWire".into(), "PulseAudio".into(), "JACK".into()],
            virtual_sink_name: DEFAULT_VIRTUAL_SINK.into(),
            status_capacity: 64,
            swap_capacity: 4,
            latency_blocks: 2,
        }
    }
}

impl EngineConfig {
    /// Replace the preferred host backends (builder pattern).
    pub fn with_preferred_backends<I, S>(mut self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_backends = backends.into_iter().map(Into::into).collect();
        self
    }

    /// Set the virtual sink name pattern (builder pattern).
    pub fn with_virtual_sink(mut self, name: impl Into<String>) -> Self {
        self.virtual_sink_name = name.into();
        self
    }

    /// Set the status channel capacity (builder pattern). Clamped to at least 1.
    pub fn with_status_capacity(mut self, capacity: usize) -> Self {
        self.status_capacity = capacity.max(1);
        self
    }

    /// Set the pending swap capacity (builder pattern). Clamped to at least 1.
    pub fn with_swap_capacity(mut self, capacity: usize) -> Self {
        self.swap_capacity = capacity.max(1);
        self
    }

    /// Set the capture-to-playback slack in blocks (builder pattern).
    pub fn with_latency_blocks(mut self, blocks: usize) -> Self {
        self.latency_blocks = blocks;
        self
    }

    /// Whether `backend` is one of the preferred host backends.
    pub fn is_preferred_backend(&self, backend: &str) -> bool {
        self.preferred_backends
            .iter()
            .any(|b| b.eq_ignore_ascii_case(backend))
    }
}

/// Sample rate and block size requested for a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per callback block.
    pub block_size: usize,
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }
}

impl StreamFormat {
    pub fn new(sample_rate: u32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
        }
    }

    /// Checks that both values are positive.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "sample rate must be positive".into(),
            });
        }
        if self.block_size == 0 {
            return Err(EngineError::InvalidConfig {
                reason: "block size must be positive".into(),
            });
        }
        Ok(())
    }

    /// Real-time budget of one block, in seconds.
    pub fn block_period_secs(&self) -> f64 {
        self.block_size as f64 / self.sample_rate as f64
    }
}

/// Everything needed to open one duplex stream.
///
/// Built once per [`Engine::start`](crate::Engine::start) and never changed
/// while the stream runs.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub format: StreamFormat,
    pub input: DeviceDescriptor,
    pub output: DeviceDescriptor,
    /// Capture-to-playback slack in blocks.
    pub latency_blocks: usize,
}

impl StreamConfig {
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.format.sample_rate
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.format.block_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_control_surface() {
        let format = StreamFormat::default();
        assert_eq!(format.sample_rate, 48_000);
        assert_eq!(format.block_size, 512);

        let config = EngineConfig::default();
        assert_eq!(config.virtual_sink_name, "VoiceChanger Sink");
        assert!(config.is_preferred_backend("pipewire"));
        assert!(!config.is_preferred_backend("ALSA"));
    }

    #[test]
    fn zero_values_are_rejected() {
        assert!(StreamFormat::new(0, 512).validate().is_err());
        assert!(StreamFormat::new(48_000, 0).validate().is_err());
        assert!(StreamFormat::new(44_100, 256).validate().is_ok());
    }

    #[test]
    fn block_period() {
        let format = StreamFormat::new(48_000, 480);
        assert!((format.block_period_secs() - 0.01).abs() < 1e-12);
    }

    #[test]
    fn capacities_are_clamped() {
        let config = EngineConfig::default()
            .with_status_capacity(0)
            .with_swap_capacity(0);
        assert_eq!(config.status_capacity, 1);
        assert_eq!(config.swap_capacity, 1);
    }
}
