//! High-level engine API

use std::sync::Arc;

use crate::backend::{AudioBackend, CpalBackend};
use crate::config::{EngineConfig, StreamConfig, StreamFormat};
use crate::device::{DeviceDescriptor, DeviceList};
use crate::error::{EngineError, Result};
use crate::processor::{BlockProcessor, StreamFlags};
use crate::slot::{transform_slot, TransformSwapper};
use crate::status::{status_channel, StatusClock, StatusEvent, StatusReceiver};
use crate::transform::{identity_factory, BlockContext, TransformFactory};

/// Everything that exists only while a stream is running.
struct ActiveStream<S> {
    stream: S,
    config: StreamConfig,
    swapper: TransformSwapper,
    flags: Arc<StreamFlags>,
}

/// The real-time duplex engine: capture, transform, play back.
///
/// `Engine` is the handle a control surface drives. It is either **Idle** or
/// **Running** one stream; [`start`](Self::start) on a running engine and
/// [`stop`](Self::stop) on an idle one do nothing.
///
/// # Example
///
/// ```no_run
/// # use voxbridge::{Engine, EngineConfig, StreamFormat};
/// use std::time::Duration;
///
/// let mut engine = Engine::with_cpal(EngineConfig::default());
/// let devices = engine.list_devices().expect("audio subsystem unavailable");
/// let input = devices.inputs.first().expect("no input device");
///
/// // no output given: the configured virtual sink is looked up by name
/// engine.start(input, None, StreamFormat::default()).unwrap();
///
/// for _ in 0..10 {
///     std::thread::sleep(Duration::from_millis(200));
///     for event in engine.drain_status() {
///         println!("{}", event);
///     }
/// }
///
/// engine.stop();
/// ```
///
/// # Threads
///
/// All methods run on the control thread. The audio thread only ever sees the
/// transform slot, the status sender and the stream flags, all of which it
/// reaches without locks.
pub struct Engine<B: AudioBackend = CpalBackend> {
    backend: B,
    config: EngineConfig,
    factory: TransformFactory,
    clock: Arc<StatusClock>,
    /// Receiver of the current (or most recent) stream.
    status: Option<StatusReceiver>,
    /// Events collected on the control thread, not yet drained.
    backlog: Vec<StatusEvent>,
    active: Option<ActiveStream<B::Stream>>,
}

impl Engine<CpalBackend> {
    /// Create an engine on top of CPAL.
    pub fn with_cpal(config: EngineConfig) -> Self {
        Self::new(CpalBackend::new(), config)
    }
}

impl<B: AudioBackend> Engine<B> {
    /// Create an idle engine on `backend` using the pass-through transform.
    pub fn new(backend: B, config: EngineConfig) -> Self {
        Self {
            backend,
            config,
            factory: identity_factory(),
            clock: StatusClock::new(),
            status: None,
            backlog: Vec::new(),
            active: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Whether a stream is running.
    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    /// Configuration of the running stream, if any.
    pub fn stream_config(&self) -> Option<&StreamConfig> {
        self.active.as_ref().map(|a| &a.config)
    }

    /// Take a fresh device snapshot and filter it into input/output choices.
    ///
    /// An empty list means no devices, not an error.
    pub fn list_devices(&self) -> Result<DeviceList> {
        let snapshot = self.backend.enumerate()?;
        let list = DeviceList::from_snapshot(&snapshot, &self.config);
        tracing::debug!(
            devices = snapshot.len(),
            inputs = list.inputs.len(),
            outputs = list.outputs.len(),
            "enumerated audio devices"
        );
        Ok(list)
    }

    /// The output the engine plays to when none is given.
    ///
    /// See [`DeviceList::find_preferred_output`]; the pattern is
    /// [`EngineConfig::virtual_sink_name`].
    pub fn find_preferred_output(&self) -> Result<Option<DeviceDescriptor>> {
        let list = self.list_devices()?;
        Ok(list
            .find_preferred_output(&self.config.virtual_sink_name)
            .cloned())
    }

    /// Start streaming from `input` to `output`.
    ///
    /// Does nothing if already running. With no `output`, the preferred
    /// output is looked up in a fresh snapshot.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidConfig`] for a zero rate or block size
    /// - [`EngineError::NoOutputDevice`] if no output can be found
    /// - [`EngineError::StreamOpen`] if the backend cannot open the stream
    ///
    /// The engine stays idle on any error.
    pub fn start(
        &mut self,
        input: &DeviceDescriptor,
        output: Option<&DeviceDescriptor>,
        format: StreamFormat,
    ) -> Result<()> {
        if let Some(active) = &self.active {
            tracing::debug!(
                input = %active.config.input.name,
                "start ignored, stream already running"
            );
            return Ok(());
        }

        format.validate()?;

        let output = match output {
            Some(device) => device.clone(),
            None => self
                .find_preferred_output()?
                .ok_or_else(|| EngineError::NoOutputDevice {
                    pattern: self.config.virtual_sink_name.clone(),
                })?,
        };

        if !input.is_input() {
            return Err(EngineError::stream_open(&input.name, "device has no input channels"));
        }
        if !output.is_output() {
            return Err(EngineError::stream_open(&output.name, "device has no output channels"));
        }

        let config = StreamConfig {
            format,
            input: input.clone(),
            output,
            latency_blocks: self.config.latency_blocks,
        };
        let ctx = block_context(&config);

        let transform = (self.factory)(&ctx);
        let transform_name = transform.name();
        let (slot, swapper) = transform_slot(transform, self.config.swap_capacity);
        let (sender, receiver) = status_channel(self.config.status_capacity, self.clock.clone());
        let flags = StreamFlags::new();
        let processor = BlockProcessor::new(ctx, slot, sender);

        let stream = self
            .backend
            .open_duplex(&config, processor, flags.clone())
            .map_err(|err| {
                tracing::error!(%err, "failed to open duplex stream");
                err
            })?;

        tracing::info!(
            input = %config.input.name,
            output = %config.output.name,
            sample_rate = format.sample_rate,
            block_size = format.block_size,
            transform = transform_name,
            "stream started"
        );

        self.collect_status();
        self.status = Some(receiver);
        self.active = Some(ActiveStream {
            stream,
            config,
            swapper,
            flags,
        });
        Ok(())
    }

    /// Stop streaming and release the stream.
    ///
    /// Does nothing if idle. Returns once the backend has stopped calling
    /// back, so the transform and its state are gone afterwards.
    pub fn stop(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };
        let ActiveStream {
            stream,
            config,
            mut swapper,
            flags,
        } = active;

        drop(stream);
        swapper.collect_retired();

        self.collect_status();
        self.collect_flags(&flags);

        tracing::info!(
            input = %config.input.name,
            output = %config.output.name,
            "stream stopped"
        );
    }

    /// Replace the transform.
    ///
    /// The factory is used for every later [`start`](Self::start). If a stream
    /// is running, a new instance is built here and installed by the audio
    /// thread before its next block.
    pub fn set_transform(&mut self, factory: TransformFactory) -> Result<()> {
        self.factory = factory;

        if let Some(active) = &mut self.active {
            let next = (self.factory)(&block_context(&active.config));
            let name = next.name();
            active
                .swapper
                .swap(next)
                .map_err(|_| EngineError::SwapQueueFull)?;
            tracing::debug!(transform = name, "transform swap queued");
        }
        Ok(())
    }

    /// Remove and return all pending status events.
    ///
    /// Meant to be polled on a timer (every 200ms or so). Sequence numbers
    /// keep increasing from one call to the next.
    pub fn drain_status(&mut self) -> Vec<StatusEvent> {
        self.collect_status();
        if let Some(active) = &mut self.active {
            active.swapper.collect_retired();
            let flags = active.flags.clone();
            self.collect_flags(&flags);
        }
        std::mem::take(&mut self.backlog)
    }

    /// Move everything queued by the audio thread into the backlog.
    fn collect_status(&mut self) {
        if let Some(receiver) = &mut self.status {
            self.backlog.extend(receiver.drain());
        }
    }

    /// Report flags the block callback never got to turn into events, e.g.
    /// because the device vanished and callbacks stopped.
    fn collect_flags(&mut self, flags: &StreamFlags) {
        let clock = &self.clock;
        self.backlog
            .extend(flags.take().kinds().map(|kind| clock.stamp(kind)));
    }
}

impl<B: AudioBackend> Drop for Engine<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn block_context(config: &StreamConfig) -> BlockContext {
    BlockContext {
        sample_rate: config.sample_rate(),
        block_size: config.block_size(),
    }
}
