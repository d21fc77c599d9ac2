//! CPAL duplex backend
//!
//! CPAL has no single duplex stream, so one is assembled from an input stream
//! and an output stream joined by a sample ring buffer. The input callback
//! only copies channel 0 into the ring. The output callback is the block
//! callback: it pulls captured samples back out and runs the
//! [`BlockProcessor`] over them in chunks of at most one block.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, SupportedBufferSize};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::config::StreamConfig;
use crate::device::DeviceDescriptor;
use crate::error::{EngineError, Result};
use crate::processor::{BlockProcessor, StreamFlags, StreamStatus};

use super::AudioBackend;

/// Backend over every host CPAL can reach on this platform.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpalBackend;

impl CpalBackend {
    pub fn new() -> Self {
        Self
    }
}

/// A running CPAL duplex stream. Dropping it stops both halves.
pub struct CpalDuplexStream {
    // output first: it owns the processor and should stop pulling first
    output: cpal::Stream,
    input: cpal::Stream,
}

impl Drop for CpalDuplexStream {
    fn drop(&mut self) {
        if let Err(err) = self.output.pause() {
            tracing::debug!(%err, "failed to pause output stream");
        }
        if let Err(err) = self.input.pause() {
            tracing::debug!(%err, "failed to pause input stream");
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Direction {
    Input,
    Output,
}

impl Direction {
    fn as_str(&self) -> &'static str {
        match self {
            Direction::Input => "input",
            Direction::Output => "output",
        }
    }
}

/// All devices of all available hosts, with their host name, in order.
fn snapshot_devices() -> Result<Vec<(&'static str, cpal::Device)>> {
    let mut devices = Vec::new();
    let mut queried = 0usize;
    let mut last_error = None;

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(host) => host,
            Err(err) => {
                tracing::warn!(host = host_id.name(), %err, "audio host unavailable");
                last_error = Some(err.to_string());
                continue;
            }
        };
        match host.devices() {
            Ok(iter) => {
                queried += 1;
                devices.extend(iter.map(|device| (host_id.name(), device)));
            }
            Err(err) => {
                tracing::warn!(host = host_id.name(), %err, "failed to list devices");
                last_error = Some(err.to_string());
            }
        }
    }

    match (queried, last_error) {
        (0, Some(reason)) => Err(EngineError::enumeration(reason)),
        _ => Ok(devices),
    }
}

fn device_name(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "Unknown".into())
}

fn max_channels(device: &cpal::Device, direction: Direction) -> u16 {
    let channels = match direction {
        Direction::Input => device
            .supported_input_configs()
            .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0)),
        Direction::Output => device
            .supported_output_configs()
            .map(|configs| configs.map(|c| c.channels()).max().unwrap_or(0)),
    };
    channels.unwrap_or(0)
}

/// Find the device `wanted` refers to, checking it is still the same device.
fn resolve(
    devices: &[(&'static str, cpal::Device)],
    wanted: &DeviceDescriptor,
) -> Result<cpal::Device> {
    match devices.get(wanted.index) {
        Some((host, device)) if *host == wanted.host && device_name(device) == wanted.name => {
            Ok(device.clone())
        }
        _ => Err(EngineError::stream_open(
            &wanted.name,
            "device handle is stale, refresh the device list",
        )),
    }
}

/// Read the device's configs for `direction` and pick one for `config`.
fn pick_config(
    device: &cpal::Device,
    name: &str,
    direction: Direction,
    config: &StreamConfig,
) -> Result<(cpal::StreamConfig, usize)> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Input => device
            .supported_input_configs()
            .map_err(|e| EngineError::stream_open(name, e))?
            .collect(),
        Direction::Output => device
            .supported_output_configs()
            .map_err(|e| EngineError::stream_open(name, e))?
            .collect(),
    };
    choose_config(ranges, name, direction, config.sample_rate(), config.block_size())
}

/// Pick an f32 config at `sample_rate` with as few channels as possible and a
/// fixed buffer of `block_size` frames.
///
/// Returns the config and its channel count.
fn choose_config(
    ranges: impl IntoIterator<Item = cpal::SupportedStreamConfigRange>,
    name: &str,
    direction: Direction,
    sample_rate: u32,
    block_size: usize,
) -> Result<(cpal::StreamConfig, usize)> {
    let rate = SampleRate(sample_rate);
    let chosen = ranges
        .into_iter()
        .filter(|r| r.sample_format() == SampleFormat::F32)
        .filter(|r| r.min_sample_rate() <= rate && rate <= r.max_sample_rate())
        .min_by_key(|r| r.channels())
        .ok_or_else(|| {
            EngineError::stream_open(
                name,
                format!("no f32 {} format at {} Hz", direction.as_str(), rate.0),
            )
        })?;

    let frames = u32::try_from(block_size)
        .map_err(|_| EngineError::stream_open(name, "block size too large"))?;
    let buffer_size = match chosen.buffer_size() {
        SupportedBufferSize::Range { min, max } if frames < *min || frames > *max => {
            return Err(EngineError::stream_open(
                name,
                format!("block size {} outside supported range {}..={}", frames, min, max),
            ));
        }
        _ => BufferSize::Fixed(frames),
    };

    let channels = chosen.channels() as usize;
    let mut stream_config = chosen.with_sample_rate(rate).config();
    stream_config.buffer_size = buffer_size;
    Ok((stream_config, channels))
}

/// The capture-to-playback sample ring, already holding `latency_blocks`
/// blocks of silence.
fn sample_bridge(block_size: usize, latency_blocks: usize) -> (Producer<f32>, Consumer<f32>) {
    let latency = block_size * latency_blocks;
    let (mut producer, consumer) = RingBuffer::<f32>::new(latency + block_size * 4);
    for _ in 0..latency {
        // ring was sized above the prefill, this cannot fail
        let _ = producer.push(0.0);
    }
    (producer, consumer)
}

/// State owned by the output callback.
struct DuplexCallback {
    processor: BlockProcessor,
    captured: Consumer<f32>,
    input: Vec<f32>,
    flags: Arc<StreamFlags>,
    channels: usize,
}

impl DuplexCallback {
    fn new(
        processor: BlockProcessor,
        captured: Consumer<f32>,
        flags: Arc<StreamFlags>,
        channels: usize,
    ) -> Self {
        let block = processor.context().block_size.max(1);
        Self {
            processor,
            captured,
            input: vec![0.0; block],
            flags,
            channels: channels.max(1),
        }
    }

    fn fill(&mut self, data: &mut [f32]) {
        let block = self.processor.context().block_size.max(1);
        let mut status = self.flags.take();

        for chunk in data.chunks_mut(block * self.channels) {
            let frames = chunk.len() / self.channels;
            let available = self.captured.slots().min(frames);

            if let Ok(read) = self.captured.read_chunk(available) {
                let (first, second) = read.as_slices();
                self.input[..first.len()].copy_from_slice(first);
                self.input[first.len()..available].copy_from_slice(second);
                read.commit_all();
            }
            if available < frames {
                self.input[available..frames].fill(0.0);
                status = status.union(StreamStatus::OUTPUT_UNDERRUN);
            }

            self.processor
                .process(status, &self.input[..frames], chunk, self.channels);
            status = StreamStatus::empty();
        }
    }
}

fn push_captured(producer: &mut Producer<f32>, data: &[f32], channels: usize, flags: &StreamFlags) {
    let mut overrun = false;
    for frame in data.chunks(channels) {
        if producer.push(frame[0]).is_err() {
            overrun = true;
        }
    }
    if overrun {
        flags.raise(StreamStatus::INPUT_OVERRUN);
    }
}

impl AudioBackend for CpalBackend {
    type Stream = CpalDuplexStream;

    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>> {
        let devices = snapshot_devices()?;
        Ok(devices
            .iter()
            .enumerate()
            .map(|(index, (host, device))| DeviceDescriptor {
                index,
                name: device_name(device),
                host: (*host).to_string(),
                max_input_channels: max_channels(device, Direction::Input),
                max_output_channels: max_channels(device, Direction::Output),
            })
            .collect())
    }

    fn open_duplex(
        &self,
        config: &StreamConfig,
        processor: BlockProcessor,
        flags: Arc<StreamFlags>,
    ) -> Result<CpalDuplexStream> {
        let devices = snapshot_devices()
            .map_err(|e| EngineError::stream_open(&config.input.name, e))?;
        let input = resolve(&devices, &config.input)?;
        let output = resolve(&devices, &config.output)?;

        let (input_config, input_channels) =
            pick_config(&input, &config.input.name, Direction::Input, config)?;
        let (output_config, output_channels) =
            pick_config(&output, &config.output.name, Direction::Output, config)?;

        tracing::debug!(
            ?input_config,
            ?output_config,
            "opening duplex stream"
        );

        let (mut producer, consumer) = sample_bridge(config.block_size(), config.latency_blocks);

        let input_flags = flags.clone();
        let input_error_flags = flags.clone();
        let input_stream = input
            .build_input_stream(
                &input_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    push_captured(&mut producer, data, input_channels, &input_flags);
                },
                move |_err| input_error_flags.raise(StreamStatus::INPUT_ERROR),
                None,
            )
            .map_err(|e| EngineError::stream_open(&config.input.name, e))?;

        let output_error_flags = flags.clone();
        let mut callback = DuplexCallback::new(processor, consumer, flags, output_channels);
        let output_stream = output
            .build_output_stream(
                &output_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| callback.fill(data),
                move |_err| output_error_flags.raise(StreamStatus::OUTPUT_ERROR),
                None,
            )
            .map_err(|e| EngineError::stream_open(&config.output.name, e))?;

        input_stream
            .play()
            .map_err(|e| EngineError::stream_open(&config.input.name, e))?;
        output_stream
            .play()
            .map_err(|e| EngineError::stream_open(&config.output.name, e))?;

        Ok(CpalDuplexStream {
            output: output_stream,
            input: input_stream,
        })
    }
}
