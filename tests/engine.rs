use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use voxbridge::transform::{factory, BlockContext, Gain, Transform};
use voxbridge::{
    AudioBackend, BlockProcessor, DeviceDescriptor, Engine, EngineConfig, EngineError, StatusKind,
    StreamConfig, StreamFlags, StreamFormat, StreamStatus,
};

struct Running {
    processor: BlockProcessor,
    flags: Arc<StreamFlags>,
    channels: usize,
}

#[derive(Default)]
struct Shared {
    running: Mutex<Option<Running>>,
    opened: AtomicUsize,
    closed: AtomicUsize,
    fail_open: AtomicBool,
    fail_enumerate: AtomicBool,
}

/// Backend whose "sound server" is the test itself: every `tick` is one
/// block callback.
#[derive(Clone)]
struct ScriptedBackend {
    devices: Vec<DeviceDescriptor>,
    shared: Arc<Shared>,
}

impl ScriptedBackend {
    fn new(devices: Vec<DeviceDescriptor>) -> Self {
        Self {
            devices,
            shared: Arc::new(Shared::default()),
        }
    }

    /// Run one block callback. `None` if no stream is open.
    fn tick(&self, input: &[f32]) -> Option<Vec<f32>> {
        let mut guard = self.shared.running.lock().unwrap();
        let running = guard.as_mut()?;
        let mut output = vec![1.0; input.len() * running.channels];
        let status = running.flags.take();
        running
            .processor
            .process(status, input, &mut output, running.channels);
        Some(output)
    }

    fn raise(&self, status: StreamStatus) {
        if let Some(running) = self.shared.running.lock().unwrap().as_ref() {
            running.flags.raise(status);
        }
    }

    fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

struct ScriptedStream {
    shared: Arc<Shared>,
}

impl Drop for ScriptedStream {
    fn drop(&mut self) {
        // waits for a tick in progress, like a real backend joining its thread
        self.shared.running.lock().unwrap().take();
        self.shared.closed.fetch_add(1, Ordering::SeqCst);
    }
}

impl AudioBackend for ScriptedBackend {
    type Stream = ScriptedStream;

    fn enumerate(&self) -> voxbridge::Result<Vec<DeviceDescriptor>> {
        if self.shared.fail_enumerate.load(Ordering::SeqCst) {
            return Err(EngineError::DeviceEnumeration {
                reason: "sound server not running".into(),
            });
        }
        Ok(self.devices.clone())
    }

    fn open_duplex(
        &self,
        config: &StreamConfig,
        processor: BlockProcessor,
        flags: Arc<StreamFlags>,
    ) -> voxbridge::Result<ScriptedStream> {
        if self.shared.fail_open.load(Ordering::SeqCst) {
            return Err(EngineError::StreamOpen {
                device: config.output.name.clone(),
                reason: "device busy".into(),
            });
        }
        *self.shared.running.lock().unwrap() = Some(Running {
            processor,
            flags,
            channels: config.output.max_output_channels as usize,
        });
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedStream {
            shared: self.shared.clone(),
        })
    }
}

fn dev(index: usize, name: &str, host: &str, ins: u16, outs: u16) -> DeviceDescriptor {
    DeviceDescriptor {
        index,
        name: name.into(),
        host: host.into(),
        max_input_channels: ins,
        max_output_channels: outs,
    }
}

fn desktop() -> Vec<DeviceDescriptor> {
    vec![
        dev(0, "Built-in Mic", "ALSA", 2, 0),
        dev(1, "pipewire", "PipeWire", 64, 64),
        dev(2, "VoiceChanger Sink", "PipeWire", 0, 2),
        dev(3, "HDMI", "ALSA", 0, 8),
    ]
}

fn engine() -> (Engine<ScriptedBackend>, ScriptedBackend) {
    let backend = ScriptedBackend::new(desktop());
    (Engine::new(backend.clone(), EngineConfig::default()), backend)
}

fn first_input(engine: &Engine<ScriptedBackend>) -> DeviceDescriptor {
    engine.list_devices().unwrap().inputs[0].clone()
}

const SMALL: StreamFormat = StreamFormat {
    sample_rate: 48_000,
    block_size: 8,
};

#[test]
fn preferred_backends_are_listed_alone_when_complete() {
    let (engine, _) = engine();
    let list = engine.list_devices().unwrap();
    let inputs: Vec<_> = list.inputs.iter().map(|d| d.index).collect();
    let outputs: Vec<_> = list.outputs.iter().map(|d| d.index).collect();
    assert_eq!(inputs, vec![1]);
    assert_eq!(outputs, vec![1, 2]);
}

#[test]
fn enumeration_failure_is_an_error() {
    let (mut engine, backend) = engine();
    let input = first_input(&engine);
    backend.shared.fail_enumerate.store(true, Ordering::SeqCst);

    assert!(matches!(
        engine.list_devices(),
        Err(EngineError::DeviceEnumeration { .. })
    ));
    assert!(matches!(
        engine.start(&input, None, SMALL),
        Err(EngineError::DeviceEnumeration { .. })
    ));
    assert!(!engine.is_running());
}

#[test]
fn start_twice_opens_one_stream() {
    let (mut engine, backend) = engine();
    let input = first_input(&engine);

    engine.start(&input, None, SMALL).unwrap();
    engine.start(&input, None, SMALL).unwrap();

    assert!(engine.is_running());
    assert_eq!(backend.opened(), 1);
    assert_eq!(backend.closed(), 0);
}

#[test]
fn stop_when_idle_is_noop() {
    let (mut engine, backend) = engine();
    engine.stop();
    engine.stop();
    assert!(!engine.is_running());
    assert_eq!(backend.closed(), 0);
    assert!(engine.drain_status().is_empty());
}

#[test]
fn missing_output_resolves_to_virtual_sink() {
    let (mut engine, _) = engine();
    let input = first_input(&engine);
    engine.start(&input, None, StreamFormat::default()).unwrap();

    let config = engine.stream_config().unwrap();
    assert_eq!(config.output.name, "VoiceChanger Sink");
    assert_eq!(config.sample_rate(), 48_000);
    assert_eq!(config.block_size(), 512);
}

#[test]
fn no_output_anywhere_fails_and_stays_idle() {
    let backend = ScriptedBackend::new(vec![dev(0, "Mic", "ALSA", 1, 0)]);
    let mut engine = Engine::new(backend.clone(), EngineConfig::default());
    let input = first_input(&engine);

    let err = engine.start(&input, None, SMALL).unwrap_err();
    assert!(matches!(err, EngineError::NoOutputDevice { .. }));
    assert!(!engine.is_running());
    assert_eq!(backend.opened(), 0);
}

#[test]
fn open_failure_leaves_engine_restartable() {
    let (mut engine, backend) = engine();
    let input = first_input(&engine);

    backend.shared.fail_open.store(true, Ordering::SeqCst);
    let err = engine.start(&input, None, SMALL).unwrap_err();
    assert!(matches!(err, EngineError::StreamOpen { .. }));
    assert!(!engine.is_running());

    backend.shared.fail_open.store(false, Ordering::SeqCst);
    engine.start(&input, None, SMALL).unwrap();
    assert!(engine.is_running());
}

#[test]
fn invalid_format_is_rejected_before_opening() {
    let (mut engine, backend) = engine();
    let input = first_input(&engine);
    let err = engine
        .start(&input, None, StreamFormat::new(48_000, 0))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfig { .. }));
    assert_eq!(backend.opened(), 0);
}

#[test]
fn output_only_device_cannot_be_input() {
    let (mut engine, _) = engine();
    let sink = dev(2, "VoiceChanger Sink", "PipeWire", 0, 2);
    let err = engine.start(&sink, None, SMALL).unwrap_err();
    assert!(matches!(err, EngineError::StreamOpen { .. }));
}

#[test]
fn identity_round_trips_on_channel_zero() {
    let (mut engine, backend) = engine();
    let input = first_input(&engine);
    engine.start(&input, None, SMALL).unwrap();

    let block: Vec<f32> = (0..8).map(|i| (i as f32 * 0.7).sin()).collect();
    let output = backend.tick(&block).unwrap();

    assert_eq!(output.len(), 16);
    for (i, frame) in output.chunks_exact(2).enumerate() {
        assert_eq!(frame[0], block[i]);
        assert_eq!(frame[1], 0.0);
    }
}

#[test]
fn stop_ends_callbacks_and_releases_stream() {
    let (mut engine, backend) = engine();
    let input = first_input(&engine);
    engine.start(&input, None, SMALL).unwrap();
    assert!(backend.tick(&[0.0; 8]).is_some());

    engine.stop();
    assert!(!engine.is_running());
    assert!(engine.stream_config().is_none());
    assert_eq!(backend.closed(), 1);
    assert!(backend.tick(&[0.0; 8]).is_none());
}

#[test]
fn dropping_engine_stops_stream() {
    let (mut engine, backend) = engine();
    let input = first_input(&engine);
    engine.start(&input, None, SMALL).unwrap();
    drop(engine);
    assert_eq!(backend.closed(), 1);
}

#[test]
fn runtime_flags_are_reported_not_raised() {
    let (mut engine, backend) = engine();
    let input = first_input(&engine);
    engine.start(&input, None, SMALL).unwrap();

    backend.raise(StreamStatus::OUTPUT_UNDERRUN);
    backend.tick(&[0.0; 8]).unwrap();
    backend.raise(StreamStatus::INPUT_OVERRUN);
    backend.tick(&[0.0; 8]).unwrap();

    let kinds: Vec<_> = engine.drain_status().into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![StatusKind::OutputUnderrun, StatusKind::InputOverrun]);
    assert!(engine.is_running());
}

#[test]
fn flags_left_behind_by_a_dead_device_still_surface() {
    let (mut engine, backend) = engine();
    let input = first_input(&engine);
    engine.start(&input, None, SMALL).unwrap();

    // the device errored and no block callback ran afterwards
    backend.raise(StreamStatus::OUTPUT_ERROR);
    engine.stop();

    let kinds: Vec<_> = engine.drain_status().into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![StatusKind::OutputDeviceError]);
}

#[test]
fn sequence_numbers_increase_across_streams() {
    let (mut engine, backend) = engine();
    let input = first_input(&engine);

    engine.start(&input, None, SMALL).unwrap();
    backend.raise(StreamStatus::INPUT_OVERRUN);
    backend.tick(&[0.0; 8]).unwrap();
    engine.stop();

    engine.start(&input, None, SMALL).unwrap();
    backend.raise(StreamStatus::OUTPUT_UNDERRUN);
    backend.tick(&[0.0; 8]).unwrap();

    let events = engine.drain_status();
    assert_eq!(events.len(), 2);
    assert!(events[0].seq < events[1].seq);
    assert_eq!(events[1].kind, StatusKind::OutputUnderrun);
}

#[test]
fn later_drains_never_return_older_sequence_numbers() {
    let (mut engine, backend) = engine();
    let input = first_input(&engine);
    engine.start(&input, None, SMALL).unwrap();

    backend.raise(StreamStatus::INPUT_OVERRUN);
    backend.tick(&[0.0; 8]).unwrap();
    // not yet picked up by a block
    backend.raise(StreamStatus::OUTPUT_ERROR);
    let first = engine.drain_status();

    backend.raise(StreamStatus::OUTPUT_UNDERRUN);
    backend.tick(&[0.0; 8]).unwrap();
    let second = engine.drain_status();

    let kinds: Vec<_> = first.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![StatusKind::InputOverrun, StatusKind::OutputDeviceError]);
    assert!(first[0].seq < first[1].seq);
    assert_eq!(second.len(), 1);
    assert!(second[0].seq > first[1].seq);
}

#[test]
fn transform_set_while_idle_applies_on_start() {
    let (mut engine, backend) = engine();
    let input = first_input(&engine);
    engine
        .set_transform(factory(|_| Box::new(Gain::new(0.5).without_smoothing())))
        .unwrap();
    engine.start(&input, None, SMALL).unwrap();

    let output = backend.tick(&[1.0; 8]).unwrap();
    assert!(output.chunks_exact(2).all(|f| f[0] == 0.5 && f[1] == 0.0));
    // installed at start, not swapped
    assert!(engine.drain_status().is_empty());
}

#[test]
fn transform_swapped_while_running_applies_next_block() {
    let (mut engine, backend) = engine();
    let input = first_input(&engine);
    engine.start(&input, None, SMALL).unwrap();

    engine
        .set_transform(factory(|_| Box::new(Gain::new(2.0).without_smoothing())))
        .unwrap();
    let output = backend.tick(&[0.25; 8]).unwrap();
    assert!(output.chunks_exact(2).all(|f| f[0] == 0.5));

    let kinds: Vec<_> = engine.drain_status().into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![StatusKind::TransformSwapped]);
}

/// Writes its tag everywhere, but only if its state still agrees with it.
struct Tagged {
    tag: f32,
    state: Vec<f32>,
}

impl Transform for Tagged {
    fn process(&mut self, _ctx: &BlockContext, _input: &[f32], output: &mut [f32]) {
        for (i, o) in output.iter_mut().enumerate() {
            let s = self.state[i % self.state.len()];
            *o = if s == self.tag { self.tag } else { f32::NAN };
        }
    }
}

#[test]
fn concurrent_swaps_never_tear_transform_state() {
    let (mut engine, backend) = engine();
    let input = first_input(&engine);
    engine.start(&input, None, SMALL).unwrap();

    let ticker = {
        let backend = backend.clone();
        thread::spawn(move || {
            let mut last = 0.0f32;
            while last < 200.0 {
                let output = backend.tick(&[0.0; 8]).unwrap();
                let first = output[0];
                assert!(!first.is_nan(), "block saw a torn transform");
                assert!(
                    output.chunks_exact(2).all(|f| f[0] == first && f[1] == 0.0),
                    "block mixed two transforms"
                );
                assert!(first >= last, "swaps applied out of order");
                last = first;
            }
            last
        })
    };

    for tag in 1..=200u32 {
        let make = factory(move |ctx: &BlockContext| {
            Box::new(Tagged {
                tag: tag as f32,
                state: vec![tag as f32; ctx.block_size],
            })
        });
        loop {
            match engine.set_transform(make.clone()) {
                Ok(()) => break,
                Err(EngineError::SwapQueueFull) => {
                    engine.drain_status();
                    thread::yield_now();
                }
                Err(err) => panic!("unexpected error: {}", err),
            }
        }
    }

    // keep disposing of retired transforms so the last swap can land
    while !ticker.is_finished() {
        engine.drain_status();
        thread::yield_now();
    }
    let last = ticker.join().unwrap();
    assert_eq!(last, 200.0);

    engine.stop();
    assert_eq!(backend.closed(), 1);
}
