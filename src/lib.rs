//! # voxbridge
//!
//! A real-time duplex audio engine: capture one channel from an input device,
//! run each block through a swappable [`Transform`](transform::Transform),
//! and play the result on an output device (typically a virtual sink other
//! applications record from).
//!
//! ## Quick Start
//!
//! ```no_run
//! use voxbridge::{Engine, EngineConfig, StreamFormat};
//! use voxbridge::transform::{factory, Gain};
//!
//! let mut engine = Engine::with_cpal(EngineConfig::default());
//! let devices = engine.list_devices().unwrap();
//!
//! engine.start(&devices.inputs[0], None, StreamFormat::default()).unwrap();
//! engine.set_transform(factory(|_| Box::new(Gain::new(0.5)))).unwrap();
//!
//! // poll from a timer
//! for event in engine.drain_status() {
//!     eprintln!("{}", event);
//! }
//!
//! engine.stop();
//! ```
//!
//! ## Design
//!
//! - One [`Engine`] handle per control surface, no global state
//! - The audio thread owns everything it touches: no locks, no allocation
//! - Control → audio traffic (transform swaps) and audio → control traffic
//!   (status events, retired transforms) go through [`rtrb`] ring buffers
//! - Setup problems are [`EngineError`]s, streaming problems are
//!   [`StatusEvent`]s

pub mod backend;
mod config;
mod device;
mod engine;
mod error;
pub mod processor;
pub mod slot;
pub mod status;
pub mod transform;

pub use backend::{AudioBackend, CpalBackend};
pub use config::{
    EngineConfig, StreamConfig, StreamFormat, DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE,
    DEFAULT_VIRTUAL_SINK,
};
pub use device::{DeviceDescriptor, DeviceList};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use processor::{BlockProcessor, StreamFlags, StreamStatus};
pub use status::{StatusEvent, StatusKind};
