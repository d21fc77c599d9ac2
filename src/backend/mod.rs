//! Audio subsystem backends.
//!
//! The engine never touches an OS audio API directly. It asks an
//! [`AudioBackend`] for the devices it can see and for a running duplex stream
//! that drives a [`BlockProcessor`]. [`CpalBackend`] is the real one; tests
//! plug in scripted backends.

use std::sync::Arc;

use crate::config::StreamConfig;
use crate::device::DeviceDescriptor;
use crate::error::Result;
use crate::processor::{BlockProcessor, StreamFlags};

mod cpal_duplex;

pub use cpal_duplex::{CpalBackend, CpalDuplexStream};

/// Source of devices and duplex streams.
pub trait AudioBackend {
    /// A running duplex stream.
    ///
    /// Dropping it must stop all callbacks and wait for one in flight to
    /// return, after which the processor it was given is gone.
    type Stream;

    /// Every device the subsystem reports, in enumeration order.
    ///
    /// `index` is the position in the returned vector. Devices need not be
    /// capable in either direction; filtering happens in
    /// [`DeviceList::from_snapshot`](crate::DeviceList::from_snapshot).
    fn enumerate(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Open and start a duplex stream for `config`.
    ///
    /// Each block the stream hands `processor` one block of mono input and
    /// the output buffer to fill. Conditions noticed outside the block
    /// callback (overruns, device errors) are raised on `flags`.
    fn open_duplex(
        &self,
        config: &StreamConfig,
        processor: BlockProcessor,
        flags: Arc<StreamFlags>,
    ) -> Result<Self::Stream>;
}
