//! Device discovery and selection.
//!
//! Backends report every device they can see as a flat list of
//! [`DeviceDescriptor`]s in enumeration order. [`DeviceList::from_snapshot`]
//! turns that into the input and output choices shown to a user.
//!
//! # Example: List Devices and Pick the Virtual Sink
//!
//! ```no_run
//! use voxbridge::{Engine, EngineConfig};
//!
//! let engine = Engine::with_cpal(EngineConfig::default());
//! let devices = engine.list_devices().unwrap();
//! for device in &devices.inputs {
//!     println!("[{}] {} ({})", device.index, device.name, device.host);
//! }
//! let sink = devices.find_preferred_output("VoiceChanger Sink");
//! ```

use crate::config::EngineConfig;

/// One device as seen by one enumeration.
///
/// The `index` only means something within the snapshot it came from. A fresh
/// enumeration may number devices differently, so never keep indices across
/// refreshes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// Ordinal within the enumeration snapshot.
    pub index: usize,
    /// Human-readable device name.
    pub name: String,
    /// Name of the host backend the device is attached through.
    pub host: String,
    pub max_input_channels: u16,
    pub max_output_channels: u16,
}

impl DeviceDescriptor {
    #[inline]
    pub fn is_input(&self) -> bool {
        self.max_input_channels > 0
    }

    #[inline]
    pub fn is_output(&self) -> bool {
        self.max_output_channels > 0
    }
}

/// Input and output choices from one snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceList {
    pub inputs: Vec<DeviceDescriptor>,
    pub outputs: Vec<DeviceDescriptor>,
}

impl DeviceList {
    /// Filter a raw enumeration snapshot.
    ///
    /// Devices on a preferred host backend come first. Only when that leaves
    /// either direction empty does a second pass over every backend append
    /// the remaining capable devices, skipping indices already collected.
    pub fn from_snapshot(snapshot: &[DeviceDescriptor], config: &EngineConfig) -> Self {
        let mut list = DeviceList::default();

        for device in snapshot.iter().filter(|d| config.is_preferred_backend(&d.host)) {
            if device.is_input() {
                list.inputs.push(device.clone());
            }
            if device.is_output() {
                list.outputs.push(device.clone());
            }
        }

        if list.inputs.is_empty() || list.outputs.is_empty() {
            if snapshot.iter().any(|d| config.is_preferred_backend(&d.host)) {
                tracing::warn!(
                    preferred_inputs = list.inputs.len(),
                    preferred_outputs = list.outputs.len(),
                    backends = ?config.preferred_backends,
                    "preferred host backends incomplete, scanning all devices"
                );
            } else {
                // the usual case on a plain ALSA build of cpal
                tracing::debug!(
                    backends = ?config.preferred_backends,
                    "no preferred host backend present, listing all devices"
                );
            }

            for device in snapshot {
                if device.is_input() && !contains_index(&list.inputs, device.index) {
                    list.inputs.push(device.clone());
                }
                if device.is_output() && !contains_index(&list.outputs, device.index) {
                    list.outputs.push(device.clone());
                }
            }
        }

        list
    }

    /// Whether no device was found in either direction.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty()
    }

    /// First output whose name contains `pattern`, else the first output.
    ///
    /// Substring matching lets a virtual sink be found without depending on
    /// the exact name the sound server decorates it with.
    pub fn find_preferred_output(&self, pattern: &str) -> Option<&DeviceDescriptor> {
        self.outputs
            .iter()
            .find(|d| d.name.contains(pattern))
            .or_else(|| self.outputs.first())
    }

    /// Look up an input by exact index or, failing that, by name substring.
    pub fn find_input(&self, query: &str) -> Option<&DeviceDescriptor> {
        find_by_query(&self.inputs, query)
    }

    /// Look up an output by exact index or, failing that, by name substring.
    pub fn find_output(&self, query: &str) -> Option<&DeviceDescriptor> {
        find_by_query(&self.outputs, query)
    }
}

fn contains_index(list: &[DeviceDescriptor], index: usize) -> bool {
    list.iter().any(|d| d.index == index)
}

fn find_by_query<'a>(list: &'a [DeviceDescriptor], query: &str) -> Option<&'a DeviceDescriptor> {
    if let Ok(index) = query.trim().parse::<usize>() {
        if let Some(device) = list.iter().find(|d| d.index == index) {
            return Some(device);
        }
    }
    list.iter().find(|d| d.name.contains(query))
}
