//! Per-block transforms and the trait they implement.
//!
//! A transform is whatever sits between capture and playback: it receives one
//! mono block of input and fills one mono block of output of the same length.
//! The struct implementing [`Transform`] *is* its state, so swapping a
//! transform always swaps function and state together.
//!
//! Built-ins:
//! - [`Identity`] - pass-through, the default
//! - [`Gain`] - smoothed volume control
//! - [`FnTransform`] - wrap a closure, see [`from_fn`]

use std::sync::Arc;

mod gain;
mod identity;

pub use gain::Gain;
pub use identity::Identity;

/// Information available during block processing.
///
/// Passed to every [`Transform::process`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockContext {
    /// Sample rate of the stream in Hz.
    pub sample_rate: u32,
    /// Configured block size in frames. The blocks handed to a transform are
    /// never longer than this, but may be shorter if the device delivers
    /// partial periods.
    pub block_size: usize,
}

/// The core trait for per-block signal processing.
///
/// `process` runs on the real-time audio thread once per block. It must not
/// allocate, block, lock, or do I/O, and it should not panic. Allocate
/// everything the transform needs in its constructor, which the engine calls
/// on the control thread.
///
/// A panic in `process` mutes the stream until the next swap (see
/// [`BlockProcessor::process`](crate::BlockProcessor::process)). The
/// process-wide panic hook still runs first, on the audio thread, and the
/// default hook formats and prints a message there.
///
/// ```
/// use voxbridge::transform::{BlockContext, Transform};
///
/// /// Flips the polarity of the signal.
/// struct Invert;
///
/// impl Transform for Invert {
///     fn process(&mut self, _ctx: &BlockContext, input: &[f32], output: &mut [f32]) {
///         for (o, i) in output.iter_mut().zip(input) {
///             *o = -*i;
///         }
///     }
/// }
/// ```
pub trait Transform: Send + 'static {
    /// Process one block. `input.len() == output.len()`.
    fn process(&mut self, ctx: &BlockContext, input: &[f32], output: &mut [f32]);

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        "transform"
    }
}

impl Transform for Box<dyn Transform> {
    #[inline]
    fn process(&mut self, ctx: &BlockContext, input: &[f32], output: &mut [f32]) {
        (**self).process(ctx, input, output)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Builds a fresh transform (and so fresh state) for a stream.
///
/// Called on the control thread whenever a stream starts or a new transform is
/// installed, never on the audio thread.
pub type TransformFactory = Arc<dyn Fn(&BlockContext) -> Box<dyn Transform> + Send + Sync>;

/// Creates a [`TransformFactory`] from a closure.
///
/// ```
/// use voxbridge::transform::{factory, Gain};
///
/// let half = factory(|ctx| Box::new(Gain::new(0.5).with_smoothing_ms(5.0, ctx.sample_rate)));
/// ```
pub fn factory<F>(f: F) -> TransformFactory
where
    F: Fn(&BlockContext) -> Box<dyn Transform> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Factory for the pass-through transform.
pub fn identity_factory() -> TransformFactory {
    factory(|_| Box::new(Identity))
}

/// A transform backed by a closure.
pub struct FnTransform<F> {
    f: F,
}

/// Wrap a closure as a [`Transform`].
///
/// The closure keeps whatever state it captures, so build it fresh per stream
/// inside a [`TransformFactory`].
///
/// ```
/// use voxbridge::transform::{factory, from_fn};
///
/// let clip = factory(|_| {
///     Box::new(from_fn(|input: &[f32], output: &mut [f32]| {
///         for (o, i) in output.iter_mut().zip(input) {
///             *o = i.clamp(-0.5, 0.5);
///         }
///     }))
/// });
/// ```
pub fn from_fn<F>(f: F) -> FnTransform<F>
where
    F: FnMut(&[f32], &mut [f32]) + Send + 'static,
{
    FnTransform { f }
}

impl<F> Transform for FnTransform<F>
where
    F: FnMut(&[f32], &mut [f32]) + Send + 'static,
{
    #[inline]
    fn process(&mut self, _ctx: &BlockContext, input: &[f32], output: &mut [f32]) {
        (self.f)(input, output)
    }

    fn name(&self) -> &'static str {
        "closure"
    }
}
