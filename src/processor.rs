//! The body of the real-time callback.
//!
//! [`BlockProcessor`] is everything the audio thread does once per block,
//! independent of how the block got there. Backends feed it a mono input
//! block plus the status flags they observed, and it fills the interleaved
//! output buffer. Keeping it free of device plumbing means it can be driven
//! from a test loop exactly as a sound server would drive it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::slot::TransformSlot;
use crate::status::{StatusKind, StatusSender};
use crate::transform::BlockContext;

/// Conditions observed by the backend since the last block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StreamStatus(u8);

impl StreamStatus {
    pub const INPUT_OVERRUN: StreamStatus = StreamStatus(1 << 0);
    pub const OUTPUT_UNDERRUN: StreamStatus = StreamStatus(1 << 1);
    pub const INPUT_ERROR: StreamStatus = StreamStatus(1 << 2);
    pub const OUTPUT_ERROR: StreamStatus = StreamStatus(1 << 3);

    const ALL: [(StreamStatus, StatusKind); 4] = [
        (Self::INPUT_OVERRUN, StatusKind::InputOverrun),
        (Self::OUTPUT_UNDERRUN, StatusKind::OutputUnderrun),
        (Self::INPUT_ERROR, StatusKind::InputDeviceError),
        (Self::OUTPUT_ERROR, StatusKind::OutputDeviceError),
    ];

    #[inline]
    pub fn empty() -> Self {
        StreamStatus(0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn contains(&self, other: StreamStatus) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn union(self, other: StreamStatus) -> StreamStatus {
        StreamStatus(self.0 | other.0)
    }

    /// The status kinds set in this value, in a fixed order.
    pub fn kinds(self) -> impl Iterator<Item = StatusKind> {
        Self::ALL
            .into_iter()
            .filter(move |(flag, _)| self.contains(*flag))
            .map(|(_, kind)| kind)
    }
}

/// Status flags shared between the stream callbacks of one stream.
///
/// Input and error callbacks may run on other threads than the block
/// callback, so they only raise bits here; the block callback takes them and
/// turns them into events.
#[derive(Debug, Default)]
pub struct StreamFlags(AtomicU8);

impl StreamFlags {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline]
    pub fn raise(&self, status: StreamStatus) {
        self.0.fetch_or(status.0, Ordering::Relaxed);
    }

    /// Take and clear every raised flag.
    #[inline]
    pub fn take(&self) -> StreamStatus {
        StreamStatus(self.0.swap(0, Ordering::Relaxed))
    }
}

/// Runs one block: report status, pick up swaps, transform, write channel 0.
pub struct BlockProcessor {
    ctx: BlockContext,
    slot: TransformSlot,
    status: StatusSender,
    scratch: Vec<f32>,
    /// Set when the active transform panicked; cleared by the next swap.
    faulted: bool,
}

impl BlockProcessor {
    pub fn new(ctx: BlockContext, slot: TransformSlot, status: StatusSender) -> Self {
        Self {
            scratch: vec![0.0; ctx.block_size.max(1)],
            ctx,
            slot,
            status,
            faulted: false,
        }
    }

    #[inline]
    pub fn context(&self) -> &BlockContext {
        &self.ctx
    }

    /// Process one block.
    ///
    /// `input` is mono, `output` is interleaved with `channels` channels.
    /// Only `min(input frames, output frames, block size)` frames carry
    /// signal; everything else in `output` is silence. Never allocates.
    ///
    /// # Panicking transforms
    ///
    /// The panic is caught, the block and every block after it are silent,
    /// and one [`StatusKind::TransformFault`] is queued. The panic hook runs
    /// before the unwind is caught, so replace the default hook if transforms
    /// may panic and nothing should be printed from the audio thread:
    ///
    /// ```
    /// use std::panic;
    /// use voxbridge::processor::{BlockProcessor, StreamStatus};
    /// use voxbridge::slot::transform_slot;
    /// use voxbridge::status::{status_channel, StatusClock, StatusKind};
    /// use voxbridge::transform::{from_fn, BlockContext};
    ///
    /// panic::set_hook(Box::new(|_| {}));
    ///
    /// let ctx = BlockContext { sample_rate: 48_000, block_size: 2 };
    /// let faulty = from_fn(|_: &[f32], _: &mut [f32]| panic!("bad block"));
    /// let (slot, _swapper) = transform_slot(Box::new(faulty), 1);
    /// let (tx, mut rx) = status_channel(4, StatusClock::new());
    /// let mut processor = BlockProcessor::new(ctx, slot, tx);
    ///
    /// let mut out = [1.0; 2];
    /// processor.process(StreamStatus::empty(), &[0.5, 0.5], &mut out, 1);
    /// assert_eq!(out, [0.0, 0.0]);
    /// assert_eq!(rx.drain()[0].kind, StatusKind::TransformFault);
    ///
    /// let _ = panic::take_hook();
    /// ```
    pub fn process(
        &mut self,
        status: StreamStatus,
        input: &[f32],
        output: &mut [f32],
        channels: usize,
    ) {
        for kind in status.kinds() {
            self.status.push(kind);
        }

        if self.slot.apply_pending() {
            self.faulted = false;
            self.status.push(StatusKind::TransformSwapped);
        }

        let channels = channels.max(1);
        let frames = (output.len() / channels)
            .min(input.len())
            .min(self.scratch.len());

        output.fill(0.0);
        if self.faulted || frames == 0 {
            return;
        }

        let ctx = &self.ctx;
        let slot = &mut self.slot;
        let block = &mut self.scratch[..frames];
        let input = &input[..frames];
        let result = panic::catch_unwind(AssertUnwindSafe(|| slot.process(ctx, input, block)));
        if result.is_err() {
            self.faulted = true;
            self.status.push(StatusKind::TransformFault);
            return;
        }

        for (frame, &sample) in output.chunks_exact_mut(channels).zip(block.iter()) {
            frame[0] = sample;
        }
    }
}
