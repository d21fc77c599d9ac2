//! The active transform and the queues that replace it.
//!
//! The audio callback owns the [`TransformSlot`] outright, so reading the
//! active transform never takes a lock. Replacements travel from the control
//! thread through one ring buffer, and the transforms they displace travel
//! back through another to be dropped off the audio thread. Because a
//! replacement is only picked up between blocks, a block always runs start to
//! finish on a single transform and its state.

use core::mem;

use rtrb::{Consumer, Producer, RingBuffer};

use crate::transform::{BlockContext, Transform};

/// Create a slot holding `initial`, plus the handle used to replace it.
///
/// `capacity` bounds how many replacements can be in flight at once.
pub fn transform_slot(
    initial: Box<dyn Transform>,
    capacity: usize,
) -> (TransformSlot, TransformSwapper) {
    let capacity = capacity.max(1);
    let (pending_tx, pending_rx) = RingBuffer::new(capacity);
    let (retired_tx, retired_rx) = RingBuffer::new(capacity);
    (
        TransformSlot {
            active: initial,
            pending: pending_rx,
            retired: retired_tx,
        },
        TransformSwapper {
            pending: pending_tx,
            retired: retired_rx,
        },
    )
}

/// Audio-thread side: the transform currently in use.
pub struct TransformSlot {
    active: Box<dyn Transform>,
    pending: Consumer<Box<dyn Transform>>,
    retired: Producer<Box<dyn Transform>>,
}

impl TransformSlot {
    /// Install queued replacements, newest last. Call only between blocks.
    ///
    /// The displaced transform is handed back to the control thread rather
    /// than dropped here. If there is no room to hand it back, the swap waits
    /// for a later block.
    ///
    /// Returns `true` if the active transform changed.
    pub fn apply_pending(&mut self) -> bool {
        let mut swapped = false;
        while !self.retired.is_full() {
            let Ok(next) = self.pending.pop() else {
                break;
            };
            let old = mem::replace(&mut self.active, next);
            // room was checked above, this cannot fail
            let _ = self.retired.push(old);
            swapped = true;
        }
        swapped
    }

    /// Run the active transform on one block.
    #[inline]
    pub fn process(&mut self, ctx: &BlockContext, input: &[f32], output: &mut [f32]) {
        self.active.process(ctx, input, output);
    }

    /// Name of the active transform.
    pub fn active_name(&self) -> &'static str {
        self.active.name()
    }
}

/// Control-thread side: queues replacements and disposes of old transforms.
pub struct TransformSwapper {
    pending: Producer<Box<dyn Transform>>,
    retired: Consumer<Box<dyn Transform>>,
}

impl TransformSwapper {
    /// Queue `next` to replace the active transform at the next block.
    ///
    /// Returns `Err(next)` if too many replacements are already queued.
    pub fn swap(&mut self, next: Box<dyn Transform>) -> Result<(), Box<dyn Transform>> {
        self.collect_retired();
        self.pending
            .push(next)
            .map_err(|rtrb::PushError::Full(t)| t)
    }

    /// Drop every transform the audio thread has handed back.
    pub fn collect_retired(&mut self) -> usize {
        let mut count = 0;
        while let Ok(old) = self.retired.pop() {
            tracing::trace!(transform = old.name(), "dropping retired transform");
            drop(old);
            count += 1;
        }
        count
    }

    /// Number of replacements the audio thread has not picked up yet.
    pub fn pending(&self) -> usize {
        self.pending.buffer().capacity() - self.pending.slots()
    }
}
