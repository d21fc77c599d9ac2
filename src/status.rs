//! Status channel between the real-time callback and the control thread.
//!
//! A thin layer over an [`rtrb`] ring buffer. The producer half lives inside
//! the audio callback and must never block, so a full queue simply drops the
//! new event and bumps a counter. The consumer half is drained on a timer by
//! whoever drives the engine.
//!
//! The callback only records when something happened. Sequence numbers are
//! handed out on the control thread as events are drained, so they follow the
//! order in which the control thread sees events, across drains.

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rtrb::{Consumer, Producer, RingBuffer};

/// What went wrong (or changed) while streaming.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// Captured samples were lost because playback fell behind.
    InputOverrun,
    /// Playback ran out of captured samples and played silence.
    OutputUnderrun,
    /// The capture device reported an error (e.g. it was unplugged).
    InputDeviceError,
    /// The playback device reported an error.
    OutputDeviceError,
    /// A new transform was installed between blocks.
    TransformSwapped,
    /// The active transform panicked; output is silent until it is replaced.
    TransformFault,
}

impl StatusKind {
    /// Short human-readable description.
    pub fn describe(&self) -> &'static str {
        match self {
            StatusKind::InputOverrun => "input overflow",
            StatusKind::OutputUnderrun => "output underflow",
            StatusKind::InputDeviceError => "input device error",
            StatusKind::OutputDeviceError => "output device error",
            StatusKind::TransformSwapped => "transform swapped",
            StatusKind::TransformFault => "transform failed, output muted",
        }
    }
}

/// One diagnostic event.
///
/// Plain `Copy` data so the callback can build one without allocating.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusEvent {
    /// Engine-wide sequence number, strictly increasing in drain order.
    pub seq: u64,
    /// Time since the engine was created, taken when the event happened.
    pub elapsed: Duration,
    pub kind: StatusKind,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} +{:.3}s {}",
            self.seq,
            self.elapsed.as_secs_f64(),
            self.kind.describe()
        )
    }
}

/// Shared sequence counter and clock origin for status events.
#[derive(Debug)]
pub struct StatusClock {
    epoch: Instant,
    next_seq: AtomicU64,
}

impl StatusClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            epoch: Instant::now(),
            next_seq: AtomicU64::new(0),
        })
    }

    /// Stamp an event happening now with the next sequence number.
    ///
    /// Control thread only.
    #[inline]
    pub fn stamp(&self, kind: StatusKind) -> StatusEvent {
        self.stamp_at(kind, self.elapsed())
    }

    /// Time since the clock was created.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn stamp_at(&self, kind: StatusKind, elapsed: Duration) -> StatusEvent {
        StatusEvent {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            elapsed,
            kind,
        }
    }
}

/// What travels through the ring: an event without its sequence number.
#[derive(Clone, Copy, Debug)]
struct Occurrence {
    elapsed: Duration,
    kind: StatusKind,
}

/// Create a bounded status channel with room for `capacity` events.
pub fn status_channel(capacity: usize, clock: Arc<StatusClock>) -> (StatusSender, StatusReceiver) {
    let (producer, consumer) = RingBuffer::new(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        StatusSender {
            producer,
            clock: clock.clone(),
            dropped: dropped.clone(),
        },
        StatusReceiver {
            consumer,
            clock,
            dropped,
            dropped_seen: 0,
        },
    )
}

/// Producer half, owned by the real-time callback.
pub struct StatusSender {
    producer: Producer<Occurrence>,
    clock: Arc<StatusClock>,
    dropped: Arc<AtomicU64>,
}

impl StatusSender {
    /// Queue an event. Never blocks; returns `false` if it was dropped.
    #[inline]
    pub fn push(&mut self, kind: StatusKind) -> bool {
        if self.producer.is_full() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let event = Occurrence {
            elapsed: self.clock.elapsed(),
            kind,
        };
        match self.producer.push(event) {
            Ok(()) => true,
            Err(rtrb::PushError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Consumer half, drained by the control thread.
pub struct StatusReceiver {
    consumer: Consumer<Occurrence>,
    clock: Arc<StatusClock>,
    dropped: Arc<AtomicU64>,
    dropped_seen: u64,
}

impl StatusReceiver {
    /// Remove and return every queued event, oldest first, numbering them
    /// as they come out.
    pub fn drain(&mut self) -> Vec<StatusEvent> {
        let mut events = Vec::with_capacity(self.consumer.slots());
        while let Ok(event) = self.consumer.pop() {
            events.push(self.clock.stamp_at(event.kind, event.elapsed));
        }

        let dropped = self.dropped.load(Ordering::Relaxed);
        if dropped > self.dropped_seen {
            tracing::warn!(
                dropped = dropped - self.dropped_seen,
                "status channel full, events were dropped"
            );
            self.dropped_seen = dropped;
        }

        events
    }

    /// Total number of events dropped because the channel was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the producer half is gone (its stream was torn down).
    pub fn is_abandoned(&self) -> bool {
        self.consumer.is_abandoned()
    }
}
