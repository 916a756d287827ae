//! Feed streams: one coalescing queue paired with one throttle timer.
//!
//! Each realtime edit category gets its own stream so that a burst on one
//! (say, a region drag) never delays another (a synth knob).

use std::hash::Hash;
use std::ops::{Deref, DerefMut};
use std::time::Instant;

use arrange_types::Patch;

use crate::coalesce::CoalescingQueue;
use crate::throttle::{Throttle, ThrottleInterval};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    RegionDrag,
    NoteDrag,
    TrackProperty,
    EffectChain,
    SynthParams,
    RecordingPreview,
}

impl StreamKind {
    pub const ALL: [StreamKind; 6] = [
        StreamKind::RegionDrag,
        StreamKind::NoteDrag,
        StreamKind::TrackProperty,
        StreamKind::EffectChain,
        StreamKind::SynthParams,
        StreamKind::RecordingPreview,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::RegionDrag => "region_drag",
            StreamKind::NoteDrag => "note_drag",
            StreamKind::TrackProperty => "track_property",
            StreamKind::EffectChain => "effect_chain",
            StreamKind::SynthParams => "synth_params",
            StreamKind::RecordingPreview => "recording_preview",
        }
    }
}

#[derive(Debug)]
pub struct FeedStream<K> {
    kind: StreamKind,
    queue: CoalescingQueue<K>,
    timer: Throttle,
}

impl<K: Eq + Hash + Clone> FeedStream<K> {
    pub fn new(kind: StreamKind, interval: ThrottleInterval) -> Self {
        Self {
            kind,
            queue: CoalescingQueue::new(),
            timer: Throttle::new(interval),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn pending(&self) -> &CoalescingQueue<K> {
        &self.queue
    }

    pub fn timer(&self) -> &Throttle {
        &self.timer
    }

    /// Enqueue a partial update and arm the timer if it is idle.
    pub fn push(&mut self, key: K, partial: Patch, now: Instant) {
        self.queue.enqueue(key, partial);
        self.timer.schedule(now);
    }

    /// Drop one key's pending update without touching the timer.
    pub fn discard(&mut self, key: &K) -> Option<Patch> {
        self.queue.remove(key)
    }

    /// If the deadline has passed, hand the window to `flush`. Returns the
    /// number of entries flushed.
    pub fn poll<F>(&mut self, now: Instant, flush: F) -> usize
    where
        F: FnOnce(Vec<(K, Patch)>),
    {
        if !self.timer.poll(now) {
            return 0;
        }
        self.emit(flush)
    }

    /// Disarm and flush immediately, regardless of the deadline.
    pub fn flush<F>(&mut self, flush: F) -> usize
    where
        F: FnOnce(Vec<(K, Patch)>),
    {
        self.timer.disarm();
        self.emit(flush)
    }

    /// Disarm without flushing and discard everything pending. Safe to call
    /// with nothing pending.
    pub fn cancel(&mut self) {
        self.timer.cancel();
        self.queue.clear();
    }

    /// Scope a gesture: the returned guard cancels the stream when dropped.
    pub fn gesture(&mut self) -> StreamGesture<'_, K> {
        StreamGesture { stream: self }
    }

    fn emit<F>(&mut self, flush: F) -> usize
    where
        F: FnOnce(Vec<(K, Patch)>),
    {
        // The window is taken before `flush` runs, so anything enqueued
        // afterwards starts the next window.
        let window = self.queue.take();
        let count = window.len();
        if count > 0 {
            log::debug!("flushing {} {} entries", count, self.kind.as_str());
            flush(window);
        }
        count
    }
}

/// Borrow of a [`FeedStream`] for the length of one gesture.
pub struct StreamGesture<'a, K: Eq + Hash + Clone> {
    stream: &'a mut FeedStream<K>,
}

impl<K: Eq + Hash + Clone> StreamGesture<'_, K> {
    /// End the gesture normally: flush the final values, then tear down.
    pub fn finish<F>(self, flush: F) -> usize
    where
        F: FnOnce(Vec<(K, Patch)>),
    {
        self.stream.flush(flush)
    }
}

impl<K: Eq + Hash + Clone> Deref for StreamGesture<'_, K> {
    type Target = FeedStream<K>;

    fn deref(&self) -> &Self::Target {
        self.stream
    }
}

impl<K: Eq + Hash + Clone> DerefMut for StreamGesture<'_, K> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.stream
    }
}

impl<K: Eq + Hash + Clone> Drop for StreamGesture<'_, K> {
    fn drop(&mut self) {
        self.stream.cancel();
    }
}
