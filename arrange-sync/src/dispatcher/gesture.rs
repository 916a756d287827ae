//! Scoped continuous edits.
//!
//! A gesture holds the element's lock for as long as the user drags, and
//! guarantees the stream is either flushed ([`Gesture::finish`]) or cancelled
//! (drop) when it ends, so a drag never leaves half a burst queued.

use std::ops::{Deref, DerefMut};

use super::{LockConflict, SyncDispatcher};
use crate::lock_id::LockTarget;
use crate::locks::AcquireResult;
use crate::store::StateStore;
use crate::stream::StreamKind;
use crate::transport::Transport;

pub struct Gesture<'a, T: Transport, S: StateStore> {
    dispatcher: &'a mut SyncDispatcher<T, S>,
    kind: StreamKind,
    lock: Option<LockTarget>,
}

impl<T: Transport, S: StateStore> SyncDispatcher<T, S> {
    /// Lock `target` and start a continuous edit on the `kind` stream.
    pub fn begin_gesture(
        &mut self,
        kind: StreamKind,
        target: LockTarget,
    ) -> Result<Gesture<'_, T, S>, LockConflict> {
        match self.acquire_lock(&target) {
            AcquireResult::Granted(_) | AcquireResult::Renewed(_) => Ok(Gesture {
                dispatcher: self,
                kind,
                lock: Some(target),
            }),
            AcquireResult::Conflict { lock_id, holder } => Err(LockConflict { lock_id, holder }),
        }
    }
}

impl<T: Transport, S: StateStore> Gesture<'_, T, S> {
    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// End the gesture: send the final value now, then release the lock.
    pub fn finish(mut self) -> usize {
        let sent = self.dispatcher.flush_stream(self.kind);
        if let Some(target) = self.lock.take() {
            self.dispatcher.release_lock(&target);
        }
        sent
    }
}

impl<T: Transport, S: StateStore> Deref for Gesture<'_, T, S> {
    type Target = SyncDispatcher<T, S>;

    fn deref(&self) -> &Self::Target {
        self.dispatcher
    }
}

impl<T: Transport, S: StateStore> DerefMut for Gesture<'_, T, S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.dispatcher
    }
}

impl<T: Transport, S: StateStore> Drop for Gesture<'_, T, S> {
    fn drop(&mut self) {
        // Abandoned without finish().
        if let Some(target) = self.lock.take() {
            self.dispatcher.cancel_stream(self.kind);
            self.dispatcher.release_lock(&target);
        }
    }
}
