//! Lock requests and lock messages.
//!
//! The room owner arbitrates: members send `lock_acquire`, the owner answers
//! with `lock_acquired` (grant, broadcast to everyone) or `lock_conflict`.
//! Members record their own request optimistically and roll it back if the
//! owner reports a conflict.

use log::{debug, info};

use arrange_types::UserId;

use super::{PeerRole, SyncDispatcher, SyncEvent};
use crate::lock_id::{LockId, LockTarget};
use crate::locks::{now_millis, AcquireResult, LockKind, LockRecord, LockStatus};
use crate::protocol::ArrangeMessage;
use crate::store::StateStore;
use crate::transport::Transport;

impl<T: Transport, S: StateStore> SyncDispatcher<T, S> {
    /// Ask for exclusive write access to an element. A conflict is reported
    /// both in the result and as a [`SyncEvent::LockConflict`].
    pub fn acquire_lock(&mut self, target: &LockTarget) -> AcquireResult {
        let lock_id = target.lock_id();
        let result = self
            .locks
            .acquire(lock_id.clone(), target.kind(), &self.local_user, now_millis());
        match &result {
            AcquireResult::Granted(record) => {
                debug!("acquired {}", lock_id);
                self.announce_lock(record.clone());
            }
            AcquireResult::Renewed(_) => {}
            AcquireResult::Conflict { lock_id, holder } => {
                debug!("{} already held by {}", lock_id, holder);
                self.events.push(SyncEvent::LockConflict {
                    lock_id: lock_id.clone(),
                    holder: holder.clone(),
                });
            }
        }
        result
    }

    /// Give up a lock. Returns false if the local user did not hold it.
    pub fn release_lock(&mut self, target: &LockTarget) -> bool {
        let lock_id = target.lock_id();
        if !self.locks.release(&lock_id, &self.local_user) {
            return false;
        }
        debug!("released {}", lock_id);
        let message = match self.role {
            PeerRole::Owner => ArrangeMessage::LockReleased {
                element_id: lock_id,
                user_id: self.local_user.clone(),
            },
            PeerRole::Member => ArrangeMessage::LockRelease { element_id: lock_id },
        };
        self.send_now(message);
        true
    }

    pub fn lock_status(&self, target: &LockTarget) -> LockStatus {
        self.locks.status(&target.lock_id(), &self.local_user)
    }

    /// Every lock currently known, sorted by id.
    pub fn locks(&self) -> Vec<LockRecord> {
        self.locks.snapshot()
    }

    pub(super) fn on_lock_acquire(
        &mut self,
        sender: &UserId,
        element_id: LockId,
        kind: LockKind,
        acquired_at: u64,
    ) {
        match self.role {
            PeerRole::Owner => {
                match self.locks.acquire(element_id.clone(), kind, sender, acquired_at) {
                    AcquireResult::Granted(record) | AcquireResult::Renewed(record) => {
                        self.send_now(ArrangeMessage::LockAcquired {
                            element_id: record.lock_id,
                            kind: record.kind,
                            user_id: record.holder_user_id,
                            acquired_at: record.acquired_at,
                        });
                    }
                    AcquireResult::Conflict { lock_id, holder } => {
                        info!("refusing {} to {}: held by {}", lock_id, sender, holder);
                        self.send_now(ArrangeMessage::LockConflict {
                            element_id: lock_id,
                            holder_id: holder,
                            requester_id: sender.clone(),
                        });
                    }
                }
            }
            PeerRole::Member => {
                // Mirror the request; the owner's answer is authoritative.
                if let AcquireResult::Conflict { lock_id, holder } =
                    self.locks.acquire(element_id, kind, sender, acquired_at)
                {
                    debug!("{} requested {} held by {}", sender, lock_id, holder);
                }
            }
        }
    }

    pub(super) fn on_lock_release(&mut self, sender: &UserId, element_id: LockId) {
        if !self.locks.release(&element_id, sender) {
            return;
        }
        if self.role == PeerRole::Owner {
            self.send_now(ArrangeMessage::LockReleased {
                element_id: element_id.clone(),
                user_id: sender.clone(),
            });
        }
        self.events.push(SyncEvent::LockReleased {
            lock_id: element_id,
            holder: sender.clone(),
        });
    }

    pub(super) fn on_lock_acquired(
        &mut self,
        element_id: LockId,
        kind: LockKind,
        user_id: UserId,
        acquired_at: u64,
    ) {
        let record = LockRecord {
            lock_id: element_id.clone(),
            holder_user_id: user_id.clone(),
            kind,
            acquired_at,
        };
        if let Some(previous) = self.locks.insert(record) {
            if previous.holder_user_id == self.local_user && user_id != self.local_user {
                info!("lost {} to {}", element_id, user_id);
                self.events.push(SyncEvent::LockLost {
                    lock_id: element_id,
                    holder: user_id,
                });
            }
        }
    }

    pub(super) fn on_lock_released(&mut self, element_id: LockId, user_id: UserId) {
        if self.locks.release(&element_id, &user_id) {
            self.events.push(SyncEvent::LockReleased {
                lock_id: element_id,
                holder: user_id,
            });
        }
    }

    pub(super) fn on_lock_conflict(
        &mut self,
        element_id: LockId,
        holder: UserId,
        requester: UserId,
    ) {
        if requester != self.local_user {
            return;
        }
        if self.locks.status(&element_id, &self.local_user) == LockStatus::LockedByMe {
            self.locks.remove(&element_id);
        }
        info!("lock {} refused, held by {}", element_id, holder);
        self.events.push(SyncEvent::LockConflict {
            lock_id: element_id,
            holder,
        });
    }

    /// Tell the room the local user holds `record`: a grant from the owner,
    /// a request from a member.
    fn announce_lock(&mut self, record: LockRecord) {
        let message = match self.role {
            PeerRole::Owner => ArrangeMessage::LockAcquired {
                element_id: record.lock_id,
                kind: record.kind,
                user_id: record.holder_user_id,
                acquired_at: record.acquired_at,
            },
            PeerRole::Member => ArrangeMessage::LockAcquire {
                element_id: record.lock_id,
                kind: record.kind,
                acquired_at: record.acquired_at,
            },
        };
        self.send_now(message);
    }

    /// Re-announce own locks past half the timeout so peers never expire
    /// them while they are still held.
    pub(super) fn renew_own_locks(&mut self) {
        let Some(timeout) = self.lock_timeout else {
            return;
        };
        let renewed = self
            .locks
            .renew_held(&self.local_user, now_millis(), timeout / 2);
        for record in renewed {
            debug!("renewing {}", record.lock_id);
            self.announce_lock(record);
        }
    }

    /// Drop other users' locks held longer than the configured timeout.
    pub(super) fn expire_locks(&mut self) {
        let Some(timeout) = self.lock_timeout else {
            return;
        };
        for record in self.locks.expire(now_millis(), timeout, &self.local_user) {
            info!("lock {} of {} expired", record.lock_id, record.holder_user_id);
            self.events.push(SyncEvent::LockReleased {
                lock_id: record.lock_id,
                holder: record.holder_user_id,
            });
        }
    }

    pub(super) fn release_locks_of(&mut self, user: &UserId) {
        for record in self.locks.release_all(user) {
            debug!("releasing {} held by departed {}", record.lock_id, user);
            self.events.push(SyncEvent::LockReleased {
                lock_id: record.lock_id,
                holder: record.holder_user_id,
            });
        }
    }
}
