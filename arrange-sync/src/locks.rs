//! Advisory per-element lock table.
//!
//! At most one record exists per lock id. Holding a record gives its holder
//! exclusive write permission over the element; every peer consults its own
//! table before letting a local edit through.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use arrange_types::UserId;

use crate::lock_id::LockId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockKind {
    Region,
    Track,
    TrackProperty,
    Note,
    Sustain,
    Control,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    pub lock_id: LockId,
    pub holder_user_id: UserId,
    pub kind: LockKind,
    /// Milliseconds since the Unix epoch.
    pub acquired_at: u64,
}

/// Outcome of an acquire attempt. A conflict is an ordinary answer, not an error.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireResult {
    Granted(LockRecord),
    /// Already held by the same user; the timestamp was refreshed.
    Renewed(LockRecord),
    Conflict { lock_id: LockId, holder: UserId },
}

impl AcquireResult {
    pub fn is_granted(&self) -> bool {
        !matches!(self, AcquireResult::Conflict { .. })
    }

    pub fn holder(&self) -> &UserId {
        match self {
            AcquireResult::Granted(r) | AcquireResult::Renewed(r) => &r.holder_user_id,
            AcquireResult::Conflict { holder, .. } => holder,
        }
    }
}

/// Lock state of an element from the local user's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockStatus {
    Unlocked,
    LockedByMe,
    LockedByOther(UserId),
}

#[derive(Debug, Default)]
pub struct LockTable {
    records: HashMap<LockId, LockRecord>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(
        &mut self,
        lock_id: LockId,
        kind: LockKind,
        user: &UserId,
        now: u64,
    ) -> AcquireResult {
        if let Some(existing) = self.records.get_mut(&lock_id) {
            if &existing.holder_user_id != user {
                return AcquireResult::Conflict {
                    lock_id,
                    holder: existing.holder_user_id.clone(),
                };
            }
            existing.acquired_at = now;
            return AcquireResult::Renewed(existing.clone());
        }
        let record = LockRecord {
            lock_id: lock_id.clone(),
            holder_user_id: user.clone(),
            kind,
            acquired_at: now,
        };
        self.records.insert(lock_id, record.clone());
        AcquireResult::Granted(record)
    }

    /// Remove the record only if `user` holds it.
    pub fn release(&mut self, lock_id: &LockId, user: &UserId) -> bool {
        match self.records.get(lock_id) {
            Some(record) if &record.holder_user_id == user => {
                self.records.remove(lock_id);
                true
            }
            _ => false,
        }
    }

    pub fn is_locked(&self, lock_id: &LockId) -> Option<&LockRecord> {
        self.records.get(lock_id)
    }

    pub fn status(&self, lock_id: &LockId, local: &UserId) -> LockStatus {
        match self.records.get(lock_id) {
            None => LockStatus::Unlocked,
            Some(r) if &r.holder_user_id == local => LockStatus::LockedByMe,
            Some(r) => LockStatus::LockedByOther(r.holder_user_id.clone()),
        }
    }

    /// Write a record received from a peer, replacing whatever was there.
    pub fn insert(&mut self, record: LockRecord) -> Option<LockRecord> {
        self.records.insert(record.lock_id.clone(), record)
    }

    /// Remove a record unconditionally.
    pub fn remove(&mut self, lock_id: &LockId) -> Option<LockRecord> {
        self.records.remove(lock_id)
    }

    /// Release every lock held by `user` (they left the room).
    pub fn release_all(&mut self, user: &UserId) -> Vec<LockRecord> {
        self.drain_where(|r| &r.holder_user_id == user)
    }

    /// Drop records older than `timeout` at time `now` (epoch millis).
    /// Records held by `local` never expire here; their holder renews them.
    pub fn expire(&mut self, now: u64, timeout: Duration, local: &UserId) -> Vec<LockRecord> {
        let max_age = timeout.as_millis() as u64;
        self.drain_where(|r| {
            &r.holder_user_id != local && now.saturating_sub(r.acquired_at) > max_age
        })
    }

    /// Refresh every record of `user` at least `age` old and return the
    /// refreshed records.
    pub fn renew_held(&mut self, user: &UserId, now: u64, age: Duration) -> Vec<LockRecord> {
        let min_age = age.as_millis() as u64;
        let mut renewed: Vec<LockRecord> = self
            .records
            .values_mut()
            .filter(|r| {
                &r.holder_user_id == user && now.saturating_sub(r.acquired_at) >= min_age
            })
            .map(|r| {
                r.acquired_at = now;
                r.clone()
            })
            .collect();
        renewed.sort_by(|a, b| a.lock_id.cmp(&b.lock_id));
        renewed
    }

    /// Records sorted by lock id.
    pub fn snapshot(&self) -> Vec<LockRecord> {
        let mut records: Vec<LockRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.lock_id.cmp(&b.lock_id));
        records
    }

    /// Replace the whole table (full-state resync).
    pub fn replace(&mut self, records: Vec<LockRecord>) {
        self.records = records
            .into_iter()
            .map(|r| (r.lock_id.clone(), r))
            .collect();
    }

    pub fn held_by(&self, user: &UserId) -> Vec<&LockRecord> {
        self.records
            .values()
            .filter(|r| &r.holder_user_id == user)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn drain_where<F>(&mut self, mut pred: F) -> Vec<LockRecord>
    where
        F: FnMut(&LockRecord) -> bool,
    {
        let ids: Vec<LockId> = self
            .records
            .values()
            .filter(|r| pred(r))
            .map(|r| r.lock_id.clone())
            .collect();
        ids.iter().filter_map(|id| self.records.remove(id)).collect()
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    fn lock(id: &str) -> LockId {
        LockId::new(id)
    }

    #[test]
    fn second_user_conflicts_and_holder_stays() {
        let mut table = LockTable::new();
        assert!(matches!(
            table.acquire(lock("L"), LockKind::Region, &user("A"), 1),
            AcquireResult::Granted(_)
        ));
        match table.acquire(lock("L"), LockKind::Region, &user("B"), 2) {
            AcquireResult::Conflict { holder, .. } => assert_eq!(holder, user("A")),
            other => panic!("expected conflict, got {:?}", other),
        }
        assert_eq!(table.is_locked(&lock("L")).unwrap().holder_user_id, user("A"));
    }

    #[test]
    fn reacquire_by_holder_renews_without_duplicate() {
        let mut table = LockTable::new();
        let _ = table.acquire(lock("L"), LockKind::Region, &user("A"), 1);
        match table.acquire(lock("L"), LockKind::Region, &user("A"), 5) {
            AcquireResult::Renewed(r) => assert_eq!(r.acquired_at, 5),
            other => panic!("expected renewal, got {:?}", other),
        }
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn release_requires_holder() {
        let mut table = LockTable::new();
        let _ = table.acquire(lock("L"), LockKind::Region, &user("A"), 1);
        assert!(!table.release(&lock("L"), &user("B")));
        assert!(table.is_locked(&lock("L")).is_some());
        assert!(table.release(&lock("L"), &user("A")));
        assert!(table.is_locked(&lock("L")).is_none());
    }

    #[test]
    fn acquire_release_acquire_scenario() {
        let mut table = LockTable::new();
        assert!(table.acquire(lock("region-1"), LockKind::Region, &user("userA"), 1).is_granted());
        let conflict = table.acquire(lock("region-1"), LockKind::Region, &user("userB"), 2);
        assert!(!conflict.is_granted());
        assert_eq!(conflict.holder(), &user("userA"));
        assert!(table.release(&lock("region-1"), &user("userA")));
        assert!(table.acquire(lock("region-1"), LockKind::Region, &user("userB"), 3).is_granted());
    }

    #[test]
    fn status_from_local_point_of_view() {
        let mut table = LockTable::new();
        let _ = table.acquire(lock("L"), LockKind::Track, &user("A"), 1);
        assert_eq!(table.status(&lock("L"), &user("A")), LockStatus::LockedByMe);
        assert_eq!(table.status(&lock("L"), &user("B")), LockStatus::LockedByOther(user("A")));
        assert_eq!(table.status(&lock("M"), &user("B")), LockStatus::Unlocked);
    }

    #[test]
    fn release_all_only_touches_that_user() {
        let mut table = LockTable::new();
        let _ = table.acquire(lock("a"), LockKind::Region, &user("A"), 1);
        let _ = table.acquire(lock("b"), LockKind::Region, &user("A"), 1);
        let _ = table.acquire(lock("c"), LockKind::Region, &user("B"), 1);
        let released = table.release_all(&user("A"));
        assert_eq!(released.len(), 2);
        assert_eq!(table.len(), 1);
        assert!(table.is_locked(&lock("c")).is_some());
    }

    #[test]
    fn expire_drops_old_records() {
        let mut table = LockTable::new();
        let _ = table.acquire(lock("old"), LockKind::Region, &user("A"), 1_000);
        let _ = table.acquire(lock("new"), LockKind::Region, &user("A"), 60_000);
        let expired = table.expire(70_000, Duration::from_secs(60), &user("B"));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].lock_id, lock("old"));
        assert!(table.is_locked(&lock("new")).is_some());
    }

    #[test]
    fn expire_keeps_local_records() {
        let mut table = LockTable::new();
        let _ = table.acquire(lock("mine"), LockKind::Region, &user("A"), 1_000);
        let _ = table.acquire(lock("theirs"), LockKind::Region, &user("B"), 1_000);
        let expired = table.expire(70_000, Duration::from_secs(60), &user("A"));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].lock_id, lock("theirs"));
        assert!(table.is_locked(&lock("mine")).is_some());
    }

    #[test]
    fn renew_held_refreshes_only_old_records_of_user() {
        let mut table = LockTable::new();
        let _ = table.acquire(lock("stale"), LockKind::Region, &user("A"), 1_000);
        let _ = table.acquire(lock("fresh"), LockKind::Region, &user("A"), 40_000);
        let _ = table.acquire(lock("other"), LockKind::Region, &user("B"), 1_000);

        let renewed = table.renew_held(&user("A"), 50_000, Duration::from_secs(30));
        assert_eq!(renewed.len(), 1);
        assert_eq!(renewed[0].lock_id, lock("stale"));
        assert_eq!(table.is_locked(&lock("stale")).unwrap().acquired_at, 50_000);
        assert_eq!(table.is_locked(&lock("fresh")).unwrap().acquired_at, 40_000);
        assert_eq!(table.is_locked(&lock("other")).unwrap().acquired_at, 1_000);
    }

    #[test]
    fn lock_kind_wire_names() {
        assert_eq!(serde_json::to_string(&LockKind::TrackProperty).unwrap(), "\"track_property\"");
        assert_eq!(serde_json::to_string(&LockKind::Control).unwrap(), "\"control\"");
    }
}
