//! Capability interface over the local project store.
//!
//! The engine only needs to read the project, apply mutations, swap in a
//! full snapshot, and let observers know something changed.

use arrange_types::{reduce, Mutation, ProjectState};

/// What changed in a store.
#[derive(Debug, Clone, Copy)]
pub enum StoreChange<'a> {
    Applied(&'a Mutation),
    Replaced,
}

pub type Subscriber = Box<dyn FnMut(&StoreChange<'_>)>;

pub trait StateStore {
    fn state(&self) -> &ProjectState;

    /// Apply one mutation. Returns false when it was not applicable.
    fn apply(&mut self, mutation: &Mutation) -> bool;

    /// Replace the whole project (full-state resync).
    fn replace(&mut self, state: ProjectState);

    fn subscribe(&mut self, subscriber: Subscriber);
}

/// Plain in-memory store backed by the [`reduce`] function.
#[derive(Default)]
pub struct MemoryStore {
    state: ProjectState,
    subscribers: Vec<Subscriber>,
}

impl MemoryStore {
    pub fn new(state: ProjectState) -> Self {
        Self {
            state,
            subscribers: Vec::new(),
        }
    }

    fn notify(&mut self, change: StoreChange<'_>) {
        for subscriber in &mut self.subscribers {
            subscriber(&change);
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("state", &self.state)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl StateStore for MemoryStore {
    fn state(&self) -> &ProjectState {
        &self.state
    }

    fn apply(&mut self, mutation: &Mutation) -> bool {
        let applied = reduce(mutation, &mut self.state);
        if applied {
            self.notify(StoreChange::Applied(mutation));
        }
        applied
    }

    fn replace(&mut self, state: ProjectState) {
        self.state = state;
        self.notify(StoreChange::Replaced);
    }

    fn subscribe(&mut self, subscriber: Subscriber) {
        self.subscribers.push(subscriber);
    }
}
