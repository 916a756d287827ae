//! Re-entrancy guard for remote application.

use std::cell::Cell;

/// While set, local mutations must not produce outbound messages.
///
/// There is exactly one gate per engine; the dispatcher shares it through an
/// `Rc` with anything else that mutates the store and might broadcast.
#[derive(Debug, Default)]
pub struct SyncGate {
    syncing: Cell<bool>,
}

impl SyncGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.get()
    }

    /// Run `f` with the gate held. The previous value is restored when `f`
    /// returns or unwinds.
    pub fn apply_remote<R>(&self, f: impl FnOnce() -> R) -> R {
        let _held = Held::new(&self.syncing);
        f()
    }
}

struct Held<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl<'a> Held<'a> {
    fn new(flag: &'a Cell<bool>) -> Self {
        let previous = flag.replace(true);
        Self { flag, previous }
    }
}

impl Drop for Held<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}
