//! Staged atomic property updates.
//!
//! Atomic requests are assembled out of `(object, property, value)`
//! triples. The log is append-only, mode selection marks a checkpoint
//! and truncates back to it between candidate modes, the way the kernel
//! api exposes a cursor on an atomic request.

use drm::control::atomic::AtomicModeReq;
use drm::control::{property, RawResourceHandle};

/// A single staged property update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyUpdate {
    pub object: RawResourceHandle,
    pub property: property::Handle,
    pub value: property::RawValue,
}

/// Marker into the update log, returned by [`Transaction::checkpoint`]
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint(usize);

/// Accumulated property updates for the next commit.
///
/// The log is not cleared by committing, later updates for the same
/// property simply override earlier ones on the kernel side.
#[derive(Debug, Default)]
pub struct Transaction {
    entries: Vec<PropertyUpdate>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one property update to the log
    pub fn stage(
        &mut self,
        object: impl Into<RawResourceHandle>,
        property: property::Handle,
        value: property::RawValue,
    ) {
        self.entries.push(PropertyUpdate {
            object: object.into(),
            property,
            value,
        });
    }

    /// Mark the current end of the log
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.entries.len())
    }

    /// Drop every update staged after the checkpoint
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        self.entries.truncate(checkpoint.0);
    }

    /// Drop all staged updates
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[PropertyUpdate] {
        &self.entries
    }

    /// Most recently staged value for a property of an object, if any
    pub fn latest(
        &self,
        object: impl Into<RawResourceHandle>,
        property: property::Handle,
    ) -> Option<property::RawValue> {
        let object = object.into();
        self.entries
            .iter()
            .rev()
            .find(|e| e.object == object && e.property == property)
            .map(|e| e.value)
    }

    /// Assemble the kernel request for the current log
    pub fn build_request(&self) -> AtomicModeReq {
        let mut req = AtomicModeReq::new();
        for entry in &self.entries {
            req.add_raw_property(entry.object, entry.property, entry.value);
        }
        req
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use super::*;

    fn object(id: u32) -> RawResourceHandle {
        NonZeroU32::new(id).unwrap()
    }

    fn prop(id: u32) -> property::Handle {
        property::Handle::from(NonZeroU32::new(id).unwrap())
    }

    #[test]
    fn rollback_truncates_to_checkpoint() {
        let mut tx = Transaction::new();
        tx.stage(object(1), prop(10), 1);
        let cp = tx.checkpoint();
        tx.stage(object(1), prop(11), 2);
        tx.stage(object(2), prop(10), 3);
        assert_eq!(tx.entries().len(), 3);

        tx.rollback(cp);
        assert_eq!(tx.entries().len(), 1);
        assert_eq!(tx.latest(object(1), prop(10)), Some(1));
        assert_eq!(tx.latest(object(1), prop(11)), None);
    }

    #[test]
    fn rollback_is_replayable() {
        let mut tx = Transaction::new();
        tx.stage(object(1), prop(10), 1);
        let cp = tx.checkpoint();
        for value in [5, 6, 7] {
            tx.rollback(cp);
            tx.stage(object(1), prop(11), value);
            assert_eq!(tx.entries().len(), 2);
        }
        assert_eq!(tx.latest(object(1), prop(11)), Some(7));
    }

    #[test]
    fn latest_wins_over_earlier_updates() {
        let mut tx = Transaction::new();
        tx.stage(object(3), prop(20), 100);
        tx.stage(object(3), prop(20), 0);
        assert_eq!(tx.latest(object(3), prop(20)), Some(0));
    }

    #[test]
    fn clear_empties_the_log() {
        let mut tx = Transaction::new();
        tx.stage(object(1), prop(10), 1);
        tx.clear();
        assert!(tx.is_empty());
    }
}
