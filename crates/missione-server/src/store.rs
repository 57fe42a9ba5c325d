//! Last-known mission cache and sequence stamping.

use chrono::Utc;
use missione_core::mission::{Mission, StampedMission};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Inner {
    seq: u64,
    last: Option<StampedMission>,
}

/// Owns the publish-side sequence counter and the single last-published
/// record.
///
/// Sequence assignment, timestamping, and the cache overwrite happen under
/// one lock, so no two publishes can observe or assign the same sequence
/// value regardless of how many tasks submit concurrently.
#[derive(Debug, Default)]
pub struct MissionStore {
    inner: Mutex<Inner>,
}

impl MissionStore {
    /// Create an empty store. The first stamp gets sequence number 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next sequence number and the current epoch-millisecond
    /// timestamp, record the result as the last known mission, and return it.
    ///
    /// The timestamp is read under the lock so a later sequence number can
    /// never carry an earlier timestamp than its predecessor.
    pub fn stamp(&self, mission: Mission) -> StampedMission {
        let mut inner = self.inner.lock();
        inner.seq += 1;
        let stamped = StampedMission::stamp(mission, inner.seq, Utc::now().timestamp_millis());
        inner.last = Some(stamped);
        stamped
    }

    /// The most recently published mission, if any. No side effects; used
    /// by polling clients that never open a streaming connection.
    pub fn last(&self) -> Option<StampedMission> {
        self.inner.lock().last
    }
}
