//! Lamport clock used to stamp locally issued edits.
//!
//! The clock only has to make a replica's own stamps distinct and
//! increasing. Combined with the replica id it names a number delta
//! uniquely across the whole document. Documents also move it past the
//! stamps they receive, so a replica's deltas read in causal order.

/// A monotonic counter.
///
/// - `tick` advances it for a local event.
/// - `update` moves it past a remote timestamp.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct LamportClock {
    time: u64,
}

impl LamportClock {
    pub fn new() -> LamportClock {
        return LamportClock { time: 0 };
    }

    #[inline]
    pub fn time(&self) -> u64 {
        return self.time;
    }

    /// Increment for a local event and return the new time.
    #[inline]
    pub fn tick(&mut self) -> u64 {
        self.time += 1;
        return self.time;
    }

    /// Set local time to `max(local, remote) + 1` and return it.
    #[inline]
    pub fn update(&mut self, remote_time: u64) -> u64 {
        self.time = self.time.max(remote_time) + 1;
        return self.time;
    }
}
