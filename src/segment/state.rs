//! The state lattice a segment can be in, and what the checker does about
//! each.

use crate::types::Interval;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Matches the index; no action needed.
    Ok,
    /// Bytes exist and match the index, but hold deleted/out-of-order data
    /// that a repack would reclaim.
    Dirty,
    /// Bytes exist but disagree with what the index believes is there.
    Unaligned,
    /// The index references a segment whose bytes are gone.
    Missing,
    /// Only the index knows about this segment; no bytes and no bug — it
    /// was removed by some other agent without updating the index.
    Deleted,
    /// Bytes exist and are unreadable by the format scanner.
    Corrupted,
    /// Past the dataset's `archive age`; a repack should move it to the
    /// archive.
    ArchiveAge,
    /// Past the dataset's `delete age`; a repack should remove it outright.
    DeleteAge,
    /// Bytes exist, nothing indexed — e.g. a scan dropped mid-way.
    New,
}

impl State {
    /// Whether the checker should propose a repack for a segment in this
    /// state (as opposed to leaving it alone or needing human attention).
    pub fn needs_repack(&self) -> bool {
        matches!(self, State::Dirty | State::ArchiveAge | State::DeleteAge)
    }

    pub fn is_problem(&self) -> bool {
        matches!(self, State::Unaligned | State::Missing | State::Corrupted)
    }
}

/// One segment's state plus the reftime span it's allowed to hold, so aging
/// decisions don't require reopening the segment's summary.
#[derive(Debug, Clone, Copy)]
pub struct SegmentState {
    pub state: State,
    pub allowed: Interval,
}

impl SegmentState {
    pub fn new(state: State, allowed: Interval) -> Self {
        Self { state, allowed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Time;

    #[test]
    fn only_specific_states_request_repack() {
        let allowed = Interval::new(Time::new(2024, 1, 1, 0, 0, 0), Time::new(2024, 1, 2, 0, 0, 0));
        assert!(SegmentState::new(State::Dirty, allowed).state.needs_repack());
        assert!(!SegmentState::new(State::Ok, allowed).state.needs_repack());
        assert!(SegmentState::new(State::Unaligned, allowed).state.is_problem());
    }
}
