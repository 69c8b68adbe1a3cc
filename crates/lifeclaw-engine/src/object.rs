//! One life-cycle object: a distinguished name owning a set of states.
//!
//! The states live in one vector cut into three contiguous regions:
//!
//! ```text
//! [0 .. idx_first)        to-add    staged by the open transaction
//! [idx_first .. idx_todel) committed the only region visible outside
//! [idx_todel .. len)      to-del    scheduled for removal on commit
//! ```
//!
//! Outside a transaction only the committed region is non-empty
//! (`idx_first == 0`, `idx_todel == len`). A commit keeps to-add plus the
//! remaining committed states and drops the to-del tail; an abort drops
//! to-add and folds to-del back into committed.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::ops::Range;

use crate::state::{LcState, TIM_DIRTY, TIM_NEVER};

/// A directory object aggregating life-cycle states.
#[derive(Debug)]
pub struct LcObject {
    dn: String,
    hsh_dn: u64,
    states: Vec<LcState>,
    idx_first: usize,
    idx_todel: usize,
    /// Earliest member fire time; `TIM_DIRTY` forces a recompute.
    tim_first: i64,
}

/// Hash a DN the way objects store it, for hash-first lookup.
pub fn dn_hash(dn: &str) -> u64 {
    let mut h = DefaultHasher::new();
    dn.hash(&mut h);
    h.finish()
}

impl LcObject {
    pub fn new(dn: &str) -> Self {
        Self {
            dn: dn.to_string(),
            hsh_dn: dn_hash(dn),
            states: Vec::new(),
            idx_first: 0,
            idx_todel: 0,
            tim_first: TIM_NEVER,
        }
    }

    pub fn dn(&self) -> &str {
        &self.dn
    }

    pub fn dn_hash(&self) -> u64 {
        self.hsh_dn
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn tim_first(&self) -> i64 {
        self.tim_first
    }

    pub fn is_dirty(&self) -> bool {
        self.tim_first == TIM_DIRTY
    }

    pub(crate) fn state(&self, i: usize) -> &LcState {
        &self.states[i]
    }

    pub(crate) fn state_mut(&mut self, i: usize) -> &mut LcState {
        &mut self.states[i]
    }

    /// The committed region.
    pub fn committed(&self) -> &[LcState] {
        &self.states[self.idx_first..self.idx_todel]
    }

    pub(crate) fn committed_range(&self) -> Range<usize> {
        self.idx_first..self.idx_todel
    }

    /// True when no transaction content is staged on this object.
    pub(crate) fn staging_clear(&self) -> bool {
        self.idx_first == 0 && self.idx_todel == self.states.len()
    }

    /// Find a state by exact text in the staged view (to-add + committed).
    pub(crate) fn find_staged(&self, text: &str) -> Option<usize> {
        self.states[..self.idx_todel]
            .iter()
            .position(|s| s.text() == text)
    }

    /// Stage a new state into the to-add prefix.
    pub(crate) fn stage_add(&mut self, state: LcState) {
        self.states.insert(0, state);
        self.idx_first += 1;
        self.idx_todel += 1;
        self.smudge();
    }

    /// Move the state at `i` (inside the staged view) to the head of the
    /// to-del tail.
    pub(crate) fn stage_del(&mut self, i: usize) {
        debug_assert!(i < self.idx_todel);
        let state = self.states.remove(i);
        if i < self.idx_first {
            self.idx_first -= 1;
        }
        self.idx_todel -= 1;
        self.states.insert(self.idx_todel, state);
        self.smudge();
    }

    /// Mark the whole staged view for deletion; later adds survive.
    pub(crate) fn stage_reset(&mut self) {
        self.idx_first = 0;
        self.idx_todel = 0;
        self.smudge();
    }

    /// Apply the open transaction: drop the to-del tail, promote to-add.
    pub(crate) fn commit(&mut self) {
        self.states.truncate(self.idx_todel);
        self.idx_first = 0;
        self.idx_todel = self.states.len();
        self.smudge();
    }

    /// Abandon the open transaction: drop to-add, fold to-del back in.
    pub(crate) fn abort(&mut self) {
        self.states.drain(..self.idx_first);
        self.idx_first = 0;
        self.idx_todel = self.states.len();
        self.smudge();
    }

    /// Mark the object's summary dirty.
    pub(crate) fn smudge(&mut self) {
        self.tim_first = TIM_DIRTY;
    }

    /// Advance the cursor of the state at `i`, propagating dirtiness to
    /// the object when that state determined the earliest fire time.
    pub(crate) fn advance_state_cursor(&mut self, i: usize) {
        let prev = self.states[i].tim_next();
        if prev != TIM_DIRTY && prev == self.tim_first {
            self.tim_first = TIM_DIRTY;
        }
        self.states[i].advance_cursor();
    }

    /// Recompute the earliest fire time over the committed states,
    /// refreshing any dirty member in place. Afterwards no dirty member
    /// remains and `tim_first` is the true minimum (`TIM_NEVER` when no
    /// timer steps exist).
    pub fn update_firetime(&mut self) -> i64 {
        let mut first = TIM_NEVER;
        for st in &mut self.states[self.idx_first..self.idx_todel] {
            if st.is_dirty() {
                st.update_firetime();
            }
            debug_assert!(st.tim_next() != TIM_DIRTY);
            first = first.min(st.tim_next());
        }
        self.tim_first = first;
        first
    }

    pub(crate) fn refresh_if_dirty(&mut self) {
        if self.is_dirty() {
            self.update_firetime();
        }
    }

    /// Append a human-readable rendering of this object, region by
    /// region, for feed debugging.
    pub(crate) fn dump(&self, out: &mut String) {
        use std::fmt::Write;
        let _ = writeln!(out, "{} (fire {})", self.dn, fmt_tim(self.tim_first));
        for (i, st) in self.states.iter().enumerate() {
            let region = if i < self.idx_first {
                "toadd"
            } else if i < self.idx_todel {
                "state"
            } else {
                "todel"
            };
            let _ = writeln!(
                out,
                "  [{region}] {:?} next={:?} fire={} missed={}",
                st.text(),
                st.next_word(),
                fmt_tim(st.tim_next()),
                st.missed()
            );
        }
    }
}

fn fmt_tim(tim: i64) -> String {
    match tim {
        TIM_DIRTY => "dirty".into(),
        TIM_NEVER => "never".into(),
        t => t.to_string(),
    }
}
