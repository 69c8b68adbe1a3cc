//! One backend environment: the object table, the handler table, the
//! transaction flags, and the synchronisation pair the feed side and the
//! service worker cooperate through.

use std::sync::{Condvar, Mutex, Weak};

use lifeclaw_core::SchedulerConfig;
use serde::Serialize;

use crate::drivers::LcDriver;
use crate::object::{dn_hash, LcObject};
use crate::state::{TIM_DIRTY, TIM_NEVER};

/// Everything behind the environment mutex.
pub(crate) struct EnvState {
    /// Object table; doubles as the scheduler queue (sorted prefix).
    pub objects: Vec<LcObject>,
    /// Length of the time-ordered prefix of `objects`.
    pub sorted_len: usize,
    /// One handler per program name. Membership is fixed after open.
    pub drivers: Vec<LcDriver>,
    /// Next environment in the transaction ring; `None` when inactive.
    pub txn_next: Option<Weak<EnvShared>>,
    /// A staged operation failed; everything fails until commit/rollback.
    pub aborted: bool,
    /// Cleared to shut the worker down cooperatively.
    pub serviced: bool,
    pub scheduler: SchedulerConfig,
}

/// The shared core of an environment: state plus the worker wake-up.
pub(crate) struct EnvShared {
    pub state: Mutex<EnvState>,
    pub wake: Condvar,
}

impl EnvState {
    pub fn new(drivers: Vec<LcDriver>, scheduler: SchedulerConfig) -> Self {
        Self {
            objects: Vec::new(),
            sorted_len: 0,
            drivers,
            txn_next: None,
            aborted: false,
            serviced: true,
            scheduler,
        }
    }

    pub fn txn_active(&self) -> bool {
        self.txn_next.is_some()
    }

    /// Hash-first object lookup by DN.
    pub fn find_object(&self, dn: &str) -> Option<usize> {
        let h = dn_hash(dn);
        self.objects
            .iter()
            .position(|o| o.dn_hash() == h && o.dn() == dn)
    }

    /// New objects join the unsorted tail.
    pub fn push_object(&mut self, obj: LcObject) -> usize {
        self.objects.push(obj);
        self.objects.len() - 1
    }

    /// Drop empty objects, keeping the sorted prefix consistent.
    pub fn reap_empty(&mut self) {
        let mut i = 0;
        while i < self.objects.len() {
            if self.objects[i].is_empty() {
                self.objects.remove(i);
                if i < self.sorted_len {
                    self.sorted_len -= 1;
                }
            } else {
                i += 1;
            }
        }
    }

    /// Multi-line rendering of every object and state, staging regions
    /// included, for feed debugging.
    pub fn dump(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        let _ = writeln!(
            out,
            "environment: {} objects, txn {}, {}aborted",
            self.objects.len(),
            if self.txn_active() { "open" } else { "closed" },
            if self.aborted { "" } else { "not " },
        );
        for obj in &self.objects {
            obj.dump(&mut out);
        }
        out
    }

    pub fn stats(&self) -> EnvStats {
        EnvStats {
            objects: self.objects.len(),
            committed_states: self.objects.iter().map(|o| o.committed().len()).sum(),
            txn_active: self.txn_active(),
            aborted: self.aborted,
            next_fire: self
                .objects
                .iter()
                .map(|o| o.tim_first())
                .filter(|&t| t != TIM_DIRTY && t != TIM_NEVER)
                .min(),
            handlers: self.drivers.iter().map(|d| d.name.clone()).collect(),
        }
    }
}

/// A point-in-time snapshot of an environment, for operators.
#[derive(Debug, Clone, Serialize)]
pub struct EnvStats {
    pub objects: usize,
    pub committed_states: usize,
    pub txn_active: bool,
    pub aborted: bool,
    /// Earliest known concrete fire time (unix seconds); `None` when
    /// nothing is scheduled or summaries are pending recomputation.
    pub next_fire: Option<i64>,
    pub handlers: Vec<String>,
}
