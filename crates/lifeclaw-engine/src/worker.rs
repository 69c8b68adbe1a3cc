//! The service worker: one thread per environment.
//!
//! The worker owns the environment mutex for the whole of each pass and
//! parks on the condvar whenever a transaction is staged, so it only ever
//! observes quiescent committed state. A pass advances `?`-waits, sorts
//! and fires timers, then sleeps until the head fire time or the next
//! commit signal, whichever comes first.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use lifeclaw_core::value::NextKind;

use crate::advance;
use crate::env::{EnvShared, EnvState};
use crate::state::{unix_now, TIM_NEVER};
use crate::timers;

pub(crate) fn spawn_worker(env: Arc<EnvShared>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("lifeclaw-worker".into())
        .spawn(move || worker_loop(env))
}

fn worker_loop(env: Arc<EnvShared>) {
    tracing::debug!("service worker started");
    let mut guard = env.state.lock().unwrap();
    while guard.serviced {
        if guard.txn_active() {
            guard = env.wake.wait(guard).unwrap();
            continue;
        }

        for i in 0..guard.objects.len() {
            advance::advance_object(&mut guard.objects[i]);
        }

        let head = run_queue(&mut guard);

        guard = match head {
            Some(fire) if fire != TIM_NEVER => {
                let now = unix_now();
                if fire <= now {
                    // Something became due while firing; run another pass.
                    continue;
                }
                let wait = Duration::from_secs((fire - now) as u64);
                env.wake.wait_timeout(guard, wait).unwrap().0
            }
            _ => env.wake.wait(guard).unwrap(),
        };
    }
    tracing::debug!("service worker stopped");
}

/// Sort the queue and fire everything due. Returns the head fire time
/// bounding the next wait, or `None` when no object is scheduled.
fn run_queue(st: &mut EnvState) -> Option<i64> {
    loop {
        let now = unix_now();
        let window = timers::sort_pass(&mut st.objects, &mut st.sorted_len, now);
        let started = Instant::now();

        let mut fired_any = false;
        while st.sorted_len > 0 {
            let target = st.objects[0].tim_first();
            if target > unix_now() {
                break;
            }
            fire_due(st, target);
            fired_any = true;
            st.objects[0].update_firetime();
            if st.objects[0].tim_first() > unix_now() {
                timers::demote_head(&mut st.objects, &mut st.sorted_len);
            }
        }

        // Fired objects fell back into the tail with fresh re-offer
        // times, and firing longer than the selection window invalidates
        // the sort either way: run another pass before trusting the head.
        if fired_any || (window != i64::MAX && started.elapsed().as_secs() as i64 > window) {
            continue;
        }
        return timers::head_fire(&st.objects, st.sorted_len);
    }
}

/// Fire every due state of the head object: write `"dn\nattr\n"` to the
/// handler matching its program name, then schedule the back-off re-offer.
/// A write failure or a missing handler never unwinds the pass.
fn fire_due(st: &mut EnvState, target: i64) {
    let EnvState { objects, drivers, scheduler, .. } = st;
    let obj = &mut objects[0];
    let now = unix_now();
    let mut fired = 0usize;
    for i in obj.committed_range() {
        {
            let state = obj.state(i);
            if state.kind() != NextKind::Timer || state.tim_next() > target {
                continue;
            }
            match drivers.iter_mut().find(|d| d.name == state.program_name()) {
                Some(driver) => {
                    tracing::info!(
                        "firing {} for {} (missed {})",
                        state.next_word(),
                        obj.dn(),
                        state.missed()
                    );
                    if let Err(e) = driver.sink.send(obj.dn(), state.text()) {
                        tracing::error!("handler {:?} write failed: {e}", driver.name);
                    }
                }
                None => {
                    tracing::debug!(
                        "no handler for program {:?}, skipping",
                        state.program_name()
                    );
                }
            }
        }
        obj.state_mut(i).record_fire(
            now,
            scheduler.refire_base_secs,
            scheduler.refire_cap_secs,
        );
        fired += 1;
    }
    debug_assert!(fired > 0, "fire_due called on an object with nothing due");
}
