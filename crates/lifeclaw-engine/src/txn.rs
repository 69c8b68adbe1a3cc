//! The transaction engine.
//!
//! Every environment carries a ring link: `None` while no transaction is
//! open, otherwise the next member of a ring of environments whose
//! transactions commit or abort together (a lone transaction is a
//! self-loop). The links are `Weak` so the ring never keeps an
//! environment alive; members are alive whenever the ring is walked,
//! because walking it requires the caller-held backend handles.
//!
//! Commit and break both walk the ring the same way: take the member's
//! link, apply the outcome to its objects, wake its worker, move on. The
//! walk ends where it started (or at a member whose link is already
//! gone).

use std::sync::{Arc, MutexGuard};

use crate::env::{EnvShared, EnvState};
use crate::object::LcObject;
use crate::state::LcState;

/// Open a transaction on an inactive environment: a self-loop ring. The
/// staged view of every object starts out equal to the committed view,
/// which the three-region representation gives for free.
pub(crate) fn ensure_open(env: &Arc<EnvShared>, st: &mut EnvState) {
    if !st.txn_active() {
        debug_assert!(st.objects.iter().all(|o| o.staging_clear()));
        st.txn_next = Some(Arc::downgrade(env));
    }
}

/// Stage an add. Fails on a duplicate within the staged view.
pub(crate) fn apply_add(st: &mut EnvState, dn: &str, attr: &str) -> bool {
    let oi = match st.find_object(dn) {
        Some(oi) => oi,
        None => st.push_object(LcObject::new(dn)),
    };
    if st.objects[oi].find_staged(attr).is_some() {
        tracing::debug!("duplicate add of {attr:?} under {dn:?}");
        return false;
    }
    st.objects[oi].stage_add(LcState::new(attr.to_string()));
    true
}

/// Stage a delete. The object and the exact attribute text must exist in
/// the staged view.
pub(crate) fn apply_del(st: &mut EnvState, dn: &str, attr: &str) -> bool {
    let Some(oi) = st.find_object(dn) else {
        tracing::debug!("delete of unknown object {dn:?}");
        return false;
    };
    let Some(si) = st.objects[oi].find_staged(attr) else {
        tracing::debug!("delete of absent {attr:?} under {dn:?}");
        return false;
    };
    st.objects[oi].stage_del(si);
    true
}

/// Mark every object's whole staged view for deletion; adds staged after
/// this survive. On commit the environment is empty but for them.
pub(crate) fn apply_reset(st: &mut EnvState) {
    for obj in &mut st.objects {
        obj.stage_reset();
    }
}

fn commit_member(st: &mut EnvState) {
    for obj in &mut st.objects {
        obj.commit();
    }
    st.reap_empty();
}

fn abort_member(st: &mut EnvState) {
    for obj in &mut st.objects {
        obj.abort();
    }
    st.reap_empty();
    st.aborted = true;
}

/// Walk the ring from `env`, applying `apply` to each member and waking
/// its worker. Each member's link is taken before moving on, so a second
/// walk (or a walk meeting a finished member) stops immediately.
fn walk_ring(env: &Arc<EnvShared>, apply: fn(&mut EnvState)) {
    let mut cur = env.clone();
    loop {
        let next = {
            let mut st = cur.state.lock().unwrap();
            let Some(next) = st.txn_next.take() else {
                break;
            };
            apply(&mut st);
            cur.wake.notify_all();
            next
        };
        match next.upgrade() {
            Some(n) if !Arc::ptr_eq(&n, env) => cur = n,
            Some(_) => break,
            None => {
                tracing::warn!("transaction ring member vanished mid-walk");
                break;
            }
        }
    }
}

/// Commit the whole ring `env` belongs to.
pub(crate) fn commit_cycle(env: &Arc<EnvShared>) {
    walk_ring(env, commit_member);
}

/// Break the whole ring `env` belongs to: staged adds are dropped,
/// deletes forgotten, and every member is flagged aborted until its
/// commit or rollback clears it. An environment that never opened still
/// gets the flag (collaboration with an aborted partner).
pub(crate) fn break_env(env: &Arc<EnvShared>) {
    {
        let mut st = env.state.lock().unwrap();
        if !st.txn_active() {
            st.aborted = true;
            env.wake.notify_all();
            return;
        }
    }
    walk_ring(env, abort_member);
}

/// Lock two environments in address order, returning the guards in
/// argument order.
fn lock_pair<'a>(
    a: &'a EnvShared,
    b: &'a EnvShared,
) -> (MutexGuard<'a, EnvState>, MutexGuard<'a, EnvState>) {
    if std::ptr::from_ref(a) < std::ptr::from_ref(b) {
        let ga = a.state.lock().unwrap();
        let gb = b.state.lock().unwrap();
        (ga, gb)
    } else {
        let gb = b.state.lock().unwrap();
        let ga = a.state.lock().unwrap();
        (ga, gb)
    }
}

/// Merge the transactions of two environments so they commit or abort
/// together. If either side already aborted, the other follows suit.
/// Always reports success: the merge itself cannot fail.
pub(crate) fn collaborate(a: &Arc<EnvShared>, b: &Arc<EnvShared>) -> bool {
    if Arc::ptr_eq(a, b) {
        return true;
    }
    let doomed = {
        let (mut ga, mut gb) = lock_pair(a, b);
        match (ga.aborted, gb.aborted) {
            (true, true) => None,
            (true, false) => Some(b.clone()),
            (false, true) => Some(a.clone()),
            (false, false) => {
                ensure_open(a, &mut ga);
                ensure_open(b, &mut gb);
                // Swapping the successor links of two disjoint rings
                // joins them into one.
                std::mem::swap(&mut ga.txn_next, &mut gb.txn_next);
                None
            }
        }
    };
    if let Some(env) = doomed {
        break_env(&env);
    }
    true
}
