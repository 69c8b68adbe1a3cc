//! The backend surface a directory connector drives.
//!
//! `open` builds the handler table and starts the service worker; the
//! mutating calls stage into the current transaction (opening one
//! implicitly when needed) and report success as a plain `bool` — any
//! malformed input aborts the whole transaction silently, and everything
//! keeps failing until `commit` or `rollback` clears the flag.

use std::sync::Arc;
use std::thread::JoinHandle;

use lifeclaw_core::error::{LifeClawError, Result};
use lifeclaw_core::value::{ident_len, parse_text};
use lifeclaw_core::{grammar, SchedulerConfig};

use crate::drivers::{LcDriver, PipeSink};
use crate::env::{EnvShared, EnvState, EnvStats};
use crate::txn;
use crate::worker;

/// A handle on one open environment.
pub struct LcBackend {
    env: Arc<EnvShared>,
    worker: Option<JoinHandle<()>>,
}

impl LcBackend {
    /// Open an environment from `args` as a directory connector passes
    /// them: `args[0]` names the backend instance, every further element
    /// is a `name=command` handler declaration. `varc` is the number of
    /// attributes per staged entry and must be 2 (DN, lifecycleState).
    pub fn open(args: &[String], varc: usize) -> Result<Self> {
        Self::open_with(args, varc, SchedulerConfig::default())
    }

    /// `open` with explicit scheduler tunables.
    pub fn open_with(args: &[String], varc: usize, scheduler: SchedulerConfig) -> Result<Self> {
        if varc != 2 {
            return Err(LifeClawError::InvalidOpen(format!(
                "expected 2 attribute variables, got {varc}"
            )));
        }
        if args.len() < 2 {
            return Err(LifeClawError::InvalidOpen(
                "need at least one name=command handler".into(),
            ));
        }
        let mut drivers = Vec::with_capacity(args.len() - 1);
        for arg in &args[1..] {
            let sep = ident_len(arg);
            if sep == 0 || arg.as_bytes().get(sep) != Some(&b'=') {
                return Err(LifeClawError::InvalidOpen(format!(
                    "handler declaration {arg:?} is not name=command"
                )));
            }
            let sink = PipeSink::spawn(&arg[sep + 1..])
                .map_err(|e| LifeClawError::Driver(format!("cannot start {arg:?}: {e}")))?;
            drivers.push(LcDriver::new(&arg[..sep], Box::new(sink)));
        }
        Self::open_with_drivers(drivers, scheduler)
    }

    /// Open with a ready-made handler table. This is the seam tests use
    /// to substitute in-memory sinks for real pipes.
    pub fn open_with_drivers(drivers: Vec<LcDriver>, scheduler: SchedulerConfig) -> Result<Self> {
        let env = Arc::new(EnvShared {
            state: std::sync::Mutex::new(EnvState::new(drivers, scheduler)),
            wake: std::sync::Condvar::new(),
        });
        let worker = worker::spawn_worker(env.clone())?;
        tracing::info!("environment opened");
        Ok(Self { env, worker: Some(worker) })
    }

    /// Stage an add of `(DN, lifecycleState)`, given as length-prefixed
    /// values. Returns `false` (and aborts the transaction) on malformed
    /// input, grammar mismatch, or a duplicate within the staged view.
    pub fn add(&self, values: &[&[u8]]) -> bool {
        self.add_del(true, values)
    }

    /// Stage a delete; the pair must exist in the staged view.
    pub fn del(&self, values: &[&[u8]]) -> bool {
        self.add_del(false, values)
    }

    fn add_del(&self, add_not_del: bool, values: &[&[u8]]) -> bool {
        let mut st = self.env.state.lock().unwrap();
        if st.aborted {
            return false;
        }
        txn::ensure_open(&self.env, &mut st);

        let staged = decode_pair(values).map(|(dn, attr)| {
            if add_not_del {
                txn::apply_add(&mut st, &dn, &attr)
            } else {
                txn::apply_del(&mut st, &dn, &attr)
            }
        });
        match staged {
            Ok(true) => true,
            Ok(false) => {
                drop(st);
                txn::break_env(&self.env);
                false
            }
            Err(e) => {
                tracing::debug!("rejected staged entry: {e}");
                drop(st);
                txn::break_env(&self.env);
                false
            }
        }
    }

    /// Empty the environment as part of the transaction: everything
    /// currently staged or committed is marked for deletion; adds staged
    /// afterwards survive.
    pub fn reset(&self) -> bool {
        let mut st = self.env.state.lock().unwrap();
        if st.aborted {
            return false;
        }
        txn::ensure_open(&self.env, &mut st);
        txn::apply_reset(&mut st);
        true
    }

    /// Two-phase probe: would a commit succeed right now?
    pub fn prepare(&self) -> bool {
        !self.env.state.lock().unwrap().aborted
    }

    /// Commit the transaction ring this environment belongs to. On an
    /// aborted environment this clears the flag and reports failure.
    pub fn commit(&self) -> bool {
        {
            let mut st = self.env.state.lock().unwrap();
            if st.aborted {
                st.aborted = false;
                return false;
            }
            if !st.txn_active() {
                return false;
            }
        }
        txn::commit_cycle(&self.env);
        tracing::debug!("transaction committed");
        true
    }

    /// Roll the transaction ring back. On an already-aborted environment
    /// this merely clears the flag.
    pub fn rollback(&self) {
        let active = {
            let mut st = self.env.state.lock().unwrap();
            if st.aborted {
                st.aborted = false;
                return;
            }
            st.txn_active()
        };
        if active {
            txn::break_env(&self.env);
            self.env.state.lock().unwrap().aborted = false;
        }
    }

    /// Merge this environment's transaction with another's, so both
    /// commit or abort together.
    pub fn collaborate(&self, other: &LcBackend) -> bool {
        txn::collaborate(&self.env, &other.env)
    }

    /// Operator snapshot.
    pub fn stats(&self) -> EnvStats {
        self.env.state.lock().unwrap().stats()
    }

    /// Multi-line rendering of the whole environment, staging regions
    /// included.
    pub fn dump(&self) -> String {
        self.env.state.lock().unwrap().dump()
    }
}

impl Drop for LcBackend {
    fn drop(&mut self) {
        let active = {
            let st = self.env.state.lock().unwrap();
            st.txn_active()
        };
        if active {
            txn::break_env(&self.env);
        }
        {
            let mut st = self.env.state.lock().unwrap();
            st.serviced = false;
        }
        self.env.wake.notify_all();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::error!("service worker panicked");
        }
        tracing::info!("environment closed");
    }
}

/// Decode and validate the (DN, lifecycleState) value pair.
fn decode_pair(values: &[&[u8]]) -> Result<(String, String)> {
    if values.len() != 2 {
        return Err(LifeClawError::MalformedValue(format!(
            "expected 2 values, got {}",
            values.len()
        )));
    }
    let dn = parse_text(values[0])?;
    let attr = parse_text(values[1])?;
    if !grammar::distinguished_name().matches(dn) {
        return Err(LifeClawError::Grammar(format!("bad distinguishedName {dn:?}")));
    }
    if !grammar::lifecycle_state().matches(attr) {
        return Err(LifeClawError::Grammar(format!("bad lifecycleState {attr:?}")));
    }
    Ok((dn.to_string(), attr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::MemorySink;
    use lifeclaw_core::value::encode_value;
    use std::time::Duration;

    const DN1: &str = "uid=bakker,dc=orvelte,dc=nep";
    const DN2: &str = "uid=smid,dc=orvelte,dc=nep";
    const A1: &str = "x . go@ gone@";
    const A2: &str = "y aap@12345 . noot@ mies@";
    const A3: &str = "y aap@12345 . noot@ . mies@";

    /// Slow re-fires so assertions about "exactly one pair" hold while
    /// the test looks.
    fn test_config() -> SchedulerConfig {
        SchedulerConfig { refire_base_secs: 3600, refire_cap_secs: 3600 }
    }

    fn open_memory(names: &[&str]) -> (LcBackend, Vec<MemorySink>) {
        let sinks: Vec<MemorySink> = names.iter().map(|_| MemorySink::new()).collect();
        let drivers = names
            .iter()
            .zip(&sinks)
            .map(|(n, s)| LcDriver::new(n, Box::new(s.clone())))
            .collect();
        let backend = LcBackend::open_with_drivers(drivers, test_config()).unwrap();
        (backend, sinks)
    }

    fn pair(dn: &str, attr: &str) -> (Vec<u8>, Vec<u8>) {
        (encode_value(dn.as_bytes()).unwrap(), encode_value(attr.as_bytes()).unwrap())
    }

    fn stage(backend: &LcBackend, add: bool, dn: &str, attr: &str) -> bool {
        let (d, a) = pair(dn, attr);
        if add {
            backend.add(&[d.as_slice(), a.as_slice()])
        } else {
            backend.del(&[d.as_slice(), a.as_slice()])
        }
    }

    fn wait_for<F: Fn() -> bool>(cond: F) -> bool {
        for _ in 0..200 {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn test_open_rejects_bad_arguments() {
        let args = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(matches!(
            LcBackend::open(&args(&["lifecycle", "x=cat"]), 3),
            Err(LifeClawError::InvalidOpen(_))
        ));
        assert!(matches!(
            LcBackend::open(&args(&["lifecycle"]), 2),
            Err(LifeClawError::InvalidOpen(_))
        ));
        assert!(matches!(
            LcBackend::open(&args(&["lifecycle", "nocommand"]), 2),
            Err(LifeClawError::InvalidOpen(_))
        ));
        assert!(matches!(
            LcBackend::open(&args(&["lifecycle", "=cat"]), 2),
            Err(LifeClawError::InvalidOpen(_))
        ));
    }

    #[test]
    fn test_s1_s2_add_commit_fire_then_empty() {
        let (backend, sinks) = open_memory(&["x", "y"]);
        assert!(stage(&backend, true, DN1, A1));
        assert!(stage(&backend, true, DN1, A2));
        assert!(stage(&backend, true, DN2, A2));
        assert!(stage(&backend, true, DN2, A1));
        assert!(backend.prepare());
        assert!(backend.commit());

        let stats = backend.stats();
        assert_eq!(stats.objects, 2);
        assert_eq!(stats.committed_states, 4);
        assert!(!stats.txn_active);

        // A1's next word `go@` and A2's `noot@` are due at once: each DN
        // produces one pair on x and one on y within a single pass.
        assert!(wait_for(|| sinks[0].lines().len() == 2 && sinks[1].lines().len() == 2));
        let mut x_lines = sinks[0].lines();
        x_lines.sort();
        assert_eq!(
            x_lines,
            vec![(DN1.to_string(), A1.to_string()), (DN2.to_string(), A1.to_string())]
        );
        let mut y_lines = sinks[1].lines();
        y_lines.sort();
        assert_eq!(
            y_lines,
            vec![(DN1.to_string(), A2.to_string()), (DN2.to_string(), A2.to_string())]
        );

        // S2: delete all four and commit; the environment is empty.
        assert!(stage(&backend, false, DN1, A1));
        assert!(stage(&backend, false, DN1, A2));
        assert!(stage(&backend, false, DN2, A1));
        assert!(stage(&backend, false, DN2, A2));
        assert!(backend.commit());
        let stats = backend.stats();
        assert_eq!(stats.objects, 0);
        assert_eq!(stats.committed_states, 0);
    }

    #[test]
    fn test_s3_collaborate_then_bad_add_breaks_both() {
        let (env1, _) = open_memory(&["x"]);
        let (env2, _) = open_memory(&["y"]);
        assert!(stage(&env1, true, DN1, A1));
        assert!(stage(&env2, true, DN2, A2));
        assert!(env1.collaborate(&env2));
        // Bad grammar on env2 aborts the whole ring.
        assert!(!stage(&env2, true, DN2, A3));
        assert!(!env1.prepare());
        assert!(!env2.prepare());
        // Commit fails once per member and clears its flag.
        assert!(!env1.commit());
        assert!(!env2.commit());
        assert!(env1.prepare());
        assert!(env2.prepare());
        assert_eq!(env1.stats().committed_states, 0);
        assert_eq!(env2.stats().committed_states, 0);
    }

    #[test]
    fn test_collaborate_commit_on_one_commits_all() {
        let (env1, _) = open_memory(&["x"]);
        let (env2, _) = open_memory(&["y"]);
        let (env3, _) = open_memory(&["x"]);
        assert!(stage(&env1, true, DN1, A1));
        assert!(stage(&env2, true, DN2, A2));
        assert!(stage(&env3, true, DN1, A2));
        assert!(env1.collaborate(&env2));
        assert!(env2.collaborate(&env3));
        assert!(env1.commit());
        for env in [&env1, &env2, &env3] {
            let stats = env.stats();
            assert!(!stats.txn_active);
            assert_eq!(stats.committed_states, 1);
        }
        // The ring is gone: a lone follow-up transaction stays lone.
        assert!(stage(&env1, true, DN2, A2));
        assert!(env1.commit());
        assert_eq!(env2.stats().committed_states, 1);
    }

    #[test]
    fn test_s4_collaborate_with_aborted_partner() {
        let (env1, _) = open_memory(&["x"]);
        let (env2, _) = open_memory(&["y"]);
        assert!(stage(&env1, true, DN1, A1));
        assert!(!stage(&env2, true, DN2, A3));
        // The merge succeeds as a call, by dooming env1 as well.
        assert!(env1.collaborate(&env2));
        assert!(!env1.commit());
        assert!(!env2.commit());
        assert_eq!(env1.stats().committed_states, 0);
    }

    #[test]
    fn test_s5_reset_on_empty_environment() {
        let (backend, _) = open_memory(&["x"]);
        assert!(backend.reset());
        assert!(backend.commit());
        let stats = backend.stats();
        assert_eq!(stats.objects, 0);
        assert!(!stats.txn_active);
    }

    #[test]
    fn test_reset_drops_committed_but_keeps_later_adds() {
        let (backend, _) = open_memory(&["x", "y"]);
        assert!(stage(&backend, true, DN1, A1));
        assert!(backend.commit());
        assert!(backend.reset());
        assert!(stage(&backend, true, DN2, A2));
        assert!(backend.commit());
        let stats = backend.stats();
        assert_eq!(stats.objects, 1);
        assert_eq!(stats.committed_states, 1);
    }

    #[test]
    fn test_rollback_restores_pre_open_state() {
        let (backend, _) = open_memory(&["x"]);
        assert!(stage(&backend, true, DN1, A1));
        assert!(backend.commit());
        assert!(stage(&backend, true, DN2, A1));
        assert!(stage(&backend, false, DN1, A1));
        backend.rollback();
        let stats = backend.stats();
        assert_eq!(stats.objects, 1);
        assert_eq!(stats.committed_states, 1);
        // And the backend is usable again.
        assert!(stage(&backend, true, DN2, A1));
        assert!(backend.commit());
        assert_eq!(backend.stats().objects, 2);
    }

    #[test]
    fn test_duplicate_add_aborts() {
        let (backend, _) = open_memory(&["x"]);
        assert!(stage(&backend, true, DN1, A1));
        assert!(!stage(&backend, true, DN1, A1));
        // Abort is sticky until commit/rollback.
        assert!(!stage(&backend, true, DN2, A2));
        assert!(!backend.reset());
        assert!(!backend.commit());
        assert!(stage(&backend, true, DN2, A2));
        assert!(backend.commit());
        assert_eq!(backend.stats().committed_states, 1);
    }

    #[test]
    fn test_delete_of_absent_aborts() {
        let (backend, _) = open_memory(&["x"]);
        assert!(stage(&backend, true, DN1, A1));
        assert!(backend.commit());
        assert!(!stage(&backend, false, DN1, A2));
        assert!(!backend.prepare());
        backend.rollback();
        assert_eq!(backend.stats().committed_states, 1);
    }

    #[test]
    fn test_malformed_values_abort() {
        let (backend, _) = open_memory(&["x"]);
        let (_, a) = pair(DN1, A1);
        // Truncated DN header.
        assert!(!backend.add(&[b"\x04".as_slice(), a.as_slice()]));
        backend.rollback();
        let (d, _) = pair(DN1, A1);
        // Embedded NUL in the attribute.
        assert!(!backend.add(&[d.as_slice(), b"\x04\x06x \0 y@".as_slice()]));
        backend.rollback();
        assert_eq!(backend.stats().committed_states, 0);
    }

    #[test]
    fn test_s6_fire_then_advance_is_idempotent() {
        let (backend, sinks) = open_memory(&["a", "c"]);
        // `a` has `b` in its past; `c` waits for it, then a timer.
        let attr_a = "a b@12345 . hold@99999999999";
        let attr_c = "c . a?b d@0";
        assert!(stage(&backend, true, DN1, attr_a));
        assert!(stage(&backend, true, DN1, attr_c));
        assert!(backend.commit());

        // Within one pass the wait advances and the revealed `d@0` fires
        // exactly once on handler c.
        assert!(wait_for(|| sinks[1].lines().len() == 1));
        assert_eq!(sinks[1].lines(), vec![(DN1.to_string(), attr_c.to_string())]);
        // Handler a has nothing due before 99999999999.
        assert!(sinks[0].lines().is_empty());

        // Another pass (forced by a no-op commit cycle) adds nothing: the
        // advancement is idempotent and the re-fire is backed off.
        assert!(backend.reset());
        backend.rollback();
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(sinks[1].lines().len(), 1);
    }

    #[test]
    fn test_worker_sees_only_committed_state() {
        let (backend, sinks) = open_memory(&["x"]);
        assert!(stage(&backend, true, DN1, A1));
        // Staged but uncommitted: nothing may fire.
        std::thread::sleep(Duration::from_millis(100));
        assert!(sinks[0].lines().is_empty());
        assert!(backend.commit());
        assert!(wait_for(|| sinks[0].lines().len() == 1));
    }

    #[test]
    fn test_dump_shows_staging_regions() {
        let (backend, _) = open_memory(&["x"]);
        assert!(stage(&backend, true, DN1, A1));
        let dump = backend.dump();
        assert!(dump.contains("txn open"));
        assert!(dump.contains(DN1));
        assert!(dump.contains("[toadd]"));
        assert!(backend.commit());
        let dump = backend.dump();
        assert!(dump.contains("txn closed"));
        assert!(dump.contains("[state]"));
    }

    #[test]
    fn test_stats_serialize() {
        let (backend, _) = open_memory(&["x"]);
        let json = serde_json::to_value(backend.stats()).unwrap();
        assert_eq!(json["objects"], 0);
        assert_eq!(json["handlers"][0], "x");
    }
}
