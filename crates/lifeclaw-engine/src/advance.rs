//! Advancement of `?`-waits: one process waiting for an event in the past
//! of a sibling process under the same object.
//!
//! This must only run while no transaction is staged on the environment:
//! a transaction may have temporarily moved an attribute into the to-del
//! tail, and acting on a half-applied view would break atomicity. The
//! worker guarantees this by running between commits only.
//!
//! Objects are independent: waits never look across distinguished names.

use lifeclaw_core::value::NextKind;

use crate::object::LcObject;

/// Advance one state through consecutive `?`-waits until a timer, an
/// annotation, or the end of the process blocks it. Returns whether the
/// cursor moved. Idempotent.
pub fn advance_state(obj: &mut LcObject, i: usize) -> bool {
    let mut advanced = false;
    loop {
        if obj.state(i).kind() != NextKind::Await {
            break;
        }
        let (lcname, event) = match obj.state(i).wait_parts() {
            Some((l, e)) => (l.to_string(), e.to_string()),
            None => break,
        };
        // The wait target: first committed state of that program name.
        // It may be the waiting state itself.
        let other = obj
            .committed_range()
            .find(|&j| obj.state(j).program_name() == lcname);
        let stepped = match other {
            Some(j) => obj.state(j).past_has_event(&event),
            None => {
                tracing::warn!(
                    "no matching life cycle for {lcname:?}, passing {event:?} silently"
                );
                true
            }
        };
        if !stepped {
            break;
        }
        obj.advance_state_cursor(i);
        advanced = true;
    }
    advanced
}

/// Advance every committed state of an object to a fixpoint: one state's
/// advancement may expose a past event another state is waiting for.
/// Returns whether anything moved. Idempotent.
pub fn advance_object(obj: &mut LcObject) -> bool {
    let mut retval = false;
    loop {
        let mut didsth = false;
        for i in obj.committed_range() {
            didsth |= advance_state(obj, i);
        }
        retval |= didsth;
        if !didsth {
            break;
        }
    }
    retval
}
