//! The scheduler queue: a partially sorted object vector.
//!
//! The prefix `[0 .. sorted_len)` is ordered by fire time; the tail is in
//! arbitrary order. Each pass refreshes dirty tails, pulls anything due
//! or near into the prefix, and leaves far-future objects untouched. The
//! window halves as closer candidates appear, so a pass spends no effort
//! ordering objects that cannot matter before the next wake-up.

use crate::object::LcObject;
use crate::state::TIM_DIRTY;

/// One sorting pass over the tail. Returns the selection window that was
/// in effect at the end (callers restart the pass when firing overran it).
pub fn sort_pass(objects: &mut Vec<LcObject>, sorted_len: &mut usize, now: i64) -> i64 {
    // Objects dirtied since the last pass fall out of the prefix first.
    let mut i = 0;
    while i < *sorted_len {
        if objects[i].is_dirty() {
            let obj = objects.remove(i);
            objects.push(obj);
            *sorted_len -= 1;
        } else {
            i += 1;
        }
    }

    let mut window = i64::MAX;
    let mut i = *sorted_len;
    while i < objects.len() {
        objects[i].refresh_if_dirty();
        let fire = objects[i].tim_first();
        let dist = fire.saturating_sub(now);
        if fire <= now || dist <= window {
            if fire > now && dist < window / 2 {
                window = dist.saturating_mul(2);
            }
            let obj = objects.remove(i);
            let pos = objects[..*sorted_len].partition_point(|o| o.tim_first() <= obj.tim_first());
            objects.insert(pos, obj);
            *sorted_len += 1;
        }
        i += 1;
    }
    window
}

/// Drop the head object back into the unsorted tail (after its fires ran
/// and its fire time moved on).
pub fn demote_head(objects: &mut Vec<LcObject>, sorted_len: &mut usize) {
    debug_assert!(*sorted_len > 0 && !objects.is_empty());
    let obj = objects.remove(0);
    objects.push(obj);
    *sorted_len -= 1;
}

/// The head object's fire time, if any object is sorted in.
pub fn head_fire(objects: &[LcObject], sorted_len: usize) -> Option<i64> {
    if sorted_len == 0 {
        return None;
    }
    let fire = objects[0].tim_first();
    debug_assert!(fire != TIM_DIRTY);
    Some(fire)
}
