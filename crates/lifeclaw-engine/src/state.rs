//! One life-cycle state: an attribute value holding a sequential process.
//!
//! The text is immutable once constructed; only the cursor offset, the
//! classification of the next word, the computed fire time, and the miss
//! counter ever change.

use chrono::Utc;
use lifeclaw_core::value::{ident_len, next_kind, NextKind};

/// Fire-time sentinel: dirty, recompute before use.
pub const TIM_DIRTY: i64 = 0;
/// Fire-time sentinel: never fires.
pub const TIM_NEVER: i64 = i64::MAX;

/// Unix seconds, the engine's single notion of "now".
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// One attribute-program.
#[derive(Debug)]
pub struct LcState {
    /// The attribute value as delivered. Immutable.
    text: String,
    /// Byte offset of the word behind the cursor.
    ofs_next: usize,
    /// Classification of that word.
    kind_next: NextKind,
    /// Next fire time; `TIM_DIRTY` means recompute, `TIM_NEVER` means never.
    tim_next: i64,
    /// Fires without an advancement from the directory, for back-off.
    cnt_missed: u8,
}

impl LcState {
    /// Build a state from validated attribute text.
    ///
    /// A committed value without an internal `" . "` cursor is an
    /// operational flaw: it is kept, logged, and never fires.
    pub fn new(text: String) -> Self {
        let (ofs_next, kind_next) = match text.find(" . ") {
            Some(dot) => {
                let ofs = dot + 3;
                (ofs, next_kind(&text[ofs..]))
            }
            None => {
                tracing::error!("operational flaw: lifecycleState without cursor: {text:?}");
                (text.len(), NextKind::Done)
            }
        };
        Self {
            text,
            ofs_next,
            kind_next,
            tim_next: TIM_DIRTY,
            cnt_missed: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// The program name: the identifier the text starts with.
    pub fn program_name(&self) -> &str {
        &self.text[..ident_len(&self.text)]
    }

    /// The word behind the cursor; empty once the process is done.
    pub fn next_word(&self) -> &str {
        let rest = &self.text[self.ofs_next..];
        match rest.find(' ') {
            Some(sp) => &rest[..sp],
            None => rest,
        }
    }

    pub fn kind(&self) -> NextKind {
        self.kind_next
    }

    pub fn tim_next(&self) -> i64 {
        self.tim_next
    }

    pub fn missed(&self) -> u8 {
        self.cnt_missed
    }

    pub fn is_dirty(&self) -> bool {
        self.tim_next == TIM_DIRTY
    }

    /// For an `Await` next word `lcname?event`, the two halves.
    pub fn wait_parts(&self) -> Option<(&str, &str)> {
        if self.kind_next != NextKind::Await {
            return None;
        }
        let word = self.next_word();
        let sep = ident_len(word);
        let rest = word.get(sep + 1..)?;
        Some((&word[..sep], &rest[..ident_len(rest)]))
    }

    /// Scan the words before the cursor (skipping the program name and the
    /// cursor itself) for one whose identifier prefix equals `event`.
    pub fn past_has_event(&self, event: &str) -> bool {
        self.text[..self.ofs_next]
            .split(' ')
            .skip(1)
            .filter(|w| !w.is_empty() && *w != ".")
            .any(|w| &w[..ident_len(w)] == event)
    }

    /// Recompute the fire time from the text. Only `Timer` words fire;
    /// an absent or zero timestamp means "now", and `0` never escapes as
    /// a concrete fire time (it is the dirty sentinel).
    pub fn update_firetime(&mut self) -> i64 {
        let mut update = TIM_NEVER;
        if self.kind_next == NextKind::Timer {
            let word = self.next_word();
            if let Some(at) = word.find('@') {
                let stamp = &word[at + 1..];
                if stamp.is_empty() {
                    update = unix_now();
                } else {
                    match stamp.parse::<i64>() {
                        Ok(0) => update = unix_now(),
                        Ok(v) => update = v,
                        Err(_) => {
                            tracing::error!("timestamp out of bounds in {:?}", word);
                        }
                    }
                }
            }
        }
        self.tim_next = update;
        update
    }

    /// Move the cursor past the current word and reclassify. The fire
    /// time becomes dirty; the caller handles object-level propagation.
    pub(crate) fn advance_cursor(&mut self) {
        let rest = &self.text[self.ofs_next..];
        self.ofs_next = match rest.find(' ') {
            Some(sp) => self.ofs_next + sp + 1,
            None => self.text.len(),
        };
        self.kind_next = next_kind(&self.text[self.ofs_next..]);
        self.tim_next = TIM_DIRTY;
    }

    /// Record a fire that went out without the directory having advanced
    /// the state yet: bump the miss counter and push the next offer to
    /// `now + min(base * 2^missed, cap)`.
    pub(crate) fn record_fire(&mut self, now: i64, base_secs: u64, cap_secs: u64) {
        let shift = u32::from(self.cnt_missed.min(31));
        let delay = base_secs
            .checked_shl(shift)
            .unwrap_or(cap_secs)
            .min(cap_secs)
            .clamp(1, i64::MAX as u64);
        self.tim_next = now.saturating_add(delay as i64);
        self.cnt_missed = self.cnt_missed.saturating_add(1);
    }
}
