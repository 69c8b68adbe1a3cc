//! The two attribute grammars: distinguishedName and lifecycleState.
//!
//! Both are anchored extended regexes, compiled once per process on first
//! use. Tests (and adventurous deployments) can build a [`Grammar`] from
//! their own pattern and pass it wherever the defaults would be used.
//!
//! A lifecycleState is a name followed by words, with a lone `.` cursor
//! separating past from future:
//!
//! ```text
//! pkix req@56 pubkey@123 . cert@ deprecate@ expire@
//! ```
//!
//! Before the cursor every step is complete (`event@ts`, `lcname?event`,
//! `var=value`); behind it the timestamp or value may still be missing.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{LifeClawError, Result};

const IDENT: &str = "[A-Za-z0-9_-]+";
const VALUE: &str = r"[^ \r\n]+";

/// A compiled, anchored grammar.
pub struct Grammar {
    re: Regex,
}

impl Grammar {
    /// Compile a grammar from a regex pattern. The pattern should be
    /// anchored; nothing is added around it.
    pub fn new(pattern: &str) -> Result<Self> {
        let re = Regex::new(pattern)
            .map_err(|e| LifeClawError::Grammar(format!("bad grammar pattern: {e}")))?;
        Ok(Self { re })
    }

    /// Validate an input string. Embedded NUL never matches any grammar.
    /// Rejections are logged.
    pub fn matches(&self, input: &str) -> bool {
        if input.contains('\0') {
            tracing::warn!("rejecting input with embedded NUL");
            return false;
        }
        if !self.re.is_match(input) {
            tracing::warn!("grammar mismatch: {input:?}");
            return false;
        }
        true
    }
}

fn dn_pattern() -> String {
    let key = "[A-Za-z][A-Za-z0-9-]*";
    let val = r"[^,\r\n]+";
    format!("^{key}={val}(?:,{key}={val})*$")
}

fn lcstate_pattern() -> String {
    // Steps in the past are complete; steps behind the cursor may lack
    // their timestamp or value.
    let done = format!("(?:{IDENT}@[0-9]+|{IDENT}\\?{IDENT}|{IDENT}={VALUE})");
    let next = format!("(?:{IDENT}@[0-9]*|{IDENT}\\?{IDENT})");
    let todo = format!("(?:{IDENT}@[0-9]*|{IDENT}\\?{IDENT}|{IDENT}=(?:{VALUE})?)");
    format!("^{IDENT}(?: {done})* \\. {next}(?: {todo})*$")
}

/// The process-wide distinguishedName grammar.
pub fn distinguished_name() -> &'static Grammar {
    static DN: OnceLock<Grammar> = OnceLock::new();
    DN.get_or_init(|| Grammar::new(&dn_pattern()).expect("default DN grammar compiles"))
}

/// The process-wide lifecycleState grammar.
pub fn lifecycle_state() -> &'static Grammar {
    static LCS: OnceLock<Grammar> = OnceLock::new();
    LCS.get_or_init(|| Grammar::new(&lcstate_pattern()).expect("default lifecycleState grammar compiles"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dn_accepts() {
        let g = distinguished_name();
        assert!(g.matches("uid=bakker,dc=orvelte,dc=nep"));
        assert!(g.matches("uid=bakker%2bkoeken,dc=orvelte,dc=nep"));
        assert!(g.matches("cn=Jan de Boer,ou=smederij,dc=orvelte,dc=nep"));
    }

    #[test]
    fn test_dn_rejects() {
        let g = distinguished_name();
        assert!(!g.matches(""));
        assert!(!g.matches("no-equals-sign"));
        assert!(!g.matches("uid=,dc=nep"));
        assert!(!g.matches("uid=bakker,"));
        assert!(!g.matches("uid=bak\0ker"));
    }

    #[test]
    fn test_lcstate_accepts() {
        let g = lifecycle_state();
        assert!(g.matches("x . go@ gone@"));
        assert!(g.matches("y aap@12345 . noot@ mies@"));
        assert!(g.matches("pkix req@56 pubkey@123 . cert@ deprecate@ expire@"));
        assert!(g.matches("a b@0 . c?b d@0"));
        assert!(g.matches("x serial=17 . go@1234567890 env?ready v="));
    }

    #[test]
    fn test_lcstate_rejects() {
        let g = lifecycle_state();
        // Two cursors.
        assert!(!g.matches("y aap@12345 . noot@ . mies@"));
        // No cursor, or nothing behind it.
        assert!(!g.matches("x go@ gone@"));
        assert!(!g.matches("x ."));
        assert!(!g.matches("x . "));
        // Timestamp and value are mandatory in the past.
        assert!(!g.matches("x go@ . gone@"));
        assert!(!g.matches("x v= . gone@"));
        // An annotation cannot be the blocking next step.
        assert!(!g.matches("x . v=1"));
    }

    #[test]
    fn test_grammar_override() {
        let g = Grammar::new("^[0-9]+$").unwrap();
        assert!(g.matches("12345"));
        assert!(!g.matches("x . go@"));
        assert!(Grammar::new("([").is_err());
    }
}
