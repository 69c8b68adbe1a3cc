//! # LifeClaw Core
//!
//! Shared foundation for the LifeClaw life-cycle scheduler:
//! - error types (`error`)
//! - configuration (`config`)
//! - length-prefixed value decoding and word classification (`value`)
//! - the distinguishedName / lifecycleState grammars (`grammar`)
//!
//! The engine crate builds the scheduler on top of these; the daemon binary
//! uses them to wrap its feed into wire values.

pub mod config;
pub mod error;
pub mod grammar;
pub mod value;

pub use config::{LifeClawConfig, SchedulerConfig};
pub use error::{LifeClawError, Result};
pub use grammar::Grammar;
pub use value::NextKind;
