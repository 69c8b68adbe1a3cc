//! # LifeClaw Engine
//!
//! The life-cycle scheduler proper. A directory feed stages attribute
//! changes into per-environment transactions; a service worker per
//! environment advances cross-process waits, keeps a partially sorted
//! timer queue, and pipes due actions into named handler programs.
//!
//! ## Architecture
//! ```text
//! directory feed ──▶ LcBackend (add/del/reset/commit/rollback)
//!                       │  stages into three-region objects,
//!                       │  ring-linked with collaborating envs
//!                       ▼
//!                    EnvState ◀── mutex/condvar ──▶ service worker
//!                                                     ├── advance ?-waits
//!                                                     ├── partial-sort timers
//!                                                     └── fire "dn\nattr\n"
//!                                                         into handler pipes
//! ```
//!
//! Handlers move a process forward by writing the advanced attribute back
//! through the directory, which arrives here as a delete + add pair in
//! one transaction.

pub mod advance;
pub mod backend;
pub mod drivers;
pub mod env;
pub mod object;
pub mod state;
pub mod timers;
pub mod txn;
pub mod worker;

pub use backend::LcBackend;
pub use drivers::{DriverSink, LcDriver, MemorySink, PipeSink};
pub use env::EnvStats;
pub use object::LcObject;
pub use state::{LcState, TIM_DIRTY, TIM_NEVER};
