#![forbid(unsafe_code)]

//! Drill engine: the pure practice-session kernel.
//!
//! Synchronous and I/O-free. Callers hold a `DrillEngine` (or call
//! `transitions::apply_action` directly) and feed it `Action`s.

/// Version of the persisted state layout. Bumped on incompatible changes.
pub const STATE_VERSION: u32 = 1;

pub mod domain;
pub mod clock;
pub mod shuffle;
pub mod actions;
pub mod state;
pub mod run;
pub mod order;
pub mod ledger;
pub mod lists;
pub mod review;
pub mod transitions;
pub mod invariants;
pub mod hashing;
pub mod engine;

pub use actions::Action;
pub use clock::{IdentityClock, ManualClock, SystemClock};
pub use domain::AppState;
pub use engine::DrillEngine;
pub use transitions::apply_action;
