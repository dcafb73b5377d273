#![forbid(unsafe_code)]

//! Drill runtime: everything around the pure kernel.
//!
//! Snapshot persistence, the lock-guarded store, the AI and remote
//! collaborators, and the practice attempt flow. No reducer logic lives
//! here; state only changes by dispatching kernel actions.

pub mod config;
pub mod prompts;
pub mod snapshot_codec;
pub mod persistence;
pub mod session;
pub mod ai;
pub mod chat_provider;
pub mod http_transport;
pub mod mock_provider;
pub mod remote;
pub mod practice_flow;
