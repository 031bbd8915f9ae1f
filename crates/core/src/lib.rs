//! The agent-browser daemon runtime.
//!
//! One daemon process owns one browser and serves one named session over
//! a local socket. Components, leaves first:
//!
//! * [`crypto`] - AEAD primitives and restricted-permission file I/O
//! * [`vault`] - encrypted credential records on disk
//! * [`policy`] - action categories and allow/deny/confirm evaluation
//! * [`confirm`] - pending confirmations with auto-expiry
//! * [`snapshot`] - accessibility capture, ref assignment, resolution
//! * [`session`] - socket listener, dispatch loop, tab/frame state
//! * [`exec`] - per-action semantics against the browser capability
//! * [`relay`] - CDP ↔ extension-envelope bridge

pub mod confirm;
pub mod crypto;
pub mod error;
pub mod exec;
pub mod paths;
pub mod policy;
pub mod relay;
pub mod session;
pub mod snapshot;
pub mod vault;

pub use error::{CoreError, Result};
