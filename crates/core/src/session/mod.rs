//! Session ownership: one daemon process, one browser, one socket.

mod server;
mod sinks;
mod state;

pub use server::{Daemon, DaemonConfig};
pub use sinks::{ConsoleEntry, RequestEntry, Ring, RouteRule, RouteTable, Sinks, glob_match};
pub use state::{LaunchSpec, SessionState, Tab};
