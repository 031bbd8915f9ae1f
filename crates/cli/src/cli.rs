use clap::{Parser, Subcommand};

/// Session-scoped browser automation daemon for machine agents.
///
/// The human-facing command grammar lives in the thin client; this
/// binary is the daemon plus a raw request forwarder.
#[derive(Debug, Parser)]
#[command(name = "agent-browser", version, about)]
pub struct Cli {
	/// Increase log verbosity (-v, -vv)
	#[arg(short, long, action = clap::ArgAction::Count, global = true)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
	/// Run the session daemon in the foreground
	Serve {
		/// Session name (default: $AGENT_BROWSER_SESSION or "default")
		#[arg(long)]
		session: Option<String>,
		/// Idle seconds before the daemon drains and exits
		#[arg(long, value_name = "SECONDS")]
		idle_timeout: Option<u64>,
	},
	/// Send one JSON request frame to the session daemon
	Request {
		/// The frame, e.g. '{"id":"1","action":"navigate","url":"https://example.com"}'
		frame: String,
		/// Session name (default: $AGENT_BROWSER_SESSION or "default")
		#[arg(long)]
		session: Option<String>,
		/// Fail instead of spawning a daemon when none is running
		#[arg(long)]
		no_spawn: bool,
	},
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_request_invocation() {
		let cli = Cli::parse_from(["agent-browser", "request", r#"{"id":"1","action":"url"}"#, "--session", "ci"]);
		match cli.command {
			Command::Request { frame, session, no_spawn } => {
				assert!(frame.contains("url"));
				assert_eq!(session.as_deref(), Some("ci"));
				assert!(!no_spawn);
			}
			other => panic!("unexpected command {other:?}"),
		}
	}

	#[test]
	fn parses_serve_with_idle_timeout() {
		let cli = Cli::parse_from(["agent-browser", "-vv", "serve", "--idle-timeout", "60"]);
		assert_eq!(cli.verbose, 2);
		match cli.command {
			Command::Serve { idle_timeout, .. } => assert_eq!(idle_timeout, Some(60)),
			other => panic!("unexpected command {other:?}"),
		}
	}
}
