use clap::Parser;

mod cli;
mod client;
mod logging;

use cli::{Cli, Command};

#[tokio::main]
async fn main() {
	let args = Cli::parse();
	logging::init_logging(args.verbose);

	let result = match args.command {
		Command::Serve { session, idle_timeout } => serve(session, idle_timeout).await,
		Command::Request { frame, session, no_spawn } => client::request(frame, session, !no_spawn).await,
	};

	if let Err(err) = result {
		eprintln!("error: {err}");
		std::process::exit(1);
	}
}

async fn serve(session: Option<String>, idle_timeout: Option<u64>) -> anyhow::Result<()> {
	let mut config = ab_core::session::DaemonConfig::default();
	if let Some(session) = session {
		config.session = session;
	}
	if let Some(secs) = idle_timeout {
		config.idle_timeout = std::time::Duration::from_secs(secs);
	}
	ab_core::session::Daemon::new(config).run().await?;
	Ok(())
}
