use tracing_subscriber::EnvFilter;

pub fn init_logging(verbosity: u8) {
	// 0 = errors only; -v = daemon info; -vv = everything including CDP
	// frame tracing.
	let filter = match verbosity {
		0 => "error",
		1 => "info",
		_ => "debug,ab.cdp=trace",
	};

	let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

	tracing_subscriber::fmt()
		.with_env_filter(env_filter)
		.with_writer(std::io::stderr)
		.with_target(true)
		.compact()
		.init();
}
