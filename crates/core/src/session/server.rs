//! The session daemon: socket ownership, the serialised dispatch loop,
//! and the policy/confirmation gate.
//!
//! One scheduler task owns the session state; connections feed it over
//! a channel, so requests execute one at a time in ingress-arrival
//! order. Responses per connection preserve request order because each
//! connection task awaits its reply before reading the next frame.

use std::path::PathBuf;
use std::time::Duration;

use ab_protocol::{Action, ErrorKind, ParseFailure, Request, Response, parse_request};
use futures::FutureExt;
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::confirm::ConfirmationRegistry;
use crate::error::{CoreError, Result};
use crate::exec;
use crate::paths;
use crate::policy::{self, PolicyLoader, Verdict};
use crate::session::SessionState;
use crate::vault::Vault;

const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const STALE_PROBE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct DaemonConfig {
	pub session: String,
	pub idle_timeout: Duration,
	pub policy_path: Option<PathBuf>,
}

impl Default for DaemonConfig {
	fn default() -> Self {
		Self {
			session: paths::session_name_from_env(),
			idle_timeout: DEFAULT_IDLE_TIMEOUT,
			policy_path: None,
		}
	}
}

struct Job {
	request: Request,
	reply: oneshot::Sender<Response>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
	Running,
	Draining,
}

pub struct Daemon {
	config: DaemonConfig,
}

impl Daemon {
	pub fn new(config: DaemonConfig) -> Self {
		Self { config }
	}

	/// Binds the session socket and serves until close or idle timeout.
	/// Returns an error immediately when another daemon owns the
	/// session.
	pub async fn run(self) -> Result<()> {
		let socket_path = paths::socket_path(&self.config.session)?;
		prepare_socket_path(&socket_path).await?;

		#[cfg(unix)]
		{
			let listener = tokio::net::UnixListener::bind(&socket_path)
				.map_err(|err| CoreError::internal(format!("bind {}: {err}", socket_path.display())))?;
			crate::crypto::restrict_file(&socket_path);
			info!(target = "ab.daemon", session = %self.config.session, path = %socket_path.display(), "listening");
			let result = self.serve_unix(listener).await;
			let _ = std::fs::remove_file(&socket_path);
			result
		}

		#[cfg(not(unix))]
		{
			let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
				.await
				.map_err(|err| CoreError::internal(format!("bind tcp: {err}")))?;
			let port = listener.local_addr()?.port();
			let sentinel = paths::port_sentinel(&self.config.session)?;
			crate::crypto::write_restricted(&sentinel, format!("{port}\n").as_bytes())
				.map_err(|err| CoreError::internal(err.to_string()))?;
			info!(target = "ab.daemon", session = %self.config.session, port, "listening (tcp fallback)");
			let result = self.serve_tcp(listener).await;
			let _ = std::fs::remove_file(&sentinel);
			result
		}
	}

	#[cfg(unix)]
	async fn serve_unix(self, listener: tokio::net::UnixListener) -> Result<()> {
		let (jobs_tx, jobs_rx) = mpsc::channel::<Job>(64);
		let scheduler = tokio::spawn(scheduler_loop(self.config.clone(), jobs_rx));

		let accept = async move {
			loop {
				match listener.accept().await {
					Ok((stream, _)) => {
						tokio::spawn(serve_connection(stream, jobs_tx.clone()));
					}
					Err(err) => {
						warn!(target = "ab.daemon", error = %err, "accept failed");
					}
				}
			}
		};

		tokio::select! {
			result = scheduler => {
				result.map_err(|err| CoreError::internal(format!("scheduler: {err}")))?
			}
			_ = accept => unreachable!("accept loop never returns"),
		}
	}

	#[cfg(not(unix))]
	async fn serve_tcp(self, listener: tokio::net::TcpListener) -> Result<()> {
		let (jobs_tx, jobs_rx) = mpsc::channel::<Job>(64);
		let scheduler = tokio::spawn(scheduler_loop(self.config.clone(), jobs_rx));

		let accept = async move {
			loop {
				match listener.accept().await {
					Ok((stream, _)) => {
						tokio::spawn(serve_connection(stream, jobs_tx.clone()));
					}
					Err(err) => {
						warn!(target = "ab.daemon", error = %err, "accept failed");
					}
				}
			}
		};

		tokio::select! {
			result = scheduler => {
				result.map_err(|err| CoreError::internal(format!("scheduler: {err}")))?
			}
			_ = accept => unreachable!("accept loop never returns"),
		}
	}
}

/// Startup probe: a connectable socket means another daemon owns this
/// session; an unconnectable one is stale and removed.
async fn prepare_socket_path(socket_path: &std::path::Path) -> Result<()> {
	if let Some(parent) = socket_path.parent() {
		std::fs::create_dir_all(parent)?;
		#[cfg(unix)]
		{
			use std::os::unix::fs::PermissionsExt;
			let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
		}
	}
	if !socket_path.exists() {
		return Ok(());
	}

	#[cfg(unix)]
	{
		let connect = tokio::net::UnixStream::connect(socket_path);
		if tokio::time::timeout(STALE_PROBE_TIMEOUT, connect).await.map(|r| r.is_ok()).unwrap_or(false) {
			return Err(CoreError::internal(format!(
				"another daemon owns this session ({})",
				socket_path.display()
			)));
		}
	}

	debug!(target = "ab.daemon", path = %socket_path.display(), "removing stale socket");
	let _ = std::fs::remove_file(socket_path);
	Ok(())
}

/// Reads newline-delimited JSON frames, pushing each through the
/// scheduler and writing the reply before reading the next frame.
async fn serve_connection<S: AsyncRead + AsyncWrite + Unpin>(stream: S, jobs: mpsc::Sender<Job>) {
	let (read_half, mut write_half) = tokio::io::split(stream);
	let mut lines = BufReader::new(read_half).lines();

	while let Ok(Some(line)) = lines.next_line().await {
		if line.trim().is_empty() {
			continue;
		}
		let response = match parse_request(&line) {
			Ok(request) => {
				let (reply_tx, reply_rx) = oneshot::channel();
				if jobs.send(Job { request, reply: reply_tx }).await.is_err() {
					// Scheduler gone: the session is draining out.
					Response::failure("", ErrorKind::SessionDraining, None)
				} else {
					match reply_rx.await {
						Ok(response) => response,
						Err(_) => Response::failure("", ErrorKind::SessionDraining, None),
					}
				}
			}
			Err(ParseFailure { id, kind, detail }) => Response::failure(id.unwrap_or_default(), kind, Some(&detail)),
		};

		let Ok(mut frame) = serde_json::to_vec(&response) else { continue };
		frame.push(b'\n');
		if write_half.write_all(&frame).await.is_err() {
			// Client went away; the request itself already ran.
			break;
		}
	}
}

async fn scheduler_loop(config: DaemonConfig, mut jobs: mpsc::Receiver<Job>) -> Result<()> {
	let vault = Vault::open_default().map_err(|err| CoreError::internal(err.to_string()))?;
	let mut session = SessionState::new(config.session.clone(), vault);
	let policy_path = match &config.policy_path {
		Some(path) => path.clone(),
		None => paths::policy_file()?,
	};
	let mut policy = PolicyLoader::new(policy_path);
	let confirmations = ConfirmationRegistry::new();
	let mut lifecycle = Lifecycle::Running;

	loop {
		let job = match tokio::time::timeout(config.idle_timeout, jobs.recv()).await {
			Ok(Some(job)) => job,
			Ok(None) => break,
			Err(_) => {
				info!(target = "ab.daemon", session = %config.session, "idle timeout, draining");
				break;
			}
		};

		let Job { request, reply } = job;
		let Request { id, action } = request;

		if lifecycle == Lifecycle::Draining && !matches!(action, Action::Close {}) {
			let _ = reply.send(Response::failure(id, ErrorKind::SessionDraining, None));
			continue;
		}

		match action {
			Action::Close {} => {
				session.close_browser().await;
				let _ = reply.send(Response::success(id, json!({ "closed": true })));
				break;
			}
			Action::Confirm { confirmation_id } => {
				let response = match confirmations.consume(&confirmation_id) {
					Some(pending) => run_action(&mut session, &id, pending.command, &mut lifecycle).await,
					None => Response::failure(&id, ErrorKind::InvalidArgument, Some("unknown or expired confirmation")),
				};
				let _ = reply.send(response);
			}
			Action::Deny { confirmation_id } => {
				let response = match confirmations.consume(&confirmation_id) {
					Some(pending) => Response::success(&id, json!({ "denied": pending.action_name })),
					None => Response::failure(&id, ErrorKind::InvalidArgument, Some("unknown or expired confirmation")),
				};
				let _ = reply.send(response);
			}
			action => {
				let category = policy::category_of(&action);
				let verdict = match policy.current() {
					Some((policy, confirm_set)) => policy::evaluate(category, Some(policy), confirm_set),
					None => policy::evaluate(category, None, &Default::default()),
				};
				let response = match verdict {
					Verdict::Deny => {
						debug!(target = "ab.daemon", action = action.name(), category = %category, "policy denied");
						Response::failure(&id, ErrorKind::PolicyDenied, None)
					}
					Verdict::Confirm => {
						let pending = confirmations.request(category, action);
						Response::confirmation(&id, pending.id, category.as_str(), pending.description)
					}
					Verdict::Allow => run_action(&mut session, &id, action, &mut lifecycle).await,
				};
				let _ = reply.send(response);
			}
		}
	}

	// Teardown observes prior actions' effects: the loop is serial.
	session.close_browser().await;
	info!(target = "ab.daemon", session = %config.session, "stopped");
	Ok(())
}

/// Executes one gated action, converting panics into the terminal
/// draining state.
async fn run_action(session: &mut SessionState, id: &str, action: Action, lifecycle: &mut Lifecycle) -> Response {
	let name = action.name();
	let outcome = std::panic::AssertUnwindSafe(exec::execute(session, action)).catch_unwind().await;
	match outcome {
		Ok(Ok(data)) => Response::success(id, data),
		Ok(Err(err)) => Response::failure(id, err.kind, err.detail.as_deref()),
		Err(_) => {
			warn!(target = "ab.daemon", action = name, "panic in executor; session draining");
			*lifecycle = Lifecycle::Draining;
			Response::failure(id, ErrorKind::SessionDraining, Some("internal panic"))
		}
	}
}
