use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use nix::sys::signal::Signal;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::framer::LineFramer;
use crate::host::{ExitStatus, ProcessHost, SpawnOptions, Terminate};
use crate::prefix::{AlignmentWidth, Prefix};
use crate::sink::Sink;

/// Upper bound on how long exit accounting waits for buffered output.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

/// Options accepted by [`crate::Childminder::create`].
#[derive(Debug, Clone)]
pub struct ChildOptions {
	/// Label shown as `[prefix]` before every output line.
	pub prefix: Option<String>,
	/// xterm 256-color index for the label.
	pub prefix_color: Option<u8>,
	/// Where framed lines go. Defaults to stdout.
	pub sink: Sink,
	/// Do not start the process until asked to.
	pub lazy: bool,
	pub keep_empty_lines: bool,
	/// Signal sent by [`Child::kill`].
	pub kill_signal: Signal,
	/// Escalate to `SIGKILL` if the process outlives this after `kill`.
	pub kill_timeout: Option<Duration>,
	pub spawn: SpawnOptions,
}

impl Default for ChildOptions {
	fn default() -> Self {
		Self {
			prefix: None,
			prefix_color: None,
			sink: Sink::Stdout,
			lazy: false,
			keep_empty_lines: false,
			kill_signal: Signal::SIGHUP,
			kill_timeout: None,
			spawn: SpawnOptions::default(),
		}
	}
}

struct RunningProcess {
	generation: u64,
	pid: Option<u32>,
	terminator: Box<dyn Terminate>,
}

/// Process slot shared with the exit watcher of every spawned process.
struct Tracker {
	current: StdMutex<Option<RunningProcess>>,
	running: watch::Sender<bool>,
	last_exit: StdMutex<Option<ExitStatus>>,
}

impl Tracker {
	fn install(&self, process: RunningProcess) {
		let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
		*current = Some(process);
		self.running.send_replace(true);
	}

	fn clear(&self, generation: u64, status: Option<ExitStatus>) {
		let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
		if current.as_ref().is_some_and(|p| p.generation == generation) {
			*current = None;
			if let Some(status) = status {
				*self.last_exit.lock().unwrap_or_else(|e| e.into_inner()) = Some(status);
			}
			self.running.send_replace(false);
		}
	}
}

/// One supervised command.
///
/// The command, arguments and spawn options are fixed at construction and
/// reused for every start. The only lifecycle state is whether a process is
/// currently tracked; it is cleared by the process's exit notification, no
/// matter who caused the exit.
pub struct Child {
	command: String,
	args: Vec<String>,
	spawn_options: SpawnOptions,
	kill_signal: Signal,
	kill_timeout: Option<Duration>,
	host: Arc<dyn ProcessHost>,
	framer: LineFramer,
	tracker: Arc<Tracker>,
	generation: AtomicU64,
	lifecycle: Mutex<()>,
}

impl Child {
	pub(crate) fn new(
		host: Arc<dyn ProcessHost>,
		prefix: Prefix,
		width: AlignmentWidth,
		command: &str,
		args: &[String],
		options: ChildOptions,
	) -> Result<Self> {
		let (running, _) = watch::channel(false);
		let child = Self {
			command: command.to_string(),
			args: args.to_vec(),
			spawn_options: options.spawn,
			kill_signal: options.kill_signal,
			kill_timeout: options.kill_timeout,
			host,
			framer: LineFramer::new(prefix, width, options.sink, options.keep_empty_lines),
			tracker: Arc::new(Tracker {
				current: StdMutex::new(None),
				running,
				last_exit: StdMutex::new(None),
			}),
			generation: AtomicU64::new(0),
			lifecycle: Mutex::new(()),
		};

		if !options.lazy {
			child.spawn_process()?;
		}
		Ok(child)
	}

	pub fn prefix(&self) -> &Prefix {
		self.framer.prefix()
	}

	pub fn command(&self) -> &str {
		&self.command
	}

	pub fn args(&self) -> &[String] {
		&self.args
	}

	pub fn is_running(&self) -> bool {
		self.lock_current().is_some()
	}

	/// Pid of the current process, if one is running.
	pub fn pid(&self) -> Option<u32> {
		self.lock_current().as_ref().and_then(|p| p.pid)
	}

	/// Exit status of the most recently exited process.
	/// Whether a process has ever been spawned for this child.
	pub fn has_started(&self) -> bool {
		self.generation.load(Ordering::Relaxed) > 0
	}

	pub fn last_exit(&self) -> Option<ExitStatus> {
		self.tracker
			.last_exit
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.clone()
	}

	/// Starts the process, first killing and awaiting the current one if
	/// it is still running.
	pub async fn start_or_restart(&self) -> Result<()> {
		let _guard = self.lifecycle.lock().await;
		self.kill_locked().await?;
		self.spawn_process()
	}

	/// Same as [`Child::start_or_restart`], but warns when there is nothing
	/// to restart. The process is started either way.
	pub async fn restart(&self) -> Result<()> {
		if !self.is_running() {
			tracing::warn!(command = %self.command, prefix = %self.prefix().raw, "process is not running");
		}
		self.start_or_restart().await
	}

	/// Terminates the current process and waits until it has exited.
	/// Does nothing when no process is running.
	pub async fn kill(&self) -> Result<()> {
		let _guard = self.lifecycle.lock().await;
		self.kill_locked().await
	}

	/// Resolves once no process is running; immediately if none is.
	pub async fn wait_for_exit(&self) {
		let mut running = self.tracker.running.subscribe();
		let _ = running.wait_for(|running| !*running).await;
	}

	async fn kill_locked(&self) -> Result<()> {
		let pid = {
			let current = self.lock_current();
			match current.as_ref() {
				Some(process) => {
					process.terminator.terminate(self.kill_signal)?;
					process.pid
				}
				None => return Ok(()),
			}
		};
		tracing::debug!(command = %self.command, pid = ?pid, signal = ?self.kill_signal, "sent stop signal");

		let Some(timeout) = self.kill_timeout else {
			self.wait_for_exit().await;
			return Ok(());
		};

		if tokio::time::timeout(timeout, self.wait_for_exit()).await.is_err() {
			tracing::warn!(command = %self.command, pid = ?pid, "still running after {:?}, sending SIGKILL", timeout);
			{
				let current = self.lock_current();
				if let Some(process) = current.as_ref() {
					process.terminator.terminate(Signal::SIGKILL)?;
				}
			}
			self.wait_for_exit().await;
		}
		Ok(())
	}

	fn spawn_process(&self) -> Result<()> {
		let spawned = self.host.spawn(&self.command, &self.args, &self.spawn_options)?;
		let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
		let pump = self.framer.attach(spawned.output);

		self.tracker.install(RunningProcess {
			generation,
			pid: spawned.pid,
			terminator: spawned.terminator,
		});
		tracing::info!(command = %self.command, pid = ?spawned.pid, prefix = %self.prefix().raw, "spawned");

		tokio::spawn(watch_exit(
			Arc::clone(&self.tracker),
			generation,
			spawned.exit,
			pump,
			self.command.clone(),
		));
		Ok(())
	}

	fn lock_current(&self) -> std::sync::MutexGuard<'_, Option<RunningProcess>> {
		self.tracker.current.lock().unwrap_or_else(|e| e.into_inner())
	}
}

impl std::fmt::Debug for Child {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Child")
			.field("command", &self.command)
			.field("args", &self.args)
			.field("prefix", &self.prefix().raw)
			.field("running", &self.is_running())
			.finish()
	}
}

/// Clears the tracked process once it has exited and its output is flushed.
///
/// A pump still open after [`OUTPUT_DRAIN_TIMEOUT`] is aborted, so nothing
/// from this generation reaches the sink once the exit is recorded.
async fn watch_exit(
	tracker: Arc<Tracker>,
	generation: u64,
	exit: oneshot::Receiver<ExitStatus>,
	mut pump: JoinHandle<()>,
	command: String,
) {
	let status = exit.await.ok();
	if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut pump).await.is_err() {
		tracing::debug!(command = %command, "output still open after exit, dropping it");
		pump.abort();
		let _ = pump.await;
	}
	tracing::debug!(command = %command, status = ?status, "exited");
	tracker.clear(generation, status);
}
