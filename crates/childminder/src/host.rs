use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, Result};

/// How a process is started. Reused verbatim on every restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnOptions {
	/// Extra environment on top of the supervisor's own.
	pub env: HashMap<String, String>,
	pub cwd: Option<PathBuf>,
	pub rows: u16,
	pub cols: u16,
	/// Value of `TERM` inside the pty.
	pub term: String,
}

impl Default for SpawnOptions {
	fn default() -> Self {
		Self {
			env: HashMap::new(),
			cwd: None,
			rows: 24,
			cols: 80,
			term: "xterm".to_string(),
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
	pub code: u32,
	pub signal: Option<String>,
}

impl ExitStatus {
	pub fn success(&self) -> bool {
		self.code == 0 && self.signal.is_none()
	}
}

/// Delivers termination requests to one spawned process.
pub trait Terminate: Send + Sync {
	fn terminate(&self, signal: Signal) -> Result<()>;
}

/// A process as handed back by a [`ProcessHost`].
pub struct SpawnedProcess {
	pub pid: Option<u32>,
	/// Raw output chunks; closes when the output stream ends.
	pub output: mpsc::Receiver<Vec<u8>>,
	/// Fires exactly once, when the process has exited.
	pub exit: oneshot::Receiver<ExitStatus>,
	pub terminator: Box<dyn Terminate>,
}

/// Spawns processes on behalf of a supervisor.
pub trait ProcessHost: Send + Sync {
	fn spawn(&self, command: &str, args: &[String], options: &SpawnOptions) -> Result<SpawnedProcess>;
}

/// Runs every process behind its own pseudo-terminal.
#[derive(Debug, Default, Clone, Copy)]
pub struct PtyHost;

impl ProcessHost for PtyHost {
	fn spawn(&self, command: &str, args: &[String], options: &SpawnOptions) -> Result<SpawnedProcess> {
		let pty_system = native_pty_system();
		let pair = pty_system
			.openpty(PtySize {
				rows: options.rows,
				cols: options.cols,
				pixel_width: 0,
				pixel_height: 0,
			})
			.map_err(|e| Error::Pty(e.to_string()))?;

		let mut cmd = CommandBuilder::new(command);
		cmd.args(args);
		cmd.env("TERM", &options.term);
		for (key, val) in &options.env {
			cmd.env(key, val);
		}
		if let Some(cwd) = &options.cwd {
			cmd.cwd(cwd);
		}

		let mut child = pair.slave.spawn_command(cmd).map_err(|e| Error::Spawn {
			command: command.to_string(),
			message: e.to_string(),
		})?;
		// The reader only sees EOF once no slave handle is left open here.
		drop(pair.slave);

		let pid = child.process_id();
		let mut reader = pair
			.master
			.try_clone_reader()
			.map_err(|e| Error::Pty(e.to_string()))?;

		let (output_tx, output_rx) = mpsc::channel::<Vec<u8>>(256);
		tokio::task::spawn_blocking(move || {
			let mut buf = [0u8; 8192];
			loop {
				match reader.read(&mut buf) {
					Ok(0) => break,
					Ok(n) => {
						if output_tx.blocking_send(buf[..n].to_vec()).is_err() {
							break;
						}
					}
					Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
					Err(ref e) if e.kind() == ErrorKind::WouldBlock => {
						std::thread::sleep(Duration::from_millis(5));
						continue;
					}
					// EIO once the slave side is gone
					Err(_) => break,
				}
			}
		});

		let master = pair.master;
		let (exit_tx, exit_rx) = oneshot::channel();
		tokio::task::spawn_blocking(move || {
			let status = match child.wait() {
				Ok(status) => ExitStatus {
					code: status.exit_code(),
					signal: status.signal().map(str::to_string),
				},
				Err(_) => ExitStatus {
					code: 1,
					signal: None,
				},
			};
			drop(master);
			let _ = exit_tx.send(status);
		});

		Ok(SpawnedProcess {
			pid,
			output: output_rx,
			exit: exit_rx,
			terminator: Box::new(PtyTerminator { pid }),
		})
	}
}

struct PtyTerminator {
	pid: Option<u32>,
}

impl Terminate for PtyTerminator {
	fn terminate(&self, signal: Signal) -> Result<()> {
		match self.pid {
			Some(pid) => signal_process_tree(pid, signal),
			None => Ok(()),
		}
	}
}

/// Signals the process group led by `pid`, falling back to `pid` alone.
/// A process that is already gone counts as success.
pub fn signal_process_tree(pid: u32, signal: Signal) -> Result<()> {
	let target = Pid::from_raw(pid as i32);
	let result = match killpg(target, signal) {
		Err(Errno::ESRCH) | Err(Errno::EPERM) => kill(target, signal),
		other => other,
	};
	match result {
		Ok(()) | Err(Errno::ESRCH) => Ok(()),
		Err(source) => Err(Error::Signal { pid, source }),
	}
}

/// True while `pid` names a live (or unreaped) process.
pub fn is_alive(pid: u32) -> bool {
	kill(Pid::from_raw(pid as i32), None).is_ok()
}
