use std::sync::{Arc, Mutex};

use crate::child::{Child, ChildOptions};
use crate::error::Result;
use crate::host::{ProcessHost, PtyHost};
use crate::prefix::{AlignmentWidth, Prefix};

/// Creates [`Child`] supervisors and keeps their prefixes aligned.
///
/// Every child created here shares one [`AlignmentWidth`], wide enough for
/// the longest prefix seen so far plus a separating space.
pub struct Childminder {
	host: Arc<dyn ProcessHost>,
	width: AlignmentWidth,
	children: Mutex<Vec<Arc<Child>>>,
}

impl Childminder {
	pub fn new() -> Self {
		Self::with_host(Arc::new(PtyHost))
	}

	pub fn with_host(host: Arc<dyn ProcessHost>) -> Self {
		Self {
			host,
			width: AlignmentWidth::new(),
			children: Mutex::new(Vec::new()),
		}
	}

	/// Registers a new child and, unless `options.lazy` is set, starts it.
	///
	/// Must be called within a tokio runtime. A spawn failure is returned
	/// and the child is not registered.
	pub fn create(&self, command: &str, args: &[String], options: ChildOptions) -> Result<Arc<Child>> {
		let prefix = Prefix::new(options.prefix.as_deref(), options.prefix_color);
		self.width.widen(&prefix);

		let child = Arc::new(Child::new(
			Arc::clone(&self.host),
			prefix,
			self.width.clone(),
			command,
			args,
			options,
		)?);

		self.children
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.push(Arc::clone(&child));
		Ok(child)
	}

	/// Current padding column shared by all children.
	pub fn alignment_width(&self) -> usize {
		self.width.get()
	}

	/// Every child created so far, in creation order.
	pub fn children(&self) -> Vec<Arc<Child>> {
		self.children.lock().unwrap_or_else(|e| e.into_inner()).clone()
	}

	/// Kills every running child, returning the first error encountered.
	pub async fn kill_all(&self) -> Result<()> {
		let mut first_err = None;
		for child in self.children() {
			if let Err(e) = child.kill().await {
				tracing::error!(command = %child.command(), "failed to kill: {}", e);
				first_err.get_or_insert(e);
			}
		}
		match first_err {
			Some(e) => Err(e),
			None => Ok(()),
		}
	}

	/// Resolves once no child is running.
	pub async fn wait_all(&self) {
		for child in self.children() {
			child.wait_for_exit().await;
		}
	}
}

impl Default for Childminder {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::error::Error;
	use crate::host::{ExitStatus, SpawnOptions, SpawnedProcess, Terminate};
	use crate::sink::Sink;
	use nix::sys::signal::Signal;
	use tokio::sync::{mpsc, oneshot};

	/// Every spawned process echoes its first argument and exits.
	struct EchoHost;

	struct NoopTerminator;

	impl Terminate for NoopTerminator {
		fn terminate(&self, _signal: Signal) -> Result<()> {
			Ok(())
		}
	}

	impl ProcessHost for EchoHost {
		fn spawn(&self, command: &str, args: &[String], _options: &SpawnOptions) -> Result<SpawnedProcess> {
			if command != "echo" {
				return Err(Error::Spawn {
					command: command.to_string(),
					message: "not found".into(),
				});
			}
			let (out_tx, out_rx) = mpsc::channel(1);
			out_tx
				.try_send(format!("{}\r\n", args.join(" ")).into_bytes())
				.unwrap();
			let (exit_tx, exit_rx) = oneshot::channel();
			exit_tx.send(ExitStatus { code: 0, signal: None }).unwrap();
			Ok(SpawnedProcess {
				pid: None,
				output: out_rx,
				exit: exit_rx,
				terminator: Box::new(NoopTerminator),
			})
		}
	}

	fn options(prefix: Option<&str>, sink: Sink) -> ChildOptions {
		ChildOptions {
			prefix: prefix.map(str::to_string),
			sink,
			..Default::default()
		}
	}

	#[tokio::test]
	async fn width_tracks_longest_prefix() {
		let cm = Childminder::with_host(Arc::new(EchoHost));
		assert_eq!(cm.alignment_width(), 0);

		cm.create("echo", &[], ChildOptions { lazy: true, ..Default::default() }).unwrap();
		assert_eq!(cm.alignment_width(), 0);

		cm.create("echo", &[], ChildOptions { lazy: true, ..options(Some("blablabla"), Sink::Stdout) })
			.unwrap();
		assert_eq!(cm.alignment_width(), 12);

		cm.create("echo", &[], ChildOptions { lazy: true, ..options(Some("blabla"), Sink::Stdout) })
			.unwrap();
		assert_eq!(cm.alignment_width(), 12);
		assert_eq!(cm.children().len(), 3);
	}

	#[tokio::test]
	async fn children_share_alignment() {
		let cm = Childminder::with_host(Arc::new(EchoHost));
		let (sink1, out1) = Sink::capture();
		let (sink2, out2) = Sink::capture();

		let a = cm
			.create("echo", &["hello".into()], ChildOptions { lazy: true, ..options(Some("blabla"), sink1) })
			.unwrap();
		let b = cm
			.create("echo", &["world".into()], ChildOptions { lazy: true, ..options(Some("blablabla"), sink2) })
			.unwrap();

		a.start_or_restart().await.unwrap();
		b.start_or_restart().await.unwrap();
		cm.wait_all().await;

		assert_eq!(out1.snapshot_string().await, "[blabla]    hello\n");
		assert_eq!(out2.snapshot_string().await, "[blablabla] world\n");
	}

	#[tokio::test]
	async fn failed_create_is_not_registered() {
		let cm = Childminder::with_host(Arc::new(EchoHost));
		assert!(cm.create("nope", &[], ChildOptions::default()).is_err());
		assert!(cm.children().is_empty());
	}

	#[tokio::test]
	async fn kill_all_stops_everything() {
		let cm = Childminder::with_host(Arc::new(EchoHost));
		let (sink, _out) = Sink::capture();
		cm.create("echo", &["a".into()], options(None, sink.clone())).unwrap();
		cm.create("echo", &["b".into()], options(None, sink)).unwrap();

		cm.kill_all().await.unwrap();
		cm.wait_all().await;
		assert!(cm.children().iter().all(|c| !c.is_running()));
	}
}
