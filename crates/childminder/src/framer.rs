use std::io;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::lines::LineSplitter;
use crate::prefix::{AlignmentWidth, Prefix};
use crate::sink::Sink;

/// Turns a child's output into prefixed, newline-terminated lines.
///
/// The padding is recomputed from the shared [`AlignmentWidth`] for every
/// line, so children registered later can widen the columns of children
/// that are already running.
#[derive(Debug, Clone)]
pub struct LineFramer {
	prefix: Prefix,
	width: AlignmentWidth,
	sink: Sink,
	keep_empty_lines: bool,
}

impl LineFramer {
	pub fn new(prefix: Prefix, width: AlignmentWidth, sink: Sink, keep_empty_lines: bool) -> Self {
		Self {
			prefix,
			width,
			sink,
			keep_empty_lines,
		}
	}

	pub fn prefix(&self) -> &Prefix {
		&self.prefix
	}

	/// `formatted + padding + line + "\n"`.
	pub fn frame(&self, line: &[u8]) -> Vec<u8> {
		let pad = self.width.padding_for(self.prefix.width());
		let mut framed = Vec::with_capacity(self.prefix.formatted.len() + pad + line.len() + 1);
		framed.extend_from_slice(self.prefix.formatted.as_bytes());
		framed.resize(framed.len() + pad, b' ');
		framed.extend_from_slice(line);
		framed.push(b'\n');
		framed
	}

	pub async fn write_line(&self, line: &[u8]) -> io::Result<()> {
		self.sink.write(&self.frame(line)).await
	}

	/// Pumps raw chunks from `output` through a fresh [`LineSplitter`] into
	/// the sink until the channel closes. The sink stays open afterwards.
	pub fn attach(&self, output: mpsc::Receiver<Vec<u8>>) -> JoinHandle<()> {
		let framer = self.clone();
		tokio::spawn(async move {
			if let Err(e) = framer.pump(output).await {
				tracing::error!(prefix = %framer.prefix.raw, "failed to write output: {}", e);
			}
		})
	}

	async fn pump(&self, mut output: mpsc::Receiver<Vec<u8>>) -> io::Result<()> {
		let mut splitter = LineSplitter::new(self.keep_empty_lines);
		while let Some(chunk) = output.recv().await {
			for line in splitter.push(&chunk) {
				self.write_line(&line).await?;
			}
		}
		if let Some(line) = splitter.finish() {
			self.write_line(&line).await?;
		}
		Ok(())
	}
}
