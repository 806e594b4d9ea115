use std::io::{self, Write};
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// Destination for framed output.
///
/// Cloning shares the destination, so several children can fan in to one
/// sink. Framers only append; nothing here is ever closed by a child.
#[derive(Clone, Default)]
pub enum Sink {
	/// The supervisor's own standard output.
	#[default]
	Stdout,
	/// In-memory capture, readable through [`OutputCapture::snapshot`].
	Capture(OutputCapture),
	/// Any async writer owned by the caller.
	Writer(Arc<Mutex<BoxedWriter>>),
}

impl Sink {
	pub fn writer<W>(writer: W) -> Self
	where
		W: AsyncWrite + Send + 'static,
	{
		Sink::Writer(Arc::new(Mutex::new(Box::pin(writer))))
	}

	pub fn capture() -> (Self, OutputCapture) {
		let capture = OutputCapture::new();
		(Sink::Capture(capture.clone()), capture)
	}

	/// Appends `data` as one unit; concurrent writers never split it.
	pub async fn write(&self, data: &[u8]) -> io::Result<()> {
		match self {
			Sink::Stdout => {
				let mut out = io::stdout().lock();
				out.write_all(data)?;
				out.flush()
			}
			Sink::Capture(capture) => {
				capture.write(data).await;
				Ok(())
			}
			Sink::Writer(writer) => {
				let mut writer = writer.lock().await;
				writer.write_all(data).await?;
				writer.flush().await
			}
		}
	}
}

impl std::fmt::Debug for Sink {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Sink::Stdout => write!(f, "Sink::Stdout"),
			Sink::Capture(_) => write!(f, "Sink::Capture"),
			Sink::Writer(_) => write!(f, "Sink::Writer"),
		}
	}
}

/// Append-only in-memory copy of everything written.
#[derive(Clone, Default)]
pub struct OutputCapture {
	buf: Arc<Mutex<Vec<u8>>>,
}

impl OutputCapture {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn write(&self, data: &[u8]) {
		self.buf.lock().await.extend_from_slice(data);
	}

	pub async fn snapshot(&self) -> Vec<u8> {
		self.buf.lock().await.clone()
	}

	pub async fn snapshot_string(&self) -> String {
		String::from_utf8_lossy(&self.snapshot().await).into_owned()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn capture_keeps_writes_in_order() {
		let (sink, capture) = Sink::capture();
		sink.write(b"one\n").await.unwrap();
		sink.clone().write(b"two\n").await.unwrap();
		assert_eq!(capture.snapshot_string().await, "one\ntwo\n");
	}

	#[tokio::test]
	async fn capture_keeps_everything() {
		let capture = OutputCapture::new();
		capture.write(&vec![b'a'; 256 * 1024]).await;
		capture.write(b"tail").await;
		let snap = capture.snapshot().await;
		assert_eq!(snap.len(), 256 * 1024 + 4);
		assert!(snap.starts_with(b"aaaa"));
		assert!(snap.ends_with(b"tail"));
	}

	#[tokio::test]
	async fn writer_sink_forwards_to_async_writer() {
		let (client, mut server) = tokio::io::duplex(64);
		let sink = Sink::writer(client);
		sink.write(b"piped\n").await.unwrap();

		let mut buf = [0u8; 6];
		tokio::io::AsyncReadExt::read_exact(&mut server, &mut buf).await.unwrap();
		assert_eq!(&buf, b"piped\n");
	}
}
