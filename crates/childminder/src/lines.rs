/// Splits a raw byte stream into lines.
///
/// `\r\n`, `\n` and a lone `\r` all end a line, including a `\r\n` pair that
/// straddles two chunks. Incomplete trailing bytes are held until the next
/// chunk or [`LineSplitter::finish`].
#[derive(Debug, Default)]
pub struct LineSplitter {
	partial: Vec<u8>,
	last_was_cr: bool,
	keep_empty: bool,
}

impl LineSplitter {
	pub fn new(keep_empty: bool) -> Self {
		Self {
			partial: Vec::new(),
			last_was_cr: false,
			keep_empty,
		}
	}

	/// Feeds one chunk, returning every line it completes.
	pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
		let mut lines = Vec::new();
		for &byte in chunk {
			match byte {
				b'\n' if self.last_was_cr => {
					self.last_was_cr = false;
				}
				b'\n' | b'\r' => {
					self.last_was_cr = byte == b'\r';
					let line = std::mem::take(&mut self.partial);
					if self.keep_empty || !line.is_empty() {
						lines.push(line);
					}
				}
				_ => {
					self.last_was_cr = false;
					self.partial.push(byte);
				}
			}
		}
		lines
	}

	/// Flushes the buffered partial line at end of stream.
	pub fn finish(&mut self) -> Option<Vec<u8>> {
		self.last_was_cr = false;
		if self.partial.is_empty() {
			None
		} else {
			Some(std::mem::take(&mut self.partial))
		}
	}
}
