use std::io;

/// Errors from process supervision.
#[derive(Debug)]
pub enum Error {
	/// The process host could not create the process.
	Spawn { command: String, message: String },
	/// Pty allocation or setup failed.
	Pty(String),
	/// A signal could not be delivered.
	Signal { pid: u32, source: nix::Error },
	/// IO error while talking to the process or the sink.
	Io(io::Error),
}

impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Error::Spawn { command, message } => write!(f, "failed to spawn {}: {}", command, message),
			Error::Pty(e) => write!(f, "pty error: {}", e),
			Error::Signal { pid, source } => write!(f, "failed to signal pid {}: {}", pid, source),
			Error::Io(e) => write!(f, "io error: {}", e),
		}
	}
}

impl std::error::Error for Error {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			Error::Signal { source, .. } => Some(source),
			Error::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		Error::Io(e)
	}
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn display_spawn_error() {
		let err = Error::Spawn {
			command: "nope".into(),
			message: "not found".into(),
		};
		assert_eq!(err.to_string(), "failed to spawn nope: not found");
	}

	#[test]
	fn io_error_converts() {
		let err: Error = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
		assert!(matches!(err, Error::Io(_)));
		assert!(std::error::Error::source(&err).is_some());
	}
}
