//! # childminder
//!
//! Supervise child processes behind pseudo-terminals and multiplex their
//! output into one stream, every line tagged with an aligned, optionally
//! colored prefix.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use childminder::{Childminder, ChildOptions};
//!
//! # #[tokio::main]
//! # async fn main() -> childminder::Result<()> {
//! let cm = Childminder::new();
//!
//! let web = cm.create("python3", &["-m".into(), "http.server".into()], ChildOptions {
//!     prefix: Some("web".into()),
//!     prefix_color: Some(120),
//!     ..Default::default()
//! })?;
//! let worker = cm.create("./worker.sh", &[], ChildOptions {
//!     prefix: Some("worker".into()),
//!     prefix_color: Some(130),
//!     ..Default::default()
//! })?;
//!
//! worker.restart().await?;
//! web.kill().await?;
//! cm.wait_all().await;
//! # Ok(())
//! # }
//! ```

pub mod child;
pub mod error;
pub mod framer;
pub mod host;
pub mod lines;
pub mod prefix;
pub mod registry;
pub mod sink;

pub use child::{Child, ChildOptions};
pub use error::{Error, Result};
pub use framer::LineFramer;
pub use host::{ExitStatus, ProcessHost, PtyHost, SpawnOptions, SpawnedProcess, Terminate};
pub use lines::LineSplitter;
pub use prefix::{AlignmentWidth, Prefix};
pub use registry::Childminder;
pub use sink::{OutputCapture, Sink};

pub use nix::sys::signal::Signal;
