use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use owo_colors::{OwoColorize, XtermColors};

/// Label printed in front of every output line of a child.
///
/// `formatted` only adds non-printing escape sequences to `raw`, so padding
/// is always computed from the characters of `raw`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Prefix {
	pub raw: String,
	pub formatted: String,
}

impl Prefix {
	/// Builds `[label]`, styled with the xterm 256-color `color` when given.
	/// A missing label yields the empty prefix.
	pub fn new(label: Option<&str>, color: Option<u8>) -> Self {
		let raw = match label {
			Some(label) if !label.is_empty() => format!("[{}]", label),
			_ => String::new(),
		};
		let formatted = match color {
			Some(index) => style(&raw, index),
			None => raw.clone(),
		};
		Self { raw, formatted }
	}

	pub fn is_empty(&self) -> bool {
		self.raw.is_empty()
	}

	/// Printed columns of `raw`, counted in chars rather than bytes.
	pub fn width(&self) -> usize {
		self.raw.chars().count()
	}

	/// Width this prefix reserves in the shared alignment, separator included.
	pub fn reserved_width(&self) -> usize {
		if self.raw.is_empty() {
			0
		} else {
			self.width() + 1
		}
	}
}

/// Wraps `text` in the escape sequences for xterm color `index`.
pub fn style(text: &str, index: u8) -> String {
	text.color(XtermColors::from(index)).to_string()
}

/// Column where payload text starts, shared by every child of a registry.
///
/// Only ever grows. Clones share the same counter, so framers observe a
/// wider value as soon as a later child registers a longer prefix.
#[derive(Debug, Clone, Default)]
pub struct AlignmentWidth(Arc<AtomicUsize>);

impl AlignmentWidth {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self) -> usize {
		self.0.load(Ordering::Acquire)
	}

	/// Raises the width to fit `prefix`; returns the resulting width.
	pub fn widen(&self, prefix: &Prefix) -> usize {
		let wanted = prefix.reserved_width();
		self.0.fetch_max(wanted, Ordering::AcqRel).max(wanted)
	}

	/// Number of spaces to put after a prefix `prefix_width` columns wide.
	pub fn padding_for(&self, prefix_width: usize) -> usize {
		self.get().saturating_sub(prefix_width)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prefix_without_label_is_empty() {
		let p = Prefix::new(None, Some(120));
		assert!(p.is_empty());
		assert_eq!(p.formatted, "");
		assert_eq!(p.reserved_width(), 0);
	}

	#[test]
	fn prefix_without_color_is_plain() {
		let p = Prefix::new(Some("worker-1"), None);
		assert_eq!(p.raw, "[worker-1]");
		assert_eq!(p.formatted, "[worker-1]");
		assert_eq!(p.reserved_width(), 11);
	}

	#[test]
	fn colored_prefix_keeps_raw_text() {
		let p = Prefix::new(Some("blabla"), Some(120));
		assert_eq!(p.raw, "[blabla]");
		assert_eq!(p.formatted, "\x1b[38;5;120m[blabla]\x1b[39m");
	}

	#[test]
	fn non_ascii_label_is_measured_in_chars() {
		let p = Prefix::new(Some("café"), Some(120));
		assert_eq!(p.raw.len(), 7);
		assert_eq!(p.width(), 6);
		assert_eq!(p.reserved_width(), 7);
	}

	#[test]
	fn alignment_only_grows() {
		let width = AlignmentWidth::new();
		assert_eq!(width.get(), 0);

		assert_eq!(width.widen(&Prefix::new(Some("blablabla"), None)), 12);
		assert_eq!(width.widen(&Prefix::new(Some("blabla"), None)), 12);
		assert_eq!(width.widen(&Prefix::new(None, None)), 12);
		assert_eq!(width.get(), 12);
	}

	#[test]
	fn alignment_is_shared_between_clones() {
		let width = AlignmentWidth::new();
		let seen_by_framer = width.clone();
		width.widen(&Prefix::new(Some("blabla"), None));
		assert_eq!(seen_by_framer.padding_for(8), 1);
		width.widen(&Prefix::new(Some("blablabla"), None));
		assert_eq!(seen_by_framer.padding_for(8), 4);
		assert_eq!(seen_by_framer.padding_for(20), 0);
	}
}
