use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use childminder::{ChildOptions, SpawnOptions};

pub const DEFAULT_CONFIG_FILE: &str = "childminder.toml";

/// Colors handed out to processes that don't pick one.
const PALETTE: &[u8] = &[39, 208, 120, 170, 226, 45, 203, 141];

// ── childminder.toml ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RunnerConfig {
	#[serde(default)]
	pub defaults: DefaultsConfig,
	#[serde(default)]
	pub procs: BTreeMap<String, ProcDef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
	#[serde(default = "default_rows")]
	pub rows: u16,
	#[serde(default = "default_cols")]
	pub cols: u16,
	/// Seconds before a kill escalates to SIGKILL.
	pub kill_timeout: Option<u64>,
	#[serde(default)]
	pub env: HashMap<String, String>,
}

impl Default for DefaultsConfig {
	fn default() -> Self {
		Self {
			rows: default_rows(),
			cols: default_cols(),
			kill_timeout: None,
			env: HashMap::new(),
		}
	}
}

fn default_rows() -> u16 { 24 }
fn default_cols() -> u16 { 80 }

/// A process entry: either a bare command string or a full table.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ProcDef {
	Simple(String),
	Full {
		run: String,
		color: Option<u8>,
		cwd: Option<String>,
		#[serde(default)]
		env: HashMap<String, String>,
		#[serde(default)]
		lazy: bool,
	},
}

/// A process ready to hand to the registry.
#[derive(Debug)]
pub struct ProcEntry {
	pub name: String,
	pub command: String,
	pub options: ChildOptions,
}

impl RunnerConfig {
	pub fn load(path: &Path) -> Result<Self, String> {
		let content = std::fs::read_to_string(path)
			.map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
		Self::parse(&content).map_err(|e| format!("failed to parse {}: {}", path.display(), e))
	}

	pub fn parse(content: &str) -> Result<Self, String> {
		toml::from_str(content).map_err(|e| e.to_string())
	}

	/// Resolves every entry, relative to `base_dir`, in name order.
	pub fn entries(&self, base_dir: &Path, color: bool) -> Vec<ProcEntry> {
		self.procs
			.iter()
			.enumerate()
			.map(|(i, (name, def))| {
				let fallback_color = PALETTE[i % PALETTE.len()];
				def.to_entry(name, &self.defaults, base_dir, color.then_some(fallback_color))
			})
			.collect()
	}
}

impl ProcDef {
	fn to_entry(
		&self,
		name: &str,
		defaults: &DefaultsConfig,
		base_dir: &Path,
		fallback_color: Option<u8>,
	) -> ProcEntry {
		let (run, color, cwd, env, lazy) = match self {
			ProcDef::Simple(run) => (run, None, None, None, false),
			ProcDef::Full { run, color, cwd, env, lazy } => (run, *color, cwd.as_ref(), Some(env), *lazy),
		};

		let mut merged_env = defaults.env.clone();
		if let Some(env) = env {
			merged_env.extend(env.clone());
		}
		let cwd = match cwd {
			Some(dir) => base_dir.join(expand_tilde(dir)),
			None => base_dir.to_path_buf(),
		};

		ProcEntry {
			name: name.to_string(),
			command: run.clone(),
			options: ChildOptions {
				prefix: Some(name.to_string()),
				prefix_color: fallback_color.map(|fallback| color.unwrap_or(fallback)),
				lazy,
				kill_timeout: defaults.kill_timeout.map(Duration::from_secs),
				spawn: SpawnOptions {
					env: merged_env,
					cwd: Some(cwd),
					rows: defaults.rows,
					cols: defaults.cols,
					..Default::default()
				},
				..Default::default()
			},
		}
	}
}

fn expand_tilde(path: &str) -> PathBuf {
	if let Some(rest) = path.strip_prefix("~/") {
		if let Ok(home) = std::env::var("HOME") {
			return PathBuf::from(home).join(rest);
		}
	}
	PathBuf::from(path)
}

#[cfg(test)]
mod tests {
	use super::*;

	const SAMPLE: &str = r#"
[defaults]
rows = 40
kill_timeout = 5
env = { FORCE_COLOR = "1" }

[procs]
web = "python -m http.server"
worker = { run = "./worker.sh", color = 130, cwd = "worker", env = { A = "1" }, lazy = true }
"#;

	#[test]
	fn parses_simple_and_full_entries() {
		let config = RunnerConfig::parse(SAMPLE).unwrap();
		assert_eq!(config.defaults.rows, 40);
		assert_eq!(config.defaults.cols, 80);
		assert_eq!(config.procs.len(), 2);
		assert!(matches!(config.procs["web"], ProcDef::Simple(_)));
	}

	#[test]
	fn entries_merge_defaults() {
		let config = RunnerConfig::parse(SAMPLE).unwrap();
		let entries = config.entries(Path::new("/srv/app"), true);

		let web = &entries[0];
		assert_eq!(web.name, "web");
		assert_eq!(web.command, "python -m http.server");
		assert_eq!(web.options.prefix.as_deref(), Some("web"));
		assert_eq!(web.options.prefix_color, Some(PALETTE[0]));
		assert_eq!(web.options.spawn.cwd.as_deref(), Some(Path::new("/srv/app")));
		assert_eq!(web.options.spawn.rows, 40);
		assert_eq!(web.options.kill_timeout, Some(Duration::from_secs(5)));
		assert_eq!(web.options.spawn.env.get("FORCE_COLOR").map(String::as_str), Some("1"));

		let worker = &entries[1];
		assert!(worker.options.lazy);
		assert_eq!(worker.options.prefix_color, Some(130));
		assert_eq!(worker.options.spawn.cwd.as_deref(), Some(Path::new("/srv/app/worker")));
		assert_eq!(worker.options.spawn.env.len(), 2);
	}

	#[test]
	fn no_color_drops_prefix_colors() {
		let config = RunnerConfig::parse(SAMPLE).unwrap();
		let entries = config.entries(Path::new("."), false);
		assert!(entries.iter().all(|e| e.options.prefix_color.is_none()));
	}

	#[test]
	fn empty_file_is_valid() {
		let config = RunnerConfig::parse("").unwrap();
		assert!(config.procs.is_empty());
	}
}
